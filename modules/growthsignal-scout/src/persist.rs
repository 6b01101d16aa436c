// Dedup + persistence: ListenerResults → discovered_posts rows + keyword counters.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use growthsignal_common::{ListenerResult, NewDiscoveredPost};

use crate::store::DiscoveryStore;

/// What one `persist` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Rows handed to storage after in-batch dedup.
    pub submitted: usize,
    /// Rows that were actually new.
    pub inserted: usize,
    /// Per-phrase counter increments applied alongside the insert.
    pub increments: BTreeMap<String, i64>,
}

impl PersistOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Counter increments for a set of inserted rows: each phrase gains one per
/// inserted row that lists it. Phrases listed twice on one row count once.
pub fn keyword_increments<'a, I>(inserted_rows: I) -> BTreeMap<String, i64>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut increments = BTreeMap::new();
    for keywords in inserted_rows {
        let unique: HashSet<&String> = keywords.iter().collect();
        for phrase in unique {
            *increments.entry(phrase.clone()).or_insert(0) += 1;
        }
    }
    increments
}

/// Drop repeated `(platform, external_id)` keys, keeping the first occurrence.
pub fn dedup_batch(results: Vec<ListenerResult>) -> Vec<ListenerResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| {
            let (platform, id) = r.dedup_key();
            seen.insert((platform, id.to_string()))
        })
        .collect()
}

pub struct Persister {
    store: Arc<dyn DiscoveryStore>,
}

impl Persister {
    pub fn new(store: Arc<dyn DiscoveryStore>) -> Self {
        Self { store }
    }

    /// Insert-or-skip a batch and bump keyword counters for the new rows only.
    /// Re-running with the same batch inserts nothing and increments nothing.
    pub async fn persist(&self, results: Vec<ListenerResult>) -> Result<PersistOutcome> {
        let received = results.len();
        let unique = dedup_batch(results);
        if unique.len() < received {
            debug!(
                received,
                unique = unique.len(),
                "Dropped in-batch duplicates before persisting"
            );
        }
        if unique.is_empty() {
            return Ok(PersistOutcome::empty());
        }

        let rows: Vec<NewDiscoveredPost> = unique.into_iter().map(Into::into).collect();
        let outcome = self.store.persist_batch(&rows).await?;

        info!(
            submitted = outcome.submitted,
            inserted = outcome.inserted,
            skipped = outcome.submitted - outcome.inserted,
            keywords_bumped = outcome.increments.len(),
            "Persisted discovered posts"
        );
        Ok(outcome)
    }
}
