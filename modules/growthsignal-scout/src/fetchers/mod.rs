// Platform fetchers. Each one wraps a single external search API and turns
// its responses into RawCandidates. Shared here: the fetch contract, the
// sequential paced query loop, per-run dedup, and query-term selection.

pub mod hackernews;
pub mod linkedin;
pub mod reddit;
pub mod x;

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use growthsignal_common::{ListenerError, Platform, PlatformCredentials, RawCandidate};

pub use hackernews::HackerNewsFetcher;
pub use linkedin::LinkedInFetcher;
pub use reddit::{RedditFetcher, RedditTokenCache};
pub use x::XFetcher;

pub const SERVICE_USER_AGENT: &str = concat!("growthsignal/", env!("CARGO_PKG_VERSION"));

/// Browser-like User-Agent for unauthenticated endpoints that reject bots.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// What a fetcher gets for one run.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    /// Every active keyword phrase, in keyword-list order.
    pub keywords: &'a [String],
    /// Only content newer than this is wanted.
    pub since: DateTime<Utc>,
    /// Resolved credentials, `None` for public/fallback mode.
    pub credentials: Option<&'a PlatformCredentials>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Authenticated,
    Public,
}

/// Result of one external call. Failures are values, not unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Completed { query: String, candidates: usize },
    Failed { query: String, error: String },
}

impl QueryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed { .. })
    }

    pub fn query(&self) -> &str {
        match self {
            QueryOutcome::Completed { query, .. } | QueryOutcome::Failed { query, .. } => query,
        }
    }
}

/// Everything a fetcher produced in one run.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub mode: FetchMode,
    pub candidates: Vec<RawCandidate>,
    pub queries: Vec<QueryOutcome>,
}

impl FetchReport {
    pub fn failed_queries(&self) -> usize {
        self.queries.iter().filter(|q| q.is_failed()).count()
    }
}

/// Shared contract for the four platform adapters.
///
/// `fetch` returns `Err` only when the platform cannot run at all this time
/// (no usable key for an integration without a public mode). Individual
/// query failures are reported inside the [`FetchReport`].
#[async_trait]
pub trait PlatformFetcher: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(&self, request: &FetchRequest<'_>) -> growthsignal_common::Result<FetchReport>;
}

/// Delay between successive external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub authenticated: Duration,
    pub public: Duration,
}

impl Pacing {
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            authenticated: delay,
            public: delay,
        }
    }

    pub const fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn delay(&self, mode: FetchMode) -> Duration {
        match mode {
            FetchMode::Authenticated => self.authenticated,
            FetchMode::Public => self.public,
        }
    }
}

/// Platform-native items at the fetcher boundary. Normalized into
/// [`RawCandidate`] immediately, so nothing downstream sees these shapes.
#[derive(Debug, Clone)]
pub enum PlatformItem {
    Reddit(reddit::RedditPost),
    X(x::Tweet),
    LinkedIn(apify_client::LinkedInPost),
    HackerNews(hackernews::HnHit),
}

impl PlatformItem {
    pub fn normalize(self) -> Option<RawCandidate> {
        match self {
            PlatformItem::Reddit(post) => reddit::normalize(post),
            PlatformItem::X(tweet) => x::normalize(tweet),
            PlatformItem::LinkedIn(post) => linkedin::normalize(post),
            PlatformItem::HackerNews(hit) => hackernews::normalize(hit),
        }
    }
}

/// Run `queries` one after another with `delay` between calls.
///
/// A failed call is logged and recorded, and the loop moves on. Candidates are
/// deduplicated by external id across the whole run, so overlapping queries
/// never yield the same post twice.
pub async fn run_queries<Q, F, Fut>(
    platform: Platform,
    queries: Vec<Q>,
    delay: Duration,
    mut call: F,
) -> (Vec<RawCandidate>, Vec<QueryOutcome>)
where
    Q: fmt::Display,
    F: FnMut(Q) -> Fut,
    Fut: Future<Output = growthsignal_common::Result<Vec<RawCandidate>>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();
    let mut outcomes = Vec::with_capacity(queries.len());

    for (i, query) in queries.into_iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let query_label = query.to_string();
        match call(query).await {
            Ok(batch) => {
                let before = candidates.len();
                candidates.extend(
                    batch
                        .into_iter()
                        .filter(|c| seen.insert(c.external_id.clone())),
                );
                let fresh = candidates.len() - before;
                debug!(%platform, query = query_label.as_str(), fresh, "Query completed");
                outcomes.push(QueryOutcome::Completed {
                    query: query_label,
                    candidates: fresh,
                });
            }
            Err(e) => {
                warn!(%platform, query = query_label.as_str(), error = %e, "Query failed, continuing");
                outcomes.push(QueryOutcome::Failed {
                    query: query_label,
                    error: e.to_string(),
                });
            }
        }
    }

    (candidates, outcomes)
}

/// Curated query terms followed by at most `max_user` user keywords that are
/// not already covered by a curated term.
pub fn query_terms<S: AsRef<str>>(curated: &[S], keywords: &[String], max_user: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut terms = Vec::new();
    for term in curated.iter().map(|t| t.as_ref().trim()) {
        if !term.is_empty() && seen.insert(term.to_lowercase()) {
            terms.push(term.to_string());
        }
    }
    let user = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .take(max_user);
    for term in user {
        if seen.insert(term.to_lowercase()) {
            terms.push(term.to_string());
        }
    }
    terms
}

/// Quote multi-word phrases for search engines that treat spaces as AND.
pub fn quote_phrase(term: &str) -> String {
    if term.contains(char::is_whitespace) {
        format!("\"{term}\"")
    } else {
        term.to_string()
    }
}

/// Build the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration, user_agent: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent.to_string())
        .build()
        .expect("Failed to build HTTP client")
}

/// Send a request and decode a JSON body, mapping non-2xx to `ListenerError::Api`.
pub async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> growthsignal_common::Result<T> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ListenerError::Api {
            status: status.as_u16(),
            message: body.chars().take(500).collect(),
        });
    }
    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(id: &str) -> RawCandidate {
        RawCandidate {
            platform: Platform::Reddit,
            external_id: id.into(),
            external_url: format!("https://www.reddit.com/{id}"),
            author_name: "u".into(),
            author_handle: "u".into(),
            content: "content".into(),
            thread_context: None,
            posted_at: None,
        }
    }

    #[tokio::test]
    async fn failed_query_does_not_stop_the_batch() {
        let queries: Vec<String> = (1..=5).map(|i| format!("q{i}")).collect();
        let calls = AtomicUsize::new(0);

        let (candidates, outcomes) =
            run_queries(Platform::Reddit, queries, Duration::ZERO, |q| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if q == "q2" {
                        Err(ListenerError::Http("connection reset".into()))
                    } else {
                        Ok(vec![candidate(&format!("id-{q}"))])
                    }
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(candidates.len(), 4);
        let ids: Vec<&str> = candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["id-q1", "id-q3", "id-q4", "id-q5"]);
        assert!(outcomes[1].is_failed());
        assert_eq!(outcomes[1].query(), "q2");
        assert_eq!(outcomes.iter().filter(|o| o.is_failed()).count(), 1);
    }

    #[tokio::test]
    async fn overlapping_queries_yield_each_post_once() {
        let queries = vec!["a".to_string(), "b".to_string()];
        let (candidates, outcomes) =
            run_queries(Platform::Reddit, queries, Duration::ZERO, |_| async {
                Ok(vec![candidate("same"), candidate("same")])
            })
            .await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(
            outcomes,
            vec![
                QueryOutcome::Completed { query: "a".into(), candidates: 1 },
                QueryOutcome::Completed { query: "b".into(), candidates: 0 },
            ]
        );
    }

    #[test]
    fn only_first_n_user_keywords_are_folded_in() {
        let keywords: Vec<String> = ["LLM", "trading bot", "rust", "quant", "agents"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let terms = query_terms(&["Trading Bot", "algo trading"], &keywords, 3);
        // "trading bot" is already curated, so it is skipped, not replaced.
        assert_eq!(terms, vec!["Trading Bot", "algo trading", "LLM", "rust"]);
    }

    #[test]
    fn multi_word_terms_are_quoted() {
        assert_eq!(quote_phrase("trading bot"), "\"trading bot\"");
        assert_eq!(quote_phrase("LLM"), "LLM");
    }

    #[test]
    fn pacing_is_wider_in_public_mode() {
        let pacing = Pacing {
            authenticated: Duration::from_secs(1),
            public: Duration::from_secs(3),
        };
        assert_eq!(pacing.delay(FetchMode::Public), Duration::from_secs(3));
        assert_eq!(pacing.delay(FetchMode::Authenticated), Duration::from_secs(1));
    }
}
