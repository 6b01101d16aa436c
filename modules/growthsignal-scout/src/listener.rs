// Listener orchestrator: one bounded discovery run across every registered
// platform. Platforms run concurrently and fail independently; within a
// platform the steps are fetch, filter, persist.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, info_span, warn, Instrument};

use growthsignal_common::{Config, ListenerResult, Platform};

use crate::credentials::{CredentialResolver, SecretCipher};
use crate::fetchers::{
    FetchMode, FetchRequest, HackerNewsFetcher, LinkedInFetcher, PlatformFetcher, QueryOutcome,
    RedditFetcher, RedditTokenCache, XFetcher,
};
use crate::filter::ContentFilter;
use crate::persist::Persister;
use crate::store::DiscoveryStore;
use crate::watermark::{since_for, WatermarkPolicy};

/// Where a platform's run got to. Every platform ends in `Done`; a failure is
/// recorded in [`PlatformReport::failed_in`] and `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformPhase {
    Idle,
    Fetching,
    Filtering,
    Persisting,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformReport {
    pub platform: Platform,
    pub phase: PlatformPhase,
    pub mode: Option<FetchMode>,
    pub since: Option<DateTime<Utc>>,
    pub queries: Vec<QueryOutcome>,
    /// Candidates returned by the fetcher.
    pub fetched: usize,
    /// Candidates that passed the content filter.
    pub accepted: usize,
    /// Rows that were new to storage.
    pub inserted: usize,
    /// Phase the platform was in when it failed.
    pub failed_in: Option<PlatformPhase>,
    pub error: Option<String>,
}

impl PlatformReport {
    fn idle(platform: Platform) -> Self {
        Self {
            platform,
            phase: PlatformPhase::Idle,
            mode: None,
            since: None,
            queries: Vec::new(),
            fetched: 0,
            accepted: 0,
            inserted: 0,
            failed_in: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed_queries(&self) -> usize {
        self.queries.iter().filter(|q| q.is_failed()).count()
    }

    fn advance(&mut self, phase: PlatformPhase) {
        debug!(from = ?self.phase, to = ?phase, "Phase transition");
        self.phase = phase;
    }

    fn fail(mut self, error: String) -> Self {
        self.failed_in = Some(self.phase);
        self.error = Some(error);
        self.advance(PlatformPhase::Done);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub keywords: usize,
    pub platforms: Vec<PlatformReport>,
}

impl RunSummary {
    pub fn total_inserted(&self) -> usize {
        self.platforms.iter().map(|p| p.inserted).sum()
    }

    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.platforms
            .iter()
            .filter(|p| !p.is_success())
            .map(|p| p.platform)
            .collect()
    }

    pub fn report(&self, platform: Platform) -> Option<&PlatformReport> {
        self.platforms.iter().find(|p| p.platform == platform)
    }
}

pub struct Listener {
    store: Arc<dyn DiscoveryStore>,
    fetchers: Vec<Arc<dyn PlatformFetcher>>,
    credentials: CredentialResolver,
    persister: Persister,
    watermark: WatermarkPolicy,
    filter: ContentFilter,
}

impl Listener {
    pub fn new(
        store: Arc<dyn DiscoveryStore>,
        fetchers: Vec<Arc<dyn PlatformFetcher>>,
        cipher: Option<SecretCipher>,
        watermark: WatermarkPolicy,
    ) -> Self {
        Self {
            credentials: CredentialResolver::new(store.clone(), cipher),
            persister: Persister::new(store.clone()),
            store,
            fetchers,
            watermark,
            filter: ContentFilter,
        }
    }

    /// The production wiring: all four platforms, one shared Reddit token cache.
    pub fn from_config(config: &Config, store: Arc<dyn DiscoveryStore>) -> Self {
        let token_cache = Arc::new(RedditTokenCache::new());
        let fetchers: Vec<Arc<dyn PlatformFetcher>> = vec![
            Arc::new(RedditFetcher::new(config, token_cache)),
            Arc::new(XFetcher::new(config)),
            Arc::new(LinkedInFetcher::new(config)),
            Arc::new(HackerNewsFetcher::new(config)),
        ];
        Self::new(
            store,
            fetchers,
            SecretCipher::from_config(config),
            WatermarkPolicy::from_config(config),
        )
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.fetchers.iter().map(|f| f.platform()).collect()
    }

    /// Run every platform once. Only a failure to load keywords fails the
    /// run; everything platform-level lands in that platform's report.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let keywords = self.active_phrases().await?;

        if keywords.is_empty() {
            info!("No active keywords, skipping discovery run");
            return Ok(RunSummary {
                started_at,
                finished_at: Utc::now(),
                keywords: 0,
                platforms: Vec::new(),
            });
        }

        info!(
            keywords = keywords.len(),
            platforms = self.fetchers.len(),
            "Starting discovery run"
        );

        let platforms = join_all(self.fetchers.iter().map(|fetcher| {
            let span = info_span!("platform", platform = %fetcher.platform());
            self.run_fetcher(fetcher.as_ref(), &keywords).instrument(span)
        }))
        .await;

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            keywords: keywords.len(),
            platforms,
        };
        info!(
            inserted = summary.total_inserted(),
            failed_platforms = summary.failed_platforms().len(),
            "Discovery run complete"
        );
        Ok(summary)
    }

    /// Run once and return only the number of new posts. Never fails.
    pub async fn discover(&self) -> usize {
        match self.run().await {
            Ok(summary) => summary.total_inserted(),
            Err(e) => {
                error!(error = %e, "Discovery run failed");
                0
            }
        }
    }

    /// Run a single platform, e.g. from a manual trigger.
    pub async fn run_platform(&self, platform: Platform) -> Result<PlatformReport> {
        let fetcher = self
            .fetchers
            .iter()
            .find(|f| f.platform() == platform)
            .ok_or_else(|| anyhow!("no fetcher registered for {platform}"))?;

        let keywords = self.active_phrases().await?;
        if keywords.is_empty() {
            info!(%platform, "No active keywords, skipping platform run");
            return Ok(PlatformReport::idle(platform));
        }

        let span = info_span!("platform", %platform);
        Ok(self
            .run_fetcher(fetcher.as_ref(), &keywords)
            .instrument(span)
            .await)
    }

    async fn active_phrases(&self) -> Result<Vec<String>> {
        let keywords = self.store.active_keywords().await?;
        Ok(keywords
            .into_iter()
            .map(|k| k.phrase.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect())
    }

    async fn run_fetcher(&self, fetcher: &dyn PlatformFetcher, keywords: &[String]) -> PlatformReport {
        let platform = fetcher.platform();
        let mut report = PlatformReport::idle(platform);

        // Fetching
        report.advance(PlatformPhase::Fetching);
        let since = since_for(self.store.as_ref(), &self.watermark, platform, Utc::now()).await;
        report.since = Some(since);
        let credentials = self.credentials.resolve(platform).await;

        let fetched = match fetcher
            .fetch(&FetchRequest {
                keywords,
                since,
                credentials: credentials.as_ref(),
            })
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(error = %e, "Platform skipped");
                return report.fail(e.to_string());
            }
        };
        report.mode = Some(fetched.mode);
        report.fetched = fetched.candidates.len();
        report.queries = fetched.queries;

        if platform == Platform::Reddit {
            if let Err(e) = self.store.mark_fetched(platform, Utc::now()).await {
                warn!(error = %e, "Failed to stamp last_fetched_at");
            }
        }

        // Filtering
        report.advance(PlatformPhase::Filtering);
        let discovered_at = Utc::now();
        let results: Vec<ListenerResult> = fetched
            .candidates
            .into_iter()
            .filter_map(|c| self.filter.evaluate(c, keywords, discovered_at))
            .collect();
        report.accepted = results.len();

        // Persisting
        report.advance(PlatformPhase::Persisting);
        match self.persister.persist(results).await {
            Ok(outcome) => report.inserted = outcome.inserted,
            Err(e) => {
                let message = format!("{e:#}");
                error!(error = message.as_str(), "Persist failed, nothing stored for this platform");
                return report.fail(message);
            }
        }

        report.advance(PlatformPhase::Done);
        info!(
            mode = ?report.mode,
            fetched = report.fetched,
            accepted = report.accepted,
            inserted = report.inserted,
            failed_queries = report.failed_queries(),
            "Platform run complete"
        );
        report
    }
}
