// Test doubles for the listener.
//
// Two mocks matching the two trait boundaries:
// - MemoryStore (DiscoveryStore): stateful in-memory tables, atomic persist
// - StaticFetcher (PlatformFetcher): scripted candidates or a scripted failure
//
// Plus helpers for building candidates and keyword lists.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use growthsignal_common::{
    Keyword, ListenerError, NewDiscoveredPost, Platform, PlatformCredentials, RawCandidate,
};

use crate::fetchers::{FetchMode, FetchReport, FetchRequest, PlatformFetcher, QueryOutcome};
use crate::persist::{keyword_increments, PersistOutcome};
use crate::store::DiscoveryStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn candidate(platform: Platform, external_id: &str, content: &str) -> RawCandidate {
    RawCandidate {
        platform,
        external_id: external_id.to_string(),
        external_url: format!("https://example.test/{}/{external_id}", platform.as_str()),
        author_name: "Test Author".to_string(),
        author_handle: "test_author".to_string(),
        content: content.to_string(),
        thread_context: None,
        posted_at: None,
    }
}

pub fn phrases(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|k| k.to_string()).collect()
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    keywords: Vec<Keyword>,
    posts: Vec<NewDiscoveredPost>,
    accounts: HashMap<Platform, String>,
    fetched: HashMap<Platform, DateTime<Utc>>,
    fail_keywords: bool,
    fail_persist: bool,
    persist_calls: usize,
}

/// In-memory `DiscoveryStore`. `persist_batch` applies inserts and counter
/// increments under one lock, or nothing at all when configured to fail.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords(self, phrases: &[&str]) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            s.keywords
                .extend(phrases.iter().map(|p| Keyword::new(p, None)));
        }
        self
    }

    pub fn with_inactive_keyword(self, phrase: &str) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            let mut kw = Keyword::new(phrase, None);
            kw.is_active = false;
            s.keywords.push(kw);
        }
        self
    }

    pub fn with_account(self, platform: Platform, blob: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(platform, blob.to_string());
        self
    }

    /// Seed a row as if an earlier run had stored it.
    pub fn with_post(self, post: NewDiscoveredPost) -> Self {
        self.state.lock().unwrap().posts.push(post);
        self
    }

    pub fn failing_keywords(self) -> Self {
        self.state.lock().unwrap().fail_keywords = true;
        self
    }

    pub fn failing_persist(self) -> Self {
        self.state.lock().unwrap().fail_persist = true;
        self
    }

    pub fn post_count(&self) -> usize {
        self.state.lock().unwrap().posts.len()
    }

    pub fn posts_for(&self, platform: Platform) -> Vec<NewDiscoveredPost> {
        self.state
            .lock()
            .unwrap()
            .posts
            .iter()
            .filter(|p| p.platform == platform)
            .cloned()
            .collect()
    }

    pub fn post(&self, platform: Platform, external_id: &str) -> Option<NewDiscoveredPost> {
        self.state
            .lock()
            .unwrap()
            .posts
            .iter()
            .find(|p| p.platform == platform && p.external_id == external_id)
            .cloned()
    }

    pub fn posts_matched(&self, phrase: &str) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .keywords
            .iter()
            .find(|k| k.phrase == phrase)
            .map(|k| k.posts_matched)
    }

    pub fn last_fetched(&self, platform: Platform) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().fetched.get(&platform).copied()
    }

    pub fn persist_calls(&self) -> usize {
        self.state.lock().unwrap().persist_calls
    }
}

#[async_trait]
impl DiscoveryStore for MemoryStore {
    async fn active_keywords(&self) -> Result<Vec<Keyword>> {
        let s = self.state.lock().unwrap();
        if s.fail_keywords {
            bail!("keyword table unavailable");
        }
        Ok(s.keywords.iter().filter(|k| k.is_active).cloned().collect())
    }

    async fn latest_discovered_at(&self, platform: Platform) -> Result<Option<DateTime<Utc>>> {
        let s = self.state.lock().unwrap();
        Ok(s.posts
            .iter()
            .filter(|p| p.platform == platform)
            .map(|p| p.discovered_at)
            .max())
    }

    async fn account_credentials(&self, platform: Platform) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().accounts.get(&platform).cloned())
    }

    async fn mark_fetched(&self, platform: Platform, at: DateTime<Utc>) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if s.accounts.contains_key(&platform) {
            s.fetched.insert(platform, at);
        }
        Ok(())
    }

    async fn persist_batch(&self, posts: &[NewDiscoveredPost]) -> Result<PersistOutcome> {
        let mut s = self.state.lock().unwrap();
        s.persist_calls += 1;
        if s.fail_persist {
            bail!("simulated write failure");
        }

        let mut inserted: Vec<NewDiscoveredPost> = Vec::new();
        for post in posts {
            let taken = s
                .posts
                .iter()
                .chain(inserted.iter())
                .any(|p| p.platform == post.platform && p.external_id == post.external_id);
            if !taken {
                inserted.push(post.clone());
            }
        }

        let increments = keyword_increments(inserted.iter().map(|p| p.matched_keywords.as_slice()));
        for kw in s.keywords.iter_mut() {
            if let Some(n) = increments.get(kw.phrase.trim()) {
                kw.posts_matched += n;
            }
        }
        let count = inserted.len();
        s.posts.extend(inserted);

        Ok(PersistOutcome {
            submitted: posts.len(),
            inserted: count,
            increments,
        })
    }
}

// ---------------------------------------------------------------------------
// StaticFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub keywords: Vec<String>,
    pub since: DateTime<Utc>,
    pub credentials: Option<PlatformCredentials>,
}

/// Returns the same candidates on every call, or fails every call.
pub struct StaticFetcher {
    platform: Platform,
    candidates: Vec<RawCandidate>,
    failure: Option<String>,
    requests: Mutex<Vec<SeenRequest>>,
}

impl StaticFetcher {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            candidates: Vec::new(),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<RawCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Fail every fetch the way an unconfigured integration does.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PlatformFetcher for StaticFetcher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> growthsignal_common::Result<FetchReport> {
        self.requests.lock().unwrap().push(SeenRequest {
            keywords: request.keywords.to_vec(),
            since: request.since,
            credentials: request.credentials.cloned(),
        });

        if let Some(message) = &self.failure {
            return Err(ListenerError::Config(message.clone()));
        }

        Ok(FetchReport {
            mode: if request.credentials.is_some() {
                FetchMode::Authenticated
            } else {
                FetchMode::Public
            },
            candidates: self.candidates.clone(),
            queries: vec![QueryOutcome::Completed {
                query: format!("static:{}", self.platform),
                candidates: self.candidates.len(),
            }],
        })
    }
}
