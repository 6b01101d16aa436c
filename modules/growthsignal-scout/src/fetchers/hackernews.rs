// Hacker News through the Algolia search API. No credentials; stories and
// comments are searched separately so each can carry its own context.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use growthsignal_common::{Config, Platform, RawCandidate};

use super::{
    http_client, query_terms, run_queries, send_json, FetchMode, FetchReport, FetchRequest,
    Pacing, PlatformFetcher, PlatformItem, SERVICE_USER_AGENT,
};
use crate::filter::strip_html;

const BASE_URL: &str = "https://hn.algolia.com/api/v1";
const HITS_PER_PAGE: u32 = 50;

const DEFAULT_TOPICS: &[&str] = &["trading bot", "algorithmic trading", "LLM agents"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HnTag {
    Story,
    Comment,
}

impl HnTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            HnTag::Story => "story",
            HnTag::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HnQuery {
    pub tag: HnTag,
    pub term: String,
}

impl fmt::Display for HnQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tag.as_str(), self.term)
    }
}

/// A story query and a comment query for every term.
pub fn build_queries(terms: Vec<String>) -> Vec<HnQuery> {
    terms
        .into_iter()
        .flat_map(|term| {
            [HnTag::Story, HnTag::Comment].map(|tag| HnQuery {
                tag,
                term: term.clone(),
            })
        })
        .collect()
}

// --- API shapes ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<HnHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HnHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub story_text: Option<String>,
    #[serde(default)]
    pub comment_text: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at_i: Option<i64>,
    #[serde(default)]
    pub story_title: Option<String>,
    #[serde(default)]
    pub story_id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

pub(crate) fn normalize(hit: HnHit) -> Option<RawCandidate> {
    let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());

    let (content, thread_context) = match non_empty(hit.comment_text) {
        Some(comment) => (
            strip_html(&comment),
            non_empty(hit.story_title).map(|t| format!("Re: {t}")),
        ),
        None => {
            let title = non_empty(hit.title).unwrap_or_default();
            let body = non_empty(hit.story_text)
                .map(|b| strip_html(&b))
                .or(non_empty(hit.url))
                .unwrap_or_default();
            (format!("{title}\n\n{body}").trim().to_string(), None)
        }
    };
    if content.is_empty() {
        return None;
    }

    let author = hit.author.unwrap_or_default();
    Some(RawCandidate {
        platform: Platform::HackerNews,
        external_url: format!("https://news.ycombinator.com/item?id={}", hit.object_id),
        external_id: hit.object_id,
        author_name: author.clone(),
        author_handle: author,
        content,
        thread_context,
        posted_at: hit.created_at_i.and_then(|ts| DateTime::from_timestamp(ts, 0)),
    })
}

// --- Fetcher ---

pub struct HackerNewsFetcher {
    client: reqwest::Client,
    base_url: String,
    pacing: Pacing,
    max_user_keywords: usize,
    topics: Vec<String>,
}

impl HackerNewsFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            client: http_client(Duration::from_secs(config.http_timeout_secs), SERVICE_USER_AGENT),
            base_url: BASE_URL.to_string(),
            pacing: Pacing::fixed(Duration::from_millis(500)),
            max_user_keywords: config.max_user_keywords,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    async fn search(
        &self,
        query: &HnQuery,
        since: DateTime<Utc>,
    ) -> growthsignal_common::Result<Vec<RawCandidate>> {
        let numeric = format!("created_at_i>{}", since.timestamp());
        let hits_per_page = HITS_PER_PAGE.to_string();
        let resp: SearchResponse = send_json(
            self.client
                .get(format!("{}/search_by_date", self.base_url))
                .query(&[
                    ("query", query.term.as_str()),
                    ("tags", query.tag.as_str()),
                    ("numericFilters", numeric.as_str()),
                    ("hitsPerPage", hits_per_page.as_str()),
                ]),
        )
        .await?;

        Ok(resp
            .hits
            .into_iter()
            .filter_map(|hit| PlatformItem::HackerNews(hit).normalize())
            .collect())
    }
}

#[async_trait]
impl PlatformFetcher for HackerNewsFetcher {
    fn platform(&self) -> Platform {
        Platform::HackerNews
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> growthsignal_common::Result<FetchReport> {
        let since = request.since;
        let queries = build_queries(query_terms(
            &self.topics,
            request.keywords,
            self.max_user_keywords,
        ));
        info!(queries = queries.len(), since = %since, "Searching Hacker News");

        let (candidates, queries) = run_queries(
            Platform::HackerNews,
            queries,
            self.pacing.delay(FetchMode::Public),
            |q| async move { self.search(&q, since).await },
        )
        .await;

        Ok(FetchReport {
            mode: FetchMode::Public,
            candidates,
            queries,
        })
    }
}
