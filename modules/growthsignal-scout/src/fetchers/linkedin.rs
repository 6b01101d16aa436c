// LinkedIn content search through an Apify actor. Each query is one
// synchronous actor run, so pacing here is about Apify spend more than rate
// limits.

use std::time::Duration;

use apify_client::{ApifyClient, ApifyError, LinkedInPost};
use async_trait::async_trait;
use tracing::info;
use url::Url;

use growthsignal_common::{Config, ListenerError, Platform, PlatformCredentials, RawCandidate};

use super::{
    query_terms, run_queries, FetchMode, FetchReport, FetchRequest, Pacing, PlatformFetcher,
    PlatformItem,
};

const SEARCH_RESULTS_URL: &str = "https://www.linkedin.com/search/results/content/";
const MAX_RESULTS: u32 = 25;

const DEFAULT_TOPICS: &[&str] = &["trading bot", "algorithmic trading", "AI trading"];

/// LinkedIn content-search URL for `query`, newest first, past week only.
pub fn search_url(query: &str) -> String {
    match Url::parse_with_params(SEARCH_RESULTS_URL, &[("keywords", query)]) {
        Ok(url) => format!(
            "{url}&sortBy=%22date_posted%22&datePosted=%22past-week%22"
        ),
        Err(_) => SEARCH_RESULTS_URL.to_string(),
    }
}

fn listener_error(err: ApifyError) -> ListenerError {
    match err.status() {
        Some(status) => ListenerError::Api {
            status,
            message: err.to_string(),
        },
        None => ListenerError::Http(err.to_string()),
    }
}

pub(crate) fn normalize(post: LinkedInPost) -> Option<RawCandidate> {
    let external_id = post.external_id()?.to_string();
    let content = post
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();
    let author_handle = post.author_handle().unwrap_or_default();
    let author_name = post
        .author_name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| author_handle.clone());
    let external_url = post
        .url
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("https://www.linkedin.com/feed/update/{external_id}/"));

    Some(RawCandidate {
        platform: Platform::LinkedIn,
        posted_at: post.posted_at(),
        external_id,
        external_url,
        author_name,
        author_handle,
        content,
        thread_context: post.author_headline.filter(|h| !h.is_empty()),
    })
}

pub struct LinkedInFetcher {
    apify_base_url: Option<String>,
    fallback_token: Option<String>,
    default_actor: String,
    pacing: Pacing,
    max_user_keywords: usize,
    topics: Vec<String>,
}

impl LinkedInFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            apify_base_url: None,
            fallback_token: config.apify_api_token.clone(),
            default_actor: config.apify_linkedin_actor.clone(),
            pacing: Pacing::fixed(Duration::from_secs(2)),
            max_user_keywords: config.max_user_keywords,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn with_apify_base_url(mut self, base_url: &str) -> Self {
        self.apify_base_url = Some(base_url.to_string());
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

    /// Token and actor from stored credentials, else from config.
    fn account(&self, credentials: Option<&PlatformCredentials>) -> Option<(String, String)> {
        match credentials {
            Some(PlatformCredentials::LinkedIn(creds)) if !creds.api_token.is_empty() => {
                let actor = creds
                    .actor_id
                    .clone()
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| self.default_actor.clone());
                Some((creds.api_token.clone(), actor))
            }
            _ => self
                .fallback_token
                .clone()
                .map(|token| (token, self.default_actor.clone())),
        }
    }

    fn client(&self, token: String) -> ApifyClient {
        match self.apify_base_url.as_deref() {
            Some(base) => ApifyClient::with_base_url(token, base),
            None => ApifyClient::new(token),
        }
    }
}

#[async_trait]
impl PlatformFetcher for LinkedInFetcher {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> growthsignal_common::Result<FetchReport> {
        let (token, actor) = self.account(request.credentials).ok_or_else(|| {
            ListenerError::Config(
                "no Apify token: store LinkedIn credentials or set APIFY_API_TOKEN".into(),
            )
        })?;
        let client = self.client(token);
        let since = request.since;

        let queries = query_terms(&self.topics, request.keywords, self.max_user_keywords);
        info!(actor = actor.as_str(), queries = queries.len(), "Searching LinkedIn");

        let (client, actor) = (&client, actor.as_str());
        let (candidates, queries) = run_queries(
            Platform::LinkedIn,
            queries,
            self.pacing.delay(FetchMode::Authenticated),
            |q| async move {
                let posts = client
                    .search_linkedin_posts(actor, &search_url(&q), MAX_RESULTS)
                    .await
                    .map_err(listener_error)?;
                Ok(posts
                    .into_iter()
                    .filter_map(|p| PlatformItem::LinkedIn(p).normalize())
                    .filter(|c| !matches!(c.posted_at, Some(at) if at < since))
                    .collect())
            },
        )
        .await;

        Ok(FetchReport {
            mode: FetchMode::Authenticated,
            candidates,
            queries,
        })
    }
}
