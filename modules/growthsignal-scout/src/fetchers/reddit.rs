// Reddit search. OAuth (password grant) when an account is configured,
// otherwise the public JSON endpoint with a browser UA and wider pacing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use growthsignal_common::{
    Config, ListenerError, Platform, PlatformCredentials, RawCandidate, RedditCredentials,
};

use super::{
    http_client, query_terms, quote_phrase, run_queries, send_json, FetchMode, FetchReport,
    FetchRequest, Pacing, PlatformFetcher, PlatformItem, BROWSER_USER_AGENT,
};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const OAUTH_BASE: &str = "https://oauth.reddit.com";
const PUBLIC_BASE: &str = "https://www.reddit.com";

/// Tokens are treated as expired this long before Reddit says they are.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);
/// Upper bound on how long a token is trusted, whatever `expires_in` says.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

const PAGE_LIMIT: u32 = 25;

const DEFAULT_TOPICS: &[&str] = &[
    "trading bot",
    "algo trading",
    "automated trading strategy",
    "AI trading assistant",
    "LLM trading",
];

// --- Token cache ---

struct CachedToken {
    client_id: String,
    access_token: String,
    expires_at: Instant,
}

/// Process-wide Reddit access token. Refresh happens while holding the lock,
/// so concurrent callers never trigger two token exchanges.
#[derive(Default)]
pub struct RedditTokenCache {
    inner: Mutex<Option<CachedToken>>,
}

impl RedditTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token for `client_id`, or run `refresh` to get a new
    /// one. `refresh` yields the token and its lifetime.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        client_id: &str,
        refresh: F,
    ) -> growthsignal_common::Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = growthsignal_common::Result<(String, Duration)>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.client_id == client_id && Instant::now() + TOKEN_EXPIRY_SKEW < cached.expires_at
            {
                return Ok(cached.access_token.clone());
            }
        }

        let (access_token, lifetime) = refresh().await?;
        *guard = Some(CachedToken {
            client_id: client_id.to_string(),
            access_token: access_token.clone(),
            expires_at: Instant::now() + lifetime.min(MAX_TOKEN_LIFETIME),
        });
        Ok(access_token)
    }

    /// Forget the cached token, e.g. after a 401.
    pub async fn invalidate(&self) {
        self.inner.lock().await.take();
    }
}

// --- API shapes ---

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RedditPost,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
}

pub(crate) fn normalize(post: RedditPost) -> Option<RawCandidate> {
    let content = format!("{}\n\n{}", post.title, post.selftext)
        .trim()
        .to_string();
    if content.is_empty() {
        return None;
    }
    let external_id = post
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("t3_{}", post.id));
    Some(RawCandidate {
        platform: Platform::Reddit,
        external_id,
        external_url: format!("https://www.reddit.com{}", post.permalink),
        author_name: post.author.clone(),
        author_handle: post.author,
        content,
        thread_context: (!post.subreddit.is_empty()).then(|| format!("r/{}", post.subreddit)),
        posted_at: DateTime::from_timestamp(post.created_utc as i64, 0),
    })
}

// --- Fetcher ---

#[derive(Debug, Clone)]
pub struct RedditEndpoints {
    pub token_url: String,
    pub oauth_base: String,
    pub public_base: String,
}

impl Default for RedditEndpoints {
    fn default() -> Self {
        Self {
            token_url: TOKEN_URL.to_string(),
            oauth_base: OAUTH_BASE.to_string(),
            public_base: PUBLIC_BASE.to_string(),
        }
    }
}

impl RedditEndpoints {
    /// All three endpoints on one host. Used against mock servers.
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token_url: format!("{base}/api/v1/access_token"),
            oauth_base: base.to_string(),
            public_base: base.to_string(),
        }
    }
}

pub struct RedditFetcher {
    client: reqwest::Client,
    endpoints: RedditEndpoints,
    token_cache: Arc<RedditTokenCache>,
    user_agent: String,
    pacing: Pacing,
    max_user_keywords: usize,
    topics: Vec<String>,
}

impl RedditFetcher {
    pub fn new(config: &Config, token_cache: Arc<RedditTokenCache>) -> Self {
        Self {
            client: http_client(
                Duration::from_secs(config.http_timeout_secs),
                &config.reddit_user_agent,
            ),
            endpoints: RedditEndpoints::default(),
            token_cache,
            user_agent: config.reddit_user_agent.clone(),
            pacing: Pacing {
                authenticated: Duration::from_secs(1),
                public: Duration::from_secs(3),
            },
            max_user_keywords: config.max_user_keywords,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: RedditEndpoints) -> Self {
        self.endpoints = endpoints;
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

    async fn access_token(&self, creds: &RedditCredentials) -> growthsignal_common::Result<String> {
        self.token_cache
            .get_or_refresh(&creds.client_id, || self.request_token(creds))
            .await
    }

    async fn request_token(
        &self,
        creds: &RedditCredentials,
    ) -> growthsignal_common::Result<(String, Duration)> {
        let resp: TokenResponse = send_json(
            self.client
                .post(&self.endpoints.token_url)
                .basic_auth(&creds.client_id, Some(&creds.client_secret))
                .header(USER_AGENT, &self.user_agent)
                .form(&[
                    ("grant_type", "password"),
                    ("username", creds.username.as_str()),
                    ("password", creds.password.as_str()),
                ]),
        )
        .await?;

        // Reddit reports bad grants as 200 with an `error` field.
        let token = resp.access_token.ok_or_else(|| {
            ListenerError::Credentials(format!(
                "Reddit token exchange rejected: {}",
                resp.error.as_deref().unwrap_or("no access_token in response")
            ))
        })?;
        info!(client_id = creds.client_id.as_str(), "Obtained Reddit access token");
        Ok((token, Duration::from_secs(resp.expires_in.unwrap_or(3600))))
    }

    async fn search_authenticated(
        &self,
        creds: &RedditCredentials,
        query: &str,
        since: DateTime<Utc>,
    ) -> growthsignal_common::Result<Vec<RawCandidate>> {
        let token = self.access_token(creds).await?;
        let request = self
            .client
            .get(format!("{}/search", self.endpoints.oauth_base))
            .bearer_auth(&token)
            .header(USER_AGENT, &self.user_agent);

        let result = self.search(request, query, since).await;
        if let Err(ListenerError::Api { status: 401, .. }) = &result {
            self.token_cache.invalidate().await;
        }
        result
    }

    async fn search_public(
        &self,
        query: &str,
        since: DateTime<Utc>,
    ) -> growthsignal_common::Result<Vec<RawCandidate>> {
        let request = self
            .client
            .get(format!("{}/search.json", self.endpoints.public_base))
            .header(USER_AGENT, BROWSER_USER_AGENT);
        self.search(request, query, since).await
    }

    async fn search(
        &self,
        request: reqwest::RequestBuilder,
        query: &str,
        since: DateTime<Utc>,
    ) -> growthsignal_common::Result<Vec<RawCandidate>> {
        let limit = PAGE_LIMIT.to_string();
        let listing: Listing = send_json(request.query(&[
            ("q", query),
            ("sort", "new"),
            ("t", "week"),
            ("limit", limit.as_str()),
            ("raw_json", "1"),
        ]))
        .await?;

        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(|child| PlatformItem::Reddit(child.data).normalize())
            .filter(|c| c.posted_at.is_some_and(|at| at > since))
            .collect())
    }
}

#[async_trait]
impl PlatformFetcher for RedditFetcher {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> growthsignal_common::Result<FetchReport> {
        let creds = match request.credentials {
            Some(PlatformCredentials::Reddit(creds)) => match self.access_token(creds).await {
                Ok(_) => Some(creds),
                Err(e) => {
                    warn!(error = %e, "Reddit token exchange failed, falling back to public search");
                    None
                }
            },
            Some(other) => {
                warn!(got = %other.platform(), "Ignoring credentials for another platform");
                None
            }
            None => None,
        };
        let mode = if creds.is_some() {
            FetchMode::Authenticated
        } else {
            FetchMode::Public
        };

        let queries: Vec<String> = query_terms(&self.topics, request.keywords, self.max_user_keywords)
            .iter()
            .map(|t| quote_phrase(t))
            .collect();
        info!(?mode, queries = queries.len(), since = %request.since, "Searching Reddit");

        let since = request.since;
        let (candidates, queries) =
            run_queries(Platform::Reddit, queries, self.pacing.delay(mode), |q| async move {
                match creds {
                    Some(creds) => self.search_authenticated(creds, &q, since).await,
                    None => self.search_public(&q, since).await,
                }
            })
            .await;

        Ok(FetchReport {
            mode,
            candidates,
            queries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use mockito::Matcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn listing(posts: &[(&str, &str, i64)]) -> String {
        let children: Vec<serde_json::Value> = posts
            .iter()
            .map(|(id, title, created)| {
                serde_json::json!({
                    "kind": "t3",
                    "data": {
                        "id": id,
                        "name": format!("t3_{id}"),
                        "title": title,
                        "selftext": "Any suggestions welcome.",
                        "author": "quant_curious",
                        "subreddit": "algotrading",
                        "permalink": format!("/r/algotrading/comments/{id}/post/"),
                        "created_utc": *created as f64,
                    }
                })
            })
            .collect();
        serde_json::json!({ "kind": "Listing", "data": { "children": children } }).to_string()
    }

    fn fetcher(base: &str) -> RedditFetcher {
        RedditFetcher::new(&Config::for_tests(), Arc::new(RedditTokenCache::new()))
            .with_endpoints(RedditEndpoints::single_host(base))
            .with_pacing(Pacing::none())
            .with_topics(vec!["trading bot".into(), "LLM".into()])
    }

    fn creds() -> PlatformCredentials {
        PlatformCredentials::Reddit(RedditCredentials {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            username: "growth".into(),
            password: "pw".into(),
        })
    }

    #[test]
    fn normalizes_listing_posts() {
        let post: RedditPost = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "name": "t3_abc",
            "title": "Best trading bot?",
            "selftext": "Need one for crypto",
            "author": "quant_curious",
            "subreddit": "algotrading",
            "permalink": "/r/algotrading/comments/abc/best/",
            "created_utc": 1717243200.0
        }))
        .unwrap();

        let c = normalize(post).unwrap();
        assert_eq!(c.external_id, "t3_abc");
        assert_eq!(c.external_url, "https://www.reddit.com/r/algotrading/comments/abc/best/");
        assert_eq!(c.content, "Best trading bot?\n\nNeed one for crypto");
        assert_eq!(c.thread_context.as_deref(), Some("r/algotrading"));
        assert_eq!(c.posted_at.unwrap().timestamp(), 1_717_243_200);
    }

    #[tokio::test]
    async fn public_mode_never_calls_token_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let now = Utc::now().timestamp();
        let token = server
            .mock("POST", "/api/v1/access_token")
            .expect(0)
            .create_async()
            .await;
        let search = server
            .mock("GET", "/search.json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("sort".into(), "new".into()),
                Matcher::UrlEncoded("raw_json".into(), "1".into()),
            ]))
            .match_header("user-agent", Matcher::Regex("Mozilla".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(listing(&[("p1", "Looking for a trading bot", now - 60)]))
            .expect(2)
            .create_async()
            .await;

        let since = Utc::now() - ChronoDuration::hours(1);
        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url())
            .fetch(&FetchRequest {
                keywords: &keywords,
                since,
                credentials: None,
            })
            .await
            .unwrap();

        assert_eq!(report.mode, FetchMode::Public);
        assert_eq!(report.queries.len(), 2);
        // Both queries return the same post; the run keeps one copy.
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].external_id, "t3_p1");
        token.assert_async().await;
        search.assert_async().await;
    }

    #[tokio::test]
    async fn authenticated_mode_reuses_one_token() {
        let mut server = mockito::Server::new_async().await;
        let now = Utc::now().timestamp();
        let token = server
            .mock("POST", "/api/v1/access_token")
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .match_body(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .with_status(200)
            .with_body(r#"{"access_token":"tok123","token_type":"bearer","expires_in":86400}"#)
            .expect(1)
            .create_async()
            .await;
        let search = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer tok123")
            .with_status(200)
            .with_body(listing(&[("a1", "Which LLM for trading signals?", now - 30)]))
            .expect(2)
            .create_async()
            .await;

        let creds = creds();
        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url())
            .fetch(&FetchRequest {
                keywords: &keywords,
                since: Utc::now() - ChronoDuration::hours(1),
                credentials: Some(&creds),
            })
            .await
            .unwrap();

        assert_eq!(report.mode, FetchMode::Authenticated);
        assert_eq!(report.candidates.len(), 1);
        token.assert_async().await;
        search.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_grant_falls_back_to_public_search() {
        let mut server = mockito::Server::new_async().await;
        let now = Utc::now().timestamp();
        server
            .mock("POST", "/api/v1/access_token")
            .with_status(200)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;
        let public = server
            .mock("GET", "/search.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(listing(&[("z9", "Anyone built a trading bot?", now - 10)]))
            .expect(2)
            .create_async()
            .await;

        let creds = creds();
        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url())
            .fetch(&FetchRequest {
                keywords: &keywords,
                since: Utc::now() - ChronoDuration::hours(1),
                credentials: Some(&creds),
            })
            .await
            .unwrap();

        assert_eq!(report.mode, FetchMode::Public);
        assert_eq!(report.candidates.len(), 1);
        public.assert_async().await;
    }

    #[tokio::test]
    async fn posts_at_or_before_watermark_are_skipped() {
        let mut server = mockito::Server::new_async().await;
        let since = Utc::now() - ChronoDuration::hours(1);
        server
            .mock("GET", "/search.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(listing(&[
                ("new1", "Fresh trading bot question", Utc::now().timestamp() - 5),
                ("old1", "Stale trading bot question", since.timestamp() - 600),
                ("edge", "Exactly at the watermark", since.timestamp()),
            ]))
            .create_async()
            .await;

        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url())
            .with_topics(vec!["trading bot".into()])
            .fetch(&FetchRequest {
                keywords: &keywords,
                since,
                credentials: None,
            })
            .await
            .unwrap();

        let ids: Vec<&str> = report.candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["t3_new1"]);
    }

    #[tokio::test]
    async fn failing_query_is_recorded_and_others_continue() {
        let mut server = mockito::Server::new_async().await;
        let now = Utc::now().timestamp();
        server
            .mock("GET", "/search.json")
            .match_query(Matcher::UrlEncoded("q".into(), "LLM".into()))
            .with_status(503)
            .with_body("upstream overloaded")
            .create_async()
            .await;
        server
            .mock("GET", "/search.json")
            .match_query(Matcher::UrlEncoded("q".into(), "\"trading bot\"".into()))
            .with_status(200)
            .with_body(listing(&[("ok1", "Recommend a trading bot please", now - 20)]))
            .create_async()
            .await;

        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url())
            .fetch(&FetchRequest {
                keywords: &keywords,
                since: Utc::now() - ChronoDuration::hours(1),
                credentials: None,
            })
            .await
            .unwrap();

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.failed_queries(), 1);
        assert_eq!(report.queries[1].query(), "LLM");
    }

    #[tokio::test]
    async fn token_cache_refreshes_once_until_expiry() {
        let cache = RedditTokenCache::new();
        let calls = AtomicUsize::new(0);
        let refresh = |ttl: u64| {
            let calls = &calls;
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok((format!("tok{n}"), Duration::from_secs(ttl)))
            }
        };

        assert_eq!(cache.get_or_refresh("cid", refresh(3600)).await.unwrap(), "tok0");
        assert_eq!(cache.get_or_refresh("cid", refresh(3600)).await.unwrap(), "tok0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A different app invalidates the cached token.
        assert_eq!(cache.get_or_refresh("other", refresh(3600)).await.unwrap(), "tok1");

        // A token inside the expiry skew is refreshed on next use.
        cache.invalidate().await;
        assert_eq!(cache.get_or_refresh("cid", refresh(30)).await.unwrap(), "tok2");
        assert_eq!(cache.get_or_refresh("cid", refresh(3600)).await.unwrap(), "tok3");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let cache = Arc::new(RedditTokenCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let refresh = || {
            let calls = calls.clone();
            move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok((format!("tok{n}"), Duration::from_secs(3600)))
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_refresh("cid", refresh()),
            cache.get_or_refresh("cid", refresh())
        );

        assert_eq!(a.unwrap(), "tok0");
        assert_eq!(b.unwrap(), "tok0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_expires_in_is_capped() {
        let cache = RedditTokenCache::new();
        let token = cache
            .get_or_refresh("cid", || async { Ok(("tok".to_string(), Duration::from_secs(u64::MAX))) })
            .await
            .unwrap();
        assert_eq!(token, "tok");

        let again = cache
            .get_or_refresh("cid", || async { Ok(("unused".to_string(), Duration::from_secs(60))) })
            .await
            .unwrap();
        assert_eq!(again, "tok");
    }
}
