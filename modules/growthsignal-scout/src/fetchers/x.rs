// X/Twitter search through the SocialData API. Boolean queries pair intent
// phrases with topic terms; results then pass a local allowlist gate because
// the upstream search happily returns intent-only matches.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use growthsignal_common::{Config, ListenerError, Platform, PlatformCredentials, RawCandidate};

use super::{
    http_client, query_terms, quote_phrase, run_queries, send_json, FetchMode, FetchReport,
    FetchRequest, Pacing, PlatformFetcher, PlatformItem, SERVICE_USER_AGENT,
};

const BASE_URL: &str = "https://api.socialdata.tools";

/// Cursor pages followed per query.
const MAX_PAGES: usize = 2;

const DEFAULT_INTENTS: &[&str] = &[
    "looking for",
    "anyone recommend",
    "any recommendations",
    "best tool for",
    "alternative to",
    "anyone tried",
];

/// One boolean topic clause: `("term" OR term OR #hashtag ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicGroup {
    pub terms: Vec<String>,
    pub hashtags: Vec<String>,
}

impl TopicGroup {
    pub fn new(terms: &[&str], hashtags: &[&str]) -> Self {
        Self {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            hashtags: hashtags.iter().map(|h| h.to_string()).collect(),
        }
    }
}

fn default_topic_groups() -> Vec<TopicGroup> {
    vec![
        TopicGroup::new(
            &["trading bot", "algo trading", "automated trading"],
            &["algotrading", "tradingbot"],
        ),
        TopicGroup::new(&["AI trading", "LLM trading", "AI agent"], &["AItrading"]),
    ]
}

/// `(intents) (topics) -filter:retweets -hiring -job -jobs lang:en since_time:<unix>`
pub fn build_query<S: AsRef<str>>(intents: &[S], group: &TopicGroup, since: DateTime<Utc>) -> String {
    let intents = intents
        .iter()
        .map(|i| quote_phrase(i.as_ref()))
        .collect::<Vec<_>>()
        .join(" OR ");
    let topics = group
        .terms
        .iter()
        .map(|t| quote_phrase(t))
        .chain(
            group
                .hashtags
                .iter()
                .map(|h| format!("#{}", h.trim_start_matches('#'))),
        )
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "({intents}) ({topics}) -filter:retweets -hiring -job -jobs lang:en since_time:{}",
        since.timestamp()
    )
}

/// True when `text` mentions at least one allowlisted term.
pub fn passes_allowlist(text: &str, allowlist: &[String]) -> bool {
    let lower = text.to_lowercase();
    allowlist
        .iter()
        .any(|term| !term.is_empty() && lower.contains(&term.to_lowercase()))
}

// --- API shapes ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    tweets: Vec<Tweet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id_str: String,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tweet_created_at: Option<String>,
    #[serde(default)]
    pub user: Option<TweetUser>,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetUser {
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
}

pub(crate) fn normalize(tweet: Tweet) -> Option<RawCandidate> {
    let content = tweet
        .full_text
        .or(tweet.text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())?;
    let user = tweet.user.unwrap_or(TweetUser {
        screen_name: String::new(),
        name: String::new(),
    });
    let external_url = if user.screen_name.is_empty() {
        format!("https://x.com/i/status/{}", tweet.id_str)
    } else {
        format!("https://x.com/{}/status/{}", user.screen_name, tweet.id_str)
    };
    let posted_at = tweet
        .tweet_created_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(RawCandidate {
        platform: Platform::X,
        external_id: tweet.id_str,
        external_url,
        author_name: if user.name.is_empty() {
            user.screen_name.clone()
        } else {
            user.name
        },
        author_handle: user.screen_name,
        content,
        thread_context: tweet
            .in_reply_to_status_id_str
            .filter(|id| !id.is_empty())
            .map(|id| format!("Reply to tweet {id}")),
        posted_at,
    })
}

// --- Fetcher ---

pub struct XFetcher {
    client: reqwest::Client,
    base_url: String,
    fallback_api_key: Option<String>,
    pacing: Pacing,
    max_user_keywords: usize,
    intents: Vec<String>,
    topic_groups: Vec<TopicGroup>,
}

impl XFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            client: http_client(Duration::from_secs(config.http_timeout_secs), SERVICE_USER_AGENT),
            base_url: BASE_URL.to_string(),
            fallback_api_key: config.socialdata_api_key.clone(),
            pacing: Pacing::fixed(Duration::from_secs(1)),
            max_user_keywords: config.max_user_keywords,
            intents: DEFAULT_INTENTS.iter().map(|i| i.to_string()).collect(),
            topic_groups: default_topic_groups(),
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

    pub fn with_topic_groups(mut self, groups: Vec<TopicGroup>) -> Self {
        self.topic_groups = groups;
        self
    }

    fn api_key<'a>(&'a self, credentials: Option<&'a PlatformCredentials>) -> Option<&'a str> {
        match credentials {
            Some(PlatformCredentials::X(creds)) if !creds.api_key.is_empty() => {
                Some(creds.api_key.as_str())
            }
            _ => self.fallback_api_key.as_deref(),
        }
    }

    /// Curated groups, then one group per user keyword not already a curated term.
    fn queries(&self, keywords: &[String], since: DateTime<Utc>) -> Vec<String> {
        let curated: HashSet<String> = self
            .topic_groups
            .iter()
            .flat_map(|g| g.terms.iter().map(|t| t.to_lowercase()))
            .collect();
        let user_groups = query_terms::<&str>(&[], keywords, self.max_user_keywords)
            .into_iter()
            .filter(|kw| !curated.contains(&kw.to_lowercase()))
            .map(|kw| TopicGroup {
                terms: vec![kw],
                hashtags: vec![],
            });

        self.topic_groups
            .iter()
            .cloned()
            .chain(user_groups)
            .map(|group| build_query(&self.intents, &group, since))
            .collect()
    }

    /// Curated topic terms and hashtags plus every active keyword.
    fn allowlist(&self, keywords: &[String]) -> Vec<String> {
        self.topic_groups
            .iter()
            .flat_map(|g| g.terms.iter().chain(g.hashtags.iter()))
            .chain(keywords.iter())
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    async fn search(
        &self,
        api_key: &str,
        query: &str,
        since: DateTime<Utc>,
        allowlist: &[String],
    ) -> growthsignal_common::Result<Vec<RawCandidate>> {
        let mut candidates = Vec::new();
        let mut cursor: Option<String> = None;

        for page_no in 0..MAX_PAGES {
            let mut request = self
                .client
                .get(format!("{}/twitter/search", self.base_url))
                .bearer_auth(api_key)
                .query(&[("query", query), ("type", "Latest")]);
            if let Some(c) = cursor.as_deref() {
                request = request.query(&[("cursor", c)]);
            }
            let page: SearchResponse = match send_json(request).await {
                Ok(page) => page,
                Err(e) if page_no > 0 => {
                    warn!(page = page_no + 1, error = %e, "SocialData page failed, keeping earlier pages");
                    break;
                }
                Err(e) => return Err(e),
            };
            let page_len = page.tweets.len();

            let before = candidates.len();
            candidates.extend(
                page.tweets
                    .into_iter()
                    .filter_map(|t| PlatformItem::X(t).normalize())
                    .filter(|c| !matches!(c.posted_at, Some(at) if at <= since))
                    .filter(|c| passes_allowlist(&c.content, allowlist)),
            );
            debug!(
                page_len,
                kept = candidates.len() - before,
                "SocialData page processed"
            );

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) if page_len > 0 => cursor = Some(next),
                _ => break,
            }
        }
        Ok(candidates)
    }
}

#[async_trait]
impl PlatformFetcher for XFetcher {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> growthsignal_common::Result<FetchReport> {
        let api_key = self.api_key(request.credentials).ok_or_else(|| {
            ListenerError::Config(
                "no SocialData API key: store X credentials or set SOCIALDATA_API_KEY".into(),
            )
        })?;

        let since = request.since;
        let queries = self.queries(request.keywords, since);
        let allowlist = self.allowlist(request.keywords);
        info!(queries = queries.len(), since = %since, "Searching X");

        let allowlist = allowlist.as_slice();
        let (candidates, queries) = run_queries(
            Platform::X,
            queries,
            self.pacing.delay(FetchMode::Authenticated),
            |q| async move { self.search(api_key, &q, since, allowlist).await },
        )
        .await;

        Ok(FetchReport {
            mode: FetchMode::Authenticated,
            candidates,
            queries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growthsignal_common::XCredentials;
    use mockito::Matcher;

    fn since() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn tweet(id: &str, text: &str, reply_to: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id_str": id,
            "full_text": text,
            "tweet_created_at": "2030-01-01T00:00:00.000000Z",
            "user": { "screen_name": "quantjane", "name": "Jane" },
            "in_reply_to_status_id_str": reply_to,
        })
    }

    fn fetcher(base: &str, fallback: Option<&str>) -> XFetcher {
        let mut config = Config::for_tests();
        config.socialdata_api_key = fallback.map(str::to_string);
        XFetcher::new(&config)
            .with_base_url(base)
            .with_pacing(Pacing::none())
            .with_topic_groups(vec![TopicGroup::new(&["trading bot"], &["algotrading"])])
    }

    #[test]
    fn query_combines_intents_topics_and_exclusions() {
        let group = TopicGroup::new(&["trading bot", "quant"], &["algotrading"]);
        let q = build_query(&["looking for", "anyone recommend"], &group, since());
        assert_eq!(
            q,
            "(\"looking for\" OR \"anyone recommend\") (\"trading bot\" OR quant OR #algotrading) \
             -filter:retweets -hiring -job -jobs lang:en since_time:1717243200"
        );
    }

    #[test]
    fn user_keywords_become_their_own_groups() {
        let f = fetcher("http://unused", Some("k"));
        let keywords: Vec<String> = vec!["trading bot".into(), "LLM".into()];
        let queries = f.queries(&keywords, since());
        assert_eq!(queries.len(), 2);
        assert!(queries[1].contains("(LLM)"));
    }

    #[test]
    fn allowlist_gate_drops_intent_only_matches() {
        let allowlist = vec!["trading bot".to_string(), "algotrading".to_string()];
        assert!(passes_allowlist("Anyone recommend a Trading Bot?", &allowlist));
        assert!(!passes_allowlist("Looking for a good pizza place in Austin", &allowlist));
    }

    #[test]
    fn normalizes_reply_context_and_url() {
        let t: Tweet = serde_json::from_value(tweet("99", "trading bot ideas?", Some("42"))).unwrap();
        let c = normalize(t).unwrap();
        assert_eq!(c.external_url, "https://x.com/quantjane/status/99");
        assert_eq!(c.author_name, "Jane");
        assert_eq!(c.author_handle, "quantjane");
        assert_eq!(c.thread_context.as_deref(), Some("Reply to tweet 42"));
    }

    #[tokio::test]
    async fn missing_key_is_a_config_error() {
        let keywords: Vec<String> = vec!["LLM".into()];
        let err = fetcher("http://unused", None)
            .fetch(&FetchRequest {
                keywords: &keywords,
                since: since(),
                credentials: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::Config(_)));
    }

    #[tokio::test]
    async fn stored_key_wins_and_results_pass_the_gate() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "next_cursor": null,
            "tweets": [
                tweet("1", "Anyone recommend a trading bot for ETH?", None),
                tweet("2", "Looking for a new apartment, anyone recommend a realtor?", None),
            ]
        });
        let mock = server
            .mock("GET", "/twitter/search")
            .match_query(Matcher::UrlEncoded("type".into(), "Latest".into()))
            .match_header("authorization", "Bearer stored-key")
            .with_status(200)
            .with_body(body.to_string())
            .expect(1)
            .create_async()
            .await;

        let creds = PlatformCredentials::X(XCredentials {
            api_key: "stored-key".into(),
        });
        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url(), Some("env-key"))
            .fetch(&FetchRequest {
                keywords: &keywords,
                since: since(),
                credentials: Some(&creds),
            })
            .await
            .unwrap();

        let ids: Vec<&str> = report.candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn follows_cursor_to_the_next_page() {
        let mut server = mockito::Server::new_async().await;
        let first = serde_json::json!({
            "next_cursor": "c1",
            "tweets": [tweet("1", "Which trading bot do you use?", None)]
        });
        let second = serde_json::json!({
            "next_cursor": null,
            "tweets": [tweet("2", "My trading bot keeps losing money", None)]
        });
        server
            .mock("GET", "/twitter/search")
            .match_query(Matcher::Regex("type=Latest$".into()))
            .with_status(200)
            .with_body(first.to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/twitter/search")
            .match_query(Matcher::UrlEncoded("cursor".into(), "c1".into()))
            .with_status(200)
            .with_body(second.to_string())
            .create_async()
            .await;

        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url(), Some("env-key"))
            .fetch(&FetchRequest {
                keywords: &keywords,
                since: since(),
                credentials: None,
            })
            .await
            .unwrap();

        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.failed_queries(), 0);
    }

    #[tokio::test]
    async fn failed_second_page_keeps_the_first() {
        let mut server = mockito::Server::new_async().await;
        let first = serde_json::json!({
            "next_cursor": "c1",
            "tweets": [tweet("1", "Which trading bot do you use?", None)]
        });
        server
            .mock("GET", "/twitter/search")
            .match_query(Matcher::Regex("type=Latest$".into()))
            .with_status(200)
            .with_body(first.to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/twitter/search")
            .match_query(Matcher::UrlEncoded("cursor".into(), "c1".into()))
            .with_status(503)
            .with_body("upstream overloaded")
            .create_async()
            .await;

        let keywords: Vec<String> = vec![];
        let report = fetcher(&server.url(), Some("env-key"))
            .fetch(&FetchRequest {
                keywords: &keywords,
                since: since(),
                credentials: None,
            })
            .await
            .unwrap();

        let ids: Vec<&str> = report.candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(report.failed_queries(), 0);
    }
}
