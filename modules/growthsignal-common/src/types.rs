use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Platforms ---

/// A platform the listener polls. Exhaustive: adding a platform is a compile
/// error everywhere a per-platform decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Reddit,
    X,
    #[serde(rename = "linkedin")]
    LinkedIn,
    #[serde(rename = "hn")]
    HackerNews,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Reddit,
        Platform::X,
        Platform::LinkedIn,
        Platform::HackerNews,
    ];

    /// Storage key, as written to `discovered_posts.platform`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::X => "x",
            Platform::LinkedIn => "linkedin",
            Platform::HackerNews => "hn",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Reddit => "Reddit",
            Platform::X => "X",
            Platform::LinkedIn => "LinkedIn",
            Platform::HackerNews => "Hacker News",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reddit" => Ok(Platform::Reddit),
            "x" | "twitter" => Ok(Platform::X),
            "linkedin" => Ok(Platform::LinkedIn),
            "hn" | "hackernews" | "hacker_news" => Ok(Platform::HackerNews),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

// --- Discovery pipeline ---

/// A post as fetched from a platform, normalized but not yet filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub platform: Platform,
    pub external_id: String,
    pub external_url: String,
    pub author_name: String,
    pub author_handle: String,
    pub content: String,
    pub thread_context: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// A candidate that passed the content filter. Always carries at least one
/// matched keyword; the only way to build one is [`ListenerResult::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerResult {
    pub candidate: RawCandidate,
    matched_keywords: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

impl ListenerResult {
    /// Returns `None` when `matched_keywords` is empty.
    pub fn new(
        candidate: RawCandidate,
        matched_keywords: Vec<String>,
        discovered_at: DateTime<Utc>,
    ) -> Option<Self> {
        if matched_keywords.is_empty() {
            return None;
        }
        Some(Self {
            candidate,
            matched_keywords,
            discovered_at,
        })
    }

    pub fn matched_keywords(&self) -> &[String] {
        &self.matched_keywords
    }

    /// The `(platform, external_id)` dedup key.
    pub fn dedup_key(&self) -> (Platform, &str) {
        (self.candidate.platform, self.candidate.external_id.as_str())
    }
}

/// Review state of a stored post. The listener only ever writes `New`;
/// the dashboard owns the other transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    New,
    Queued,
    Replied,
    Dismissed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::New => "new",
            PostStatus::Queued => "queued",
            PostStatus::Replied => "replied",
            PostStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(PostStatus::New),
            "queued" => Ok(PostStatus::Queued),
            "replied" => Ok(PostStatus::Replied),
            "dismissed" => Ok(PostStatus::Dismissed),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

/// Row shape submitted to storage: a [`ListenerResult`] with its keyword list
/// serialized the way `discovered_posts.matched_keywords` stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDiscoveredPost {
    pub platform: Platform,
    pub external_id: String,
    pub external_url: String,
    pub author_name: String,
    pub author_handle: String,
    pub content: String,
    pub thread_context: Option<String>,
    pub matched_keywords: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
}

impl NewDiscoveredPost {
    /// JSON array text, e.g. `["trading bot","LLM"]`.
    pub fn matched_keywords_json(&self) -> String {
        serde_json::to_string(&self.matched_keywords).unwrap_or_else(|_| "[]".to_string())
    }
}

impl From<ListenerResult> for NewDiscoveredPost {
    fn from(result: ListenerResult) -> Self {
        let c = result.candidate;
        Self {
            platform: c.platform,
            external_id: c.external_id,
            external_url: c.external_url,
            author_name: c.author_name,
            author_handle: c.author_handle,
            content: c.content,
            thread_context: c.thread_context,
            matched_keywords: result.matched_keywords,
            posted_at: c.posted_at,
            discovered_at: result.discovered_at,
        }
    }
}

/// A stored post.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPost {
    pub id: Uuid,
    pub platform: Platform,
    pub external_id: String,
    pub external_url: String,
    pub author_name: String,
    pub author_handle: String,
    pub content: String,
    pub thread_context: Option<String>,
    /// Serialized JSON array of keyword phrases.
    pub matched_keywords: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
    pub status: PostStatus,
}

impl DiscoveredPost {
    pub fn keywords(&self) -> Vec<String> {
        serde_json::from_str(&self.matched_keywords).unwrap_or_default()
    }
}

/// A tracked keyword phrase. Owned by the settings surface; the listener reads
/// active phrases and bumps `posts_matched`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: Uuid,
    pub phrase: String,
    pub category: Option<String>,
    pub is_active: bool,
    pub posts_matched: i64,
}

impl Keyword {
    pub fn new(phrase: &str, category: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phrase: phrase.to_string(),
            category: category.map(str::to_string),
            is_active: true,
            posts_matched: 0,
        }
    }
}

// --- Credentials ---

#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XCredentials {
    pub api_key: String,
}

impl fmt::Debug for XCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XCredentials").finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedInCredentials {
    pub api_token: String,
    #[serde(default)]
    pub actor_id: Option<String>,
}

impl fmt::Debug for LinkedInCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedInCredentials")
            .field("actor_id", &self.actor_id)
            .finish_non_exhaustive()
    }
}

/// Decrypted credentials for one platform account.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCredentials {
    Reddit(RedditCredentials),
    X(XCredentials),
    LinkedIn(LinkedInCredentials),
}

impl PlatformCredentials {
    /// Parse a decrypted JSON blob into the typed struct for `platform`.
    /// Hacker News has no authenticated mode, so it never has credentials.
    pub fn parse(platform: Platform, json: &str) -> Result<Option<Self>, serde_json::Error> {
        let creds = match platform {
            Platform::Reddit => Some(PlatformCredentials::Reddit(serde_json::from_str(json)?)),
            Platform::X => Some(PlatformCredentials::X(serde_json::from_str(json)?)),
            Platform::LinkedIn => Some(PlatformCredentials::LinkedIn(serde_json::from_str(json)?)),
            Platform::HackerNews => None,
        };
        Ok(creds)
    }

    pub fn platform(&self) -> Platform {
        match self {
            PlatformCredentials::Reddit(_) => Platform::Reddit,
            PlatformCredentials::X(_) => Platform::X,
            PlatformCredentials::LinkedIn(_) => Platform::LinkedIn,
        }
    }
}
