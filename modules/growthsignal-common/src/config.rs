use std::env;

use tracing::info;

pub const DEFAULT_LINKEDIN_ACTOR: &str = "curious_coder~linkedin-post-search-scraper";
pub const DEFAULT_REDDIT_USER_AGENT: &str = "growthsignal/0.1 (discovery engine)";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Credential envelopes
    pub credentials_encryption_key: Option<String>,
    pub credentials_key_id: String,

    // Fallback keys for integrations without a public mode
    pub socialdata_api_key: Option<String>,
    pub apify_api_token: Option<String>,
    pub apify_linkedin_actor: String,

    pub reddit_user_agent: String,

    // Run shaping
    pub max_user_keywords: usize,
    pub default_lookback_hours: i64,
    pub max_lookback_hours: i64,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            credentials_encryption_key: optional_env("CREDENTIALS_ENCRYPTION_KEY"),
            credentials_key_id: optional_env("CREDENTIALS_KEY_ID")
                .unwrap_or_else(|| "v1".to_string()),
            socialdata_api_key: optional_env("SOCIALDATA_API_KEY"),
            apify_api_token: optional_env("APIFY_API_TOKEN"),
            apify_linkedin_actor: optional_env("APIFY_LINKEDIN_ACTOR")
                .unwrap_or_else(|| DEFAULT_LINKEDIN_ACTOR.to_string()),
            reddit_user_agent: optional_env("REDDIT_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_REDDIT_USER_AGENT.to_string()),
            max_user_keywords: parsed_env("LISTENER_MAX_USER_KEYWORDS", 5),
            default_lookback_hours: parsed_env("LISTENER_DEFAULT_LOOKBACK_HOURS", 24),
            max_lookback_hours: parsed_env("LISTENER_MAX_LOOKBACK_HOURS", 168),
            http_timeout_secs: parsed_env("LISTENER_HTTP_TIMEOUT_SECS", 30),
        }
    }

    /// Defaults with no secrets and no database. Used by tests and local tooling.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            credentials_encryption_key: None,
            credentials_key_id: "v1".to_string(),
            socialdata_api_key: None,
            apify_api_token: None,
            apify_linkedin_actor: DEFAULT_LINKEDIN_ACTOR.to_string(),
            reddit_user_agent: DEFAULT_REDDIT_USER_AGENT.to_string(),
            max_user_keywords: 5,
            default_lookback_hours: 24,
            max_lookback_hours: 168,
            http_timeout_secs: 30,
        }
    }

    /// Log which integrations are configured without printing any secret.
    pub fn log_redacted(&self) {
        info!(
            credentials_encryption = self.credentials_encryption_key.is_some(),
            credentials_key_id = self.credentials_key_id.as_str(),
            socialdata_fallback = self.socialdata_api_key.is_some(),
            apify_fallback = self.apify_api_token.is_some(),
            linkedin_actor = self.apify_linkedin_actor.as_str(),
            max_user_keywords = self.max_user_keywords,
            default_lookback_hours = self.default_lookback_hours,
            max_lookback_hours = self.max_lookback_hours,
            http_timeout_secs = self.http_timeout_secs,
            "Listener config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {raw:?}")),
        None => default,
    }
}
