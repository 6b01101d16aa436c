// Storage boundary for the listener.
//
// DiscoveryStore covers everything the engine reads and writes: active
// keywords, the per-platform watermark, stored credentials, and the atomic
// insert-and-count step. PgStore is the production implementation;
// testing::MemoryStore backs unit tests with no database.

mod postgres;

pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use growthsignal_common::{Keyword, NewDiscoveredPost, Platform};

use crate::persist::PersistOutcome;

#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Keywords with `is_active = true`, in a stable order.
    async fn active_keywords(&self) -> Result<Vec<Keyword>>;

    /// Most recent `discovered_at` stored for a platform.
    async fn latest_discovered_at(&self, platform: Platform) -> Result<Option<DateTime<Utc>>>;

    /// Raw (possibly encrypted) credential blob of the active account.
    async fn account_credentials(&self, platform: Platform) -> Result<Option<String>>;

    /// Stamp `last_fetched_at` on the active account. Observability only.
    async fn mark_fetched(&self, platform: Platform, at: DateTime<Utc>) -> Result<()>;

    /// Insert posts, skipping `(platform, external_id)` collisions, and bump
    /// `posts_matched` for the keywords of the rows actually inserted.
    /// Both writes commit together or not at all.
    async fn persist_batch(&self, posts: &[NewDiscoveredPost]) -> Result<PersistOutcome>;
}
