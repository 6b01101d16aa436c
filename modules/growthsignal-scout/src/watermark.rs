// Incremental fetch window. The watermark is derived from the newest stored
// row per platform, not kept in its own table; persist-time dedup absorbs the
// overlap when two runs race on the same platform.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use growthsignal_common::{Config, Platform};

use crate::store::DiscoveryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkPolicy {
    /// Window used when a platform has nothing stored yet.
    pub default_lookback: Duration,
    /// Oldest `since` ever handed to a fetcher.
    pub max_lookback: Duration,
}

impl WatermarkPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_lookback: Duration::hours(config.default_lookback_hours),
            max_lookback: Duration::hours(config.max_lookback_hours),
        }
    }

    /// Clamp a stored watermark into `[now - max_lookback, now]`.
    pub fn window_start(&self, latest: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = now - self.max_lookback;
        match latest {
            Some(at) if at > now => now,
            Some(at) => at.max(floor),
            None => (now - self.default_lookback).max(floor),
        }
    }
}

impl Default for WatermarkPolicy {
    fn default() -> Self {
        Self {
            default_lookback: Duration::hours(24),
            max_lookback: Duration::hours(168),
        }
    }
}

/// Start of the next fetch window for `platform`. A failed lookup falls back
/// to the default window rather than failing the platform.
pub async fn since_for(
    store: &dyn DiscoveryStore,
    policy: &WatermarkPolicy,
    platform: Platform,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let latest = match store.latest_discovered_at(platform).await {
        Ok(latest) => latest,
        Err(e) => {
            warn!(%platform, error = %e, "Watermark lookup failed, using default window");
            None
        }
    };
    let since = policy.window_start(latest, now);
    debug!(%platform, ?latest, %since, "Resolved fetch window");
    since
}
