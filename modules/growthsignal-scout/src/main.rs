use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use growthsignal_common::Config;
use growthsignal_scout::store::PgStore;
use growthsignal_scout::Listener;

/// One bounded discovery run. Scheduling belongs to whoever invokes this.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("growthsignal=info".parse()?))
        .init();

    info!("GrowthSignal listener starting...");

    let config = Config::from_env();
    config.log_redacted();

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let listener = Listener::from_config(&config, Arc::new(store));
    let summary = listener.run().await?;

    for report in &summary.platforms {
        match &report.error {
            None => info!(
                platform = report.platform.display_name(),
                fetched = report.fetched,
                accepted = report.accepted,
                inserted = report.inserted,
                failed_queries = report.failed_queries(),
                "Platform summary"
            ),
            Some(error) => warn!(
                platform = report.platform.display_name(),
                failed_in = ?report.failed_in,
                error = error.as_str(),
                "Platform failed"
            ),
        }
    }
    info!(
        keywords = summary.keywords,
        inserted = summary.total_inserted(),
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        "GrowthSignal listener finished"
    );

    Ok(())
}
