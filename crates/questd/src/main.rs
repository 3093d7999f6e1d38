//! questd - quest progression daemon

use anyhow::Result;
use quest_common::QuestConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("questd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = QuestConfig::load();
    questd::daemon::run(config).await?;

    info!("questd stopped");
    Ok(())
}
