//! Composition root: storage, engine, dispatcher, scheduler and HTTP surface.

use crate::dispatcher::{self, LogSink, WebhookSink};
use crate::scheduler;
use crate::server::{self, AppState};
use anyhow::{Context, Result};
use quest_common::events::{self, EffectReceiver};
use quest_common::rotation::snapshot_catalogue;
use quest_common::{QuestConfig, QuestDb, QuestService, SystemTimeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Open storage and build the engine; returns the effect receiver for the dispatcher
pub async fn build_service(config: QuestConfig) -> Result<(QuestService, EffectReceiver)> {
    let db = QuestDb::open(config.daemon.db_location())
        .await
        .context("Failed to open quest database")?;
    let (tx, rx) = events::channel();
    let service = QuestService::new(Arc::new(db), config, Arc::new(SystemTimeSource), tx)
        .context("Invalid configuration")?;

    let catalogue = Arc::clone(service.config());
    let now = service.now();
    service
        .db()
        .transaction(move |tx| snapshot_catalogue(tx, &catalogue.catalogue, now))
        .await
        .context("Failed to store quest catalogue")?;

    Ok((service, rx))
}

/// Start the dispatcher with the configured sink
pub fn spawn_dispatcher(config: &QuestConfig, rx: EffectReceiver) -> Result<JoinHandle<()>> {
    let timeout = Duration::from_secs(config.dispatch.timeout_secs);
    let handle = match &config.dispatch.webhook_url {
        Some(url) => {
            let sink = WebhookSink::new(url.clone(), timeout)?;
            info!("Delivering side effects to {}", url);
            tokio::spawn(async move {
                dispatcher::run(sink, rx, timeout).await;
            })
        }
        None => {
            info!("No webhook configured, side effects are only logged");
            tokio::spawn(async move {
                dispatcher::run(LogSink, rx, timeout).await;
            })
        }
    };
    Ok(handle)
}

/// Run the daemon until ctrl-c
pub async fn run(config: QuestConfig) -> Result<()> {
    let listen_addr = config.daemon.listen_addr.clone();
    let tick = Duration::from_secs(config.scheduler.tick_secs);

    let (service, rx) = build_service(config.clone()).await?;
    let dispatcher = spawn_dispatcher(&config, rx)?;
    let scheduler = scheduler::spawn(service.clone(), tick);

    info!(
        "questd ready: {} ranks, {} daily pools, approval {}",
        config.ladder.rank_count(),
        config.catalogue.pools.len(),
        if config.claims.require_approval { "required" } else { "off" }
    );

    let result = server::run(AppState::new(service), &listen_addr).await;

    scheduler.abort();
    dispatcher.abort();
    result
}
