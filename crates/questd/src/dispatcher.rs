//! Side-effect delivery.
//!
//! Drains the engine's effect channel and hands each effect to a sink. Every
//! delivery is bounded by a timeout; failures are logged and dropped. The
//! engine state they describe is already committed.

use anyhow::{bail, Context, Result};
use quest_common::events::EffectReceiver;
use quest_common::SideEffect;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Destination for side effects
pub trait EffectSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn deliver(&self, effect: &SideEffect) -> impl Future<Output = Result<()>> + Send;
}

/// POSTs every effect as JSON to the chat bridge
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl EffectSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, effect: &SideEffect) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(effect)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.url))?;

        if !response.status().is_success() {
            bail!("Bridge returned {}", response.status());
        }
        Ok(())
    }
}

/// Records effects in the log only
pub struct LogSink;

impl EffectSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, effect: &SideEffect) -> Result<()> {
        let payload = serde_json::to_string(effect)?;
        info!(effect = effect.label(), "{}", payload);
        Ok(())
    }
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Deliver effects until every sender is gone
pub async fn run<S: EffectSink>(sink: S, mut rx: EffectReceiver, timeout: Duration) -> DispatchStats {
    let mut stats = DispatchStats::default();
    info!("Side-effect dispatcher started ({} sink)", sink.name());

    while let Some(effect) = rx.recv().await {
        match tokio::time::timeout(timeout, sink.deliver(&effect)).await {
            Ok(Ok(())) => {
                stats.delivered += 1;
                debug!("Delivered {}", effect.label());
            }
            Ok(Err(e)) => {
                stats.failed += 1;
                warn!("Side effect {} failed via {}: {:#}", effect.label(), sink.name(), e);
            }
            Err(_) => {
                stats.failed += 1;
                warn!(
                    "Side effect {} timed out after {}s via {}",
                    effect.label(),
                    timeout.as_secs(),
                    sink.name()
                );
            }
        }
    }

    info!(
        "Side-effect dispatcher stopped ({} delivered, {} failed)",
        stats.delivered, stats.failed
    );
    stats
}
