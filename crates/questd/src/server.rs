//! HTTP server for questd

use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use quest_common::QuestService;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub service: QuestService,
}

impl AppState {
    pub fn new(service: QuestService) -> Self {
        Self { service }
    }
}

/// Every route of the command surface
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::claim_routes())
        .merge(routes::read_routes())
        .merge(routes::admin_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until ctrl-c
pub async fn run(state: AppState, addr: &str) -> Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down gracefully");
    }
}
