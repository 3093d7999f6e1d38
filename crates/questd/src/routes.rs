//! API routes for questd
//!
//! Every engine failure is answered with `{ "kind", "message" }` and a status
//! matching its kind.

use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use quest_common::api::{
    ClaimOutcome, ClaimRequest, ErrorBody, GrantRequest, HealthResponse, LeaderboardQuery,
    LeaderboardView, ProgressView, ResetRequest, ReviewOutcome, TodayQuests, WeeklyClaimRequest,
};
use quest_common::claims::PendingClaim;
use quest_common::ledger::{GrantOutcome, ResetOutcome};
use quest_common::{ErrorKind, QuestError};
use std::sync::Arc;
use tracing::error;

type AppStateArc = Arc<AppState>;

/// Engine error as an HTTP response
pub struct ApiError(QuestError);

impl From<QuestError> for ApiError {
    fn from(e: QuestError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyClaimed => StatusCode::CONFLICT,
        ErrorKind::NotEligible => StatusCode::FORBIDDEN,
        ErrorKind::NotYetGenerated => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if kind == ErrorKind::Storage {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Claim Routes
// ============================================================================

pub fn claim_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/claims/daily", post(claim_daily))
        .route("/v1/claims/weekly", post(claim_weekly))
}

async fn claim_daily(
    State(state): State<AppStateArc>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<ClaimOutcome> {
    let outcome = state.service.claim_quest(&req.user_id, &req.quest_key).await?;
    Ok(Json(outcome))
}

async fn claim_weekly(
    State(state): State<AppStateArc>,
    Json(req): Json<WeeklyClaimRequest>,
) -> ApiResult<ClaimOutcome> {
    let outcome = state.service.claim_weekly_quest(&req.user_id, req.rank).await?;
    Ok(Json(outcome))
}

// ============================================================================
// Read Routes
// ============================================================================

pub fn read_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/progress/:user_id", get(progress))
        .route("/v1/leaderboard", get(leaderboard))
        .route("/v1/quests/today", get(today))
}

async fn progress(
    State(state): State<AppStateArc>,
    Path(user_id): Path<String>,
) -> ApiResult<ProgressView> {
    Ok(Json(state.service.get_progress(&user_id).await?))
}

async fn leaderboard(
    State(state): State<AppStateArc>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<LeaderboardView> {
    Ok(Json(state.service.get_leaderboard(query).await?))
}

async fn today(State(state): State<AppStateArc>) -> ApiResult<TodayQuests> {
    Ok(Json(state.service.todays_quests().await?))
}

// ============================================================================
// Admin Routes
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/admin/grant", post(admin_grant))
        .route("/v1/admin/reset", post(admin_reset))
        .route("/v1/admin/pending", get(list_pending))
        .route("/v1/admin/pending/:id/approve", post(approve))
        .route("/v1/admin/pending/:id/reject", post(reject))
}

async fn admin_grant(
    State(state): State<AppStateArc>,
    Json(req): Json<GrantRequest>,
) -> ApiResult<GrantOutcome> {
    let grant = state
        .service
        .admin_grant_xp(&req.user_id, req.amount, req.reason)
        .await?;
    Ok(Json(grant))
}

async fn admin_reset(
    State(state): State<AppStateArc>,
    Json(req): Json<ResetRequest>,
) -> ApiResult<ResetOutcome> {
    Ok(Json(state.service.admin_reset_user(&req.user_id).await?))
}

async fn list_pending(State(state): State<AppStateArc>) -> ApiResult<Vec<PendingClaim>> {
    Ok(Json(state.service.list_pending().await?))
}

async fn approve(State(state): State<AppStateArc>, Path(id): Path<i64>) -> ApiResult<ReviewOutcome> {
    Ok(Json(state.service.approve_claim(id).await?))
}

async fn reject(State(state): State<AppStateArc>, Path(id): Path<i64>) -> ApiResult<ReviewOutcome> {
    Ok(Json(state.service.reject_claim(id).await?))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> ApiResult<HealthResponse> {
    Ok(Json(state.service.health().await?))
}
