//! HTTP client for the questd command surface

use anyhow::{Context, Result};
use quest_common::api::{
    ClaimOutcome, ClaimRequest, ErrorBody, GrantRequest, HealthResponse, LeaderboardQuery,
    LeaderboardView, ProgressView, ResetRequest, ReviewOutcome, TodayQuests, WeeklyClaimRequest,
};
use quest_common::claims::PendingClaim;
use quest_common::ledger::{GrantOutcome, ResetOutcome};
use quest_common::ErrorKind;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Request the daemon answered with an engine error
#[derive(Debug, thiserror::Error)]
#[error("{}", .body.message)]
pub struct DaemonError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl DaemonError {
    pub fn kind(&self) -> ErrorKind {
        self.body.kind
    }
}

/// Client for a questd instance
pub struct QuestClient {
    client: reqwest::Client,
    base_url: String,
}

impl QuestClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL whose trailing segments are percent-encoded, for member ids in the path
    fn segment_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid questd URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("questd URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and decode either the typed body or the daemon's error body
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach questd at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
                return Err(DaemonError { status, body }.into());
            }
            anyhow::bail!("questd returned error ({}): {}", status, text);
        }

        response
            .json::<T>()
            .await
            .context("Failed to parse questd response")
    }

    pub async fn claim(&self, user_id: &str, quest_key: &str) -> Result<ClaimOutcome> {
        let body = ClaimRequest {
            user_id: user_id.to_string(),
            quest_key: quest_key.to_string(),
        };
        self.send(self.client.post(self.url("/v1/claims/daily")).json(&body))
            .await
    }

    pub async fn claim_weekly(&self, user_id: &str, rank: Option<u8>) -> Result<ClaimOutcome> {
        let body = WeeklyClaimRequest {
            user_id: user_id.to_string(),
            rank,
        };
        self.send(self.client.post(self.url("/v1/claims/weekly")).json(&body))
            .await
    }

    pub async fn progress(&self, user_id: &str) -> Result<ProgressView> {
        let url = self.segment_url(&["v1", "progress", user_id])?;
        self.send(self.client.get(url)).await
    }

    pub async fn leaderboard(&self, query: &LeaderboardQuery) -> Result<LeaderboardView> {
        self.send(self.client.get(self.url("/v1/leaderboard")).query(query))
            .await
    }

    pub async fn today(&self) -> Result<TodayQuests> {
        self.send(self.client.get(self.url("/v1/quests/today"))).await
    }

    pub async fn grant(&self, user_id: &str, amount: i64, reason: Option<String>) -> Result<GrantOutcome> {
        let body = GrantRequest {
            user_id: user_id.to_string(),
            amount,
            reason,
        };
        self.send(self.client.post(self.url("/v1/admin/grant")).json(&body))
            .await
    }

    pub async fn reset(&self, user_id: &str) -> Result<ResetOutcome> {
        let body = ResetRequest {
            user_id: user_id.to_string(),
        };
        self.send(self.client.post(self.url("/v1/admin/reset")).json(&body))
            .await
    }

    pub async fn pending(&self) -> Result<Vec<PendingClaim>> {
        self.send(self.client.get(self.url("/v1/admin/pending"))).await
    }

    pub async fn approve(&self, id: i64) -> Result<ReviewOutcome> {
        let url = self.url(&format!("/v1/admin/pending/{}/approve", id));
        self.send(self.client.post(url)).await
    }

    pub async fn reject(&self, id: i64) -> Result<ReviewOutcome> {
        let url = self.url(&format!("/v1/admin/pending/{}/reject", id));
        self.send(self.client.post(url)).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send(self.client.get(self.url("/v1/health"))).await
    }
}
