//! Request and response types of the daemon's HTTP surface.

use crate::claims::PendingClaim;
use crate::error::ErrorKind;
use crate::leaderboard::Leaderboard;
use crate::ledger::GrantOutcome;
use crate::rotation::{DailySelection, WeeklySelection};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Claim today's quest from a pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub user_id: String,
    pub quest_key: String,
}

/// Claim this week's quest; `rank` defaults to the member's current rank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyClaimRequest {
    pub user_id: String,
    #[serde(default)]
    pub rank: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// XP was granted
    Granted,
    /// Waiting for a moderator
    Pending,
}

/// Result of a successful claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub user_id: String,
    pub quest_key: String,
    pub period_key: String,
    pub quest_text: String,
    pub xp_reward: i64,
    pub status: ClaimStatus,
    pub streak: u32,
    #[serde(default)]
    pub pending_id: Option<i64>,
    #[serde(default)]
    pub grant: Option<GrantOutcome>,
    /// Name of the member's rank after the claim
    pub rank_name: String,
}

impl ClaimOutcome {
    pub fn rank_up(&self) -> bool {
        self.grant.as_ref().map_or(false, GrantOutcome::rank_up)
    }

    pub fn tier_up(&self) -> bool {
        self.grant.as_ref().map_or(false, GrantOutcome::tier_up)
    }
}

/// A member's progress as shown by `!progress`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressView {
    pub user_id: String,
    pub xp_total: i64,
    pub rank: u8,
    pub rank_name: String,
    pub tier: u8,
    pub tier_count: u8,
    pub streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub next_rank_name: Option<String>,
    pub xp_to_next_rank: Option<i64>,
    /// Pools the member may claim from today
    pub eligible_pools: Vec<String>,
    /// Quest keys already claimed this day or week
    pub claimed: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardCategory {
    /// Lifetime XP, every member
    #[default]
    Global,
    /// Last 7 days, one rank
    Weekly,
    /// Last 30 days, one rank
    Monthly,
    /// Explicit rank and window
    Rank,
}

impl LeaderboardCategory {
    pub fn default_window_days(&self) -> Option<u32> {
        match self {
            LeaderboardCategory::Global => None,
            LeaderboardCategory::Weekly | LeaderboardCategory::Rank => Some(7),
            LeaderboardCategory::Monthly => Some(30),
        }
    }
}

impl fmt::Display for LeaderboardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeaderboardCategory::Global => "global",
            LeaderboardCategory::Weekly => "weekly",
            LeaderboardCategory::Monthly => "monthly",
            LeaderboardCategory::Rank => "rank",
        };
        f.write_str(name)
    }
}

/// Query string of `GET /v1/leaderboard`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub category: LeaderboardCategory,
    #[serde(default)]
    pub rank: Option<u8>,
    #[serde(default)]
    pub window_days: Option<u32>,
    /// Requesting member, reported even outside the top entries
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub category: LeaderboardCategory,
    pub rank: Option<u8>,
    pub rank_name: Option<String>,
    pub window_days: Option<u32>,
    #[serde(flatten)]
    pub board: Leaderboard,
}

/// Everything posted for the current day and week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayQuests {
    pub day_key: String,
    pub week_key: String,
    pub daily: Vec<DailySelection>,
    pub weekly: Vec<WeeklySelection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRequest {
    pub user_id: String,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetRequest {
    pub user_id: String,
}

/// Moderator decision on a pending claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub claim: PendingClaim,
    /// Present when the claim was approved
    #[serde(default)]
    pub grant: Option<GrantOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub schema_version: i64,
    pub day_key: String,
    pub week_key: String,
    pub require_approval: bool,
    /// Members whose XP total disagrees with their event log
    #[serde(default)]
    pub ledger_drift: usize,
}

/// Error body of every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaderboard_query_defaults() {
        let query: LeaderboardQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.category, LeaderboardCategory::Global);
        assert!(query.rank.is_none());

        let query: LeaderboardQuery =
            serde_json::from_str(r#"{"category":"monthly","user_id":"u1"}"#).unwrap();
        assert_eq!(query.category, LeaderboardCategory::Monthly);
        assert_eq!(query.category.default_window_days(), Some(30));
    }

    #[test]
    fn test_weekly_claim_rank_is_optional() {
        let req: WeeklyClaimRequest = serde_json::from_str(r#"{"user_id":"u1"}"#).unwrap();
        assert_eq!(req.rank, None);
    }
}
