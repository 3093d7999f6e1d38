//! Progression ledger.
//!
//! Owns every XP mutation. `user_progress.xp_total` is a materialized sum of
//! `xp_events.amount`; both are written in the caller's transaction so they can
//! never drift apart. Events are append-only: an admin reset writes a
//! compensating negative event instead of deleting history.

use crate::clock::{day_key, parse_day_key};
use crate::error::{QuestError, QuestResult};
use crate::ladder::Ladder;
use crate::store::{decode_ts, encode_ts};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Longest accepted member id
pub const MAX_USER_ID_LEN: usize = 128;

/// Reason of the compensating event written by a reset
pub const RESET_REASON: &str = "admin reset";

/// Progress record for one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub xp_total: i64,
    pub rank: u8,
    pub tier: u8,
    pub streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Result of a grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantOutcome {
    pub user_id: String,
    pub amount: i64,
    pub new_total: i64,
    pub old_rank: u8,
    pub new_rank: u8,
    pub old_tier: u8,
    pub new_tier: u8,
}

impl GrantOutcome {
    pub fn rank_up(&self) -> bool {
        self.new_rank > self.old_rank
    }

    /// Tier moved up inside the same rank
    pub fn tier_up(&self) -> bool {
        self.new_rank == self.old_rank && self.new_tier > self.old_tier
    }
}

/// Result of an admin reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub user_id: String,
    pub previous_xp: i64,
    pub previous_rank: u8,
}

impl ResetOutcome {
    pub fn rank_changed(&self) -> bool {
        self.previous_rank != 1
    }
}

pub fn validate_user_id(user_id: &str) -> QuestResult<()> {
    if user_id.trim().is_empty() {
        return Err(QuestError::validation("user id must not be empty"));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(QuestError::validation(format!(
            "user id longer than {} characters",
            MAX_USER_ID_LEN
        )));
    }
    Ok(())
}

type RawProgress = (String, i64, i64, i64, i64, Option<String>, String);

fn decode_progress(raw: RawProgress) -> QuestResult<UserProgress> {
    let (user_id, xp_total, rank, tier, streak, last_activity, created_at) = raw;
    Ok(UserProgress {
        user_id,
        xp_total,
        rank: rank.clamp(1, u8::MAX as i64) as u8,
        tier: tier.clamp(1, u8::MAX as i64) as u8,
        streak: streak.max(0) as u32,
        last_activity_date: last_activity.as_deref().map(parse_day_key).transpose()?,
        created_at: decode_ts(&created_at)?,
    })
}

/// Load a member's record, if any
pub fn load(conn: &Connection, user_id: &str) -> QuestResult<Option<UserProgress>> {
    let raw: Option<RawProgress> = conn
        .query_row(
            "SELECT user_id, xp_total, rank, tier, streak, last_activity_date, created_at
             FROM user_progress WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()?;
    raw.map(decode_progress).transpose()
}

/// Atomic get-or-create: rank 1, tier 1, zero XP, zero streak
pub fn get_or_create(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> QuestResult<UserProgress> {
    let created = conn.execute(
        "INSERT OR IGNORE INTO user_progress (user_id, xp_total, rank, tier, streak, created_at)
         VALUES (?1, 0, 1, 1, 0, ?2)",
        params![user_id, encode_ts(now)],
    )?;
    if created == 1 {
        debug!("Created progress record for {}", user_id);
    }
    load(conn, user_id)?.ok_or_else(|| QuestError::NotFound(format!("user '{}'", user_id)))
}

/// Append one event to the log
pub fn append_event(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> QuestResult<i64> {
    conn.execute(
        "INSERT INTO xp_events (user_id, amount, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, amount, reason, encode_ts(now)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Grant `amount` XP and recompute rank and tier
pub fn grant_xp(
    conn: &Connection,
    ladder: &Ladder,
    user_id: &str,
    amount: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> QuestResult<GrantOutcome> {
    if amount <= 0 {
        return Err(QuestError::validation("XP amount must be positive"));
    }

    let user = get_or_create(conn, user_id, now)?;
    let new_total = user
        .xp_total
        .checked_add(amount)
        .ok_or_else(|| QuestError::validation("XP total would overflow"))?;

    append_event(conn, user_id, amount, reason, now)?;

    let standing = ladder.advance(user.rank, new_total);
    conn.execute(
        "UPDATE user_progress SET xp_total = ?2, rank = ?3, tier = ?4 WHERE user_id = ?1",
        params![user_id, new_total, standing.rank, standing.tier],
    )?;

    let outcome = GrantOutcome {
        user_id: user_id.to_string(),
        amount,
        new_total,
        old_rank: user.rank,
        new_rank: standing.rank,
        old_tier: user.tier,
        new_tier: standing.tier,
    };

    if outcome.rank_up() {
        info!(
            "{} ranked up: {} -> {} ({} XP)",
            user_id, outcome.old_rank, outcome.new_rank, new_total
        );
    } else {
        debug!("{} +{} XP ({}): total {}", user_id, amount, reason, new_total);
    }

    Ok(outcome)
}

/// Return a member to rank 1 with zero XP and no streak
pub fn reset_user(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> QuestResult<ResetOutcome> {
    let user = load(conn, user_id)?
        .ok_or_else(|| QuestError::NotFound(format!("user '{}'", user_id)))?;

    if user.xp_total != 0 {
        append_event(conn, user_id, -user.xp_total, RESET_REASON, now)?;
    }
    conn.execute(
        "UPDATE user_progress
         SET xp_total = 0, rank = 1, tier = 1, streak = 0, last_activity_date = NULL
         WHERE user_id = ?1",
        params![user_id],
    )?;

    info!("Reset {} (was {} XP, rank {})", user_id, user.xp_total, user.rank);
    Ok(ResetOutcome {
        user_id: user_id.to_string(),
        previous_xp: user.xp_total,
        previous_rank: user.rank,
    })
}

/// Record streak state
pub fn save_streak(
    conn: &Connection,
    user_id: &str,
    streak: u32,
    last_activity: NaiveDate,
) -> QuestResult<()> {
    conn.execute(
        "UPDATE user_progress SET streak = ?2, last_activity_date = ?3 WHERE user_id = ?1",
        params![user_id, streak, day_key(last_activity)],
    )?;
    Ok(())
}

/// Members whose materialized total disagrees with their event log
pub fn find_drift(conn: &Connection) -> QuestResult<Vec<(String, i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT u.user_id, u.xp_total, COALESCE(SUM(e.amount), 0) AS event_sum
         FROM user_progress u
         LEFT JOIN xp_events e ON e.user_id = u.user_id
         GROUP BY u.user_id
         HAVING u.xp_total != event_sum",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
