//! Leaderboards.
//!
//! Computed on read from `user_progress` and the XP event log. Every board is
//! a full scan so the caller's own position is known even outside the top N.
//! Ties keep first-seen order (rowid of `user_progress`).

use crate::error::{QuestError, QuestResult};
use crate::ledger::RESET_REASON;
use crate::store::encode_ts;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// Longest accepted window, in days
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Entries returned when the caller does not ask for a size
pub const DEFAULT_LIMIT: usize = 10;

/// One row of a board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based
    pub position: usize,
    pub user_id: String,
    pub rank: u8,
    /// Lifetime XP on the global board, XP earned inside the window otherwise
    pub xp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    /// The requesting member, wherever they placed
    pub caller: Option<LeaderboardEntry>,
    /// Members on the full board
    pub total: usize,
}

impl Leaderboard {
    fn from_rows(rows: Vec<(String, i64, i64)>, limit: usize, caller: Option<&str>) -> Self {
        let total = rows.len();
        let ranked: Vec<LeaderboardEntry> = rows
            .into_iter()
            .enumerate()
            .map(|(idx, (user_id, rank, xp))| LeaderboardEntry {
                position: idx + 1,
                user_id,
                rank: rank.clamp(0, u8::MAX as i64) as u8,
                xp,
            })
            .collect();

        let caller = caller.and_then(|id| ranked.iter().find(|e| e.user_id == id).cloned());
        let entries = ranked.into_iter().take(limit).collect();

        Self {
            entries,
            caller,
            total,
        }
    }
}

/// Every member by lifetime XP
pub fn global(conn: &Connection, limit: usize, caller: Option<&str>) -> QuestResult<Leaderboard> {
    let mut stmt = conn.prepare(
        "SELECT user_id, rank, xp_total FROM user_progress
         ORDER BY xp_total DESC, rowid ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Leaderboard::from_rows(rows, limit, caller))
}

/// Members currently at `rank`, by XP earned in the trailing `window_days`.
///
/// Members without events in the window are listed with 0. Only XP earned
/// after a member's latest reset counts; the reset's compensating event is
/// never part of the sum.
pub fn ranked(
    conn: &Connection,
    rank: u8,
    window_days: u32,
    now: DateTime<Utc>,
    limit: usize,
    caller: Option<&str>,
) -> QuestResult<Leaderboard> {
    if window_days == 0 || window_days > MAX_WINDOW_DAYS {
        return Err(QuestError::validation(format!(
            "window must be between 1 and {} days",
            MAX_WINDOW_DAYS
        )));
    }
    let since = encode_ts(now - Duration::days(window_days as i64));

    let mut stmt = conn.prepare(
        "SELECT u.user_id, u.rank, COALESCE(SUM(e.amount), 0) AS window_xp
         FROM user_progress u
         LEFT JOIN xp_events e ON e.user_id = u.user_id
             AND e.created_at >= ?2
             AND e.amount > 0
             AND e.id > COALESCE(
                 (SELECT MAX(r.id) FROM xp_events r
                  WHERE r.user_id = u.user_id AND r.reason = ?3 AND r.amount < 0), 0)
         WHERE u.rank = ?1
         GROUP BY u.rowid, u.user_id, u.rank
         ORDER BY window_xp DESC, u.rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![rank, since, RESET_REASON], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Leaderboard::from_rows(rows, limit, caller))
}
