//! Daily engagement streaks.

use crate::clock::days_between;
use crate::error::QuestResult;
use crate::ledger::{get_or_create, save_streak};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Streak after activity on `today`, given the previous state.
///
/// A date earlier than the last recorded activity (skewed clock, a claim
/// approved late) leaves the streak as it is.
pub fn next_streak(current: u32, last_activity: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last_activity {
        None => 1,
        Some(last) => match days_between(last, today) {
            d if d <= 0 => current.max(1),
            1 => current.saturating_add(1),
            _ => 1,
        },
    }
}

/// Result of touching a streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub previous: u32,
    pub current: u32,
}

impl StreakUpdate {
    pub fn broken(&self) -> bool {
        self.previous > 1 && self.current == 1
    }
}

/// Record activity for `user_id` on `today`
pub fn touch(
    conn: &Connection,
    user_id: &str,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> QuestResult<StreakUpdate> {
    let user = get_or_create(conn, user_id, now)?;
    let current = next_streak(user.streak, user.last_activity_date, today);
    let last = user
        .last_activity_date
        .map_or(today, |last| last.max(today));

    save_streak(conn, user_id, current, last)?;
    debug!("{} streak {} -> {}", user_id, user.streak, current);

    Ok(StreakUpdate {
        previous: user.streak,
        current,
    })
}
