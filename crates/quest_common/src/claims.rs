//! Claim tracker.
//!
//! A row in `claims` is the only authority for "already claimed". Inserts go
//! through `INSERT OR IGNORE` on the (user, quest, period) primary key, so two
//! racing claims for the same key can never both succeed.
//!
//! In moderated mode a claim also opens a `pending_claims` row; XP is granted
//! when a moderator approves it.

use crate::error::{QuestError, QuestResult};
use crate::store::{decode_ts, encode_ts};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Accepted claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub user_id: String,
    pub quest_key: String,
    pub period_key: String,
    pub xp_reward: i64,
    pub claimed_at: DateTime<Utc>,
}

/// Record a claim; false if one already exists for the key
pub fn try_claim(
    conn: &Connection,
    user_id: &str,
    quest_key: &str,
    period_key: &str,
    xp_reward: i64,
    now: DateTime<Utc>,
) -> QuestResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO claims (user_id, quest_key, period_key, xp_reward, claimed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, quest_key, period_key, xp_reward, encode_ts(now)],
    )?;
    if inserted == 0 {
        debug!("Duplicate claim {}/{}/{}", user_id, quest_key, period_key);
    }
    Ok(inserted == 1)
}

/// Claims of one member, newest first
pub fn claims_for_user(conn: &Connection, user_id: &str, limit: usize) -> QuestResult<Vec<ClaimRecord>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, quest_key, period_key, xp_reward, claimed_at FROM claims
         WHERE user_id = ?1 ORDER BY claimed_at DESC, quest_key ASC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(user_id, quest_key, period_key, xp_reward, claimed_at)| {
            Ok(ClaimRecord {
                user_id,
                quest_key,
                period_key,
                xp_reward,
                claimed_at: decode_ts(&claimed_at)?,
            })
        })
        .collect()
}

/// Moderation state of a submitted claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Approved,
    Rejected,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Approved => "approved",
            PendingStatus::Rejected => "rejected",
        }
    }

    fn parse(raw: &str) -> QuestResult<Self> {
        match raw {
            "pending" => Ok(PendingStatus::Pending),
            "approved" => Ok(PendingStatus::Approved),
            "rejected" => Ok(PendingStatus::Rejected),
            other => Err(QuestError::Storage(format!("unknown claim status '{}'", other))),
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim waiting for a moderator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingClaim {
    pub id: i64,
    pub user_id: String,
    pub quest_key: String,
    pub period_key: String,
    pub quest_text: String,
    pub xp_reward: i64,
    pub status: PendingStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Submission details for moderated mode
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    pub user_id: &'a str,
    pub quest_key: &'a str,
    pub period_key: &'a str,
    pub quest_text: &'a str,
    pub xp_reward: i64,
}

pub fn insert_pending(conn: &Connection, submission: &Submission<'_>, now: DateTime<Utc>) -> QuestResult<i64> {
    conn.execute(
        "INSERT INTO pending_claims
             (user_id, quest_key, period_key, quest_text, xp_reward, status, submitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        params![
            submission.user_id,
            submission.quest_key,
            submission.period_key,
            submission.quest_text,
            submission.xp_reward,
            encode_ts(now)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const PENDING_COLUMNS: &str = "id, user_id, quest_key, period_key, quest_text, xp_reward, status, submitted_at, decided_at";

type RawPending = (i64, String, String, String, String, i64, String, String, Option<String>);

fn read_pending(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPending> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode_pending(raw: RawPending) -> QuestResult<PendingClaim> {
    let (id, user_id, quest_key, period_key, quest_text, xp_reward, status, submitted_at, decided_at) = raw;
    Ok(PendingClaim {
        id,
        user_id,
        quest_key,
        period_key,
        quest_text,
        xp_reward,
        status: PendingStatus::parse(&status)?,
        submitted_at: decode_ts(&submitted_at)?,
        decided_at: decided_at.as_deref().map(decode_ts).transpose()?,
    })
}

pub fn load_pending(conn: &Connection, id: i64) -> QuestResult<Option<PendingClaim>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM pending_claims WHERE id = ?1", PENDING_COLUMNS),
            params![id],
            read_pending,
        )
        .optional()?;
    raw.map(decode_pending).transpose()
}

/// Claims still awaiting a decision, oldest first
pub fn list_pending(conn: &Connection) -> QuestResult<Vec<PendingClaim>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM pending_claims WHERE status = 'pending' ORDER BY id ASC",
        PENDING_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], read_pending)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_pending).collect()
}

/// Close a pending claim with `status`
pub fn decide_pending(
    conn: &Connection,
    id: i64,
    status: PendingStatus,
    now: DateTime<Utc>,
) -> QuestResult<PendingClaim> {
    if status == PendingStatus::Pending {
        return Err(QuestError::validation("a decision must approve or reject"));
    }

    let claim = load_pending(conn, id)?
        .ok_or_else(|| QuestError::NotFound(format!("pending claim {}", id)))?;
    if claim.status != PendingStatus::Pending {
        return Err(QuestError::validation(format!(
            "claim {} was already {}",
            id, claim.status
        )));
    }

    conn.execute(
        "UPDATE pending_claims SET status = ?2, decided_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), encode_ts(now)],
    )?;

    Ok(PendingClaim {
        status,
        decided_at: Some(now),
        ..claim
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::migrate;
    use chrono::TimeZone;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_claim_once_per_period() {
        let conn = setup();
        assert!(try_claim(&conn, "u1", "explorer-1", "2026-03-02", 30, now()).unwrap());
        assert!(!try_claim(&conn, "u1", "explorer-1", "2026-03-02", 30, now()).unwrap());
        assert_eq!(claims_for_user(&conn, "u1", 10).unwrap().len(), 1);

        // Different day, quest or member are independent keys
        assert!(try_claim(&conn, "u1", "explorer-1", "2026-03-03", 30, now()).unwrap());
        assert!(try_claim(&conn, "u1", "explorer-2", "2026-03-02", 40, now()).unwrap());
        assert!(try_claim(&conn, "u2", "explorer-1", "2026-03-02", 30, now()).unwrap());

        assert_eq!(claims_for_user(&conn, "u1", 10).unwrap().len(), 3);
    }

    fn submit(conn: &Connection) -> i64 {
        insert_pending(
            conn,
            &Submission {
                user_id: "u1",
                quest_key: "initiate-1",
                period_key: "2026-03-02",
                quest_text: "Smile at 3 people",
                xp_reward: 5,
            },
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_pending_lifecycle() {
        let conn = setup();
        let id = submit(&conn);

        let pending = list_pending(&conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, PendingStatus::Pending);
        assert_eq!(pending[0].decided_at, None);

        let decided = decide_pending(&conn, id, PendingStatus::Approved, now()).unwrap();
        assert_eq!(decided.status, PendingStatus::Approved);
        assert!(list_pending(&conn).unwrap().is_empty());
        assert_eq!(
            load_pending(&conn, id).unwrap().unwrap().status,
            PendingStatus::Approved
        );
    }

    #[test]
    fn test_decisions_are_final() {
        let conn = setup();
        let id = submit(&conn);
        decide_pending(&conn, id, PendingStatus::Rejected, now()).unwrap();

        assert!(matches!(
            decide_pending(&conn, id, PendingStatus::Approved, now()),
            Err(QuestError::Validation(_))
        ));
        assert!(matches!(
            decide_pending(&conn, 999, PendingStatus::Approved, now()),
            Err(QuestError::NotFound(_))
        ));
    }
}
