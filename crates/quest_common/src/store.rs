//! Persistent store for progression state.
//!
//! One SQLite database, one connection behind a mutex. Every engine operation
//! runs on the blocking pool inside an IMMEDIATE transaction, which serializes
//! all writers: a claim, a grant and a scheduler tick never interleave.
//!
//! # Schema versioning
//!
//! `schema_version` holds the single canonical version. To change the schema,
//! bump `CURRENT_SCHEMA_VERSION` and add a step to `migrate()`; steps run in
//! order from the stored version.

use crate::error::{QuestError, QuestResult};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Default database path for the daemon
pub const SYSTEM_DB_PATH: &str = "/var/lib/questd/quest.db";

/// Where the database lives
#[derive(Debug, Clone)]
pub enum DbLocation {
    /// /var/lib/questd/quest.db
    System,
    /// Explicit path (config or tests)
    Custom(PathBuf),
}

impl DbLocation {
    pub fn path(&self) -> PathBuf {
        match self {
            DbLocation::System => PathBuf::from(SYSTEM_DB_PATH),
            DbLocation::Custom(path) => path.clone(),
        }
    }
}

/// Storage service shared by the engine, scheduler and API
pub struct QuestDb {
    conn: Arc<Mutex<Connection>>,
}

impl QuestDb {
    /// Open or create the database and bring the schema up to date
    pub async fn open(location: DbLocation) -> Result<Self> {
        let db_path = location.path();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        info!("Opening quest database at: {}", db_path.display());

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&db_path).context("Failed to open SQLite database")?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .context("Failed to enable WAL mode")?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .context("Failed to set synchronous mode")?;
            conn.busy_timeout(Duration::from_secs(5))
                .context("Failed to set busy timeout")?;

            let version = migrate(&conn).context("Database migration failed")?;
            info!("Quest database schema at version {}", version);
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a read or single-statement operation on the blocking pool
    pub async fn execute<F, R>(&self, f: F) -> QuestResult<R>
    where
        F: FnOnce(&Connection) -> QuestResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }

    /// Run `f` inside an IMMEDIATE transaction; commits on `Ok`, rolls back on `Err`
    pub async fn transaction<F, R>(&self, f: F) -> QuestResult<R>
    where
        F: FnOnce(&Transaction<'_>) -> QuestResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await?
    }

    pub async fn schema_version(&self) -> QuestResult<i64> {
        self.execute(|conn| schema_version(conn)).await
    }
}

/// Canonical timestamp encoding (fixed width, UTC, sorts lexicographically)
pub fn encode_ts(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_ts(raw: &str) -> QuestResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| QuestError::Storage(format!("malformed timestamp '{}': {}", raw, e)))
}

pub fn schema_version(conn: &Connection) -> QuestResult<i64> {
    let version = conn
        .query_row(
            "SELECT version FROM schema_version WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    Ok(version)
}

/// Bring `conn` to `CURRENT_SCHEMA_VERSION`; returns the resulting version
pub fn migrate(conn: &Connection) -> QuestResult<i64> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );",
    )?;

    let from = schema_version(conn)?;
    if from > CURRENT_SCHEMA_VERSION {
        return Err(QuestError::Storage(format!(
            "database schema version {} is newer than supported version {}",
            from, CURRENT_SCHEMA_VERSION
        )));
    }
    if from == CURRENT_SCHEMA_VERSION {
        debug!("Schema up to date (version {})", from);
        return Ok(from);
    }

    // v1: progression, rotation and claim tables
    if from < 1 {
        info!("Running migration: schema v1");
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS user_progress (
                user_id TEXT PRIMARY KEY,
                xp_total INTEGER NOT NULL DEFAULT 0 CHECK (xp_total >= 0),
                rank INTEGER NOT NULL DEFAULT 1,
                tier INTEGER NOT NULL DEFAULT 1,
                streak INTEGER NOT NULL DEFAULT 0,
                last_activity_date TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS xp_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_xp_events_user ON xp_events(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_xp_events_time ON xp_events(created_at);
            CREATE TABLE IF NOT EXISTS daily_quests (
                day_key TEXT NOT NULL,
                pool_key TEXT NOT NULL,
                quest_text TEXT NOT NULL,
                xp_reward INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (day_key, pool_key)
            );
            CREATE INDEX IF NOT EXISTS idx_daily_quests_pool ON daily_quests(pool_key, day_key);
            CREATE TABLE IF NOT EXISTS rotation_state (
                pool_key TEXT PRIMARY KEY,
                used_quests TEXT NOT NULL,
                cycle_start TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS weekly_quests (
                week_key TEXT NOT NULL,
                rank INTEGER NOT NULL,
                quest_text TEXT NOT NULL,
                xp_reward INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (week_key, rank)
            );
            CREATE TABLE IF NOT EXISTS claims (
                user_id TEXT NOT NULL,
                quest_key TEXT NOT NULL,
                period_key TEXT NOT NULL,
                xp_reward INTEGER NOT NULL,
                claimed_at TEXT NOT NULL,
                PRIMARY KEY (user_id, quest_key, period_key)
            );
            CREATE TABLE IF NOT EXISTS broadcast_markers (
                kind TEXT NOT NULL,
                period_key TEXT NOT NULL,
                posted_at TEXT NOT NULL,
                PRIMARY KEY (kind, period_key)
            );
            INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, 1);
            COMMIT;",
        )?;
    }

    // v2: catalogue snapshot and moderated claims
    if from < 2 {
        info!("Running migration: schema v2");
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS quest_pools (
                pool_key TEXT PRIMARY KEY,
                definition TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pending_claims (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                quest_key TEXT NOT NULL,
                period_key TEXT NOT NULL,
                quest_text TEXT NOT NULL,
                xp_reward INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                submitted_at TEXT NOT NULL,
                decided_at TEXT,
                UNIQUE (user_id, quest_key, period_key)
            );
            CREATE INDEX IF NOT EXISTS idx_pending_claims_status ON pending_claims(status);
            INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, 2);
            COMMIT;",
        )?;
    }

    schema_version(conn)
}

/// Persist a "done for this period" marker; true only for the first caller
pub fn mark_once(
    conn: &Connection,
    kind: &str,
    period_key: &str,
    now: DateTime<Utc>,
) -> QuestResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO broadcast_markers (kind, period_key, posted_at)
         VALUES (?1, ?2, ?3)",
        params![kind, period_key, encode_ts(now)],
    )?;
    Ok(inserted == 1)
}
