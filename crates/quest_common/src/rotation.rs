//! Quest rotation engine.
//!
//! Picks one quest per pool per epoch day and one weekly quest per rank per
//! epoch week. Selections are written once and never overwritten, so
//! regenerating is always safe.
//!
//! ## Determinism
//!
//! The random draw for a (pool, day) pair is seeded from
//! `SHA-256(pool_key "/" day_key)`. Given the same persisted history the same
//! quest is chosen, which keeps replays and restarts reproducible.
//!
//! ## No-repeat windows
//!
//! A `no_repeat_window(N)` pool keeps the set of quests served in the current
//! cycle. Candidates are the pool minus that set. The cycle resets when it is
//! N days old or when nothing is left. Candidates additionally skip whatever
//! the pool served in the previous N-1 days, falling back to skipping only
//! yesterday's quest, then to the whole pool.

use crate::catalogue::{weekly_quest_key, Catalogue, QuestPoolDefinition, RotationPolicy, WeeklyPool};
use crate::clock::{day_key, days_between, parse_day_key};
use crate::error::{QuestError, QuestResult};
use crate::store::{decode_ts, encode_ts};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Quest posted for one pool on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySelection {
    pub day_key: String,
    pub pool_key: String,
    pub quest_text: String,
    pub xp_reward: i64,
    pub created_at: DateTime<Utc>,
}

/// Quest posted for one rank for one week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySelection {
    pub week_key: String,
    pub rank: u8,
    pub quest_text: String,
    pub xp_reward: i64,
    pub created_at: DateTime<Utc>,
}

impl WeeklySelection {
    pub fn quest_key(&self) -> String {
        weekly_quest_key(self.rank)
    }
}

/// Rotation progress of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleState {
    pub used: Vec<String>,
    pub cycle_start: NaiveDate,
}

impl CycleState {
    fn fresh(today: NaiveDate) -> Self {
        Self {
            used: Vec::new(),
            cycle_start: today,
        }
    }
}

/// Outcome of a no-repeat draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPick {
    pub quest: String,
    pub state: CycleState,
    /// The cycle was restarted before this draw
    pub reset: bool,
}

/// Deterministic RNG for one (scope, period) pair
pub fn seeded_rng(scope: &str, period_key: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b"/");
    hasher.update(period_key.as_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

/// Pure no-repeat draw.
///
/// `recent` holds the quests this pool served in the trailing window,
/// `yesterday` the quest served the day before `today`.
pub fn pick_no_repeat(
    quests: &[String],
    window_days: u32,
    state: Option<CycleState>,
    recent: &[String],
    yesterday: Option<&str>,
    today: NaiveDate,
    rng: &mut StdRng,
) -> Option<RotationPick> {
    let mut state = state.unwrap_or_else(|| CycleState::fresh(today));
    let mut reset = false;

    if days_between(state.cycle_start, today) >= window_days as i64 {
        state = CycleState::fresh(today);
        reset = true;
    }

    let mut base: Vec<&String> = quests.iter().filter(|q| !state.used.contains(*q)).collect();
    if base.is_empty() {
        state = CycleState::fresh(today);
        reset = true;
        base = quests.iter().collect();
    }

    let mut candidates: Vec<&String> = base
        .iter()
        .copied()
        .filter(|q| !recent.contains(*q))
        .collect();
    if candidates.is_empty() {
        candidates = base
            .iter()
            .copied()
            .filter(|q| Some(q.as_str()) != yesterday)
            .collect();
    }
    if candidates.is_empty() {
        candidates = base;
    }

    let quest = (*candidates.choose(rng)?).clone();

    // Drop quests that left the pool since the cycle began
    state.used.retain(|q| quests.contains(q));
    state.used.push(quest.clone());

    Some(RotationPick { quest, state, reset })
}

type RawSelection = (String, String, String, i64, String);

fn decode_daily(raw: RawSelection) -> QuestResult<DailySelection> {
    let (day_key, pool_key, quest_text, xp_reward, created_at) = raw;
    Ok(DailySelection {
        day_key,
        pool_key,
        quest_text,
        xp_reward,
        created_at: decode_ts(&created_at)?,
    })
}

/// Selection for `pool_key` on `day`, if generated
pub fn load_daily(conn: &Connection, day: &str, pool_key: &str) -> QuestResult<Option<DailySelection>> {
    let raw: Option<RawSelection> = conn
        .query_row(
            "SELECT day_key, pool_key, quest_text, xp_reward, created_at
             FROM daily_quests WHERE day_key = ?1 AND pool_key = ?2",
            params![day, pool_key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;
    raw.map(decode_daily).transpose()
}

/// Every selection generated for `day`
pub fn daily_for_day(conn: &Connection, day: &str) -> QuestResult<Vec<DailySelection>> {
    let mut stmt = conn.prepare(
        "SELECT day_key, pool_key, quest_text, xp_reward, created_at
         FROM daily_quests WHERE day_key = ?1 ORDER BY pool_key",
    )?;
    let rows = stmt
        .query_map(params![day], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<Result<Vec<RawSelection>, _>>()?;
    rows.into_iter().map(decode_daily).collect()
}

/// Quests `pool_key` served on days in `[from, until)`
fn served_between(
    conn: &Connection,
    pool_key: &str,
    from: NaiveDate,
    until: NaiveDate,
) -> QuestResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT quest_text FROM daily_quests
         WHERE pool_key = ?1 AND day_key >= ?2 AND day_key < ?3
         ORDER BY day_key",
    )?;
    let rows = stmt
        .query_map(params![pool_key, day_key(from), day_key(until)], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

pub fn load_cycle_state(conn: &Connection, pool_key: &str) -> QuestResult<Option<CycleState>> {
    let raw: Option<(String, String)> = conn
        .query_row(
            "SELECT used_quests, cycle_start FROM rotation_state WHERE pool_key = ?1",
            params![pool_key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match raw {
        Some((used, cycle_start)) => Ok(Some(CycleState {
            used: serde_json::from_str(&used)?,
            cycle_start: parse_day_key(&cycle_start)?,
        })),
        None => Ok(None),
    }
}

fn save_cycle_state(
    conn: &Connection,
    pool_key: &str,
    state: &CycleState,
    now: DateTime<Utc>,
) -> QuestResult<()> {
    conn.execute(
        "INSERT INTO rotation_state (pool_key, used_quests, cycle_start, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(pool_key) DO UPDATE SET
             used_quests = excluded.used_quests,
             cycle_start = excluded.cycle_start,
             updated_at = excluded.updated_at",
        params![
            pool_key,
            serde_json::to_string(&state.used)?,
            day_key(state.cycle_start),
            encode_ts(now)
        ],
    )?;
    Ok(())
}

/// Today's quest for `pool`, generating it if needed.
///
/// Returns the selection and whether this call created it.
pub fn select_daily_quest(
    conn: &Connection,
    pool: &QuestPoolDefinition,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> QuestResult<(DailySelection, bool)> {
    let today_key = day_key(today);
    if let Some(existing) = load_daily(conn, &today_key, &pool.key)? {
        return Ok((existing, false));
    }

    let mut rng = seeded_rng(&pool.key, &today_key);
    let empty = || QuestError::validation(format!("pool '{}' has no quests", pool.key));

    let quest = match pool.rotation {
        RotationPolicy::SimpleRandom => pool.quests.choose(&mut rng).ok_or_else(empty)?.clone(),
        RotationPolicy::NoRepeatWindow { window_days } => {
            let lookback = Duration::days(window_days.saturating_sub(1) as i64);
            let recent = served_between(conn, &pool.key, today - lookback, today)?;
            let yesterday = load_daily(conn, &day_key(today - Duration::days(1)), &pool.key)?
                .map(|s| s.quest_text);

            let pick = pick_no_repeat(
                &pool.quests,
                window_days,
                load_cycle_state(conn, &pool.key)?,
                &recent,
                yesterday.as_deref(),
                today,
                &mut rng,
            )
            .ok_or_else(empty)?;

            if pick.reset {
                debug!("Rotation cycle of {} restarted on {}", pool.key, today_key);
            }
            save_cycle_state(conn, &pool.key, &pick.state, now)?;
            pick.quest
        }
    };

    conn.execute(
        "INSERT INTO daily_quests (day_key, pool_key, quest_text, xp_reward, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![today_key, pool.key, quest, pool.xp_reward, encode_ts(now)],
    )?;

    let selection = DailySelection {
        day_key: today_key,
        pool_key: pool.key.clone(),
        quest_text: quest,
        xp_reward: pool.xp_reward,
        created_at: now,
    };
    Ok((selection, true))
}

/// Generate every missing daily selection for `today`; returns the new ones
pub fn generate_daily(
    conn: &Connection,
    catalogue: &Catalogue,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> QuestResult<Vec<DailySelection>> {
    let mut created = Vec::new();
    for pool in &catalogue.pools {
        let (selection, new) = select_daily_quest(conn, pool, today, now)?;
        if new {
            created.push(selection);
        }
    }
    if !created.is_empty() {
        info!("Generated {} daily quests for {}", created.len(), day_key(today));
    }
    Ok(created)
}

type RawWeekly = (String, i64, String, i64, String);

fn decode_weekly(raw: RawWeekly) -> QuestResult<WeeklySelection> {
    let (week_key, rank, quest_text, xp_reward, created_at) = raw;
    Ok(WeeklySelection {
        week_key,
        rank: rank.clamp(0, u8::MAX as i64) as u8,
        quest_text,
        xp_reward,
        created_at: decode_ts(&created_at)?,
    })
}

pub fn load_weekly(conn: &Connection, week: &str, rank: u8) -> QuestResult<Option<WeeklySelection>> {
    let raw: Option<RawWeekly> = conn
        .query_row(
            "SELECT week_key, rank, quest_text, xp_reward, created_at
             FROM weekly_quests WHERE week_key = ?1 AND rank = ?2",
            params![week, rank],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;
    raw.map(decode_weekly).transpose()
}

pub fn weekly_for_week(conn: &Connection, week: &str) -> QuestResult<Vec<WeeklySelection>> {
    let mut stmt = conn.prepare(
        "SELECT week_key, rank, quest_text, xp_reward, created_at
         FROM weekly_quests WHERE week_key = ?1 ORDER BY rank",
    )?;
    let rows = stmt
        .query_map(params![week], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<Result<Vec<RawWeekly>, _>>()?;
    rows.into_iter().map(decode_weekly).collect()
}

/// This week's quest for `pool`, generating it if needed
pub fn select_weekly_quest(
    conn: &Connection,
    pool: &WeeklyPool,
    week: &str,
    now: DateTime<Utc>,
) -> QuestResult<(WeeklySelection, bool)> {
    if let Some(existing) = load_weekly(conn, week, pool.rank)? {
        return Ok((existing, false));
    }

    let mut rng = seeded_rng(&weekly_quest_key(pool.rank), week);
    let quest = pool
        .quests
        .choose(&mut rng)
        .ok_or_else(|| QuestError::validation(format!("weekly pool for rank {} is empty", pool.rank)))?
        .clone();

    conn.execute(
        "INSERT INTO weekly_quests (week_key, rank, quest_text, xp_reward, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![week, pool.rank, quest, pool.xp_reward, encode_ts(now)],
    )?;

    Ok((
        WeeklySelection {
            week_key: week.to_string(),
            rank: pool.rank,
            quest_text: quest,
            xp_reward: pool.xp_reward,
            created_at: now,
        },
        true,
    ))
}

pub fn generate_weekly(
    conn: &Connection,
    catalogue: &Catalogue,
    week: &str,
    now: DateTime<Utc>,
) -> QuestResult<Vec<WeeklySelection>> {
    let mut created = Vec::new();
    for pool in &catalogue.weekly {
        let (selection, new) = select_weekly_quest(conn, pool, week, now)?;
        if new {
            created.push(selection);
        }
    }
    if !created.is_empty() {
        info!("Generated {} weekly quests for {}", created.len(), week);
    }
    Ok(created)
}

/// Store the configured pools so the database is self-describing
pub fn snapshot_catalogue(conn: &Connection, catalogue: &Catalogue, now: DateTime<Utc>) -> QuestResult<()> {
    for pool in &catalogue.pools {
        conn.execute(
            "INSERT INTO quest_pools (pool_key, definition, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(pool_key) DO UPDATE SET
                 definition = excluded.definition,
                 updated_at = excluded.updated_at",
            params![pool.key, serde_json::to_string(pool)?, encode_ts(now)],
        )?;
    }

    let configured: Vec<&str> = catalogue.pools.iter().map(|p| p.key.as_str()).collect();
    let stored = stored_pools(conn)?;
    for pool in stored.iter().filter(|p| !configured.contains(&p.key.as_str())) {
        conn.execute("DELETE FROM quest_pools WHERE pool_key = ?1", params![pool.key])?;
        debug!("Dropped pool {} from snapshot", pool.key);
    }
    Ok(())
}

pub fn stored_pools(conn: &Connection) -> QuestResult<Vec<QuestPoolDefinition>> {
    let mut stmt = conn.prepare("SELECT definition FROM quest_pools ORDER BY pool_key")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.iter()
        .map(|raw| serde_json::from_str(raw).map_err(QuestError::from))
        .collect()
}
