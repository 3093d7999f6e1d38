//! Engine facade.
//!
//! Every command runs as one storage transaction: claim, rotation lookup, XP
//! grant and streak update commit together or not at all. Side effects are
//! queued only after the commit succeeded.

use crate::api::{
    ClaimOutcome, ClaimStatus, HealthResponse, LeaderboardCategory, LeaderboardQuery,
    LeaderboardView, ProgressView, ReviewOutcome, TodayQuests,
};
use crate::catalogue::{weekly_quest_key, WEEKLY_KEY_PREFIX};
use crate::claims::{self, PendingClaim, PendingStatus, Submission};
use crate::clock::{day_key, week_key, Clock, TimeSource};
use crate::config::QuestConfig;
use crate::error::{QuestError, QuestResult};
use crate::events::{EffectSender, Notification, SideEffect};
use crate::leaderboard::{self, DEFAULT_LIMIT};
use crate::ledger::{self, GrantOutcome, ResetOutcome, UserProgress};
use crate::rotation;
use crate::store::{schema_version, QuestDb};
use crate::streak;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Largest leaderboard page
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Quest engine shared by the HTTP surface and the scheduler
#[derive(Clone)]
pub struct QuestService {
    db: Arc<QuestDb>,
    config: Arc<QuestConfig>,
    clock: Clock,
    time: Arc<dyn TimeSource>,
    effects: EffectSender,
}

/// Target of a claim, resolved inside the transaction
struct ClaimTarget {
    quest_key: String,
    period_key: String,
    quest_text: String,
    xp_reward: i64,
}

impl QuestService {
    pub fn new(
        db: Arc<QuestDb>,
        config: QuestConfig,
        time: Arc<dyn TimeSource>,
        effects: EffectSender,
    ) -> QuestResult<Self> {
        config.validate()?;
        let clock = config.clock()?;
        Ok(Self {
            db,
            config: Arc::new(config),
            clock,
            time,
            effects,
        })
    }

    pub fn db(&self) -> &Arc<QuestDb> {
        &self.db
    }

    pub fn config(&self) -> &Arc<QuestConfig> {
        &self.config
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn effects(&self) -> &EffectSender {
        &self.effects
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    /// Current epoch day
    pub fn today(&self) -> NaiveDate {
        self.clock.day(self.now())
    }

    /// Claim today's quest from pool `quest_key`
    pub async fn claim_quest(&self, user_id: &str, quest_key: &str) -> QuestResult<ClaimOutcome> {
        ledger::validate_user_id(user_id)?;
        if quest_key.starts_with(WEEKLY_KEY_PREFIX) {
            return Err(QuestError::validation(format!(
                "'{}' is a weekly quest, claim it with the weekly command",
                quest_key
            )));
        }
        if self.config.catalogue.pool(quest_key).is_none() {
            return Err(QuestError::validation(format!("unknown quest '{}'", quest_key)));
        }

        let now = self.now();
        let today = day_key(self.clock.day(now));
        let user_id = user_id.to_string();
        let quest_key = quest_key.to_string();
        let config = Arc::clone(&self.config);

        let outcome = self
            .db
            .transaction(move |tx| {
                let user = ledger::get_or_create(tx, &user_id, now)?;
                if !config.catalogue.is_eligible(user.rank, &quest_key) {
                    return Err(QuestError::NotEligible {
                        rank: user.rank,
                        quest_key,
                    });
                }

                let selection = rotation::load_daily(tx, &today, &quest_key)?.ok_or_else(|| {
                    QuestError::NotYetGenerated {
                        quest_key: quest_key.clone(),
                        period_key: today.clone(),
                    }
                })?;

                let target = ClaimTarget {
                    quest_key,
                    period_key: today,
                    quest_text: selection.quest_text,
                    xp_reward: selection.xp_reward,
                };
                record_claim(tx, &config, &user, target, now)
            })
            .await?;

        self.after_claim(&outcome);
        Ok(outcome)
    }

    /// Claim this week's quest for `rank` (the member's own rank by default)
    pub async fn claim_weekly_quest(&self, user_id: &str, rank: Option<u8>) -> QuestResult<ClaimOutcome> {
        ledger::validate_user_id(user_id)?;
        if let Some(rank) = rank {
            if !self.config.ladder.contains(rank) {
                return Err(QuestError::validation(format!("unknown rank {}", rank)));
            }
        }

        let now = self.now();
        let week = week_key(self.clock.day(now));
        let user_id = user_id.to_string();
        let config = Arc::clone(&self.config);

        let outcome = self
            .db
            .transaction(move |tx| {
                let user = ledger::get_or_create(tx, &user_id, now)?;
                let rank = rank.unwrap_or(user.rank);
                let quest_key = weekly_quest_key(rank);

                if rank != user.rank {
                    return Err(QuestError::NotEligible {
                        rank: user.rank,
                        quest_key,
                    });
                }
                if config.catalogue.weekly_for(rank).is_none() {
                    return Err(QuestError::validation(format!(
                        "rank {} has no weekly quest",
                        rank
                    )));
                }

                let selection = rotation::load_weekly(tx, &week, rank)?.ok_or_else(|| {
                    QuestError::NotYetGenerated {
                        quest_key: quest_key.clone(),
                        period_key: week.clone(),
                    }
                })?;

                let target = ClaimTarget {
                    quest_key,
                    period_key: week,
                    quest_text: selection.quest_text,
                    xp_reward: selection.xp_reward,
                };
                record_claim(tx, &config, &user, target, now)
            })
            .await?;

        self.after_claim(&outcome);
        Ok(outcome)
    }

    fn after_claim(&self, outcome: &ClaimOutcome) {
        match outcome.status {
            ClaimStatus::Granted => {
                info!(
                    "{} claimed {} (+{} XP, streak {})",
                    outcome.user_id, outcome.quest_key, outcome.xp_reward, outcome.streak
                );
                if let Some(grant) = &outcome.grant {
                    self.sync_roles(grant);
                }
            }
            ClaimStatus::Pending => {
                info!(
                    "{} submitted {} for review",
                    outcome.user_id, outcome.quest_key
                );
                if let Some(pending_id) = outcome.pending_id {
                    self.effects
                        .emit(SideEffect::Broadcast(Notification::ClaimSubmitted {
                            pending_id,
                            user_id: outcome.user_id.clone(),
                            quest_text: outcome.quest_text.clone(),
                            xp_reward: outcome.xp_reward,
                        }));
                }
            }
        }
    }

    fn sync_roles(&self, grant: &GrantOutcome) {
        if !grant.rank_up() {
            return;
        }
        let roles = self.config.ladder.role_names();
        if let Some(effect) = SideEffect::role_sync(&grant.user_id, grant.new_rank, &roles) {
            self.effects.emit(effect);
        }
    }

    /// Progress of a member; unknown members are reported at rank 1 without
    /// creating a record
    pub async fn get_progress(&self, user_id: &str) -> QuestResult<ProgressView> {
        ledger::validate_user_id(user_id)?;
        let now = self.now();
        let today = self.clock.day(now);
        let id = user_id.to_string();

        let (user, claimed) = self
            .db
            .execute(move |conn| {
                let user = ledger::load(conn, &id)?;
                let claimed = claimed_keys(conn, &id, today)?;
                Ok((user, claimed))
            })
            .await?;

        let user = user.unwrap_or_else(|| UserProgress {
            user_id: user_id.to_string(),
            xp_total: 0,
            rank: 1,
            tier: 1,
            streak: 0,
            last_activity_date: None,
            created_at: now,
        });

        let ladder = &self.config.ladder;
        let next_rank = user.rank.saturating_add(1);
        Ok(ProgressView {
            rank_name: ladder.name(user.rank).to_string(),
            tier_count: ladder.get(user.rank).map_or(1, |r| r.tier_count()),
            next_rank_name: ladder.get(next_rank).map(|r| r.name.clone()),
            xp_to_next_rank: ladder.xp_to_next_rank(user.rank, user.xp_total),
            eligible_pools: self.config.catalogue.pools_for_rank(user.rank).to_vec(),
            claimed,
            user_id: user.user_id,
            xp_total: user.xp_total,
            rank: user.rank,
            tier: user.tier,
            streak: user.streak,
            last_activity_date: user.last_activity_date,
        })
    }

    pub async fn get_leaderboard(&self, query: LeaderboardQuery) -> QuestResult<LeaderboardView> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT);
        if let Some(id) = &query.user_id {
            ledger::validate_user_id(id)?;
        }
        if let Some(rank) = query.rank {
            if !self.config.ladder.contains(rank) {
                return Err(QuestError::validation(format!("unknown rank {}", rank)));
            }
        }
        if query.category == LeaderboardCategory::Rank && query.rank.is_none() {
            return Err(QuestError::validation("the rank board needs a rank"));
        }

        let now = self.now();
        let category = query.category;
        let window_days = match category {
            LeaderboardCategory::Global => None,
            LeaderboardCategory::Rank => query.window_days.or(category.default_window_days()),
            _ => category.default_window_days(),
        };

        let (rank, board) = self
            .db
            .execute(move |conn| {
                let caller = query.user_id.as_deref();
                match window_days {
                    None => Ok((None, leaderboard::global(conn, limit, caller)?)),
                    Some(window) => {
                        let rank = match (query.rank, caller) {
                            (Some(rank), _) => rank,
                            (None, Some(id)) => ledger::load(conn, id)?.map_or(1, |u| u.rank),
                            (None, None) => 1,
                        };
                        let board = leaderboard::ranked(conn, rank, window, now, limit, caller)?;
                        Ok((Some(rank), board))
                    }
                }
            })
            .await?;

        Ok(LeaderboardView {
            category,
            rank,
            rank_name: rank.map(|r| self.config.ladder.name(r).to_string()),
            window_days,
            board,
        })
    }

    /// Moderator grant
    pub async fn admin_grant_xp(
        &self,
        user_id: &str,
        amount: i64,
        reason: Option<String>,
    ) -> QuestResult<GrantOutcome> {
        ledger::validate_user_id(user_id)?;
        if amount <= 0 {
            return Err(QuestError::validation("amount must be a positive number of XP"));
        }

        let now = self.now();
        let id = user_id.to_string();
        let reason = reason.unwrap_or_else(|| "admin grant".to_string());
        let config = Arc::clone(&self.config);

        let grant = self
            .db
            .transaction(move |tx| ledger::grant_xp(tx, &config.ladder, &id, amount, &reason, now))
            .await?;

        info!("Admin granted {} XP to {}", amount, user_id);
        self.sync_roles(&grant);
        Ok(grant)
    }

    /// Return a member to rank 1 with no XP or streak
    pub async fn admin_reset_user(&self, user_id: &str) -> QuestResult<ResetOutcome> {
        ledger::validate_user_id(user_id)?;
        let now = self.now();
        let id = user_id.to_string();

        let outcome = self
            .db
            .transaction(move |tx| ledger::reset_user(tx, &id, now))
            .await?;

        if outcome.rank_changed() {
            let roles = self.config.ladder.role_names();
            if let Some(effect) = SideEffect::role_sync(user_id, 1, &roles) {
                self.effects.emit(effect);
            }
        }
        Ok(outcome)
    }

    /// Quests posted for the current day and week
    pub async fn todays_quests(&self) -> QuestResult<TodayQuests> {
        let today = self.today();
        let day = day_key(today);
        let week = week_key(today);

        let (daily, weekly) = {
            let day = day.clone();
            let week = week.clone();
            self.db
                .execute(move |conn| {
                    Ok((
                        rotation::daily_for_day(conn, &day)?,
                        rotation::weekly_for_week(conn, &week)?,
                    ))
                })
                .await?
        };

        Ok(TodayQuests {
            day_key: day,
            week_key: week,
            daily,
            weekly,
        })
    }

    pub async fn list_pending(&self) -> QuestResult<Vec<PendingClaim>> {
        self.db.execute(claims::list_pending).await
    }

    /// Approve a pending claim and grant its XP
    pub async fn approve_claim(&self, pending_id: i64) -> QuestResult<ReviewOutcome> {
        let now = self.now();
        let config = Arc::clone(&self.config);

        let outcome = self
            .db
            .transaction(move |tx| {
                let claim = claims::decide_pending(tx, pending_id, PendingStatus::Approved, now)?;
                let reason = format!("quest {} ({})", claim.quest_key, claim.period_key);
                let grant = ledger::grant_xp(
                    tx,
                    &config.ladder,
                    &claim.user_id,
                    claim.xp_reward,
                    &reason,
                    now,
                )?;
                Ok(ReviewOutcome {
                    claim,
                    grant: Some(grant),
                })
            })
            .await?;

        if let Some(grant) = &outcome.grant {
            info!(
                "Approved claim {} for {} (+{} XP)",
                pending_id, grant.user_id, grant.amount
            );
            self.effects
                .emit(SideEffect::Broadcast(Notification::ClaimApproved {
                    user_id: grant.user_id.clone(),
                    quest_text: outcome.claim.quest_text.clone(),
                    xp_reward: grant.amount,
                    xp_total: grant.new_total,
                    rank_name: self.config.ladder.name(grant.new_rank).to_string(),
                }));
            self.sync_roles(grant);
        }
        Ok(outcome)
    }

    /// Reject a pending claim; the claim stays recorded so it cannot be resubmitted
    pub async fn reject_claim(&self, pending_id: i64) -> QuestResult<ReviewOutcome> {
        let now = self.now();
        let claim = self
            .db
            .transaction(move |tx| claims::decide_pending(tx, pending_id, PendingStatus::Rejected, now))
            .await?;
        info!("Rejected claim {} from {}", pending_id, claim.user_id);
        Ok(ReviewOutcome { claim, grant: None })
    }

    pub async fn health(&self) -> QuestResult<HealthResponse> {
        let today = self.today();
        let (version, drift) = self
            .db
            .execute(|conn| Ok((schema_version(conn)?, ledger::find_drift(conn)?)))
            .await?;
        for (user_id, total, sum) in &drift {
            warn!("Ledger drift for {}: total {} but events sum to {}", user_id, total, sum);
        }
        Ok(HealthResponse {
            status: if drift.is_empty() { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: version,
            day_key: day_key(today),
            week_key: week_key(today),
            require_approval: self.config.claims.require_approval,
            ledger_drift: drift.len(),
        })
    }
}

/// Insert the claim, update the streak and either grant XP or queue for review
fn record_claim(
    conn: &Connection,
    config: &QuestConfig,
    user: &UserProgress,
    target: ClaimTarget,
    now: DateTime<Utc>,
) -> QuestResult<ClaimOutcome> {
    let claimed = claims::try_claim(
        conn,
        &user.user_id,
        &target.quest_key,
        &target.period_key,
        target.xp_reward,
        now,
    )?;
    if !claimed {
        return Err(QuestError::AlreadyClaimed {
            quest_key: target.quest_key,
            period_key: target.period_key,
        });
    }

    let today = config.clock()?.day(now);

    let (status, pending_id, grant, rank) = if config.claims.require_approval {
        let id = claims::insert_pending(
            conn,
            &Submission {
                user_id: &user.user_id,
                quest_key: &target.quest_key,
                period_key: &target.period_key,
                quest_text: &target.quest_text,
                xp_reward: target.xp_reward,
            },
            now,
        )?;
        (ClaimStatus::Pending, Some(id), None, user.rank)
    } else {
        let reason = format!("quest {} ({})", target.quest_key, target.period_key);
        let grant = ledger::grant_xp(
            conn,
            &config.ladder,
            &user.user_id,
            target.xp_reward,
            &reason,
            now,
        )?;
        let rank = grant.new_rank;
        (ClaimStatus::Granted, None, Some(grant), rank)
    };

    let streak = streak::touch(conn, &user.user_id, today, now)?;
    if streak.broken() {
        debug!("{} lost a {} day streak", user.user_id, streak.previous);
    }

    Ok(ClaimOutcome {
        user_id: user.user_id.clone(),
        quest_key: target.quest_key,
        period_key: target.period_key,
        quest_text: target.quest_text,
        xp_reward: target.xp_reward,
        status,
        streak: streak.current,
        pending_id,
        grant,
        rank_name: config.ladder.name(rank).to_string(),
    })
}

/// Quest keys the member already claimed today, plus this week's weekly claim
fn claimed_keys(conn: &Connection, user_id: &str, today: NaiveDate) -> QuestResult<Vec<String>> {
    let day = day_key(today);
    let week = week_key(today);
    let mut keys: Vec<String> = claims::claims_for_user(conn, user_id, 64)?
        .into_iter()
        .filter(|c| c.period_key == day || c.period_key == week)
        .map(|c| c.quest_key)
        .collect();
    keys.sort();
    Ok(keys)
}
