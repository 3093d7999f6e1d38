//! Periodic quest generation and announcements.
//!
//! Runs on a tick much finer than a day. Every step checks persisted state
//! first (existing selections, broadcast markers), so a tick can be repeated
//! or interrupted at any point and a restarted daemon picks up where it left
//! off without posting anything twice.

use chrono::NaiveDate;
use quest_common::clock::{day_key, week_key};
use quest_common::events::PostedQuest;
use quest_common::rotation::{self, DailySelection, WeeklySelection};
use quest_common::store::mark_once;
use quest_common::{Ladder, Notification, QuestResult, QuestService, SideEffect};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

pub const DAILY_POSTED_MARKER: &str = "daily_quests_posted";
pub const WEEKLY_POSTED_MARKER: &str = "weekly_quests_posted";
pub const DAILY_REMINDER_MARKER: &str = "daily_reminder";

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub day_key: String,
    pub week_key: String,
    pub daily_created: usize,
    pub weekly_created: usize,
    pub posted_daily: bool,
    pub posted_weekly: bool,
    pub reminded: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.daily_created == 0
            && self.weekly_created == 0
            && !self.posted_daily
            && !self.posted_weekly
            && !self.reminded
    }
}

fn daily_posts(selections: &[DailySelection]) -> Vec<PostedQuest> {
    selections
        .iter()
        .map(|s| PostedQuest::daily(&s.pool_key, &s.quest_text, s.xp_reward))
        .collect()
}

fn weekly_posts(ladder: &Ladder, selections: &[WeeklySelection]) -> Vec<PostedQuest> {
    selections
        .iter()
        .map(|s| PostedQuest::weekly(&s.quest_key(), ladder.name(s.rank), &s.quest_text, s.xp_reward))
        .collect()
}

/// One scheduler pass; announcements are queued after the transaction commits
pub async fn run_tick(service: &QuestService) -> QuestResult<TickReport> {
    let now = service.now();
    let clock = service.clock();
    let today = clock.day(now);
    let local_hour = clock.local_hour(now);
    let config = Arc::clone(service.config());

    let (report, notifications) = service
        .db()
        .transaction(move |tx| {
            let mut report = TickReport {
                day_key: day_key(today),
                week_key: week_key(today),
                ..Default::default()
            };
            let mut notifications = Vec::new();

            report.daily_created = rotation::generate_daily(tx, &config.catalogue, today, now)?.len();
            report.weekly_created =
                rotation::generate_weekly(tx, &config.catalogue, &report.week_key, now)?.len();

            // An empty catalogue leaves the period unmarked
            let daily = todays_posts(tx, today)?;
            if !daily.is_empty() && mark_once(tx, DAILY_POSTED_MARKER, &report.day_key, now)? {
                report.posted_daily = true;
                notifications.push(Notification::DailyQuestsPosted {
                    day_key: report.day_key.clone(),
                    quests: daily,
                });
            }

            let weekly = rotation::weekly_for_week(tx, &report.week_key)?;
            if !weekly.is_empty() && mark_once(tx, WEEKLY_POSTED_MARKER, &report.week_key, now)? {
                report.posted_weekly = true;
                notifications.push(Notification::WeeklyQuestsPosted {
                    week_key: report.week_key.clone(),
                    quests: weekly_posts(&config.ladder, &weekly),
                });
            }

            let reminders = &config.reminders;
            if reminders.enabled
                && local_hour >= reminders.hour
                && mark_once(tx, DAILY_REMINDER_MARKER, &report.day_key, now)?
            {
                report.reminded = true;
                notifications.push(Notification::DailyReminder {
                    day_key: report.day_key.clone(),
                    message: reminders.message.clone(),
                    quests: todays_posts(tx, today)?,
                });
            }

            Ok((report, notifications))
        })
        .await?;

    for notification in notifications {
        service.effects().emit(SideEffect::Broadcast(notification));
    }

    if report.is_idle() {
        debug!("Scheduler tick for {}: nothing to do", report.day_key);
    } else {
        info!(
            "Scheduler tick for {}: {} daily, {} weekly generated; posted daily={} weekly={} reminder={}",
            report.day_key,
            report.daily_created,
            report.weekly_created,
            report.posted_daily,
            report.posted_weekly,
            report.reminded
        );
    }
    Ok(report)
}

fn todays_posts(conn: &Connection, today: NaiveDate) -> QuestResult<Vec<PostedQuest>> {
    Ok(daily_posts(&rotation::daily_for_day(conn, &day_key(today))?))
}

/// Run `run_tick` every `every`, starting immediately
pub fn spawn(service: QuestService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Quest scheduler started (every {}s)", every.as_secs());

        loop {
            ticker.tick().await;
            if let Err(e) = run_tick(&service).await {
                error!("Scheduler tick failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_common::events::{self, EffectReceiver};
    use quest_common::{DbLocation, ManualTimeSource, QuestConfig, QuestDb};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tempfile::TempDir;

    async fn service_at(hour: u32) -> (TempDir, QuestService, EffectReceiver, Arc<ManualTimeSource>) {
        let dir = tempfile::tempdir().unwrap();
        let db = QuestDb::open(DbLocation::Custom(dir.path().join("quest.db")))
            .await
            .unwrap();
        let time = Arc::new(ManualTimeSource::new(
            Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap(),
        ));
        let (tx, rx) = events::channel();
        let service =
            QuestService::new(Arc::new(db), QuestConfig::default(), time.clone(), tx).unwrap();
        (dir, service, rx, time)
    }

    fn labels(rx: &mut EffectReceiver) -> Vec<&'static str> {
        let mut out = Vec::new();
        while let Ok(effect) = rx.try_recv() {
            out.push(effect.label());
        }
        out
    }

    #[tokio::test]
    async fn test_first_tick_generates_and_posts() {
        let (_dir, service, mut rx, _time) = service_at(8).await;

        let report = run_tick(&service).await.unwrap();
        assert_eq!(report.daily_created, service.config().catalogue.pools.len());
        assert_eq!(report.weekly_created, 5);
        assert!(report.posted_daily);
        assert!(report.posted_weekly);
        // Before the reminder hour
        assert!(!report.reminded);

        assert_eq!(labels(&mut rx), vec!["daily_quests_posted", "weekly_quests_posted"]);
    }

    #[tokio::test]
    async fn test_repeated_ticks_are_idle() {
        let (_dir, service, mut rx, time) = service_at(8).await;
        run_tick(&service).await.unwrap();
        labels(&mut rx);

        time.advance(ChronoDuration::minutes(5));
        let report = run_tick(&service).await.unwrap();
        assert!(report.is_idle());
        assert!(labels(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_reminder_once_after_hour() {
        let (_dir, service, mut rx, time) = service_at(8).await;
        run_tick(&service).await.unwrap();
        labels(&mut rx);

        time.set(Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap());
        let report = run_tick(&service).await.unwrap();
        assert!(report.reminded);
        assert_eq!(labels(&mut rx), vec!["daily_reminder"]);

        time.advance(ChronoDuration::hours(1));
        assert!(!run_tick(&service).await.unwrap().reminded);
    }

    #[tokio::test]
    async fn test_empty_weekly_catalogue_is_not_announced() {
        let dir = tempfile::tempdir().unwrap();
        let db = QuestDb::open(DbLocation::Custom(dir.path().join("quest.db")))
            .await
            .unwrap();
        let time = Arc::new(ManualTimeSource::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
        ));
        let mut config = QuestConfig::default();
        config.catalogue.weekly.clear();
        let (tx, mut rx) = events::channel();
        let service = QuestService::new(Arc::new(db), config, time, tx).unwrap();

        let report = run_tick(&service).await.unwrap();
        assert!(report.posted_daily);
        assert!(!report.posted_weekly);
        assert_eq!(report.weekly_created, 0);
        assert_eq!(labels(&mut rx), vec!["daily_quests_posted"]);

        // Still nothing to announce on the next tick
        assert!(run_tick(&service).await.unwrap().is_idle());
        assert!(labels(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_new_day_posts_only_daily() {
        let (_dir, service, mut rx, time) = service_at(8).await;
        run_tick(&service).await.unwrap();
        labels(&mut rx);

        // Tuesday, same ISO week
        time.advance(ChronoDuration::days(1));
        let report = run_tick(&service).await.unwrap();
        assert!(report.posted_daily);
        assert!(!report.posted_weekly);
        assert_eq!(report.weekly_created, 0);
        assert_eq!(labels(&mut rx), vec!["daily_quests_posted"]);
    }
}
