//! Restart safety and side-effect isolation

use anyhow::bail;
use chrono::{TimeZone, Utc};
use quest_common::events::{self, EffectReceiver};
use quest_common::{DbLocation, ManualTimeSource, QuestConfig, QuestDb, QuestService, SideEffect};
use questd::dispatcher::{self, DispatchStats, EffectSink};
use questd::scheduler::run_tick;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

async fn open_service(path: &Path) -> (QuestService, EffectReceiver) {
    let db = QuestDb::open(DbLocation::Custom(path.to_path_buf()))
        .await
        .unwrap();
    let time = Arc::new(ManualTimeSource::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 19, 0, 0).unwrap(),
    ));
    let (tx, rx) = events::channel();
    let service = QuestService::new(Arc::new(db), QuestConfig::default(), time, tx).unwrap();
    (service, rx)
}

fn labels(rx: &mut EffectReceiver) -> Vec<&'static str> {
    let mut out = Vec::new();
    while let Ok(effect) = rx.try_recv() {
        out.push(effect.label());
    }
    out
}

#[tokio::test]
async fn restarted_daemon_does_not_repost() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quest.db");

    let first_today = {
        let (service, mut rx) = open_service(&path).await;
        let report = run_tick(&service).await.unwrap();
        assert!(report.posted_daily && report.posted_weekly && report.reminded);
        assert_eq!(
            labels(&mut rx),
            vec!["daily_quests_posted", "weekly_quests_posted", "daily_reminder"]
        );
        service.todays_quests().await.unwrap()
    };

    // Same instant after a restart
    let (service, mut rx) = open_service(&path).await;
    let report = run_tick(&service).await.unwrap();
    assert!(report.is_idle());
    assert!(labels(&mut rx).is_empty());

    // Selections survived unchanged
    assert_eq!(service.todays_quests().await.unwrap(), first_today);
}

struct BrokenBridge;

impl EffectSink for BrokenBridge {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn deliver(&self, _effect: &SideEffect) -> anyhow::Result<()> {
        bail!("bridge is down")
    }
}

#[tokio::test]
async fn failed_delivery_keeps_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let (service, rx) = open_service(&dir.path().join("quest.db")).await;
    run_tick(&service).await.unwrap();

    let grant = service.admin_grant_xp("u1", 400, None).await.unwrap();
    assert!(grant.rank_up());
    drop(service);

    let stats = dispatcher::run(BrokenBridge, rx, Duration::from_secs(1)).await;
    assert_eq!(stats.delivered, 0);
    // Three broadcasts plus the role sync
    assert_eq!(stats, DispatchStats { delivered: 0, failed: 4 });

    let (service, _rx) = open_service(&dir.path().join("quest.db")).await;
    let progress = service.get_progress("u1").await.unwrap();
    assert_eq!(progress.xp_total, 400);
    assert_eq!(progress.rank, 2);
}
