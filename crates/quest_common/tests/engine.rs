//! End-to-end engine behaviour through `QuestService`

use chrono::{Duration, TimeZone, Utc};
use quest_common::api::{ClaimStatus, LeaderboardCategory, LeaderboardQuery};
use quest_common::clock::week_key;
use quest_common::events::{self, EffectReceiver};
use quest_common::{
    ledger, rotation, DbLocation, ManualTimeSource, QuestConfig, QuestDb, QuestError,
    QuestService, SideEffect,
};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    service: QuestService,
    effects: EffectReceiver,
    time: Arc<ManualTimeSource>,
}

async fn harness_with(config: QuestConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = QuestDb::open(DbLocation::Custom(dir.path().join("quest.db")))
        .await
        .unwrap();
    // Monday 2026-03-02, 09:00 UTC
    let time = Arc::new(ManualTimeSource::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ));
    let (tx, effects) = events::channel();
    let service = QuestService::new(Arc::new(db), config, time.clone(), tx).unwrap();
    Harness {
        _dir: dir,
        service,
        effects,
        time,
    }
}

async fn harness() -> Harness {
    let mut config = QuestConfig::default();
    // initiate-1 pays 10 XP in these tests
    config.catalogue.pools[0].xp_reward = 10;
    harness_with(config).await
}

/// What the scheduler does at the start of a day
async fn post_quests(service: &QuestService) {
    let config = Arc::clone(service.config());
    let now = service.now();
    let today = service.clock().day(now);
    service
        .db()
        .transaction(move |tx| {
            rotation::generate_daily(tx, &config.catalogue, today, now)?;
            rotation::generate_weekly(tx, &config.catalogue, &week_key(today), now)?;
            Ok(())
        })
        .await
        .unwrap();
}

fn drain(effects: &mut EffectReceiver) -> Vec<SideEffect> {
    let mut out = Vec::new();
    while let Ok(effect) = effects.try_recv() {
        out.push(effect);
    }
    out
}

async fn assert_sum_invariant(service: &QuestService, user_id: &str) {
    let drift = service.db().execute(ledger::find_drift).await.unwrap();
    assert!(
        drift.iter().all(|(id, _, _)| id != user_id),
        "xp_total drifted from the event log: {:?}",
        drift
    );
    assert_eq!(service.health().await.unwrap().ledger_drift, 0);
}

#[tokio::test]
async fn first_claim_grants_xp_and_starts_streak() {
    let mut h = harness().await;
    post_quests(&h.service).await;

    let outcome = h.service.claim_quest("u1", "initiate-1").await.unwrap();
    assert_eq!(outcome.status, ClaimStatus::Granted);
    assert_eq!(outcome.streak, 1);
    assert_eq!(outcome.rank_name, "Initiate");
    assert!(!outcome.rank_up());

    let grant = outcome.grant.unwrap();
    assert_eq!(grant.new_total, 10);
    assert_eq!(grant.new_rank, 1);

    let progress = h.service.get_progress("u1").await.unwrap();
    assert_eq!(progress.xp_total, 10);
    assert_eq!(progress.streak, 1);
    assert_eq!(progress.claimed, vec!["initiate-1".to_string()]);

    // No rank change, no role sync
    assert!(drain(&mut h.effects).is_empty());
    assert_sum_invariant(&h.service, "u1").await;
}

#[tokio::test]
async fn crossing_a_threshold_ranks_up_and_syncs_roles() {
    let mut h = harness().await;
    post_quests(&h.service).await;

    h.service.admin_grant_xp("u1", 295, None).await.unwrap();
    assert!(drain(&mut h.effects).is_empty());

    let outcome = h.service.claim_quest("u1", "initiate-1").await.unwrap();
    let grant = outcome.grant.clone().unwrap();
    assert_eq!(grant.new_total, 305);
    assert_eq!(grant.new_rank, 2);
    assert_eq!(grant.new_tier, 1);
    assert!(outcome.rank_up());
    assert_eq!(outcome.rank_name, "Explorer");

    let effects = drain(&mut h.effects);
    assert_eq!(effects.len(), 1);
    match &effects[0] {
        SideEffect::RoleSync {
            user_id,
            rank,
            role,
            remove_roles,
        } => {
            assert_eq!(user_id, "u1");
            assert_eq!(*rank, 2);
            assert_eq!(role, "Explorer");
            assert!(remove_roles.contains(&"Initiate".to_string()));
            assert!(!remove_roles.contains(&"Explorer".to_string()));
        }
        other => panic!("unexpected effect {:?}", other),
    }
}

#[tokio::test]
async fn duplicate_claim_is_refused() {
    let h = harness().await;
    post_quests(&h.service).await;

    h.service.claim_quest("u1", "initiate-2").await.unwrap();
    let err = h.service.claim_quest("u1", "initiate-2").await.unwrap_err();
    assert!(matches!(err, QuestError::AlreadyClaimed { .. }));

    let progress = h.service.get_progress("u1").await.unwrap();
    assert_eq!(progress.xp_total, 15);
    assert_sum_invariant(&h.service, "u1").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_grant_once() {
    let h = harness().await;
    post_quests(&h.service).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.claim_quest("racer", "initiate-1").await
        }));
    }

    let mut granted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(QuestError::AlreadyClaimed { .. }) => refused += 1,
            Err(other) => panic!("unexpected error {}", other),
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(refused, 7);

    let progress = h.service.get_progress("racer").await.unwrap();
    assert_eq!(progress.xp_total, 10);
    assert_sum_invariant(&h.service, "racer").await;
}

#[tokio::test]
async fn eligibility_and_generation_errors() {
    let h = harness().await;

    // Nothing posted yet
    let err = h.service.claim_quest("u1", "initiate-1").await.unwrap_err();
    assert!(matches!(err, QuestError::NotYetGenerated { .. }));

    post_quests(&h.service).await;

    let err = h.service.claim_quest("u1", "explorer-1").await.unwrap_err();
    assert!(matches!(err, QuestError::NotEligible { rank: 1, .. }));

    let err = h.service.claim_quest("u1", "no-such-pool").await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));

    let err = h.service.claim_quest("", "initiate-1").await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));

    // Failed claims leave no XP behind
    assert_eq!(h.service.get_progress("u1").await.unwrap().xp_total, 0);
}

#[tokio::test]
async fn access_follows_the_whitelist_not_rank_order() {
    let h = harness().await;
    post_quests(&h.service).await;

    h.service.admin_grant_xp("u1", 350, None).await.unwrap();
    // Explorers keep initiate-2 but lose initiate-1
    assert!(h.service.claim_quest("u1", "initiate-2").await.is_ok());
    let err = h.service.claim_quest("u1", "initiate-1").await.unwrap_err();
    assert!(matches!(err, QuestError::NotEligible { rank: 2, .. }));
}

#[tokio::test]
async fn weekly_quest_once_per_week_for_own_rank() {
    let h = harness().await;
    post_quests(&h.service).await;

    let err = h.service.claim_weekly_quest("u1", Some(3)).await.unwrap_err();
    assert!(matches!(err, QuestError::NotEligible { rank: 1, .. }));

    let outcome = h.service.claim_weekly_quest("u1", None).await.unwrap();
    assert_eq!(outcome.quest_key, "weekly-1");
    assert_eq!(outcome.period_key, "2026-W10");
    assert_eq!(outcome.xp_reward, 50);

    // Later the same week
    h.time.advance(Duration::days(3));
    post_quests(&h.service).await;
    let err = h.service.claim_weekly_quest("u1", Some(1)).await.unwrap_err();
    assert!(matches!(err, QuestError::AlreadyClaimed { .. }));

    // Next Monday is a new week
    h.time.advance(Duration::days(4));
    post_quests(&h.service).await;
    let outcome = h.service.claim_weekly_quest("u1", Some(1)).await.unwrap();
    assert_eq!(outcome.period_key, "2026-W11");

    let err = h.service.claim_weekly_quest("u1", Some(9)).await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
}

#[tokio::test]
async fn weekly_keys_are_not_daily_quests() {
    let h = harness().await;
    post_quests(&h.service).await;
    let err = h.service.claim_quest("u1", "weekly-1").await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
}

#[tokio::test]
async fn streak_follows_consecutive_days() {
    let h = harness().await;

    post_quests(&h.service).await;
    assert_eq!(h.service.claim_quest("u1", "initiate-1").await.unwrap().streak, 1);
    // Second quest the same day leaves the streak alone
    assert_eq!(h.service.claim_quest("u1", "initiate-2").await.unwrap().streak, 1);

    h.time.advance(Duration::days(1));
    post_quests(&h.service).await;
    assert_eq!(h.service.claim_quest("u1", "initiate-1").await.unwrap().streak, 2);

    // Skip a day
    h.time.advance(Duration::days(2));
    post_quests(&h.service).await;
    assert_eq!(h.service.claim_quest("u1", "initiate-1").await.unwrap().streak, 1);
}

#[tokio::test]
async fn admin_grant_validates_amount() {
    let h = harness().await;
    let err = h.service.admin_grant_xp("u1", 0, None).await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
    let err = h.service.admin_grant_xp("u1", -20, None).await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));

    let exists = h
        .service
        .db()
        .execute(|conn| Ok(ledger::load(conn, "u1")?.is_some()))
        .await
        .unwrap();
    assert!(!exists, "rejected grant must not create the member");
}

#[tokio::test]
async fn admin_reset_keeps_the_log_consistent() {
    let mut h = harness().await;
    post_quests(&h.service).await;

    h.service.admin_grant_xp("u1", 900, Some("event host".into())).await.unwrap();
    h.service.claim_weekly_quest("u1", None).await.unwrap();
    drain(&mut h.effects);

    let outcome = h.service.admin_reset_user("u1").await.unwrap();
    assert_eq!(outcome.previous_xp, 1050);
    assert_eq!(outcome.previous_rank, 3);

    let progress = h.service.get_progress("u1").await.unwrap();
    assert_eq!(progress.xp_total, 0);
    assert_eq!(progress.rank, 1);
    assert_eq!(progress.streak, 0);
    assert_sum_invariant(&h.service, "u1").await;

    let effects = drain(&mut h.effects);
    assert!(matches!(
        effects.as_slice(),
        [SideEffect::RoleSync { rank: 1, .. }]
    ));

    let err = h.service.admin_reset_user("ghost").await.unwrap_err();
    assert!(matches!(err, QuestError::NotFound(_)));
}

#[tokio::test]
async fn moderated_claims_grant_on_approval() {
    let mut config = QuestConfig::default();
    config.claims.require_approval = true;
    let mut h = harness_with(config).await;
    post_quests(&h.service).await;

    let outcome = h.service.claim_quest("u1", "initiate-2").await.unwrap();
    assert_eq!(outcome.status, ClaimStatus::Pending);
    assert!(outcome.grant.is_none());
    let pending_id = outcome.pending_id.unwrap();
    assert_eq!(h.service.get_progress("u1").await.unwrap().xp_total, 0);

    // Resubmitting while pending is still a duplicate
    let err = h.service.claim_quest("u1", "initiate-2").await.unwrap_err();
    assert!(matches!(err, QuestError::AlreadyClaimed { .. }));

    let pending = h.service.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, pending_id);

    let review = h.service.approve_claim(pending_id).await.unwrap();
    assert_eq!(review.grant.unwrap().new_total, 15);
    assert!(h.service.list_pending().await.unwrap().is_empty());
    assert_sum_invariant(&h.service, "u1").await;

    let labels: Vec<&str> = drain(&mut h.effects).iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["claim_submitted", "claim_approved"]);

    // A decision is final
    let err = h.service.approve_claim(pending_id).await.unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
}

#[tokio::test]
async fn rejected_claims_grant_nothing() {
    let mut config = QuestConfig::default();
    config.claims.require_approval = true;
    let h = harness_with(config).await;
    post_quests(&h.service).await;

    let outcome = h.service.claim_quest("u1", "initiate-1").await.unwrap();
    let review = h.service.reject_claim(outcome.pending_id.unwrap()).await.unwrap();
    assert!(review.grant.is_none());
    assert_eq!(h.service.get_progress("u1").await.unwrap().xp_total, 0);

    let err = h.service.claim_quest("u1", "initiate-1").await.unwrap_err();
    assert!(matches!(err, QuestError::AlreadyClaimed { .. }));
    let err = h.service.approve_claim(4242).await.unwrap_err();
    assert!(matches!(err, QuestError::NotFound(_)));
}

#[tokio::test]
async fn weekly_board_lists_idle_members_with_zero() {
    let h = harness().await;
    post_quests(&h.service).await;

    h.service.claim_quest("old", "initiate-1").await.unwrap();
    h.time.advance(Duration::days(10));
    post_quests(&h.service).await;
    h.service.claim_quest("fresh", "initiate-2").await.unwrap();

    let view = h
        .service
        .get_leaderboard(LeaderboardQuery {
            category: LeaderboardCategory::Weekly,
            user_id: Some("old".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(view.rank, Some(1));
    assert_eq!(view.window_days, Some(7));

    let rows: Vec<(&str, i64)> = view
        .board
        .entries
        .iter()
        .map(|e| (e.user_id.as_str(), e.xp))
        .collect();
    assert_eq!(rows, vec![("fresh", 15), ("old", 0)]);
    assert_eq!(view.board.caller.unwrap().position, 2);

    let global = h.service.get_leaderboard(LeaderboardQuery::default()).await.unwrap();
    assert_eq!(global.board.entries[0].user_id, "fresh");
    assert_eq!(global.window_days, None);

    let err = h
        .service
        .get_leaderboard(LeaderboardQuery {
            category: LeaderboardCategory::Rank,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, QuestError::Validation(_)));
}

#[tokio::test]
async fn progress_of_unknown_member_is_read_only() {
    let h = harness().await;
    let progress = h.service.get_progress("nobody").await.unwrap();
    assert_eq!(progress.rank, 1);
    assert_eq!(progress.rank_name, "Initiate");
    assert_eq!(progress.xp_to_next_rank, Some(300));
    assert_eq!(
        progress.eligible_pools,
        vec!["initiate-1".to_string(), "initiate-2".to_string()]
    );

    let board = h.service.get_leaderboard(LeaderboardQuery::default()).await.unwrap();
    assert_eq!(board.board.total, 0);
}

#[tokio::test]
async fn todays_quests_lists_posted_selections() {
    let h = harness().await;
    let before = h.service.todays_quests().await.unwrap();
    assert!(before.daily.is_empty());

    post_quests(&h.service).await;
    let today = h.service.todays_quests().await.unwrap();
    assert_eq!(today.day_key, "2026-03-02");
    assert_eq!(today.week_key, "2026-W10");
    assert_eq!(today.daily.len(), h.service.config().catalogue.pools.len());
    assert_eq!(today.weekly.len(), 5);
}

#[tokio::test]
async fn event_log_matches_totals_after_mixed_history() {
    let h = harness().await;
    for day in 0..5 {
        post_quests(&h.service).await;
        h.service.claim_quest("u1", "initiate-1").await.ok();
        h.service.claim_quest("u1", "initiate-2").await.ok();
        if day == 2 {
            h.service.admin_grant_xp("u1", 120, None).await.unwrap();
        }
        h.time.advance(Duration::days(1));
    }
    h.service.admin_reset_user("u1").await.unwrap();
    post_quests(&h.service).await;
    h.service.claim_quest("u1", "initiate-1").await.unwrap();

    assert_sum_invariant(&h.service, "u1").await;
    let progress = h.service.get_progress("u1").await.unwrap();
    assert_eq!(progress.xp_total, 10);
    assert_eq!(progress.streak, 1);
}

#[tokio::test]
async fn health_flags_ledger_drift() {
    let h = harness().await;
    h.service.admin_grant_xp("u1", 40, None).await.unwrap();
    assert_eq!(h.service.health().await.unwrap().status, "ok");

    h.service
        .db()
        .execute(|conn| {
            conn.execute("UPDATE user_progress SET xp_total = 41 WHERE user_id = 'u1'", [])?;
            Ok(())
        })
        .await
        .unwrap();

    let health = h.service.health().await.unwrap();
    assert_eq!(health.status, "degraded");
    assert_eq!(health.ledger_drift, 1);
}

#[tokio::test]
async fn weekly_board_counts_xp_earned_after_reset() {
    let h = harness().await;
    h.service.admin_grant_xp("u1", 90, None).await.unwrap();
    h.time.advance(Duration::days(18));
    h.service.admin_reset_user("u1").await.unwrap();
    h.time.advance(Duration::days(1));
    h.service.admin_grant_xp("u1", 30, None).await.unwrap();
    h.time.advance(Duration::days(1));

    let view = h
        .service
        .get_leaderboard(LeaderboardQuery {
            category: LeaderboardCategory::Weekly,
            user_id: Some("u1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(view.board.entries[0].user_id, "u1");
    assert_eq!(view.board.entries[0].xp, 30);
    assert_sum_invariant(&h.service, "u1").await;
}
