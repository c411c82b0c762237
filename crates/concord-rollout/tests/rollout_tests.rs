//! Rollout controller integration tests
//!
//! Covers cohort stability across stages, the kill switch, persistence
//! across restarts and audit history integrity.

use concord_core::{Cohort, Error};
use concord_rollout::{
    assign_cohort, bucket, CohortCache, FileRolloutStore, MemoryRolloutStore, RolloutController,
    RolloutState, RolloutStore, Stage, TransitionKind, STAGE_PERCENTAGES,
};
use concord_telemetry::MetricsCollector;
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #[test]
    fn cohort_is_deterministic(caller in "[a-zA-Z0-9_-]{1,40}", pct in 0u8..=100) {
        prop_assert_eq!(assign_cohort(&caller, pct), assign_cohort(&caller, pct));
    }

    #[test]
    fn promotion_is_monotone(caller in "[a-zA-Z0-9_-]{1,40}", a in 0u8..=100, b in 0u8..=100) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if assign_cohort(&caller, low) == Cohort::New {
            prop_assert_eq!(assign_cohort(&caller, high), Cohort::New);
        }
    }

    #[test]
    fn bucket_in_range(caller in ".*") {
        prop_assert!(bucket(&caller) < 100);
    }
}

#[test]
fn test_stage_shares_are_roughly_respected() {
    let callers: Vec<String> = (0..10_000).map(|i| format!("user-{}", i)).collect();

    for pct in STAGE_PERCENTAGES {
        let new = callers
            .iter()
            .filter(|c| assign_cohort(c, pct) == Cohort::New)
            .count();
        let observed = new as f64 * 100.0 / callers.len() as f64;
        assert!(
            (observed - pct as f64).abs() < 2.0,
            "stage {}%: observed {:.2}%",
            pct,
            observed
        );
    }
}

#[tokio::test]
async fn test_kill_switch_from_full_rollout() {
    let controller = RolloutController::in_memory().await.unwrap();
    controller.set_stage("alice", 4, None).await.unwrap();
    assert_eq!(controller.assign("user-1"), Cohort::New);

    let t = controller
        .rollback("oncall", 0, Some("kill switch".into()))
        .await
        .unwrap();

    assert!(t.changed);
    assert_eq!(t.previous_stage, Stage::MAX);
    assert_eq!(t.state.stage, Stage::OFF);
    assert_eq!(t.state.rollout_percentage, 0);
    for i in 0..200 {
        assert_eq!(controller.assign(&format!("user-{}", i)), Cohort::Legacy);
    }
}

#[tokio::test]
async fn test_rollback_is_idempotent() {
    let controller = RolloutController::in_memory().await.unwrap();
    controller.set_stage("alice", 3, None).await.unwrap();

    let first = controller.rollback("bob", 1, None).await.unwrap();
    let second = controller.rollback("bob", 1, None).await.unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(first.state.version, second.state.version);
    assert_eq!(controller.history(10).await.len(), 2);
}

#[tokio::test]
async fn test_new_callers_stay_new_while_advancing() {
    let controller = RolloutController::in_memory().await.unwrap();
    let callers: Vec<String> = (0..500).map(|i| format!("caller-{}", i)).collect();
    let mut promoted: Vec<&String> = Vec::new();

    while controller.state().stage < Stage::MAX {
        controller.advance("alice", None).await.unwrap();
        for caller in &promoted {
            assert_eq!(controller.assign(caller), Cohort::New);
        }
        promoted = callers
            .iter()
            .filter(|c| controller.assign(c) == Cohort::New)
            .collect();
    }
    assert_eq!(promoted.len(), callers.len());
}

#[tokio::test]
async fn test_cache_follows_stage_changes() {
    let controller = RolloutController::in_memory().await.unwrap();
    let caller = (0..1000)
        .map(|i| format!("user-{}", i))
        .find(|c| bucket(c) >= 5 && bucket(c) < 25)
        .unwrap();

    controller.advance("alice", None).await.unwrap();
    assert_eq!(controller.assign(&caller), Cohort::Legacy);

    controller.advance("alice", None).await.unwrap();
    assert_eq!(controller.assign(&caller), Cohort::New);

    controller.rollback("alice", 1, None).await.unwrap();
    assert_eq!(controller.assign(&caller), Cohort::Legacy);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(FileRolloutStore::open(dir.path()).await.unwrap());
        let controller =
            RolloutController::load(store, CohortCache::new(64), MetricsCollector::new())
                .await
                .unwrap();
        controller.advance("alice", None).await.unwrap();
        controller
            .set_stage("bob", 3, Some("metrics look good".into()))
            .await
            .unwrap();
    }

    let store = Arc::new(FileRolloutStore::open(dir.path()).await.unwrap());
    let controller = RolloutController::load(store, CohortCache::new(64), MetricsCollector::new())
        .await
        .unwrap();

    let state = controller.state();
    assert_eq!(state.stage, Stage::new(3).unwrap());
    assert_eq!(state.rollout_percentage, 50);
    assert_eq!(state.version, 2);
    assert_eq!(state.updated_by, "bob");
    assert!(controller.verify_history().await);

    let history = controller.history(10).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, TransitionKind::SetStage);
    assert_eq!(history[1].kind, TransitionKind::Advance);
}

fn history_lines(dir: &std::path::Path) -> usize {
    std::fs::read_to_string(dir.join("history.jsonl"))
        .map(|content| content.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_failed_state_replace_leaves_history_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileRolloutStore::open(dir.path()).await.unwrap());
    let controller = RolloutController::load(store, CohortCache::new(64), MetricsCollector::new())
        .await
        .unwrap();
    controller.advance("alice", None).await.unwrap();
    assert_eq!(history_lines(dir.path()), 1);

    // A non-empty directory in place of state.json makes the rename fail
    let state_path = dir.path().join("state.json");
    std::fs::remove_file(&state_path).unwrap();
    std::fs::create_dir(&state_path).unwrap();
    std::fs::write(state_path.join("blocker"), b"x").unwrap();

    let err = controller.advance("bob", None).await.unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    assert_eq!(history_lines(dir.path()), 1);
    assert_eq!(controller.state().version, 1);
    assert!(!dir.path().join("state.json.tmp").exists());

    std::fs::remove_dir_all(&state_path).unwrap();
    controller.advance("carol", None).await.unwrap();
    assert_eq!(history_lines(dir.path()), 2);

    let store = Arc::new(FileRolloutStore::open(dir.path()).await.unwrap());
    let reloaded = RolloutController::load(store, CohortCache::new(64), MetricsCollector::new())
        .await
        .unwrap();
    let state = reloaded.state();
    assert_eq!(state.stage, Stage::new(2).unwrap());
    assert_eq!(state.version, 2);
    assert_eq!(state.updated_by, "carol");
    assert!(reloaded.verify_history().await);
    assert_eq!(reloaded.history(10).await.len(), 2);
}

#[tokio::test]
async fn test_state_restored_from_history_when_behind() {
    let store = Arc::new(MemoryRolloutStore::new());
    let controller = RolloutController::load(
        store.clone(),
        CohortCache::default(),
        MetricsCollector::new(),
    )
    .await
    .unwrap();
    controller.advance("alice", None).await.unwrap();
    controller.advance("alice", None).await.unwrap();

    // Full history, but the state write of the last commit was lost
    let fresh = Arc::new(MemoryRolloutStore::new());
    let history = store.load_history().await.unwrap();
    let stale = RolloutState::initial().moved_to(Stage::new(1).unwrap(), "alice", None);
    for event in &history {
        fresh.commit(&stale, event).await.unwrap();
    }

    let reloaded =
        RolloutController::load(fresh, CohortCache::default(), MetricsCollector::new())
            .await
            .unwrap();
    assert_eq!(reloaded.state().stage, Stage::new(2).unwrap());
    assert_eq!(reloaded.state().version, 2);
}

#[tokio::test]
async fn test_tampered_history_is_rejected_on_load() {
    let store = Arc::new(MemoryRolloutStore::new());
    let controller = RolloutController::load(
        store.clone(),
        CohortCache::default(),
        MetricsCollector::new(),
    )
    .await
    .unwrap();
    controller.advance("alice", None).await.unwrap();
    controller.advance("alice", None).await.unwrap();

    let mut history = store.load_history().await.unwrap();
    history[0].actor = "mallory".to_string();

    let tampered = Arc::new(MemoryRolloutStore::new());
    let state = store.load_state().await.unwrap().unwrap();
    for event in &history {
        tampered.commit(&state, event).await.unwrap();
    }

    let result =
        RolloutController::load(tampered, CohortCache::default(), MetricsCollector::new()).await;
    assert!(matches!(result, Err(Error::Persistence(_))));
}

#[tokio::test]
async fn test_assignment_metrics_track_current_stage() {
    let controller = RolloutController::in_memory().await.unwrap();
    controller.set_stage("alice", 4, None).await.unwrap();
    for i in 0..10 {
        controller.assign(&format!("user-{}", i));
    }

    controller.rollback("alice", 0, None).await.unwrap();
    for i in 0..4 {
        controller.assign(&format!("user-{}", i));
    }

    let metrics = controller.metrics();
    assert_eq!(metrics.new.assignments, 10);
    assert_eq!(metrics.legacy.assignments, 4);
    assert_eq!(metrics.current_stage.stage_version, 2);
    assert_eq!(metrics.current_stage.legacy, 4);
    assert_eq!(metrics.current_stage.new_percentage(), 0.0);
}

#[tokio::test]
async fn test_concurrent_advances_are_serialized() {
    let controller = Arc::new(RolloutController::in_memory().await.unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller.advance(&format!("op-{}", i), None).await
        }));
    }

    let mut ok = 0;
    let mut at_max = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(Error::AlreadyAtMaxStage(4)) => at_max += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(ok, 4);
    assert_eq!(at_max, 4);
    assert_eq!(controller.state().version, 4);
    assert!(controller.verify_history().await);
}
