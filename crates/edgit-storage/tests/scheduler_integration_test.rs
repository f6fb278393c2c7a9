//! Integration tests for the migration scheduler
//!
//! Tests cover:
//! 1. Candidate selection from tracked and untracked objects
//! 2. Exponential backoff, automatic pause and resume
//! 3. Catch-up scheduling when a cycle fills its batch
//! 4. Durable scheduler state and audit trail in a SQLite control plane

use chrono::{DateTime, Utc};
use edgit_core::{MigrationPolicy, ObjectId, ObjectType, StoredObject, Tier};
use edgit_storage::tiering_manager::{
    AccessKind, AccessPattern, AccessTracker, HistoryState, MigratorBackend,
    TierMigrationScheduler, TierMigrator,
};
use edgit_storage::{
    AccessPatternStore, ControlPlaneStore, MemoryControlPlane, MemoryTierStorage,
    SqliteControlPlane,
};
use std::sync::Arc;
use std::time::Duration;

fn sha(n: usize) -> ObjectId {
    ObjectId::parse(&format!("{n:040x}")).expect("valid sha")
}

fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(hours)
}

/// Helper: scheduler over in-memory tiers with the given control plane
async fn scheduler_with(
    storage: Arc<MemoryTierStorage>,
    control: Arc<MemoryControlPlane>,
    policy: MigrationPolicy,
) -> TierMigrationScheduler {
    let tracker = Arc::new(AccessTracker::new(storage.clone(), control.clone()));
    tracker.load_from_storage().await.unwrap();
    let migrator = Arc::new(TierMigrator::new(storage.clone()));
    let backend = Arc::new(MigratorBackend::new(storage, migrator, tracker));
    TierMigrationScheduler::new(backend, control, policy).unwrap()
}

/// Immediate hot eligibility; freshly demoted objects stay warm
fn hot_only_policy() -> MigrationPolicy {
    MigrationPolicy {
        warm_to_cold_age_ms: 7 * 24 * 3_600_000,
        ..MigrationPolicy::for_testing()
    }
}

fn pattern(n: usize, access_count: u64, last_accessed_at: DateTime<Utc>) -> AccessPattern {
    AccessPattern {
        sha: sha(n),
        read_count: access_count,
        write_count: 0,
        last_accessed_at,
        created_at: hours_ago(48),
        total_bytes_read: 0,
        total_latency_ms: 0,
        access_count,
    }
}

fn seed_blob(storage: &MemoryTierStorage, tier: Tier, n: usize, stored_at: DateTime<Utc>) {
    storage.seed_at(
        tier,
        StoredObject::new(sha(n), ObjectType::Blob, vec![7u8; 16]),
        stored_at,
    );
}

/// `at` falls within `[now + expected, now + expected + slack]`
fn assert_due_in(at: DateTime<Utc>, before: DateTime<Utc>, expected: Duration) {
    let delay = (at - before).to_std().unwrap_or_default();
    assert!(delay >= expected, "alarm {delay:?} earlier than {expected:?}");
    assert!(
        delay <= expected + Duration::from_secs(2),
        "alarm {delay:?} later than {expected:?}"
    );
}

#[tokio::test]
async fn test_candidate_selection_uses_tracked_access() {
    // Setup: four objects stored 30h ago, three of them with history
    let storage = MemoryTierStorage::shared();
    let control = Arc::new(MemoryControlPlane::new());
    for n in 0..4 {
        seed_blob(&storage, Tier::Hot, n, hours_ago(30));
    }
    // Idle and rarely used
    control.save_pattern(&pattern(0, 2, hours_ago(25))).await.unwrap();
    // Recently used
    control.save_pattern(&pattern(1, 2, hours_ago(1))).await.unwrap();
    // Idle but popular
    control.save_pattern(&pattern(2, 6, hours_ago(25))).await.unwrap();
    // sha(3) has never been accessed

    let scheduler = scheduler_with(storage.clone(), control.clone(), MigrationPolicy::default()).await;
    let result = scheduler.run_migration_cycle().await.unwrap();

    assert_eq!(result.hot_to_warm, 2);
    assert!(storage.contains(Tier::Warm, &sha(0)));
    assert!(storage.contains(Tier::Hot, &sha(1)));
    assert!(storage.contains(Tier::Hot, &sha(2)));
    assert!(storage.contains(Tier::Warm, &sha(3)));

    // Over capacity every hot object goes
    scheduler
        .update_policy(MigrationPolicy {
            max_hot_tier_bytes: 1,
            ..MigrationPolicy::default()
        })
        .await
        .unwrap();
    let result = scheduler.run_migration_cycle().await.unwrap();

    assert_eq!(result.hot_to_warm, 2);
    assert_eq!(storage.object_count(Tier::Hot), 0);
    assert_eq!(storage.object_count(Tier::Warm), 4);
}

#[tokio::test]
async fn test_backoff_then_pause_then_resume() {
    let storage = MemoryTierStorage::shared();
    let control = Arc::new(MemoryControlPlane::new());
    seed_blob(&storage, Tier::Hot, 0, hours_ago(1));
    let scheduler = scheduler_with(storage.clone(), control.clone(), hot_only_policy()).await;
    scheduler.initialize().await.unwrap();

    storage.fail_listings(Tier::Hot, 3, "listing unavailable");

    // Failure 1: retry after the base delay
    let before = Utc::now();
    assert!(scheduler.run_migration_cycle().await.is_err());
    let state = scheduler.get_state();
    assert_eq!(state.consecutive_failures, 1);
    assert!(!state.paused);
    assert_due_in(
        scheduler.next_alarm().await.unwrap().unwrap(),
        before,
        Duration::from_secs(1),
    );

    // Failure 2: delay doubles
    let before = Utc::now();
    assert!(scheduler.run_migration_cycle().await.is_err());
    assert_eq!(scheduler.get_state().consecutive_failures, 2);
    assert_due_in(
        scheduler.next_alarm().await.unwrap().unwrap(),
        before,
        Duration::from_secs(2),
    );

    // Failure 3 reaches the limit: paused with no alarm
    assert!(scheduler.run_migration_cycle().await.is_err());
    let state = scheduler.get_state();
    assert!(state.paused);
    assert!(state.pause_reason.is_some());
    assert_eq!(scheduler.next_alarm().await.unwrap(), None);
    assert_eq!(control.load_state().await.unwrap().unwrap(), state);

    // Paused: scheduling refused, cycles are no-ops
    assert!(!scheduler
        .schedule_background_migration(None, true)
        .await
        .unwrap());
    let idle = scheduler.run_migration_cycle().await.unwrap();
    assert_eq!(idle.migrated, 0);
    assert!(storage.contains(Tier::Hot, &sha(0)));

    // Resume clears the failure streak and fires right away
    let before = Utc::now();
    scheduler.resume_migration().await.unwrap();
    let state = scheduler.get_state();
    assert!(!state.paused);
    assert_eq!(state.pause_reason, None);
    assert_eq!(state.consecutive_failures, 0);
    assert_due_in(
        scheduler.next_alarm().await.unwrap().unwrap(),
        before,
        Duration::ZERO,
    );

    let result = scheduler.run_migration_cycle().await.unwrap();
    assert_eq!(result.migrated, 1);
    assert!(storage.contains(Tier::Warm, &sha(0)));
}

#[tokio::test]
async fn test_full_batch_schedules_catch_up() {
    let storage = MemoryTierStorage::shared();
    let control = Arc::new(MemoryControlPlane::new());
    for n in 0..60 {
        seed_blob(&storage, Tier::Hot, n, hours_ago(2));
    }
    let policy = MigrationPolicy {
        migration_interval_ms: 3_600_000,
        ..hot_only_policy()
    };
    let scheduler = scheduler_with(storage.clone(), control.clone(), policy).await;

    let before = Utc::now();
    let result = scheduler.run_migration_cycle().await.unwrap();

    assert_eq!(result.migrated, 50);
    assert_eq!(result.hot_to_warm, 50);
    assert_eq!(result.warm_to_cold, 0);
    assert_eq!(result.bytes_migrated, 50 * 16);
    assert!(result.more_to_migrate);
    assert_eq!(storage.object_count(Tier::Hot), 10);
    assert_eq!(storage.object_count(Tier::Warm), 50);

    // min(interval / 4, 15 minutes)
    assert_due_in(
        scheduler.next_alarm().await.unwrap().unwrap(),
        before,
        Duration::from_secs(15 * 60),
    );

    let state = scheduler.get_state();
    assert_eq!(state.total_migrated, 50);
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.last_migration_at.is_some());
    assert_eq!(control.history_len(), 50);

    // The remainder fits, so the normal interval resumes
    let before = Utc::now();
    let result = scheduler.run_migration_cycle().await.unwrap();
    assert_eq!(result.migrated, 10);
    assert!(!result.more_to_migrate);
    assert_due_in(
        scheduler.next_alarm().await.unwrap().unwrap(),
        before,
        Duration::from_secs(3600),
    );
}

#[tokio::test]
async fn test_sqlite_control_plane_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("control.db").display());
    let storage = MemoryTierStorage::shared();
    for n in 0..3 {
        seed_blob(&storage, Tier::Hot, n, hours_ago(2));
    }
    let policy = hot_only_policy();

    {
        let control = Arc::new(SqliteControlPlane::connect(&url).await.unwrap());
        let tracker = Arc::new(AccessTracker::new(storage.clone(), control.clone()));
        let migrator = Arc::new(TierMigrator::new(storage.clone()));
        let backend = Arc::new(MigratorBackend::new(
            storage.clone(),
            migrator,
            Arc::clone(&tracker),
        ));
        let scheduler = TierMigrationScheduler::new(backend, control.clone(), policy.clone()).unwrap();
        scheduler.initialize().await.unwrap();

        // Five accesses keep sha(2) hot
        for _ in 0..5 {
            scheduler.record_access(&sha(2), AccessKind::Read).await.unwrap();
        }
        let result = scheduler.run_migration_cycle().await.unwrap();
        assert_eq!(result.migrated, 2);

        scheduler.pause_migration("maintenance window").await.unwrap();
    }

    // Reopen the same file
    let control = Arc::new(SqliteControlPlane::connect(&url).await.unwrap());

    let state = control.load_state().await.unwrap().unwrap();
    assert!(state.paused);
    assert_eq!(state.pause_reason.as_deref(), Some("maintenance window"));
    assert_eq!(state.total_migrated, 2);
    assert_eq!(state.total_bytes_migrated, 32);
    assert_eq!(control.get_alarm().await.unwrap(), None);
    assert_eq!(control.load_policy().await.unwrap(), Some(policy.clone()));

    let history = control.list_history(10, 0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.state == HistoryState::Completed));
    assert!(history.iter().all(|h| h.target_tier == Tier::Warm));

    let tracker = AccessTracker::new(storage.clone(), control.clone());
    assert_eq!(tracker.load_from_storage().await.unwrap(), 1);
    assert_eq!(tracker.get_access_pattern(&sha(2)).await.read_count, 5);

    // A restarted scheduler stays paused
    let migrator = Arc::new(TierMigrator::new(storage.clone()));
    let backend = Arc::new(MigratorBackend::new(storage.clone(), migrator, Arc::new(tracker)));
    let scheduler = TierMigrationScheduler::new(backend, control.clone(), policy).unwrap();
    scheduler.initialize().await.unwrap();
    assert!(scheduler.get_state().paused);
    assert_eq!(scheduler.next_alarm().await.unwrap(), None);
}
