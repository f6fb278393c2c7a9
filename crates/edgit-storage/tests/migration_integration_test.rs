//! Integration tests for single-object and job-based migration
//!
//! Tests cover:
//! 1. Concurrent migrations of the same object (in-process and across migrators)
//! 2. Rollback when the target write fails
//! 3. Checksum verification and corrupted target writes
//! 4. Access counter decay
//! 5. End-to-end verified hot → warm migration
//! 6. Writes queued behind an open migration job, including while it starts
//! 7. Job completion racing rollback

use edgit_core::{ObjectId, ObjectType, StoredObject, Tier};
use edgit_storage::tiering_manager::{
    AccessKind, AccessTracker, DecayOptions, HistoryState, JobState, MigrationErrorKind,
    MigrationOptions, MigrationOutcome, SkipReason, TierMigrator,
};
use edgit_storage::{MemoryStorageConfig, MemoryTierStorage};
use std::sync::Arc;
use std::time::Duration;

fn sha(c: char) -> ObjectId {
    ObjectId::parse(&c.to_string().repeat(40)).expect("valid sha")
}

/// Helper: storage with one object in the hot tier
fn storage_with(c: char, data: &[u8]) -> Arc<MemoryTierStorage> {
    let storage = MemoryTierStorage::shared();
    storage.seed(
        Tier::Hot,
        StoredObject::new(sha(c), ObjectType::Blob, data.to_vec()),
    );
    storage
}

/// Helper: like `storage_with`, but every storage call takes 20ms
fn slow_storage_with(c: char, data: &[u8]) -> Arc<MemoryTierStorage> {
    let storage = Arc::new(MemoryTierStorage::new_with_config(MemoryStorageConfig {
        latency: Duration::from_millis(20),
    }));
    storage.seed(
        Tier::Hot,
        StoredObject::new(sha(c), ObjectType::Blob, data.to_vec()),
    );
    storage
}

#[tokio::test]
async fn test_concurrent_migrations_of_same_object() {
    // Setup: latency so both calls are in flight together
    let storage = Arc::new(MemoryTierStorage::new_with_config(MemoryStorageConfig {
        latency: Duration::from_millis(5),
    }));
    storage.seed(
        Tier::Hot,
        StoredObject::new(sha('a'), ObjectType::Blob, "payload"),
    );
    let migrator = TierMigrator::new(storage.clone());

    let id = sha('a');
    let (first, second) = tokio::join!(
        migrator.migrate(&id, Tier::Hot, Tier::Warm, MigrationOptions::default()),
        migrator.migrate(&id, Tier::Hot, Tier::Warm, MigrationOptions::default()),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    // Verify: exactly one migrated, one skipped, one location write
    assert_eq!(outcomes.iter().filter(|o| o.is_migrated()).count(), 1);
    assert!(outcomes.contains(&MigrationOutcome::Skipped(SkipReason::InFlight)));
    assert_eq!(storage.location_updates(), 1);
    assert_eq!(storage.peek_location(&sha('a')).unwrap().tier, Tier::Warm);
}

#[tokio::test]
async fn test_storage_lock_serializes_separate_migrators() {
    let storage = Arc::new(MemoryTierStorage::new_with_config(MemoryStorageConfig {
        latency: Duration::from_millis(5),
    }));
    storage.seed(
        Tier::Hot,
        StoredObject::new(sha('a'), ObjectType::Blob, "payload"),
    );
    // Two processes sharing one lock backend
    let left = TierMigrator::new(storage.clone());
    let right = TierMigrator::new(storage.clone());

    let id = sha('a');
    let (first, second) = tokio::join!(
        left.migrate(&id, Tier::Hot, Tier::Warm, MigrationOptions::default()),
        right.migrate(&id, Tier::Hot, Tier::Warm, MigrationOptions::default()),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_migrated()).count(), 1);
    assert!(outcomes.contains(&MigrationOutcome::Skipped(SkipReason::AlreadyMigrated)));
    assert_eq!(storage.location_updates(), 1);
    assert!(!storage.is_locked(&sha('a')));
}

#[tokio::test]
async fn test_failed_target_write_preserves_source() {
    let storage = storage_with('a', b"original bytes");
    storage.fail_next_put(Tier::Warm, "disk full");
    let migrator = TierMigrator::new(storage.clone());

    let error = migrator
        .migrate(&sha('a'), Tier::Hot, Tier::Warm, MigrationOptions::default())
        .await
        .expect_err("write failure must surface");

    assert_eq!(error.kind, MigrationErrorKind::WriteFailed);
    assert!(error.rolled_back);
    assert!(error.rollback_reason.is_some());
    assert_eq!(
        &storage.peek(Tier::Hot, &sha('a')).unwrap().data[..],
        b"original bytes"
    );
    assert!(!storage.contains(Tier::Warm, &sha('a')));
    assert_eq!(storage.peek_location(&sha('a')).unwrap().tier, Tier::Hot);
    assert!(!storage.is_locked(&sha('a')));
    assert_eq!(migrator.history()[0].state, HistoryState::RolledBack);
}

#[tokio::test]
async fn test_checksum_verification() {
    let payloads: [&[u8]; 4] = [b"", b"x", b"tree 40\0abc", &[0xFFu8; 4096]];

    for (i, payload) in payloads.iter().enumerate() {
        let c = char::from(b'a' + i as u8);
        let storage = storage_with(c, payload);
        let migrator = TierMigrator::new(storage.clone());

        let outcome = migrator
            .migrate(&sha(c), Tier::Hot, Tier::Warm, MigrationOptions::verified())
            .await
            .expect("intact copy verifies");
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                checksum_verified: true,
                bytes: payload.len() as u64,
            }
        );
    }
}

#[tokio::test]
async fn test_corrupted_target_write_is_rejected() {
    let storage = storage_with('a', b"important commit");
    storage.corrupt_next_put(Tier::Warm);
    let migrator = TierMigrator::new(storage.clone());

    let error = migrator
        .migrate(&sha('a'), Tier::Hot, Tier::Warm, MigrationOptions::verified())
        .await
        .expect_err("corruption must be detected");

    assert_eq!(error.kind, MigrationErrorKind::ChecksumMismatch);
    assert!(error.rolled_back);
    assert_eq!(storage.peek_location(&sha('a')).unwrap().tier, Tier::Hot);
    assert!(!storage.contains(Tier::Warm, &sha('a')));
    assert_eq!(storage.location_updates(), 0);
}

#[tokio::test]
async fn test_decay_is_monotonic() {
    let storage = MemoryTierStorage::shared();
    let tracker = AccessTracker::new(storage.clone(), storage.clone());
    for _ in 0..7 {
        tracker
            .record_access(&sha('a'), AccessKind::Read, None)
            .await
            .unwrap();
    }
    let options = DecayOptions {
        decay_factor: 0.5,
        min_age_for_decay: Duration::ZERO,
    };

    tracker.apply_decay(options).await.unwrap();
    assert_eq!(tracker.get_access_pattern(&sha('a')).await.read_count, 3);

    let mut previous = 3;
    for _ in 0..4 {
        tracker.apply_decay(options).await.unwrap();
        let current = tracker.get_access_pattern(&sha('a')).await.read_count;
        assert!(current <= previous);
        previous = current;
    }
    assert_eq!(previous, 0);
}

#[tokio::test]
async fn test_verified_hot_to_warm_migration() {
    let storage = storage_with('a', &[42u8; 20]);
    let migrator = TierMigrator::new(storage.clone());

    let outcome = migrator
        .migrate(&sha('a'), Tier::Hot, Tier::Warm, MigrationOptions::verified())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        MigrationOutcome::Migrated {
            checksum_verified: true,
            bytes: 20,
        }
    );
    assert_eq!(storage.peek_location(&sha('a')).unwrap().tier, Tier::Warm);
    assert!(!storage.contains(Tier::Hot, &sha('a')));
    assert_eq!(storage.peek(Tier::Warm, &sha('a')).unwrap().data.len(), 20);
}

#[tokio::test]
async fn test_write_during_job_lands_in_target() {
    let storage = storage_with('b', b"pre-migration");
    let migrator = Arc::new(TierMigrator::new(storage.clone()));

    let job = migrator
        .start_migration_job(&sha('b'), Tier::Hot, Tier::Warm)
        .await
        .unwrap();
    assert_eq!(job.state, JobState::InProgress);

    // The write is held until the job completes
    let writer = {
        let migrator = Arc::clone(&migrator);
        tokio::spawn(async move {
            migrator
                .write_during_migration(StoredObject::new(
                    sha('b'),
                    ObjectType::Blob,
                    "post-migration",
                ))
                .await
        })
    };
    while migrator.pending_write_count(&sha('b')) == 0 {
        tokio::task::yield_now().await;
    }
    assert!(!writer.is_finished());

    let completed = migrator.complete_migration_job(job.id).await.unwrap();
    writer.await.unwrap().unwrap();

    assert_eq!(completed.state, JobState::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(
        &storage.peek(Tier::Warm, &sha('b')).unwrap().data[..],
        b"post-migration"
    );
    assert!(!storage.contains(Tier::Hot, &sha('b')));
    assert_eq!(storage.peek_location(&sha('b')).unwrap().tier, Tier::Warm);
    assert!(!storage.is_locked(&sha('b')));
    assert_eq!(migrator.pending_write_count(&sha('b')), 0);
}

#[tokio::test]
async fn test_failed_location_update_keeps_job_open() {
    let storage = storage_with('c', b"data");
    let migrator = TierMigrator::new(storage.clone());

    let job = migrator
        .start_migration_job(&sha('c'), Tier::Hot, Tier::Warm)
        .await
        .unwrap();
    storage.fail_next_location_update("index offline");

    assert!(migrator.complete_migration_job(job.id).await.is_err());
    assert!(migrator.get_job(job.id).is_some());

    let rolled_back = migrator.rollback_migration_job(job.id).await.unwrap();
    assert_eq!(rolled_back.state, JobState::RolledBack);
    assert!(storage.contains(Tier::Hot, &sha('c')));
    assert!(!storage.contains(Tier::Warm, &sha('c')));
}

#[tokio::test]
async fn test_write_while_job_starts_lands_in_target() {
    let storage = slow_storage_with('d', b"old");
    let migrator = Arc::new(TierMigrator::new(storage.clone()));

    let starter = {
        let migrator = Arc::clone(&migrator);
        tokio::spawn(async move {
            migrator
                .start_migration_job(&sha('d'), Tier::Hot, Tier::Warm)
                .await
        })
    };
    // Registered, but still copying
    while !migrator.is_migrating(&sha('d')) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(migrator.active_jobs().is_empty());

    let writer = {
        let migrator = Arc::clone(&migrator);
        tokio::spawn(async move {
            migrator
                .write_during_migration(StoredObject::new(sha('d'), ObjectType::Blob, "new"))
                .await
        })
    };
    while migrator.pending_write_count(&sha('d')) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(!writer.is_finished());

    let job = starter.await.unwrap().unwrap();
    migrator.complete_migration_job(job.id).await.unwrap();
    writer.await.unwrap().unwrap();

    assert_eq!(&storage.peek(Tier::Warm, &sha('d')).unwrap().data[..], b"new");
    assert!(!storage.contains(Tier::Hot, &sha('d')));
    assert_eq!(storage.peek_location(&sha('d')).unwrap().tier, Tier::Warm);
}

#[tokio::test]
async fn test_failed_job_start_replays_queued_writes_to_source() {
    let storage = slow_storage_with('e', b"old");
    storage.fail_next_put(Tier::Warm, "disk full");
    let migrator = Arc::new(TierMigrator::new(storage.clone()));

    let starter = {
        let migrator = Arc::clone(&migrator);
        tokio::spawn(async move {
            migrator
                .start_migration_job(&sha('e'), Tier::Hot, Tier::Warm)
                .await
        })
    };
    while !migrator.is_migrating(&sha('e')) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let writer = {
        let migrator = Arc::clone(&migrator);
        tokio::spawn(async move {
            migrator
                .write_during_migration(StoredObject::new(sha('e'), ObjectType::Blob, "new"))
                .await
        })
    };

    let error = starter.await.unwrap().unwrap_err();
    writer.await.unwrap().unwrap();

    assert_eq!(error.kind, MigrationErrorKind::WriteFailed);
    assert_eq!(&storage.peek(Tier::Hot, &sha('e')).unwrap().data[..], b"new");
    assert!(!storage.contains(Tier::Warm, &sha('e')));
    assert!(!storage.is_locked(&sha('e')));
    assert!(!migrator.is_migrating(&sha('e')));
    assert_eq!(migrator.pending_write_count(&sha('e')), 0);
}

#[tokio::test]
async fn test_rollback_during_completion_is_refused() {
    let storage = slow_storage_with('f', b"payload");
    let migrator = Arc::new(TierMigrator::new(storage.clone()));
    let job = migrator
        .start_migration_job(&sha('f'), Tier::Hot, Tier::Warm)
        .await
        .unwrap();

    let completer = {
        let migrator = Arc::clone(&migrator);
        tokio::spawn(async move { migrator.complete_migration_job(job.id).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let rollback = migrator.rollback_migration_job(job.id).await;
    let cancel = migrator.cancel_migration_job(job.id).await;
    let completed = completer.await.unwrap().unwrap();

    assert!(rollback.unwrap_err().is_not_found());
    assert!(cancel.unwrap_err().is_not_found());
    assert_eq!(completed.state, JobState::Completed);

    // The canonical location holds the bytes
    let location = storage.peek_location(&sha('f')).unwrap();
    assert_eq!(location.tier, Tier::Warm);
    assert_eq!(
        &storage.peek(Tier::Warm, &sha('f')).unwrap().data[..],
        b"payload"
    );
    assert!(!storage.contains(Tier::Hot, &sha('f')));
    assert!(!storage.is_locked(&sha('f')));
}
