use async_trait::async_trait;
use edgit_core::{CoreResult, ObjectId, Tier};
use std::sync::Arc;

use super::migrator::{MigrationOptions, MigrationOutcome, TierMigrator};
use super::state::{AccessKind, MigrationCandidate};
use super::tracker::AccessTracker;
use crate::backend::TierStorage;

/// Outcome of [`TieredStorageBackend::migrate_object`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMigration {
    pub success: bool,
    pub bytes: u64,
    pub error: Option<String>,
}

impl ObjectMigration {
    pub fn succeeded(bytes: u64) -> Self {
        Self {
            success: true,
            bytes,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            bytes: 0,
            error: Some(error.into()),
        }
    }
}

/// What the scheduler needs from the storage layer.
///
/// Listing errors are cycle-level failures. `migrate_object` reports
/// per-object failures in its result instead.
#[async_trait]
pub trait TieredStorageBackend: Send + Sync {
    async fn get_objects_by_tier(&self, tier: Tier) -> CoreResult<Vec<MigrationCandidate>>;

    async fn get_tier_bytes(&self, tier: Tier) -> CoreResult<u64>;

    async fn migrate_object(&self, sha: &ObjectId, from: Tier, to: Tier) -> ObjectMigration;

    /// Optional access hook; the default ignores the access.
    async fn record_access(&self, _sha: &ObjectId, _kind: AccessKind) -> CoreResult<()> {
        Ok(())
    }
}

/// [`TieredStorageBackend`] over a [`TierMigrator`], with access statistics
/// from an [`AccessTracker`].
pub struct MigratorBackend {
    storage: Arc<dyn TierStorage>,
    migrator: Arc<TierMigrator>,
    tracker: Arc<AccessTracker>,
    options: MigrationOptions,
}

impl MigratorBackend {
    pub fn new(
        storage: Arc<dyn TierStorage>,
        migrator: Arc<TierMigrator>,
        tracker: Arc<AccessTracker>,
    ) -> Self {
        Self {
            storage,
            migrator,
            tracker,
            options: MigrationOptions::verified(),
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn migrator(&self) -> &Arc<TierMigrator> {
        &self.migrator
    }

    pub fn tracker(&self) -> &Arc<AccessTracker> {
        &self.tracker
    }
}

#[async_trait]
impl TieredStorageBackend for MigratorBackend {
    async fn get_objects_by_tier(&self, tier: Tier) -> CoreResult<Vec<MigrationCandidate>> {
        let residents = self.storage.objects_in_tier(tier).await?;
        let mut candidates = Vec::with_capacity(residents.len());

        for info in residents {
            let pattern = self.tracker.pattern(&info.sha).await;
            candidates.push(MigrationCandidate {
                access_count: pattern.as_ref().map_or(0, |p| p.access_count),
                last_accessed_at: pattern
                    .as_ref()
                    .map_or(info.stored_at, |p| p.last_accessed_at),
                created_at: pattern.as_ref().map_or(info.stored_at, |p| p.created_at),
                sha: info.sha,
                object_type: info.object_type,
                size: info.size,
                tier,
            });
        }
        Ok(candidates)
    }

    async fn get_tier_bytes(&self, tier: Tier) -> CoreResult<u64> {
        let residents = self.storage.objects_in_tier(tier).await?;
        Ok(residents.iter().map(|info| info.size).sum())
    }

    async fn migrate_object(&self, sha: &ObjectId, from: Tier, to: Tier) -> ObjectMigration {
        match self.migrator.migrate(sha, from, to, self.options).await {
            Ok(MigrationOutcome::Migrated { bytes, .. }) => ObjectMigration::succeeded(bytes),
            Ok(MigrationOutcome::Skipped(reason)) => {
                ObjectMigration::failed(format!("skipped: {reason:?}"))
            }
            Err(e) => ObjectMigration::failed(e.to_string()),
        }
    }

    async fn record_access(&self, sha: &ObjectId, kind: AccessKind) -> CoreResult<()> {
        self.tracker.record_access(sha, kind, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTierStorage;
    use edgit_core::{ObjectType, StoredObject};

    fn sha(c: char) -> ObjectId {
        ObjectId::parse(&c.to_string().repeat(40)).unwrap()
    }

    fn backend() -> (MigratorBackend, Arc<MemoryTierStorage>) {
        let storage = MemoryTierStorage::shared();
        let migrator = Arc::new(TierMigrator::new(storage.clone()));
        let tracker = Arc::new(AccessTracker::new(storage.clone(), storage.clone()));
        (MigratorBackend::new(storage.clone(), migrator, tracker), storage)
    }

    #[tokio::test]
    async fn test_candidates_carry_tracked_access() {
        let (backend, storage) = backend();
        storage.seed(Tier::Hot, StoredObject::new(sha('a'), ObjectType::Blob, vec![0u8; 8]));
        storage.seed(Tier::Hot, StoredObject::new(sha('b'), ObjectType::Blob, vec![0u8; 4]));
        backend.record_access(&sha('a'), AccessKind::Read).await.unwrap();
        backend.record_access(&sha('a'), AccessKind::Read).await.unwrap();

        let mut candidates = backend.get_objects_by_tier(Tier::Hot).await.unwrap();
        candidates.sort_by(|x, y| x.sha.cmp(&y.sha));
        assert_eq!(candidates[0].access_count, 2);
        assert_eq!(candidates[1].access_count, 0);
        assert_eq!(backend.get_tier_bytes(Tier::Hot).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_migrate_object_reports_failures() {
        let (backend, storage) = backend();
        storage.seed(Tier::Hot, StoredObject::new(sha('a'), ObjectType::Blob, "abc"));

        let ok = backend.migrate_object(&sha('a'), Tier::Hot, Tier::Warm).await;
        assert_eq!(ok, ObjectMigration::succeeded(3));

        let missing = backend.migrate_object(&sha('b'), Tier::Hot, Tier::Warm).await;
        assert!(!missing.success);
        assert!(missing.error.unwrap().starts_with("NOT_FOUND"));
    }
}
