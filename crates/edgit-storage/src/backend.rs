use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgit_core::{ObjectId, ObjectType, StoredObject, Tier, TierLocation};

use crate::error::Result;
use crate::tiering_manager::AccessPattern;

/// Summary of an object resident in a tier, used for candidate scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierObjectInfo {
    pub sha: ObjectId,
    pub object_type: ObjectType,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

/// One entry of the raw access log kept by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub sha: ObjectId,
    pub accessed_at: DateTime<Utc>,
}

/// Storage primitives the migration engine orchestrates.
///
/// Implementations own the bytes of each tier, the canonical location table
/// and the per-object lock. None of the methods may assume another call is
/// in progress; the migrator provides the ordering.
///
/// # Error Handling
///
/// - `get_object` / `get_location` return `Ok(None)` for absent entries
/// - `delete_object` is idempotent
/// - backend failures surface as `CoreError::Storage`
#[async_trait]
pub trait TierStorage: Send + Sync {
    // === Object bytes ===
    async fn get_object(&self, tier: Tier, sha: &ObjectId) -> Result<Option<StoredObject>>;
    async fn put_object(&self, tier: Tier, object: &StoredObject) -> Result<()>;
    async fn delete_object(&self, tier: Tier, sha: &ObjectId) -> Result<()>;

    /// Lists every object currently held by `tier`.
    async fn objects_in_tier(&self, tier: Tier) -> Result<Vec<TierObjectInfo>>;

    // === Canonical location table ===
    async fn get_location(&self, sha: &ObjectId) -> Result<Option<TierLocation>>;
    async fn update_location(&self, location: &TierLocation) -> Result<()>;

    // === Per-object lock ===

    /// Waits up to `timeout` for the lock on `sha`. Returns false on timeout.
    async fn acquire_lock(&self, sha: &ObjectId, timeout: Duration) -> Result<bool>;

    /// Releases the lock on `sha`. Releasing an unheld lock is a no-op.
    async fn release_lock(&self, sha: &ObjectId) -> Result<()>;

    // === Access log ===
    async fn access_log(&self) -> Result<Vec<AccessLogEntry>>;
}

/// Durable side store behind the in-memory access-pattern cache.
#[async_trait]
pub trait AccessPatternStore: Send + Sync {
    /// Upserts one pattern.
    async fn save_pattern(&self, pattern: &AccessPattern) -> Result<()>;

    /// Returns every persisted pattern.
    async fn load_patterns(&self) -> Result<Vec<AccessPattern>>;
}
