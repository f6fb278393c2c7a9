//! In-memory tier storage for tests, demos and single-process deployments
//!
//! Simulates the hot/warm/cold stores, the canonical location table, the
//! per-object lock and the access log, with configurable fault injection.
//!
//! # Features
//!
//! - **Deterministic Faults**: queue a failure (or a corrupted write) for the
//!   next call of a given operation on a given tier
//! - **Latency Simulation**: every call sleeps for a configurable delay so
//!   concurrent callers genuinely interleave
//! - **Counters**: location updates are counted for assertions
//!
//! # Examples
//!
//! ```rust
//! use edgit_core::{ObjectId, ObjectType, StoredObject, Tier};
//! use edgit_storage::{MemoryTierStorage, TierStorage};
//!
//! # async fn example() -> edgit_core::CoreResult<()> {
//! let storage = MemoryTierStorage::new();
//! let sha = ObjectId::parse(&"a".repeat(40))?;
//! storage.seed(Tier::Hot, StoredObject::new(sha.clone(), ObjectType::Blob, "hello"));
//!
//! storage.fail_next_put(Tier::Warm, "disk full");
//! let copy = storage.get_object(Tier::Hot, &sha).await?.unwrap();
//! assert!(storage.put_object(Tier::Warm, &copy).await.is_err());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use edgit_core::{CoreError, ObjectId, StoredObject, Tier, TierLocation};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::backend::{AccessLogEntry, AccessPatternStore, TierObjectInfo, TierStorage};
use crate::error::Result;
use crate::tiering_manager::{AccessPattern, TierBackend};

/// Storage operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Get,
    Put,
    Delete,
    List,
    GetLocation,
    UpdateLocation,
}

impl StorageOp {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOp::Get => "get",
            StorageOp::Put => "put",
            StorageOp::Delete => "delete",
            StorageOp::List => "list",
            StorageOp::GetLocation => "get_location",
            StorageOp::UpdateLocation => "update_location",
        }
    }
}

/// Injected behaviour for one call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// The call fails with a storage error.
    Error(String),

    /// Puts only: the write succeeds but the last byte is flipped.
    Corrupt,
}

/// Memory storage configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageConfig {
    /// Simulated per-call latency (default: none).
    pub latency: Duration,
}

#[derive(Debug, Clone)]
struct Entry {
    object: StoredObject,
    stored_at: DateTime<Utc>,
}

type FaultKey = (StorageOp, Option<Tier>);

/// In-memory implementation of [`TierStorage`] and [`AccessPatternStore`].
pub struct MemoryTierStorage {
    tiers: RwLock<HashMap<Tier, HashMap<ObjectId, Entry>>>,
    locations: RwLock<HashMap<ObjectId, TierLocation>>,
    access_log: RwLock<Vec<AccessLogEntry>>,
    patterns: RwLock<HashMap<ObjectId, AccessPattern>>,
    locks: Mutex<HashSet<ObjectId>>,
    lock_released: Notify,
    faults: Mutex<HashMap<FaultKey, VecDeque<Fault>>>,
    location_updates: AtomicU64,
    config: MemoryStorageConfig,
}

impl MemoryTierStorage {
    /// Create new storage with default config (no latency, no faults).
    pub fn new() -> Self {
        Self::new_with_config(MemoryStorageConfig::default())
    }

    /// Create new storage with custom config.
    pub fn new_with_config(config: MemoryStorageConfig) -> Self {
        Self {
            tiers: RwLock::new(HashMap::new()),
            locations: RwLock::new(HashMap::new()),
            access_log: RwLock::new(Vec::new()),
            patterns: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashSet::new()),
            lock_released: Notify::new(),
            faults: Mutex::new(HashMap::new()),
            location_updates: AtomicU64::new(0),
            config,
        }
    }

    /// Convenience constructor returning an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // === Seeding (initial writes) ===

    /// Writes `object` into `tier` and points its canonical location there.
    pub fn seed(&self, tier: Tier, object: StoredObject) {
        self.seed_at(tier, object, Utc::now());
    }

    /// Same as [`seed`](Self::seed) with an explicit storage timestamp.
    pub fn seed_at(&self, tier: Tier, object: StoredObject, stored_at: DateTime<Utc>) {
        let sha = object.sha.clone();
        self.tiers
            .write()
            .entry(tier)
            .or_default()
            .insert(sha.clone(), Entry { object, stored_at });
        self.locations
            .write()
            .insert(sha.clone(), TierLocation::new(sha, tier));
    }

    /// Appends an access-log entry stamped now.
    pub fn log_access(&self, sha: &ObjectId) {
        self.log_access_at(sha, Utc::now());
    }

    /// Appends an access-log entry with an explicit timestamp.
    pub fn log_access_at(&self, sha: &ObjectId, accessed_at: DateTime<Utc>) {
        self.access_log.write().push(AccessLogEntry {
            sha: sha.clone(),
            accessed_at,
        });
    }

    // === Fault injection ===

    /// Queues a fault for the next `op` call (on `tier`, or on any tier when `None`).
    pub fn inject(&self, op: StorageOp, tier: Option<Tier>, fault: Fault) {
        self.faults
            .lock()
            .entry((op, tier))
            .or_default()
            .push_back(fault);
    }

    /// The next put into `tier` fails.
    pub fn fail_next_put(&self, tier: Tier, message: &str) {
        self.inject(StorageOp::Put, Some(tier), Fault::Error(message.to_string()));
    }

    /// The next put into `tier` stores corrupted bytes.
    pub fn corrupt_next_put(&self, tier: Tier) {
        self.inject(StorageOp::Put, Some(tier), Fault::Corrupt);
    }

    /// The next location-table update fails.
    pub fn fail_next_location_update(&self, message: &str) {
        self.inject(
            StorageOp::UpdateLocation,
            None,
            Fault::Error(message.to_string()),
        );
    }

    /// The next `count` listings of `tier` fail.
    pub fn fail_listings(&self, tier: Tier, count: usize, message: &str) {
        for _ in 0..count {
            self.inject(StorageOp::List, Some(tier), Fault::Error(message.to_string()));
        }
    }

    /// Drops all queued faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    // === Inspection ===

    /// Returns the object held by `tier` without latency or faults.
    pub fn peek(&self, tier: Tier, sha: &ObjectId) -> Option<StoredObject> {
        self.tiers
            .read()
            .get(&tier)
            .and_then(|objects| objects.get(sha))
            .map(|entry| entry.object.clone())
    }

    /// Returns true when `tier` holds `sha`.
    pub fn contains(&self, tier: Tier, sha: &ObjectId) -> bool {
        self.peek(tier, sha).is_some()
    }

    /// Returns the canonical location without latency or faults.
    pub fn peek_location(&self, sha: &ObjectId) -> Option<TierLocation> {
        self.locations.read().get(sha).cloned()
    }

    /// Number of objects held by `tier`.
    pub fn object_count(&self, tier: Tier) -> usize {
        self.tiers.read().get(&tier).map_or(0, HashMap::len)
    }

    /// Number of successful location-table writes.
    pub fn location_updates(&self) -> u64 {
        self.location_updates.load(Ordering::SeqCst)
    }

    /// Returns true while some caller holds the lock on `sha`.
    pub fn is_locked(&self, sha: &ObjectId) -> bool {
        self.locks.lock().contains(sha)
    }

    async fn simulate(&self, op: StorageOp, tier: Option<Tier>) -> Result<Option<Fault>> {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let fault = {
            let mut faults = self.faults.lock();
            let specific = faults
                .get_mut(&(op, tier))
                .and_then(VecDeque::pop_front);
            specific.or_else(|| faults.get_mut(&(op, None)).and_then(VecDeque::pop_front))
        };

        match fault {
            Some(Fault::Error(message)) => {
                tracing::debug!(op = op.as_str(), ?tier, %message, "Injected storage fault");
                Err(CoreError::storage(format!("{}: {}", op.as_str(), message)))
            }
            other => Ok(other),
        }
    }
}

impl Default for MemoryTierStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn corrupt(object: &StoredObject) -> StoredObject {
    let mut bytes = object.data.to_vec();
    match bytes.last_mut() {
        Some(last) => *last ^= 0xFF,
        None => bytes.push(0xFF),
    }
    StoredObject {
        data: Bytes::from(bytes),
        ..object.clone()
    }
}

#[async_trait]
impl TierStorage for MemoryTierStorage {
    async fn get_object(&self, tier: Tier, sha: &ObjectId) -> Result<Option<StoredObject>> {
        self.simulate(StorageOp::Get, Some(tier)).await?;
        Ok(self.peek(tier, sha))
    }

    async fn put_object(&self, tier: Tier, object: &StoredObject) -> Result<()> {
        let stored = match self.simulate(StorageOp::Put, Some(tier)).await? {
            Some(Fault::Corrupt) => corrupt(object),
            _ => object.clone(),
        };

        self.tiers.write().entry(tier).or_default().insert(
            stored.sha.clone(),
            Entry {
                object: stored,
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, tier: Tier, sha: &ObjectId) -> Result<()> {
        self.simulate(StorageOp::Delete, Some(tier)).await?;
        if let Some(objects) = self.tiers.write().get_mut(&tier) {
            objects.remove(sha);
        }
        Ok(())
    }

    async fn objects_in_tier(&self, tier: Tier) -> Result<Vec<TierObjectInfo>> {
        self.simulate(StorageOp::List, Some(tier)).await?;
        let tiers = self.tiers.read();
        Ok(tiers
            .get(&tier)
            .map(|objects| {
                objects
                    .values()
                    .map(|entry| TierObjectInfo {
                        sha: entry.object.sha.clone(),
                        object_type: entry.object.object_type,
                        size: entry.object.size,
                        stored_at: entry.stored_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_location(&self, sha: &ObjectId) -> Result<Option<TierLocation>> {
        self.simulate(StorageOp::GetLocation, None).await?;
        Ok(self.peek_location(sha))
    }

    async fn update_location(&self, location: &TierLocation) -> Result<()> {
        self.simulate(StorageOp::UpdateLocation, None).await?;
        self.locations
            .write()
            .insert(location.sha.clone(), location.clone());
        self.location_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn acquire_lock(&self, sha: &ObjectId, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a release between the
            // check and the wait is not missed.
            let released = self.lock_released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.locks.lock().insert(sha.clone()) {
                return Ok(true);
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return Ok(false);
            }
        }
    }

    async fn release_lock(&self, sha: &ObjectId) -> Result<()> {
        if self.locks.lock().remove(sha) {
            self.lock_released.notify_waiters();
        }
        Ok(())
    }

    async fn access_log(&self) -> Result<Vec<AccessLogEntry>> {
        Ok(self.access_log.read().clone())
    }
}

#[async_trait]
impl AccessPatternStore for MemoryTierStorage {
    async fn save_pattern(&self, pattern: &AccessPattern) -> Result<()> {
        self.patterns
            .write()
            .insert(pattern.sha.clone(), pattern.clone());
        Ok(())
    }

    async fn load_patterns(&self) -> Result<Vec<AccessPattern>> {
        Ok(self.patterns.read().values().cloned().collect())
    }
}

/// Single-tier object store for the [`TieredReader`](crate::tiering_manager::TieredReader).
#[derive(Default)]
pub struct MemoryObjectTier {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
    unavailable: RwLock<Option<String>>,
}

impl MemoryObjectTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object without going through the async interface.
    pub fn insert(&self, object: StoredObject) {
        self.objects.write().insert(object.sha.clone(), object);
    }

    pub fn contains(&self, sha: &ObjectId) -> bool {
        self.objects.read().contains_key(sha)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Makes every call fail until [`restore`](Self::restore) is called.
    pub fn make_unavailable(&self, reason: &str) {
        *self.unavailable.write() = Some(reason.to_string());
    }

    pub fn restore(&self) {
        *self.unavailable.write() = None;
    }

    fn check_available(&self) -> Result<()> {
        match self.unavailable.read().as_ref() {
            Some(reason) => Err(CoreError::storage(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TierBackend for MemoryObjectTier {
    async fn get(&self, sha: &ObjectId) -> Result<Option<StoredObject>> {
        self.check_available()?;
        Ok(self.objects.read().get(sha).cloned())
    }

    async fn put(&self, object: StoredObject) -> Result<()> {
        self.check_available()?;
        self.objects.write().insert(object.sha.clone(), object);
        Ok(())
    }
}
