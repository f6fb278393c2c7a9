use chrono::{DateTime, Utc};
use edgit_core::metrics::{
    ACTIVE_MIGRATION_JOBS, MIGRATIONS_TOTAL, MIGRATION_BYTES, MIGRATION_DURATION,
};
use edgit_core::{CoreError, CoreResult, JobId, MigrationPolicy, ObjectId, StoredObject, Tier, TierLocation};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use super::access_handler::ConcurrentAccessHandler;
use super::job::{JobState, MigrationJob};
use super::rollback::MigrationRollback;
use super::state::{HistoryState, MigrationHistoryEntry};
use crate::backend::TierStorage;

/// Lock wait used when the caller gives none.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5_000);

const DIGEST_HEX_LEN: usize = 64;

/// Per-call options for [`TierMigrator::migrate`].
#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    /// Re-read the target and compare SHA-256 digests before committing
    pub verify_checksum: bool,
    /// Maximum wait for the per-object lock
    pub lock_timeout: Duration,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            verify_checksum: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl MigrationOptions {
    pub fn verified() -> Self {
        Self {
            verify_checksum: true,
            ..Self::default()
        }
    }
}

/// Why a migration call did nothing without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another migration of the same object is running in this process
    InFlight,
    /// A concurrent migration finished while this call waited for the lock
    AlreadyMigrated,
    /// The source tier no longer holds the object
    SourceMissing,
}

/// Non-error outcome of a single-object migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated { checksum_verified: bool, bytes: u64 },
    Skipped(SkipReason),
}

impl MigrationOutcome {
    #[must_use]
    pub fn is_migrated(&self) -> bool {
        matches!(self, Self::Migrated { .. })
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationErrorKind {
    NotFound,
    AlreadyInTarget,
    LockTimeout,
    /// Another migration of the same object is running in this process
    InFlight,
    WriteFailed,
    ChecksumMismatch,
    UpdateFailed,
    /// Source bytes or the location table could not be read
    ReadFailed,
}

impl MigrationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyInTarget => "ALREADY_IN_TARGET",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::InFlight => "IN_FLIGHT",
            Self::WriteFailed => "WRITE_FAILED",
            Self::ChecksumMismatch => "CHECKSUM_MISMATCH",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::ReadFailed => "READ_FAILED",
        }
    }
}

impl fmt::Display for MigrationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed migration. The source copy is intact for every kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {sha} {source_tier} -> {target_tier}{}", .cause.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct MigrationError {
    pub kind: MigrationErrorKind,
    pub sha: ObjectId,
    pub source_tier: Tier,
    pub target_tier: Tier,
    pub cause: Option<String>,
    /// A target copy was written and then removed
    pub rolled_back: bool,
    pub rollback_reason: Option<String>,
}

impl MigrationError {
    fn new(kind: MigrationErrorKind, sha: &ObjectId, source_tier: Tier, target_tier: Tier) -> Self {
        Self {
            kind,
            sha: sha.clone(),
            source_tier,
            target_tier,
            cause: None,
            rolled_back: false,
            rollback_reason: None,
        }
    }

    fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    fn rolled_back(mut self, reason: impl Into<String>) -> Self {
        self.rolled_back = true;
        self.rollback_reason = Some(reason.into());
        self
    }
}

pub type MigrationResult = Result<MigrationOutcome, MigrationError>;

/// Outcome of [`TierMigrator::migrate_batch`]. Skips count as failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchMigrationResult {
    pub successful: Vec<ObjectId>,
    pub failed: Vec<ObjectId>,
}

/// Hot-tier candidate filter.
///
/// `max_age_in_hot: None` means no age limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateCriteria {
    pub max_age_in_hot: Option<Duration>,
    pub min_access_count: u64,
    pub max_hot_size: u64,
}

impl From<&MigrationPolicy> for CandidateCriteria {
    fn from(policy: &MigrationPolicy) -> Self {
        Self {
            max_age_in_hot: Some(policy.hot_to_warm_age()),
            min_access_count: policy.min_access_count_for_hot,
            max_hot_size: policy.max_hot_tier_bytes,
        }
    }
}

/// SHA-256 of the raw payload, lowercase hex.
pub fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn is_valid_digest(digest: &str) -> bool {
    digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

struct QueuedWrite {
    object: StoredObject,
    done: oneshot::Sender<CoreResult<()>>,
}

#[derive(Default)]
struct JobTable {
    active: HashMap<JobId, MigrationJob>,
    by_sha: HashMap<ObjectId, JobId>,
    pending_writes: HashMap<ObjectId, VecDeque<QueuedWrite>>,
}

/// Removes the object from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<ObjectId>>,
    sha: ObjectId,
}

impl<'a> InFlightGuard<'a> {
    fn claim(set: &'a Mutex<HashSet<ObjectId>>, sha: &ObjectId) -> Option<Self> {
        set.lock().insert(sha.clone()).then(|| Self {
            set,
            sha: sha.clone(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.sha);
    }
}

/// Moves objects between tiers without ever leaving the canonical location
/// pointing at unverified data.
///
/// Two flavours:
/// - [`migrate`](Self::migrate): inline, lock → copy → verify → relocate →
///   delete source, with rollback of the target copy on any failure
/// - jobs ([`start_migration_job`](Self::start_migration_job) and friends):
///   the copy happens eagerly, the relocation later; writes that arrive
///   meanwhile are queued and replayed in order on completion
///
/// At most one migration per object runs at a time: an in-process in-flight
/// set plus the storage-level lock.
pub struct TierMigrator {
    storage: Arc<dyn TierStorage>,
    access_handler: ConcurrentAccessHandler,
    rollback: MigrationRollback,
    in_flight: Mutex<HashSet<ObjectId>>,
    jobs: Mutex<JobTable>,
    history: RwLock<Vec<MigrationHistoryEntry>>,
    job_lock_timeout: Duration,
}

impl TierMigrator {
    pub fn new(storage: Arc<dyn TierStorage>) -> Self {
        Self {
            access_handler: ConcurrentAccessHandler::new(Arc::clone(&storage)),
            rollback: MigrationRollback::new(Arc::clone(&storage)),
            storage,
            in_flight: Mutex::new(HashSet::new()),
            jobs: Mutex::new(JobTable::default()),
            history: RwLock::new(Vec::new()),
            job_lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Lock wait used by [`start_migration_job`](Self::start_migration_job).
    pub fn with_job_lock_timeout(mut self, timeout: Duration) -> Self {
        self.job_lock_timeout = timeout;
        self
    }

    /// Hot-tier objects eligible for demotion, oldest access first.
    pub async fn find_migration_candidates(
        &self,
        criteria: CandidateCriteria,
    ) -> CoreResult<Vec<ObjectId>> {
        let residents = self.storage.objects_in_tier(Tier::Hot).await?;
        let total_bytes: u64 = residents.iter().map(|info| info.size).sum();

        let mut recent: HashMap<ObjectId, (u64, DateTime<Utc>)> = HashMap::new();
        for entry in self.storage.access_log().await? {
            let stat = recent.entry(entry.sha).or_insert((0, entry.accessed_at));
            stat.0 += 1;
            stat.1 = stat.1.max(entry.accessed_at);
        }

        let now = Utc::now();
        let mut rows: Vec<(ObjectId, DateTime<Utc>, u64)> = residents
            .into_iter()
            .map(|info| {
                let (count, last) = recent
                    .get(&info.sha)
                    .copied()
                    .unwrap_or((0, info.stored_at));
                (info.sha, last, count)
            })
            .collect();
        rows.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let over_capacity = total_bytes > criteria.max_hot_size;
        let candidates = rows
            .into_iter()
            .filter(|(_, last, count)| {
                let age = (now - *last).to_std().unwrap_or_default();
                match (criteria.max_age_in_hot, criteria.min_access_count) {
                    (None, 0) => over_capacity,
                    (None, min) => *count < min,
                    (Some(max_age), 0) => age > max_age,
                    (Some(max_age), min) => age > max_age && *count < min,
                }
            })
            .map(|(sha, _, _)| sha)
            .collect::<Vec<_>>();

        tracing::debug!(
            candidates = candidates.len(),
            hot_bytes = total_bytes,
            over_capacity,
            "Found migration candidates"
        );
        Ok(candidates)
    }

    /// Migrate one object from `source` to `target`.
    pub async fn migrate(
        &self,
        sha: &ObjectId,
        source: Tier,
        target: Tier,
        options: MigrationOptions,
    ) -> MigrationResult {
        let err = |kind| MigrationError::new(kind, sha, source, target);

        match self.storage.get_location(sha).await {
            Ok(Some(location)) if location.tier == target => {
                return Err(err(MigrationErrorKind::AlreadyInTarget))
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err(err(MigrationErrorKind::NotFound)),
            Err(e) => return Err(err(MigrationErrorKind::ReadFailed).with_cause(e)),
        }

        let Some(_in_flight) = InFlightGuard::claim(&self.in_flight, sha) else {
            tracing::debug!(sha = %sha, "Skipping migration: already in flight");
            self.count(source, target, "skipped");
            return Ok(MigrationOutcome::Skipped(SkipReason::InFlight));
        };

        match self.storage.acquire_lock(sha, options.lock_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(sha = %sha, timeout_ms = options.lock_timeout.as_millis() as u64, "Lock timeout");
                self.count(source, target, "failed");
                return Err(err(MigrationErrorKind::LockTimeout));
            }
            Err(e) => {
                self.count(source, target, "failed");
                return Err(err(MigrationErrorKind::LockTimeout).with_cause(e));
            }
        }

        let start = Instant::now();
        let result = self.transfer(sha, source, target, options).await;

        if let Err(e) = self.storage.release_lock(sha).await {
            tracing::warn!(sha = %sha, error = %e, "Failed to release migration lock");
        }

        MIGRATION_DURATION
            .with_label_values(&[source.as_str(), target.as_str()])
            .observe(start.elapsed().as_secs_f64());
        match &result {
            Ok(MigrationOutcome::Migrated { bytes, .. }) => {
                self.count(source, target, "migrated");
                MIGRATION_BYTES
                    .with_label_values(&[source.as_str(), target.as_str()])
                    .inc_by(*bytes);
            }
            Ok(MigrationOutcome::Skipped(_)) => self.count(source, target, "skipped"),
            Err(e) if e.rolled_back => self.count(source, target, "rolled_back"),
            Err(_) => self.count(source, target, "failed"),
        }
        result
    }

    /// Body of `migrate` once the lock is held.
    async fn transfer(
        &self,
        sha: &ObjectId,
        source: Tier,
        target: Tier,
        options: MigrationOptions,
    ) -> MigrationResult {
        let err = |kind| MigrationError::new(kind, sha, source, target);

        match self.storage.get_location(sha).await {
            Ok(Some(location)) if location.tier == target => {
                tracing::debug!(sha = %sha, "Skipping migration: completed while waiting for lock");
                return Ok(MigrationOutcome::Skipped(SkipReason::AlreadyMigrated));
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err(err(MigrationErrorKind::NotFound)),
            Err(e) => return Err(err(MigrationErrorKind::ReadFailed).with_cause(e)),
        }

        let object = match self.storage.get_object(source, sha).await {
            Ok(Some(object)) => object,
            Ok(None) => {
                tracing::debug!(sha = %sha, tier = %source, "Skipping migration: source copy gone");
                return Ok(MigrationOutcome::Skipped(SkipReason::SourceMissing));
            }
            Err(e) => return Err(err(MigrationErrorKind::ReadFailed).with_cause(e)),
        };

        let expected = options.verify_checksum.then(|| checksum(&object.data));

        if let Err(e) = self.storage.put_object(target, &object).await {
            self.discard_target(sha, target).await;
            let error = err(MigrationErrorKind::WriteFailed)
                .with_cause(&e)
                .rolled_back(format!("target write failed: {e}"));
            self.fail(&error, HistoryState::RolledBack);
            return Err(error);
        }

        if let Some(expected) = expected {
            let actual = match self.storage.get_object(target, sha).await {
                Ok(Some(copy)) => Some(checksum(&copy.data)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(sha = %sha, error = %e, "Failed to re-read target for verification");
                    None
                }
            };
            let verified = actual
                .as_deref()
                .is_some_and(|digest| is_valid_digest(digest) && digest == expected);

            if !verified {
                self.discard_target(sha, target).await;
                let error = err(MigrationErrorKind::ChecksumMismatch)
                    .with_cause(format!(
                        "expected {expected}, got {}",
                        actual.as_deref().unwrap_or("nothing")
                    ))
                    .rolled_back("checksum mismatch");
                self.fail(&error, HistoryState::RolledBack);
                return Err(error);
            }
        }

        if let Err(e) = self
            .storage
            .update_location(&TierLocation::new(sha.clone(), target))
            .await
        {
            self.discard_target(sha, target).await;
            let error = err(MigrationErrorKind::UpdateFailed)
                .with_cause(&e)
                .rolled_back(format!("location update failed: {e}"));
            self.fail(&error, HistoryState::RolledBack);
            return Err(error);
        }

        if let Err(e) = self.storage.delete_object(source, sha).await {
            // Location already points at the target; the stale copy is garbage.
            tracing::warn!(sha = %sha, tier = %source, error = %e, "Failed to delete source copy");
        }

        self.record(MigrationHistoryEntry::new(
            sha.clone(),
            source,
            target,
            HistoryState::Completed,
            None,
        ));
        tracing::info!(
            sha = %sha,
            source = %source,
            target = %target,
            bytes = object.size,
            verified = options.verify_checksum,
            "Migrated object"
        );

        Ok(MigrationOutcome::Migrated {
            checksum_verified: options.verify_checksum,
            bytes: object.size,
        })
    }

    /// Migrate many objects, `concurrency` at a time. One failure never
    /// aborts its siblings.
    pub async fn migrate_batch(
        &self,
        shas: &[ObjectId],
        source: Tier,
        target: Tier,
        concurrency: usize,
        options: MigrationOptions,
    ) -> BatchMigrationResult {
        let mut result = BatchMigrationResult::default();

        for chunk in shas.chunks(concurrency.max(1)) {
            let outcomes = futures::future::join_all(
                chunk
                    .iter()
                    .map(|sha| self.migrate(sha, source, target, options)),
            )
            .await;

            for (sha, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(MigrationOutcome::Migrated { .. }) => result.successful.push(sha.clone()),
                    _ => result.failed.push(sha.clone()),
                }
            }
        }

        tracing::info!(
            successful = result.successful.len(),
            failed = result.failed.len(),
            "Batch migration finished"
        );
        result
    }

    // === Job-based migration ===

    /// Lock the object and copy it to `target`, leaving the source and the
    /// location untouched until [`complete_migration_job`](Self::complete_migration_job).
    ///
    /// The object is registered before the copy starts, so writes arriving
    /// while the copy runs are queued rather than written past it.
    pub async fn start_migration_job(
        &self,
        sha: &ObjectId,
        source: Tier,
        target: Tier,
    ) -> Result<MigrationJob, MigrationError> {
        let err = |kind| MigrationError::new(kind, sha, source, target);

        match self.storage.get_location(sha).await {
            Ok(Some(location)) if location.tier == target => {
                return Err(err(MigrationErrorKind::AlreadyInTarget))
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err(err(MigrationErrorKind::NotFound)),
            Err(e) => return Err(err(MigrationErrorKind::ReadFailed).with_cause(e)),
        }

        let mut job = MigrationJob::start(sha.clone(), source, target);
        {
            // Lock order: jobs, then in_flight.
            let mut jobs = self.jobs.lock();
            if !self.in_flight.lock().insert(sha.clone()) {
                return Err(err(MigrationErrorKind::InFlight));
            }
            jobs.by_sha.insert(sha.clone(), job.id);
        }

        if let Err(e) = self.copy_for_job(&mut job).await {
            let replayed = self.drain_writes(sha, source).await;
            if job.lock_acquired {
                if let Err(release) = self.storage.release_lock(sha).await {
                    tracing::warn!(sha = %sha, error = %release, "Failed to release job lock");
                }
            }
            self.in_flight.lock().remove(sha);
            tracing::warn!(sha = %sha, kind = %e.kind, replayed, "Migration job failed to start");
            return Err(e);
        }

        self.jobs.lock().active.insert(job.id, job.clone());
        ACTIVE_MIGRATION_JOBS.inc();
        tracing::info!(job_id = %job.id, sha = %sha, source = %source, target = %target, "Started migration job");

        Ok(job)
    }

    async fn copy_for_job(&self, job: &mut MigrationJob) -> Result<(), MigrationError> {
        let (sha, source, target) = (job.sha.clone(), job.source_tier, job.target_tier);
        let err = |kind| MigrationError::new(kind, &sha, source, target);

        match self.storage.acquire_lock(&sha, self.job_lock_timeout).await {
            Ok(true) => job.lock_acquired = true,
            Ok(false) => return Err(err(MigrationErrorKind::LockTimeout)),
            Err(e) => return Err(err(MigrationErrorKind::LockTimeout).with_cause(e)),
        }

        let object = match self.storage.get_object(source, &sha).await {
            Ok(Some(object)) => object,
            Ok(None) => return Err(err(MigrationErrorKind::NotFound)),
            Err(e) => return Err(err(MigrationErrorKind::ReadFailed).with_cause(e)),
        };
        job.progress.total_bytes = object.size;

        if let Err(e) = self.storage.put_object(target, &object).await {
            self.discard_target(&sha, target).await;
            return Err(err(MigrationErrorKind::WriteFailed)
                .with_cause(&e)
                .rolled_back(format!("target write failed: {e}")));
        }
        job.progress.bytes_transferred = object.size;
        Ok(())
    }

    /// Relocate the object to the job's target, delete the source, release
    /// the lock and replay queued writes in arrival order.
    ///
    /// The job leaves the open set before any I/O, so a concurrent rollback
    /// or cancel sees `NotFound` instead of deleting the target underneath.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown job id. A failed location update puts the
    /// job back so the caller can retry or roll back.
    pub async fn complete_migration_job(&self, job_id: JobId) -> CoreResult<MigrationJob> {
        let mut job = self.claim_job(job_id)?;

        if let Err(e) = self
            .storage
            .update_location(&TierLocation::new(job.sha.clone(), job.target_tier))
            .await
        {
            tracing::warn!(job_id = %job_id, sha = %job.sha, error = %e, "Location update failed; job stays open");
            self.jobs.lock().active.insert(job_id, job);
            return Err(e);
        }
        ACTIVE_MIGRATION_JOBS.dec();

        if let Err(e) = self.storage.delete_object(job.source_tier, &job.sha).await {
            tracing::warn!(sha = %job.sha, tier = %job.source_tier, error = %e, "Failed to delete source copy");
        }

        let replayed = self.drain_writes(&job.sha, job.target_tier).await;

        if job.lock_acquired {
            if let Err(e) = self.storage.release_lock(&job.sha).await {
                tracing::warn!(sha = %job.sha, error = %e, "Failed to release job lock");
            }
            job.lock_acquired = false;
        }
        self.in_flight.lock().remove(&job.sha);
        job.finish(JobState::Completed);

        self.record(MigrationHistoryEntry::new(
            job.sha.clone(),
            job.source_tier,
            job.target_tier,
            HistoryState::Completed,
            None,
        ));
        MIGRATION_BYTES
            .with_label_values(&[job.source_tier.as_str(), job.target_tier.as_str()])
            .inc_by(job.progress.bytes_transferred);
        self.count(job.source_tier, job.target_tier, "migrated");
        tracing::info!(job_id = %job_id, sha = %job.sha, replayed, "Completed migration job");

        Ok(job)
    }

    /// Undo an open job: drop the target copy, release the lock, apply
    /// queued writes to the source tier.
    pub async fn rollback_migration_job(&self, job_id: JobId) -> CoreResult<MigrationJob> {
        self.terminate_job(job_id, JobState::RolledBack).await
    }

    /// Cooperative cancel; same cleanup as rollback, recorded as cancelled.
    pub async fn cancel_migration_job(&self, job_id: JobId) -> CoreResult<MigrationJob> {
        self.terminate_job(job_id, JobState::Cancelled).await
    }

    async fn terminate_job(&self, job_id: JobId, state: JobState) -> CoreResult<MigrationJob> {
        let mut job = self.claim_job(job_id)?;
        ACTIVE_MIGRATION_JOBS.dec();

        // The source is still canonical, so queued writes belong there.
        self.drain_writes(&job.sha, job.source_tier).await;

        let cleanup = match state {
            JobState::RolledBack => self.rollback.rollback(&mut job).await,
            _ => self.rollback.cleanup(&mut job).await,
        };
        if let Err(e) = cleanup {
            tracing::warn!(job_id = %job_id, sha = %job.sha, error = %e, "Job cleanup incomplete");
        }
        if !job.state.is_terminal() {
            job.finish(state);
        }
        self.in_flight.lock().remove(&job.sha);

        let history_state = match state {
            JobState::Cancelled => HistoryState::Cancelled,
            _ => HistoryState::RolledBack,
        };
        self.record(MigrationHistoryEntry::new(
            job.sha.clone(),
            job.source_tier,
            job.target_tier,
            history_state,
            None,
        ));
        self.count(job.source_tier, job.target_tier, "rolled_back");
        tracing::warn!(job_id = %job_id, sha = %job.sha, state = ?job.state, "Terminated migration job");

        Ok(job)
    }

    /// Take the job out of the open set. The object stays registered, so
    /// writes keep queuing until [`drain_writes`](Self::drain_writes).
    fn claim_job(&self, job_id: JobId) -> CoreResult<MigrationJob> {
        self.jobs
            .lock()
            .active
            .remove(&job_id)
            .ok_or_else(|| CoreError::not_found("migration job", job_id.to_string()))
    }

    /// Replay queued writes to `tier` until the queue stays empty, then
    /// unregister the object. Writes arriving mid-replay join the queue, so
    /// arrival order holds.
    async fn drain_writes(&self, sha: &ObjectId, tier: Tier) -> usize {
        let mut replayed = 0;
        loop {
            let queued = {
                let mut jobs = self.jobs.lock();
                match jobs.pending_writes.remove(sha) {
                    Some(queued) if !queued.is_empty() => queued,
                    _ => {
                        jobs.by_sha.remove(sha);
                        return replayed;
                    }
                }
            };
            replayed += self.replay_writes(tier, queued).await;
        }
    }

    async fn replay_writes(&self, tier: Tier, queued: VecDeque<QueuedWrite>) -> usize {
        let count = queued.len();
        for write in queued {
            let result = self.storage.put_object(tier, &write.object).await;
            if let Err(e) = &result {
                tracing::warn!(sha = %write.object.sha, tier = %tier, error = %e, "Queued write failed on replay");
            }
            // The writer may have given up waiting; nothing to report then.
            let _ = write.done.send(result);
        }
        count
    }

    /// Hot first, then warm.
    pub async fn read_during_migration(&self, sha: &ObjectId) -> CoreResult<Option<StoredObject>> {
        self.access_handler.handle_read(sha).await
    }

    /// Queue the write behind an open job (resolves once replayed), or write
    /// straight to hot when no job is open for the object.
    pub async fn write_during_migration(&self, object: StoredObject) -> CoreResult<()> {
        let queued = {
            let mut jobs = self.jobs.lock();
            if jobs.by_sha.contains_key(&object.sha) {
                let (done, receiver) = oneshot::channel();
                jobs.pending_writes
                    .entry(object.sha.clone())
                    .or_default()
                    .push_back(QueuedWrite { object, done });
                Ok(receiver)
            } else {
                Err(object)
            }
        };

        match queued {
            Ok(receiver) => receiver
                .await
                .map_err(|_| CoreError::internal("queued write was dropped before replay"))?,
            Err(object) => self.access_handler.handle_write(&object).await,
        }
    }

    // === Introspection ===

    pub fn get_job(&self, job_id: JobId) -> Option<MigrationJob> {
        self.jobs.lock().active.get(&job_id).cloned()
    }

    pub fn active_jobs(&self) -> Vec<MigrationJob> {
        self.jobs.lock().active.values().cloned().collect()
    }

    pub fn pending_write_count(&self, sha: &ObjectId) -> usize {
        self.jobs
            .lock()
            .pending_writes
            .get(sha)
            .map_or(0, VecDeque::len)
    }

    pub fn is_migrating(&self, sha: &ObjectId) -> bool {
        self.in_flight.lock().contains(sha)
    }

    /// Audit trail in completion order.
    pub fn history(&self) -> Vec<MigrationHistoryEntry> {
        self.history.read().clone()
    }

    // === Internals ===

    async fn discard_target(&self, sha: &ObjectId, target: Tier) {
        if let Err(e) = self.storage.delete_object(target, sha).await {
            tracing::warn!(sha = %sha, tier = %target, error = %e, "Failed to remove partial target copy");
        }
    }

    fn fail(&self, error: &MigrationError, state: HistoryState) {
        tracing::warn!(
            sha = %error.sha,
            kind = %error.kind,
            cause = error.cause.as_deref().unwrap_or(""),
            "Migration rolled back"
        );
        self.record(MigrationHistoryEntry::new(
            error.sha.clone(),
            error.source_tier,
            error.target_tier,
            state,
            Some(error.to_string()),
        ));
    }

    fn record(&self, entry: MigrationHistoryEntry) {
        self.history.write().push(entry);
    }

    fn count(&self, source: Tier, target: Tier, outcome: &str) {
        MIGRATIONS_TOTAL
            .with_label_values(&[source.as_str(), target.as_str(), outcome])
            .inc();
    }
}
