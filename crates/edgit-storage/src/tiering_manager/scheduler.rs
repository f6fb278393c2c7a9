use chrono::{DateTime, Utc};
use edgit_core::metrics::{SCHEDULER_CONSECUTIVE_FAILURES, SCHEDULER_CYCLES, SCHEDULER_PAUSED};
use edgit_core::{CoreError, CoreResult, MigrationPolicy, ObjectId, Tier};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::backend::{ObjectMigration, TieredStorageBackend};
use super::state::{AccessKind, HistoryState, MigrationCandidate, MigrationHistoryEntry, SchedulerState};
use crate::control_plane::ControlPlaneStore;

/// Upper bound on how long the worker sleeps before re-reading the durable
/// alarm, so alarms set by another process are picked up.
const ALARM_RECHECK_INTERVAL: Duration = Duration::from_secs(60);

/// One object that failed inside a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFailure {
    pub sha: ObjectId,
    pub source_tier: Tier,
    pub target_tier: Tier,
    pub error: String,
}

/// Tally of one scheduler cycle. All zero when the scheduler is paused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationCycleResult {
    pub migrated: usize,
    pub failed: usize,
    pub bytes_migrated: u64,
    pub hot_to_warm: usize,
    pub warm_to_cold: usize,
    /// Candidates were left behind; the next cycle runs sooner
    pub more_to_migrate: bool,
    pub errors: Vec<ObjectFailure>,
}

/// Background driver for tier demotion
///
/// A single durable alarm drives cycles. Each cycle demotes up to
/// `batch_size` objects, hot → warm first and warm → cold with whatever
/// capacity is left, then reschedules itself:
///
/// ```text
/// idle ──schedule──▶ scheduled ──alarm──▶ running ──ok──▶ scheduled (interval or catch-up)
///                                            │
///                                            └─err──▶ scheduled (backoff)
///                                                    └─▶ paused (after max_consecutive_failures)
/// ```
///
/// Per-object failures are reported in [`MigrationCycleResult::errors`] and
/// never count towards the consecutive-failure budget. Only errors escaping
/// the whole cycle (listing a tier, reaching the control plane) do.
pub struct TierMigrationScheduler {
    backend: Arc<dyn TieredStorageBackend>,
    control: Arc<dyn ControlPlaneStore>,
    policy: Arc<RwLock<MigrationPolicy>>,
    state: Arc<RwLock<SchedulerState>>,
    alarm_changed: Arc<Notify>,
    cycle: Arc<Mutex<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TierMigrationScheduler {
    /// Create new scheduler
    ///
    /// # Errors
    ///
    /// Returns error if policy validation fails
    pub fn new(
        backend: Arc<dyn TieredStorageBackend>,
        control: Arc<dyn ControlPlaneStore>,
        policy: MigrationPolicy,
    ) -> CoreResult<Self> {
        policy.validate().map_err(CoreError::Validation)?;

        Ok(Self {
            backend,
            control,
            policy: Arc::new(RwLock::new(policy)),
            state: Arc::new(RwLock::new(SchedulerState::default())),
            alarm_changed: Arc::new(Notify::new()),
            cycle: Arc::new(Mutex::new(())),
            worker: None,
        })
    }

    /// Rehydrate policy and state from the control plane and make sure an
    /// alarm is pending unless paused.
    pub async fn initialize(&self) -> CoreResult<()> {
        match self.control.load_policy().await? {
            Some(stored) => {
                stored.validate().map_err(CoreError::Validation)?;
                *self.policy.write() = stored;
            }
            None => self.control.save_policy(&self.get_config()).await?,
        }

        let state = match self.control.load_state().await? {
            Some(stored) => stored,
            None => {
                let state = SchedulerState::default();
                self.control.save_state(&state).await?;
                state
            }
        };
        SCHEDULER_PAUSED.set(i64::from(state.paused));
        SCHEDULER_CONSECUTIVE_FAILURES.set(i64::from(state.consecutive_failures));
        let paused = state.paused;
        *self.state.write() = state;

        if !paused {
            self.schedule_background_migration(None, false).await?;
        }
        tracing::info!(paused, "Migration scheduler initialized");
        Ok(())
    }

    /// Arm the alarm `delay` from now (default: the migration interval).
    ///
    /// Returns false without touching anything when paused, or when a future
    /// alarm is already pending and `force` is not set.
    pub async fn schedule_background_migration(
        &self,
        delay: Option<Duration>,
        force: bool,
    ) -> CoreResult<bool> {
        if self.state.read().paused {
            return Ok(false);
        }

        let now = Utc::now();
        if !force {
            if let Some(at) = self.control.get_alarm().await? {
                if at > now {
                    return Ok(false);
                }
            }
        }

        let delay = delay.unwrap_or_else(|| self.get_config().migration_interval());
        let at = now
            + chrono::Duration::from_std(delay)
                .map_err(|e| CoreError::Validation(format!("schedule delay out of range: {e}")))?;
        self.control.set_alarm(at).await?;

        let snapshot = {
            let mut state = self.state.write();
            state.next_migration_at = Some(at);
            state.clone()
        };
        self.control.save_state(&snapshot).await?;
        self.alarm_changed.notify_one();

        tracing::debug!(next_migration_at = %at, delay_ms = delay.as_millis() as u64, "Scheduled migration cycle");
        Ok(true)
    }

    /// Alarm handler: runs one cycle.
    pub async fn alarm(&self) -> CoreResult<MigrationCycleResult> {
        self.run_migration_cycle().await
    }

    /// Run one demotion cycle
    ///
    /// This method is called by the background worker but can also be
    /// invoked manually. Cycles never overlap.
    pub async fn run_migration_cycle(&self) -> CoreResult<MigrationCycleResult> {
        let _running = self.cycle.lock().await;

        // The durable copy wins so pause/resume from another process applies.
        match self.control.load_state().await {
            Ok(Some(stored)) => {
                *self.state.write() = stored;
            }
            Ok(None) => {}
            Err(e) => {
                self.fail_cycle(&e).await;
                return Err(e);
            }
        }
        let paused = self.get_state().paused;

        if paused {
            tracing::debug!("Skipping migration cycle: scheduler paused");
            SCHEDULER_CYCLES.with_label_values(&["paused"]).inc();
            return Ok(MigrationCycleResult::default());
        }

        tracing::info!("Starting migration cycle");
        let start = Instant::now();

        match self.execute_cycle().await {
            Ok(result) => {
                self.complete_cycle(&result).await;
                tracing::info!(
                    migrated = result.migrated,
                    failed = result.failed,
                    bytes = result.bytes_migrated,
                    hot_to_warm = result.hot_to_warm,
                    warm_to_cold = result.warm_to_cold,
                    more_to_migrate = result.more_to_migrate,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Migration cycle complete"
                );
                Ok(result)
            }
            Err(e) => {
                self.fail_cycle(&e).await;
                Err(e)
            }
        }
    }

    async fn execute_cycle(&self) -> CoreResult<MigrationCycleResult> {
        let policy = self.get_config();
        let now = Utc::now();
        let mut result = MigrationCycleResult::default();

        // Phase 1: hot → warm
        let hot = self.backend.get_objects_by_tier(Tier::Hot).await?;
        let hot_bytes = self.backend.get_tier_bytes(Tier::Hot).await?;
        let hot_candidates = select_hot_candidates(hot, hot_bytes, &policy, now);
        let phase1 = hot_candidates.len().min(policy.batch_size);

        result.hot_to_warm = self
            .migrate_phase(&hot_candidates[..phase1], Tier::Hot, Tier::Warm, &policy, &mut result)
            .await?;
        let mut left_behind = hot_candidates.len() - phase1;

        // Phase 2: warm → cold with the remaining capacity
        let capacity = policy.batch_size - phase1;
        if capacity > 0 {
            let warm = self.backend.get_objects_by_tier(Tier::Warm).await?;
            let warm_candidates = select_warm_candidates(warm, &policy, now);
            let phase2 = warm_candidates.len().min(capacity);

            result.warm_to_cold = self
                .migrate_phase(&warm_candidates[..phase2], Tier::Warm, Tier::Cold, &policy, &mut result)
                .await?;
            left_behind += warm_candidates.len() - phase2;
        }

        // A full phase 1 never looks at warm, so its backlog is unknown.
        result.more_to_migrate = left_behind > 0 || capacity == 0;
        Ok(result)
    }

    /// Migrate `batch` with bounded concurrency, recording every outcome.
    /// Returns the number of successes.
    async fn migrate_phase(
        &self,
        batch: &[MigrationCandidate],
        from: Tier,
        to: Tier,
        policy: &MigrationPolicy,
        result: &mut MigrationCycleResult,
    ) -> CoreResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let shas: Vec<ObjectId> = batch.iter().map(|c| c.sha.clone()).collect();
        let backend = Arc::clone(&self.backend);
        let outcomes: Vec<(ObjectId, ObjectMigration)> = stream::iter(shas)
            .map(move |sha| {
                let backend = Arc::clone(&backend);
                async move {
                    let outcome = backend.migrate_object(&sha, from, to).await;
                    (sha, outcome)
                }
            })
            .buffered(policy.concurrency.max(1))
            .collect()
            .await;

        let mut succeeded = 0;
        for (sha, outcome) in outcomes {
            let entry = if outcome.success {
                succeeded += 1;
                result.migrated += 1;
                result.bytes_migrated += outcome.bytes;
                MigrationHistoryEntry::new(sha, from, to, HistoryState::Completed, None)
            } else {
                let error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                tracing::warn!(sha = %sha, source = %from, target = %to, error = %error, "Object migration failed");
                result.failed += 1;
                result.errors.push(ObjectFailure {
                    sha: sha.clone(),
                    source_tier: from,
                    target_tier: to,
                    error: error.clone(),
                });
                MigrationHistoryEntry::new(sha, from, to, HistoryState::Failed, Some(error))
            };
            // The object already moved; losing its audit row must not fail the cycle.
            if let Err(e) = self.control.append_history(&entry).await {
                tracing::warn!(sha = %entry.sha, error = %e, "Failed to record migration history");
            }
        }
        Ok(succeeded)
    }

    async fn complete_cycle(&self, result: &MigrationCycleResult) {
        let policy = self.get_config();
        let snapshot = {
            let mut state = self.state.write();
            state.consecutive_failures = 0;
            state.total_migrated += result.migrated as u64;
            state.total_bytes_migrated += result.bytes_migrated;
            state.last_migration_at = Some(Utc::now());
            state.clone()
        };
        SCHEDULER_CONSECUTIVE_FAILURES.set(0);
        SCHEDULER_CYCLES.with_label_values(&["success"]).inc();
        self.persist(&snapshot).await;

        let delay = if result.more_to_migrate {
            policy.catch_up_delay()
        } else {
            policy.migration_interval()
        };
        if let Err(e) = self.schedule_background_migration(Some(delay), true).await {
            tracing::error!(error = %e, "Failed to reschedule migration cycle");
        }
    }

    async fn fail_cycle(&self, error: &CoreError) {
        let policy = self.get_config();
        let snapshot = {
            let mut state = self.state.write();
            state.consecutive_failures += 1;
            if state.consecutive_failures >= policy.max_consecutive_failures {
                state.paused = true;
                state.pause_reason = Some(format!(
                    "paused after {} consecutive failed cycles: {error}",
                    state.consecutive_failures
                ));
            }
            state.clone()
        };
        SCHEDULER_CYCLES.with_label_values(&["failure"]).inc();
        SCHEDULER_CONSECUTIVE_FAILURES.set(i64::from(snapshot.consecutive_failures));
        self.persist(&snapshot).await;

        if snapshot.paused {
            SCHEDULER_PAUSED.set(1);
            if let Err(e) = self.control.delete_alarm().await {
                tracing::warn!(error = %e, "Failed to clear alarm after pausing");
            }
            self.alarm_changed.notify_one();
            tracing::error!(
                failures = snapshot.consecutive_failures,
                error = %error,
                "Migration cycle failed; scheduler paused"
            );
            return;
        }

        let delay = policy.backoff_delay(snapshot.consecutive_failures);
        tracing::error!(
            failures = snapshot.consecutive_failures,
            backoff_ms = delay.as_millis() as u64,
            error = %error,
            "Migration cycle failed"
        );
        if let Err(e) = self.schedule_background_migration(Some(delay), true).await {
            tracing::error!(error = %e, "Failed to schedule backoff retry");
        }
    }

    async fn persist(&self, state: &SchedulerState) {
        if let Err(e) = self.control.save_state(state).await {
            tracing::warn!(error = %e, "Failed to persist scheduler state");
        }
    }

    /// Stop scheduling cycles until [`resume_migration`](Self::resume_migration).
    pub async fn pause_migration(&self, reason: &str) -> CoreResult<()> {
        let snapshot = {
            let mut state = self.state.write();
            state.paused = true;
            state.pause_reason = Some(reason.to_string());
            state.clone()
        };
        self.control.save_state(&snapshot).await?;
        self.control.delete_alarm().await?;
        self.alarm_changed.notify_one();
        SCHEDULER_PAUSED.set(1);

        tracing::info!(reason, "Migration paused");
        Ok(())
    }

    /// Clear the pause and the failure count, and run a cycle right away.
    pub async fn resume_migration(&self) -> CoreResult<()> {
        let snapshot = {
            let mut state = self.state.write();
            state.paused = false;
            state.pause_reason = None;
            state.consecutive_failures = 0;
            state.clone()
        };
        self.control.save_state(&snapshot).await?;
        SCHEDULER_PAUSED.set(0);
        SCHEDULER_CONSECUTIVE_FAILURES.set(0);

        self.schedule_background_migration(Some(Duration::ZERO), true)
            .await?;
        tracing::info!("Migration resumed");
        Ok(())
    }

    /// Audit trail, newest first.
    pub async fn get_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> CoreResult<Vec<MigrationHistoryEntry>> {
        self.control.list_history(limit, offset).await
    }

    pub fn get_state(&self) -> SchedulerState {
        self.state.read().clone()
    }

    pub fn get_config(&self) -> MigrationPolicy {
        self.policy.read().clone()
    }

    /// Validate, persist and apply a new policy. Takes effect next cycle.
    pub async fn update_policy(&self, policy: MigrationPolicy) -> CoreResult<()> {
        policy.validate().map_err(CoreError::Validation)?;
        self.control.save_policy(&policy).await?;
        *self.policy.write() = policy;
        tracing::info!("Migration policy updated");
        Ok(())
    }

    /// Forward an access to the backend's optional hook.
    pub async fn record_access(&self, sha: &ObjectId, kind: AccessKind) -> CoreResult<()> {
        self.backend.record_access(sha, kind).await
    }

    /// Pending alarm, if any.
    pub async fn next_alarm(&self) -> CoreResult<Option<DateTime<Utc>>> {
        self.control.get_alarm().await
    }

    /// Start background worker
    ///
    /// Sleeps until the durable alarm is due (or changes), clears it and runs
    /// one cycle. Each cycle arms the next alarm itself.
    pub fn start_worker(&mut self) {
        if self.worker.is_some() {
            tracing::warn!("Background worker already running");
            return;
        }

        let scheduler = self.clone_for_worker();
        let handle = tokio::spawn(async move {
            loop {
                let alarm = match scheduler.control.get_alarm().await {
                    Ok(alarm) => alarm,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read alarm");
                        None
                    }
                };

                let now = Utc::now();
                match alarm {
                    Some(at) if at <= now => {
                        if let Err(e) = scheduler.control.delete_alarm().await {
                            tracing::warn!(error = %e, "Failed to clear fired alarm");
                        }
                        if let Err(e) = scheduler.alarm().await {
                            tracing::error!(error = %e, "Migration cycle failed");
                        }
                    }
                    Some(at) => {
                        let wait = (at - now).to_std().unwrap_or_default();
                        scheduler.wait_for_alarm(wait.min(ALARM_RECHECK_INTERVAL)).await;
                    }
                    None => scheduler.wait_for_alarm(ALARM_RECHECK_INTERVAL).await,
                }
            }
        });

        self.worker = Some(handle);
        tracing::info!("Background worker started");
    }

    async fn wait_for_alarm(&self, timeout: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {}
            _ = self.alarm_changed.notified() => {}
        }
    }

    /// Shutdown background worker
    pub async fn shutdown(&mut self) -> CoreResult<()> {
        if let Some(handle) = self.worker.take() {
            handle.abort();
            tracing::info!("Background worker shut down");
        }
        Ok(())
    }

    /// Clone for worker (without JoinHandle)
    fn clone_for_worker(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            control: Arc::clone(&self.control),
            policy: Arc::clone(&self.policy),
            state: Arc::clone(&self.state),
            alarm_changed: Arc::clone(&self.alarm_changed),
            cycle: Arc::clone(&self.cycle),
            worker: None,
        }
    }
}

fn idle_for(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

/// Idle, rarely used hot objects; every hot object when over capacity.
/// Oldest access first.
fn select_hot_candidates(
    objects: Vec<MigrationCandidate>,
    hot_bytes: u64,
    policy: &MigrationPolicy,
    now: DateTime<Utc>,
) -> Vec<MigrationCandidate> {
    let over_capacity = hot_bytes > policy.max_hot_tier_bytes;
    let max_age = policy.hot_to_warm_age();

    let mut candidates: Vec<MigrationCandidate> = objects
        .into_iter()
        .filter(|c| {
            over_capacity
                || (idle_for(now, c.last_accessed_at) > max_age
                    && c.access_count < policy.min_access_count_for_hot)
        })
        .collect();
    candidates.sort_by(|a, b| a.last_accessed_at.cmp(&b.last_accessed_at));
    candidates
}

fn select_warm_candidates(
    objects: Vec<MigrationCandidate>,
    policy: &MigrationPolicy,
    now: DateTime<Utc>,
) -> Vec<MigrationCandidate> {
    let max_age = policy.warm_to_cold_age();
    let mut candidates: Vec<MigrationCandidate> = objects
        .into_iter()
        .filter(|c| idle_for(now, c.last_accessed_at) > max_age)
        .collect();
    candidates.sort_by(|a, b| a.last_accessed_at.cmp(&b.last_accessed_at));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::MemoryControlPlane;
    use crate::memory::MemoryTierStorage;
    use crate::tiering_manager::{AccessTracker, MigratorBackend, TierMigrator};
    use edgit_core::{ObjectType, StoredObject};

    struct Harness {
        scheduler: TierMigrationScheduler,
        storage: Arc<MemoryTierStorage>,
        control: Arc<MemoryControlPlane>,
    }

    fn sha(n: usize) -> ObjectId {
        ObjectId::parse(&format!("{n:040x}")).unwrap()
    }

    fn harness(policy: MigrationPolicy) -> Harness {
        let storage = MemoryTierStorage::shared();
        let control = Arc::new(MemoryControlPlane::new());
        let migrator = Arc::new(TierMigrator::new(storage.clone()));
        let tracker = Arc::new(AccessTracker::new(storage.clone(), control.clone()));
        let backend = Arc::new(MigratorBackend::new(storage.clone(), migrator, tracker));
        let scheduler = TierMigrationScheduler::new(backend, control.clone(), policy).unwrap();
        Harness {
            scheduler,
            storage,
            control,
        }
    }

    fn seed_hot(storage: &MemoryTierStorage, count: usize) {
        let stored_at = Utc::now() - chrono::Duration::hours(1);
        for n in 0..count {
            storage.seed_at(
                Tier::Hot,
                StoredObject::new(sha(n), ObjectType::Blob, vec![1u8; 10]),
                stored_at,
            );
        }
    }

    fn hot_only_policy() -> MigrationPolicy {
        MigrationPolicy {
            warm_to_cold_age_ms: 7 * 24 * 3600 * 1000,
            ..MigrationPolicy::for_testing()
        }
    }

    fn candidate(n: usize, idle_hours: i64, access_count: u64, now: DateTime<Utc>) -> MigrationCandidate {
        MigrationCandidate {
            sha: sha(n),
            object_type: ObjectType::Blob,
            size: 10,
            tier: Tier::Hot,
            access_count,
            last_accessed_at: now - chrono::Duration::hours(idle_hours),
            created_at: now - chrono::Duration::hours(idle_hours),
        }
    }

    #[test]
    fn test_hot_candidate_policy() {
        let now = Utc::now();
        let policy = MigrationPolicy::default();
        let objects = vec![
            candidate(1, 25, 2, now),
            candidate(2, 1, 2, now),
            candidate(3, 25, 6, now),
        ];

        let selected = select_hot_candidates(objects.clone(), 0, &policy, now);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].sha, sha(1));

        let pressured = select_hot_candidates(objects, policy.max_hot_tier_bytes + 1, &policy, now);
        assert_eq!(pressured.len(), 3);
        assert_eq!(pressured[0].sha, sha(1));
    }

    #[tokio::test]
    async fn test_schedule_is_noop_while_alarm_pending() {
        let h = harness(MigrationPolicy::for_testing());
        assert!(h
            .scheduler
            .schedule_background_migration(None, false)
            .await
            .unwrap());
        let first = h.control.get_alarm().await.unwrap().unwrap();

        assert!(!h
            .scheduler
            .schedule_background_migration(Some(Duration::from_secs(1)), false)
            .await
            .unwrap());
        assert_eq!(h.control.get_alarm().await.unwrap(), Some(first));

        assert!(h
            .scheduler
            .schedule_background_migration(Some(Duration::from_secs(1)), true)
            .await
            .unwrap());
        assert!(h.control.get_alarm().await.unwrap().unwrap() < first);
        assert!(h.scheduler.get_state().next_migration_at.is_some());
    }

    #[tokio::test]
    async fn test_paused_scheduler_does_nothing() {
        let h = harness(hot_only_policy());
        seed_hot(&h.storage, 3);
        h.scheduler.pause_migration("maintenance").await.unwrap();

        assert!(!h
            .scheduler
            .schedule_background_migration(None, true)
            .await
            .unwrap());
        let result = h.scheduler.run_migration_cycle().await.unwrap();
        assert_eq!(result, MigrationCycleResult::default());
        assert_eq!(h.storage.object_count(Tier::Hot), 3);
        assert_eq!(
            h.scheduler.get_state().pause_reason.as_deref(),
            Some("maintenance")
        );
    }

    #[tokio::test]
    async fn test_cycle_migrates_and_reschedules() {
        let h = harness(hot_only_policy());
        seed_hot(&h.storage, 3);

        let result = h.scheduler.run_migration_cycle().await.unwrap();
        assert_eq!(result.migrated, 3);
        assert_eq!(result.hot_to_warm, 3);
        assert_eq!(result.warm_to_cold, 0);
        assert_eq!(result.bytes_migrated, 30);
        assert!(!result.more_to_migrate);

        let state = h.scheduler.get_state();
        assert_eq!(state.total_migrated, 3);
        assert!(state.last_migration_at.is_some());

        let alarm = h.control.get_alarm().await.unwrap().unwrap();
        let delay = alarm - Utc::now();
        assert!(delay > chrono::Duration::seconds(50));

        let history = h.scheduler.get_history(2, 0).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.state == HistoryState::Completed));
    }

    #[tokio::test]
    async fn test_phase_two_uses_remaining_capacity() {
        let policy = MigrationPolicy {
            batch_size: 5,
            ..MigrationPolicy::for_testing()
        };
        let h = harness(policy);
        seed_hot(&h.storage, 2);
        let old = Utc::now() - chrono::Duration::days(30);
        for n in 100..110 {
            h.storage
                .seed_at(Tier::Warm, StoredObject::new(sha(n), ObjectType::Blob, "w"), old);
        }

        let result = h.scheduler.run_migration_cycle().await.unwrap();
        assert_eq!(result.hot_to_warm, 2);
        assert_eq!(result.warm_to_cold, 3);
        assert_eq!(result.migrated, 5);
        assert!(result.more_to_migrate);
        assert_eq!(h.storage.object_count(Tier::Cold), 3);
    }

    #[test]
    fn test_cycle_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let h = harness(hot_only_policy());
        let cycle = h.scheduler.run_migration_cycle();
        assert_send(&cycle);
    }

    #[tokio::test]
    async fn test_history_failure_keeps_cycle_totals() {
        let h = harness(hot_only_policy());
        seed_hot(&h.storage, 3);
        h.control.fail_history_appends(2);

        let result = h.scheduler.run_migration_cycle().await.unwrap();
        assert_eq!(result.migrated, 3);

        let state = h.scheduler.get_state();
        assert_eq!(state.total_migrated, 3);
        assert_eq!(state.total_bytes_migrated, 30);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(h.control.history_len(), 1);
    }

    #[tokio::test]
    async fn test_object_failures_do_not_fail_cycle() {
        let h = harness(hot_only_policy());
        seed_hot(&h.storage, 2);
        h.storage.fail_next_put(Tier::Warm, "disk full");

        let result = h.scheduler.run_migration_cycle().await.unwrap();
        assert_eq!(result.migrated, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].error.contains("WRITE_FAILED"));
        assert_eq!(h.scheduler.get_state().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_control_plane_outage_counts_as_cycle_failure() {
        let h = harness(hot_only_policy());
        h.control.fail_state_loads(1);

        assert!(h.scheduler.run_migration_cycle().await.is_err());
        let state = h.scheduler.get_state();
        assert_eq!(state.consecutive_failures, 1);
        assert!(!state.paused);
    }

    #[tokio::test]
    async fn test_update_policy_validates() {
        let h = harness(MigrationPolicy::for_testing());
        let bad = MigrationPolicy {
            batch_size: 0,
            ..MigrationPolicy::for_testing()
        };
        assert!(h.scheduler.update_policy(bad).await.is_err());

        let good = MigrationPolicy {
            batch_size: 9,
            ..MigrationPolicy::for_testing()
        };
        h.scheduler.update_policy(good).await.unwrap();
        assert_eq!(h.scheduler.get_config().batch_size, 9);
        assert_eq!(h.control.load_policy().await.unwrap().unwrap().batch_size, 9);
    }

    #[tokio::test]
    async fn test_initialize_restores_durable_state() {
        let h = harness(MigrationPolicy::for_testing());
        let stored = SchedulerState {
            total_migrated: 42,
            paused: true,
            pause_reason: Some("operator".into()),
            ..SchedulerState::default()
        };
        h.control.save_state(&stored).await.unwrap();

        h.scheduler.initialize().await.unwrap();
        assert_eq!(h.scheduler.get_state(), stored);
        assert!(h.control.get_alarm().await.unwrap().is_none());
        assert!(h.control.load_policy().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_worker_runs_due_alarm() {
        let mut h = harness(hot_only_policy());
        seed_hot(&h.storage, 4);
        h.scheduler
            .schedule_background_migration(Some(Duration::ZERO), true)
            .await
            .unwrap();

        h.scheduler.start_worker();
        let migrated = tokio::time::timeout(Duration::from_secs(5), async {
            while h.scheduler.get_state().total_migrated < 4 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        h.scheduler.shutdown().await.unwrap();

        assert!(migrated.is_ok());
        assert_eq!(h.storage.object_count(Tier::Warm), 4);
    }
}
