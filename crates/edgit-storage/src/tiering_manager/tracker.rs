use chrono::{DateTime, Duration, Utc};
use edgit_core::{CoreResult, ObjectId, Tier};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::state::{AccessKind, AccessMetrics, AccessPattern};
use crate::backend::{AccessPatternStore, TierStorage};

/// Summary returned by [`AccessTracker::get_access_pattern`].
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSummary {
    pub read_count: u64,
    pub write_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Accesses per second since the pattern was created
    pub access_frequency: f64,
    pub total_bytes_read: u64,
    pub avg_latency_ms: f64,
}

impl AccessSummary {
    fn zeroed() -> Self {
        Self {
            read_count: 0,
            write_count: 0,
            last_accessed_at: None,
            access_frequency: 0.0,
            total_bytes_read: 0,
            avg_latency_ms: 0.0,
        }
    }
}

/// Aggregate counters over all active patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessStats {
    pub total_reads: u64,
    pub total_writes: u64,
    pub unique_objects_accessed: usize,
}

/// Criteria for [`AccessTracker::identify_cold_objects`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ColdObjectCriteria {
    pub max_access_count: u64,
    /// When set, the object must also be idle at least this long
    pub min_age: Option<std::time::Duration>,
}

/// Parameters for [`AccessTracker::apply_decay`].
#[derive(Debug, Clone, Copy)]
pub struct DecayOptions {
    pub decay_factor: f64,
    pub min_age_for_decay: std::time::Duration,
}

impl From<&edgit_core::AccessTrackingConfig> for DecayOptions {
    fn from(config: &edgit_core::AccessTrackingConfig) -> Self {
        Self {
            decay_factor: config.decay_factor,
            min_age_for_decay: std::time::Duration::from_millis(config.min_age_for_decay_ms),
        }
    }
}

/// Per-object access statistics (cache-aside over an [`AccessPatternStore`])
///
/// Every `record_access` writes the updated pattern through to the durable
/// store before returning, so a crash loses at most the access in flight.
/// `load_from_storage` rebuilds the cache after a restart.
pub struct AccessTracker {
    cache: Arc<RwLock<HashMap<ObjectId, AccessPattern>>>,
    store: Arc<dyn AccessPatternStore>,
    storage: Arc<dyn TierStorage>,
}

impl AccessTracker {
    /// Create new access tracker
    pub fn new(storage: Arc<dyn TierStorage>, store: Arc<dyn AccessPatternStore>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            store,
            storage,
        }
    }

    /// Record an object access and persist the updated pattern
    pub async fn record_access(
        &self,
        sha: &ObjectId,
        kind: AccessKind,
        metrics: Option<AccessMetrics>,
    ) -> CoreResult<()> {
        let now = Utc::now();
        // Held across the save so the store sees updates in cache order.
        let mut cache = self.cache.write().await;
        let pattern = cache
            .entry(sha.clone())
            .or_insert_with(|| AccessPattern::new(sha.clone(), now));

        match kind {
            AccessKind::Read => pattern.read_count += 1,
            AccessKind::Write => pattern.write_count += 1,
        }
        pattern.access_count += 1;
        pattern.last_accessed_at = now;

        if let Some(metrics) = metrics {
            pattern.total_bytes_read += metrics.bytes_read.unwrap_or(0);
            pattern.total_latency_ms += metrics.latency_ms.unwrap_or(0);
        }

        self.store.save_pattern(pattern).await
    }

    /// Get access summary; unknown objects yield a zeroed summary
    pub async fn get_access_pattern(&self, sha: &ObjectId) -> AccessSummary {
        let cache = self.cache.read().await;
        let Some(pattern) = cache.get(sha) else {
            return AccessSummary::zeroed();
        };

        let total = pattern.total_accesses();
        let age_secs = (Utc::now() - pattern.created_at).num_milliseconds() as f64 / 1000.0;
        // A pattern younger than one second counts as one second old.
        let access_frequency = total as f64 / age_secs.max(1.0);
        let avg_latency_ms = if pattern.access_count == 0 {
            0.0
        } else {
            pattern.total_latency_ms as f64 / pattern.access_count as f64
        };

        AccessSummary {
            read_count: pattern.read_count,
            write_count: pattern.write_count,
            last_accessed_at: Some(pattern.last_accessed_at),
            access_frequency,
            total_bytes_read: pattern.total_bytes_read,
            avg_latency_ms,
        }
    }

    /// Raw pattern, if the object has ever been accessed
    pub async fn pattern(&self, sha: &ObjectId) -> Option<AccessPattern> {
        self.cache.read().await.get(sha).cloned()
    }

    /// All tracked objects with at least `min_access_count` reads + writes
    pub async fn identify_hot_objects(&self, min_access_count: u64) -> Vec<ObjectId> {
        let cache = self.cache.read().await;
        let mut hot: Vec<ObjectId> = cache
            .values()
            .filter(|p| p.total_accesses() >= min_access_count)
            .map(|p| p.sha.clone())
            .collect();
        hot.sort();
        hot
    }

    /// Hot-tier residents with at most `max_access_count` reads + writes
    ///
    /// Objects never accessed count as zero accesses; their idle time is
    /// measured from when the tier stored them.
    pub async fn identify_cold_objects(
        &self,
        criteria: ColdObjectCriteria,
    ) -> CoreResult<Vec<ObjectId>> {
        let residents = self.storage.objects_in_tier(Tier::Hot).await?;
        let now = Utc::now();
        let cache = self.cache.read().await;

        let mut cold: Vec<ObjectId> = residents
            .into_iter()
            .filter(|info| {
                let pattern = cache.get(&info.sha);
                let accesses = pattern.map_or(0, AccessPattern::total_accesses);
                if accesses > criteria.max_access_count {
                    return false;
                }
                match criteria.min_age {
                    Some(min_age) => {
                        let last = pattern.map_or(info.stored_at, |p| p.last_accessed_at);
                        idle_for(now, last) >= min_age
                    }
                    None => true,
                }
            })
            .map(|info| info.sha)
            .collect();
        cold.sort();
        Ok(cold)
    }

    /// Scale read/write counters down by `decay_factor` (floored)
    ///
    /// Patterns touched within `min_age_for_decay` are skipped. Returns the
    /// number of patterns decayed.
    pub async fn apply_decay(&self, options: DecayOptions) -> CoreResult<usize> {
        let factor = options.decay_factor.clamp(0.0, 1.0);
        let now = Utc::now();

        let mut cache = self.cache.write().await;
        let mut decayed = 0;
        for pattern in cache.values_mut() {
            if idle_for(now, pattern.last_accessed_at) < options.min_age_for_decay {
                continue;
            }
            pattern.read_count = decay(pattern.read_count, factor);
            pattern.write_count = decay(pattern.write_count, factor);
            pattern.access_count = pattern.total_accesses();
            self.store.save_pattern(pattern).await?;
            decayed += 1;
        }
        drop(cache);

        tracing::debug!(decayed, factor, "Applied access decay");
        Ok(decayed)
    }

    /// Totals over every pattern with nonzero activity
    pub async fn get_access_stats(&self) -> AccessStats {
        let cache = self.cache.read().await;
        cache
            .values()
            .filter(|p| p.total_accesses() > 0)
            .fold(AccessStats::default(), |mut stats, p| {
                stats.total_reads += p.read_count;
                stats.total_writes += p.write_count;
                stats.unique_objects_accessed += 1;
                stats
            })
    }

    /// Rehydrate the cache from the durable store (idempotent)
    pub async fn load_from_storage(&self) -> CoreResult<usize> {
        let patterns = self.store.load_patterns().await?;
        let mut cache = self.cache.write().await;
        for pattern in patterns {
            cache.insert(pattern.sha.clone(), pattern);
        }
        tracing::info!(patterns = cache.len(), "Loaded access patterns");
        Ok(cache.len())
    }
}

fn decay(count: u64, factor: f64) -> u64 {
    (count as f64 * factor).floor() as u64
}

fn idle_for(now: DateTime<Utc>, since: DateTime<Utc>) -> std::time::Duration {
    (now - since).max(Duration::zero()).to_std().unwrap_or_default()
}
