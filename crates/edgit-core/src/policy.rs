use serde::{Deserialize, Serialize};
use std::time::Duration;

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Migration policy driving candidate selection and the background scheduler.
///
/// # Example
///
/// ```
/// use edgit_core::MigrationPolicy;
///
/// let policy = MigrationPolicy::default();
/// assert_eq!(policy.batch_size, 50);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationPolicy {
    /// Idle time before a hot object becomes a warm candidate (default: 24h)
    pub hot_to_warm_age_ms: u64,

    /// Idle time before a warm object becomes a cold candidate (default: 7d)
    pub warm_to_cold_age_ms: u64,

    /// Objects with at least this many accesses stay hot (default: 5)
    pub min_access_count_for_hot: u64,

    /// Hot tier capacity; above it every hot object is a candidate (default: 100 MiB)
    pub max_hot_tier_bytes: u64,

    /// Maximum objects migrated per scheduler cycle (default: 50)
    pub batch_size: usize,

    /// Concurrent migrations within one phase of a cycle (default: 4)
    pub concurrency: usize,

    /// Normal delay between scheduler cycles (default: 1h)
    pub migration_interval_ms: u64,

    /// Cycle-level failures tolerated before pausing (default: 5)
    pub max_consecutive_failures: u32,

    /// First backoff delay after a failed cycle (default: 60s)
    pub backoff_base_delay_ms: u64,

    /// Growth factor applied per consecutive failure (default: 2.0)
    pub backoff_multiplier: f64,

    /// Backoff ceiling (default: 1h)
    pub max_backoff_delay_ms: u64,
}

impl Default for MigrationPolicy {
    fn default() -> Self {
        Self {
            hot_to_warm_age_ms: DAY_MS,
            warm_to_cold_age_ms: 7 * DAY_MS,
            min_access_count_for_hot: 5,
            max_hot_tier_bytes: 100 * 1024 * 1024,
            batch_size: 50,
            concurrency: 4,
            migration_interval_ms: HOUR_MS,
            max_consecutive_failures: 5,
            backoff_base_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            max_backoff_delay_ms: HOUR_MS,
        }
    }
}

impl MigrationPolicy {
    /// Validate policy configuration
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be >= 1".into());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be >= 1".into());
        }
        if self.migration_interval_ms == 0 {
            return Err("migration_interval_ms must be > 0".into());
        }
        if self.max_consecutive_failures == 0 {
            return Err("max_consecutive_failures must be >= 1".into());
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err("backoff_multiplier must be >= 1.0".into());
        }
        if self.max_backoff_delay_ms < self.backoff_base_delay_ms {
            return Err("max_backoff_delay_ms must be >= backoff_base_delay_ms".into());
        }
        Ok(())
    }

    pub fn hot_to_warm_age(&self) -> Duration {
        Duration::from_millis(self.hot_to_warm_age_ms)
    }

    pub fn warm_to_cold_age(&self) -> Duration {
        Duration::from_millis(self.warm_to_cold_age_ms)
    }

    pub fn migration_interval(&self) -> Duration {
        Duration::from_millis(self.migration_interval_ms)
    }

    /// Delay used when a cycle left candidates behind: `min(interval / 4, 15min)`.
    pub fn catch_up_delay(&self) -> Duration {
        (self.migration_interval() / 4).min(Duration::from_secs(15 * 60))
    }

    /// Backoff after `failures` consecutive cycle-level failures (1-based).
    ///
    /// `min(base * multiplier^(failures - 1), max)`
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = (self.backoff_base_delay_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Policy with immediate eligibility and short delays, for tests and demos.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            hot_to_warm_age_ms: 0,
            warm_to_cold_age_ms: 0,
            min_access_count_for_hot: 5,
            max_hot_tier_bytes: u64::MAX,
            batch_size: 50,
            concurrency: 4,
            migration_interval_ms: 60_000,
            max_consecutive_failures: 3,
            backoff_base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_delay_ms: 30_000,
        }
    }
}

/// Whether a read served from a slower tier copies the object back to hot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPolicy {
    /// Promote on the first warm/cold hit.
    Aggressive,
    /// Reserved for frequency-based promotion; currently never auto-promotes.
    Conservative,
    /// Never auto-promote.
    #[default]
    None,
}

impl PromotionPolicy {
    /// Returns true when a first read from a slower tier should promote.
    #[must_use]
    pub fn promotes_on_read(&self) -> bool {
        matches!(self, Self::Aggressive)
    }
}

/// Periodic decay applied to access counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessTrackingConfig {
    /// Multiplier applied to read/write counters (0, 1] (default: 0.5)
    pub decay_factor: f64,

    /// Patterns accessed more recently than this are not decayed (default: 1h)
    pub min_age_for_decay_ms: u64,

    /// How often the daemon applies decay (default: 6h)
    pub decay_interval_secs: u64,
}

impl Default for AccessTrackingConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.5,
            min_age_for_decay_ms: HOUR_MS,
            decay_interval_secs: 6 * 60 * 60,
        }
    }
}

impl AccessTrackingConfig {
    /// # Errors
    ///
    /// Returns a message when the decay factor is outside (0, 1].
    pub fn validate(&self) -> Result<(), String> {
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err("decay_factor must be in (0, 1]".into());
        }
        if self.decay_interval_secs == 0 {
            return Err("decay_interval_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.decay_interval_secs)
    }
}
