//! Central metrics registry and metric definitions
//!
//! Prometheus metrics for the tiering engine. Metrics are registered lazily
//! on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

// ===== Migration Metrics =====

/// Single-object migrations by tier pair and outcome
/// (migrated, skipped, rolled_back, failed)
pub static MIGRATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "edgit_migrations_total",
        "Total number of object migrations",
        &["source", "target", "outcome"]
    )
    .expect("Failed to register migrations counter")
});

/// Bytes moved by completed migrations
pub static MIGRATION_BYTES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "edgit_migration_bytes_total",
        "Total bytes moved between tiers",
        &["source", "target"]
    )
    .expect("Failed to register migration bytes counter")
});

/// Migration latency histogram
pub static MIGRATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "edgit_migration_duration_seconds",
        "Object migration duration in seconds",
        &["source", "target"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register migration duration histogram")
});

/// Long-running migration jobs currently open
pub static ACTIVE_MIGRATION_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "edgit_migration_jobs_active",
        "Number of open job-based migrations"
    )
    .expect("Failed to register active jobs gauge")
});

// ===== Scheduler Metrics =====

/// Scheduler cycles by status (success, failure, paused)
pub static SCHEDULER_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "edgit_scheduler_cycles_total",
        "Total number of scheduler cycles",
        &["status"]
    )
    .expect("Failed to register scheduler cycles counter")
});

/// Current consecutive cycle-level failures
pub static SCHEDULER_CONSECUTIVE_FAILURES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "edgit_scheduler_consecutive_failures",
        "Consecutive failed scheduler cycles"
    )
    .expect("Failed to register consecutive failures gauge")
});

/// 1 while the scheduler is paused
pub static SCHEDULER_PAUSED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("edgit_scheduler_paused", "Scheduler pause flag (1=paused)")
        .expect("Failed to register scheduler paused gauge")
});

// ===== Read Path Metrics =====

/// Tiered reads by serving tier and outcome (hit, miss, error)
pub static TIERED_READS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "edgit_tiered_reads_total",
        "Total number of tier lookups on the read path",
        &["tier", "outcome"]
    )
    .expect("Failed to register tiered reads counter")
});

/// Objects copied back to the hot tier
pub static PROMOTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("edgit_promotions_total", "Total number of hot-tier promotions")
        .expect("Failed to register promotions counter")
});
