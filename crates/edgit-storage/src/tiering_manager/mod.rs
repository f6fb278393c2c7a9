//! Hot/Warm/Cold Tiering Engine
//!
//! Moves Git objects between storage tiers based on access patterns, without
//! ever losing the canonical copy:
//! - **Hot Tier**: recently written or frequently read objects, lowest latency
//! - **Warm Tier**: idle objects, cheaper storage
//! - **Cold Tier**: long-idle objects, cheapest storage
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Object read path                          │
//! │                                                                 │
//! │  TieredReader.read(sha) ──▶ hot ─▶ warm ─▶ cold (first hit)     │
//! │         │                   ▲                                   │
//! │         │                   └── promote (aggressive policy)     │
//! │         ▼                                                       │
//! │  AccessTracker.record_access(sha) ──▶ AccessPatternStore        │
//! │                                                                 │
//! │                 TierMigrationScheduler                          │
//! │   (durable alarm; batch_size objects per cycle; backoff/pause)  │
//! │                        │                                        │
//! │                        ▼                                        │
//! │              TieredStorageBackend (MigratorBackend)             │
//! │                        │                                        │
//! │                        ▼                                        │
//! │                   TierMigrator                                  │
//! │   lock ─▶ copy ─▶ verify ─▶ relocate ─▶ delete source           │
//! │     │                 └── any failure: MigrationRollback        │
//! │     │                                                           │
//! │  Hot Tier ─────────▶ Warm Tier ─────────▶ Cold Tier             │
//! │                                                                 │
//! │  ConcurrentAccessHandler: reads/writes while a job is open      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use edgit_core::{MigrationPolicy, ObjectId, ObjectType, StoredObject, Tier};
//! use edgit_storage::tiering_manager::{
//!     AccessTracker, MigrationOptions, MigratorBackend, TierMigrationScheduler, TierMigrator,
//! };
//! use edgit_storage::{MemoryControlPlane, MemoryTierStorage};
//! use std::sync::Arc;
//!
//! # async fn example() -> edgit_core::CoreResult<()> {
//! let storage = MemoryTierStorage::shared();
//! let sha = ObjectId::parse(&"a".repeat(40))?;
//! storage.seed(Tier::Hot, StoredObject::new(sha.clone(), ObjectType::Blob, "hello"));
//!
//! // Migrate one object directly
//! let migrator = Arc::new(TierMigrator::new(storage.clone()));
//! let outcome = migrator
//!     .migrate(&sha, Tier::Hot, Tier::Warm, MigrationOptions::verified())
//!     .await;
//! assert!(outcome.is_ok());
//!
//! // Or let the scheduler drive it
//! let control = Arc::new(MemoryControlPlane::new());
//! let tracker = Arc::new(AccessTracker::new(storage.clone(), control.clone()));
//! let backend = Arc::new(MigratorBackend::new(storage.clone(), migrator, tracker));
//! let mut scheduler = TierMigrationScheduler::new(backend, control, MigrationPolicy::default())?;
//! scheduler.initialize().await?;
//! scheduler.start_worker();
//! # Ok(())
//! # }
//! ```

mod access_handler;
mod backend;
mod job;
mod migrator;
mod reader;
mod rollback;
mod scheduler;
mod state;
mod tracker;

pub use access_handler::ConcurrentAccessHandler;
pub use backend::{MigratorBackend, ObjectMigration, TieredStorageBackend};
pub use job::{JobState, MigrationJob, MigrationProgress};
pub use migrator::{
    checksum, BatchMigrationResult, CandidateCriteria, MigrationError, MigrationErrorKind,
    MigrationOptions, MigrationOutcome, MigrationResult, SkipReason, TierMigrator,
    DEFAULT_LOCK_TIMEOUT,
};
pub use reader::{TierBackend, TierConfig, TieredReadResult, TieredReader, TieredReaderConfig};
pub use rollback::MigrationRollback;
pub use scheduler::{MigrationCycleResult, ObjectFailure, TierMigrationScheduler};
pub use state::{
    AccessKind, AccessMetrics, AccessPattern, HistoryState, MigrationCandidate,
    MigrationHistoryEntry, SchedulerState,
};
pub use tracker::{AccessStats, AccessSummary, AccessTracker, ColdObjectCriteria, DecayOptions};
