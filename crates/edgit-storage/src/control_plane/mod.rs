//! Durable control plane for the migration scheduler
//!
//! Holds the scheduler singleton state, the active policy, the audit trail of
//! migrations and the single pending alarm. Two implementations:
//!
//! - [`MemoryControlPlane`]: process-local, for tests and ephemeral runs
//! - [`SqliteControlPlane`]: `sqlx` SQLite; state and policy as JSON
//!   documents, history and access patterns as rows
//!
//! Both also implement [`AccessPatternStore`](crate::AccessPatternStore) so
//! the access tracker can persist through the same database.

mod memory;
mod sqlite;

pub use memory::MemoryControlPlane;
pub use sqlite::SqliteControlPlane;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgit_core::MigrationPolicy;

use crate::error::Result;
use crate::tiering_manager::{MigrationHistoryEntry, SchedulerState};

#[async_trait]
pub trait ControlPlaneStore: Send + Sync {
    // === Scheduler state ===

    /// `None` until the first save.
    async fn load_state(&self) -> Result<Option<SchedulerState>>;
    async fn save_state(&self, state: &SchedulerState) -> Result<()>;

    // === Audit trail ===

    async fn append_history(&self, entry: &MigrationHistoryEntry) -> Result<()>;

    /// Newest first.
    async fn list_history(&self, limit: usize, offset: usize) -> Result<Vec<MigrationHistoryEntry>>;

    // === Policy ===

    async fn load_policy(&self) -> Result<Option<MigrationPolicy>>;
    async fn save_policy(&self, policy: &MigrationPolicy) -> Result<()>;

    // === Alarm ===

    /// Replaces any pending alarm.
    async fn set_alarm(&self, at: DateTime<Utc>) -> Result<()>;
    async fn get_alarm(&self) -> Result<Option<DateTime<Utc>>>;
    async fn delete_alarm(&self) -> Result<()>;
}
