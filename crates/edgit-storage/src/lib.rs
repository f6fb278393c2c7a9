pub mod backend;
pub mod control_plane;
pub mod error;
pub mod memory;
pub mod tiering_manager;

pub use backend::{AccessLogEntry, AccessPatternStore, TierObjectInfo, TierStorage};
pub use control_plane::{ControlPlaneStore, MemoryControlPlane, SqliteControlPlane};
pub use error::Result;
pub use memory::{Fault, MemoryObjectTier, MemoryStorageConfig, MemoryTierStorage, StorageOp};
pub use tiering_manager::{
    AccessTracker, MigrationError, MigrationErrorKind, MigrationOptions, MigrationOutcome,
    MigratorBackend, TierBackend, TierMigrationScheduler, TierMigrator, TieredReader,
    TieredStorageBackend,
};
