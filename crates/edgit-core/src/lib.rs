//! Core domain types for the edgit tiered object store.

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod object;
pub mod policy;
pub mod tier;

pub use config::{ControlPlaneConfig, EdgitConfig, ReaderConfig};
pub use error::{CoreError, CoreResult};
pub use ids::{JobId, ObjectId, OBJECT_ID_HEX_LEN};
pub use object::{ObjectType, StoredObject};
pub use policy::{AccessTrackingConfig, MigrationPolicy, PromotionPolicy};
pub use tier::{Tier, TierLocation};
