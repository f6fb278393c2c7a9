use edgit_core::{CoreResult, ObjectId, StoredObject, Tier};
use std::sync::Arc;

use crate::backend::TierStorage;

/// Read/write mediation for objects that may be mid-migration.
///
/// The source copy is only deleted after the location table points at the
/// target, so hot is authoritative while a copy is in flight and warm covers
/// objects whose migration already finished. Takes no locks.
pub struct ConcurrentAccessHandler {
    storage: Arc<dyn TierStorage>,
}

impl ConcurrentAccessHandler {
    pub fn new(storage: Arc<dyn TierStorage>) -> Self {
        Self { storage }
    }

    /// Hot first, then warm.
    pub async fn handle_read(&self, sha: &ObjectId) -> CoreResult<Option<StoredObject>> {
        if let Some(object) = self.storage.get_object(Tier::Hot, sha).await? {
            return Ok(Some(object));
        }
        self.storage.get_object(Tier::Warm, sha).await
    }

    /// Writes always land in hot.
    pub async fn handle_write(&self, object: &StoredObject) -> CoreResult<()> {
        self.storage.put_object(Tier::Hot, object).await
    }
}
