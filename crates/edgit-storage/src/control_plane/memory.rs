use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgit_core::{CoreError, MigrationPolicy, ObjectId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use super::ControlPlaneStore;
use crate::backend::AccessPatternStore;
use crate::error::Result;
use crate::tiering_manager::{AccessPattern, MigrationHistoryEntry, SchedulerState};

/// In-memory [`ControlPlaneStore`].
///
/// `fail_state_loads` makes the next N `load_state` calls fail, which the
/// scheduler surfaces as cycle-level failures. `fail_history_appends` does the
/// same for `append_history`.
#[derive(Default)]
pub struct MemoryControlPlane {
    state: RwLock<Option<SchedulerState>>,
    history: RwLock<Vec<MigrationHistoryEntry>>,
    policy: RwLock<Option<MigrationPolicy>>,
    alarm: RwLock<Option<DateTime<Utc>>>,
    patterns: RwLock<HashMap<ObjectId, AccessPattern>>,
    failing_state_loads: Mutex<usize>,
    failing_history_appends: Mutex<usize>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_state_loads(&self, count: usize) {
        *self.failing_state_loads.lock() = count;
    }

    pub fn fail_history_appends(&self, count: usize) {
        *self.failing_history_appends.lock() = count;
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

#[async_trait]
impl ControlPlaneStore for MemoryControlPlane {
    async fn load_state(&self) -> Result<Option<SchedulerState>> {
        {
            let mut failing = self.failing_state_loads.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(CoreError::storage("control plane unavailable"));
            }
        }
        Ok(self.state.read().clone())
    }

    async fn save_state(&self, state: &SchedulerState) -> Result<()> {
        *self.state.write() = Some(state.clone());
        Ok(())
    }

    async fn append_history(&self, entry: &MigrationHistoryEntry) -> Result<()> {
        {
            let mut failing = self.failing_history_appends.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(CoreError::storage("history table unavailable"));
            }
        }
        self.history.write().push(entry.clone());
        Ok(())
    }

    async fn list_history(&self, limit: usize, offset: usize) -> Result<Vec<MigrationHistoryEntry>> {
        Ok(self
            .history
            .read()
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn load_policy(&self) -> Result<Option<MigrationPolicy>> {
        Ok(self.policy.read().clone())
    }

    async fn save_policy(&self, policy: &MigrationPolicy) -> Result<()> {
        *self.policy.write() = Some(policy.clone());
        Ok(())
    }

    async fn set_alarm(&self, at: DateTime<Utc>) -> Result<()> {
        *self.alarm.write() = Some(at);
        Ok(())
    }

    async fn get_alarm(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(*self.alarm.read())
    }

    async fn delete_alarm(&self) -> Result<()> {
        *self.alarm.write() = None;
        Ok(())
    }
}

#[async_trait]
impl AccessPatternStore for MemoryControlPlane {
    async fn save_pattern(&self, pattern: &AccessPattern) -> Result<()> {
        self.patterns
            .write()
            .insert(pattern.sha.clone(), pattern.clone());
        Ok(())
    }

    async fn load_patterns(&self) -> Result<Vec<AccessPattern>> {
        Ok(self.patterns.read().values().cloned().collect())
    }
}
