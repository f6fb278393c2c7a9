use chrono::{DateTime, Utc};
use edgit_core::{JobId, ObjectId, Tier};
use serde::{Deserialize, Serialize};

/// Lifecycle of a job-based migration.
///
/// `InProgress` ends in exactly one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    InProgress,
    Completed,
    RolledBack,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Long-running migration tracked by the migrator until it terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub id: JobId,
    pub sha: ObjectId,
    pub source_tier: Tier,
    pub target_tier: Tier,
    pub state: JobState,
    pub lock_acquired: bool,
    pub progress: MigrationProgress,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationJob {
    pub(crate) fn start(sha: ObjectId, source_tier: Tier, target_tier: Tier) -> Self {
        Self {
            id: JobId::new(),
            sha,
            source_tier,
            target_tier,
            state: JobState::InProgress,
            lock_acquired: false,
            progress: MigrationProgress::default(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub(crate) fn finish(&mut self, state: JobState) {
        self.state = state;
        self.completed_at = Some(Utc::now());
    }
}
