use chrono::{DateTime, Utc};
use edgit_core::{ObjectId, ObjectType, Tier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of access recorded against an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

/// Optional measurements attached to a recorded access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessMetrics {
    pub bytes_read: Option<u64>,
    pub latency_ms: Option<u64>,
}

/// Per-object access statistics.
///
/// Created on first recorded access, grown additively, scaled down by decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPattern {
    pub sha: ObjectId,
    pub read_count: u64,
    pub write_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub total_bytes_read: u64,
    pub total_latency_ms: u64,
    pub access_count: u64,
}

impl AccessPattern {
    pub(crate) fn new(sha: ObjectId, now: DateTime<Utc>) -> Self {
        Self {
            sha,
            read_count: 0,
            write_count: 0,
            last_accessed_at: now,
            created_at: now,
            total_bytes_read: 0,
            total_latency_ms: 0,
            access_count: 0,
        }
    }

    /// Reads plus writes.
    #[must_use]
    pub fn total_accesses(&self) -> u64 {
        self.read_count + self.write_count
    }
}

/// Read-only view of an object eligible for policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationCandidate {
    pub sha: ObjectId,
    pub object_type: ObjectType,
    pub size: u64,
    pub tier: Tier,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Terminal state recorded in the migration audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryState {
    Completed,
    RolledBack,
    Cancelled,
    Failed,
}

impl HistoryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryState::Completed => "completed",
            HistoryState::RolledBack => "rolled_back",
            HistoryState::Cancelled => "cancelled",
            HistoryState::Failed => "failed",
        }
    }
}

impl std::str::FromStr for HistoryState {
    type Err = edgit_core::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(HistoryState::Completed),
            "rolled_back" => Ok(HistoryState::RolledBack),
            "cancelled" => Ok(HistoryState::Cancelled),
            "failed" => Ok(HistoryState::Failed),
            _ => Err(edgit_core::CoreError::invalid_state(format!(
                "Invalid history state: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for HistoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record of one migration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationHistoryEntry {
    pub sha: ObjectId,
    pub source_tier: Tier,
    pub target_tier: Tier,
    pub state: HistoryState,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationHistoryEntry {
    pub fn new(
        sha: ObjectId,
        source_tier: Tier,
        target_tier: Tier,
        state: HistoryState,
        error: Option<String>,
    ) -> Self {
        Self {
            sha,
            source_tier,
            target_tier,
            state,
            timestamp: Utc::now(),
            error,
        }
    }
}

/// Durable scheduler singleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub consecutive_failures: u32,
    pub last_migration_at: Option<DateTime<Utc>>,
    pub next_migration_at: Option<DateTime<Utc>>,
    pub total_migrated: u64,
    pub total_bytes_migrated: u64,
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
}
