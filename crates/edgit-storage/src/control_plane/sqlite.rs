use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use edgit_core::{CoreError, MigrationPolicy, ObjectId, Tier};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{query, Row, SqlitePool};
use std::str::FromStr;

use super::ControlPlaneStore;
use crate::backend::AccessPatternStore;
use crate::error::Result;
use crate::tiering_manager::{AccessPattern, HistoryState, MigrationHistoryEntry, SchedulerState};

const STATE_KEY: &str = "scheduler_state";
const POLICY_KEY: &str = "migration_policy";
const ALARM_KEY: &str = "alarm";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS control_documents (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sha TEXT NOT NULL,
        source_tier TEXT NOT NULL,
        target_tier TEXT NOT NULL,
        state TEXT NOT NULL,
        error TEXT,
        timestamp TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_migration_history_sha ON migration_history (sha)",
    r#"
    CREATE TABLE IF NOT EXISTS access_patterns (
        sha TEXT PRIMARY KEY,
        read_count INTEGER NOT NULL,
        write_count INTEGER NOT NULL,
        access_count INTEGER NOT NULL,
        total_bytes_read INTEGER NOT NULL,
        total_latency_ms INTEGER NOT NULL,
        last_accessed_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
];

/// SQLite-backed [`ControlPlaneStore`] and [`AccessPatternStore`].
pub struct SqliteControlPlane {
    pool: SqlitePool,
}

impl SqliteControlPlane {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_error)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let store = Self::new(pool);
        store.init_schema().await?;
        tracing::info!(url, "Opened control plane database");
        Ok(store)
    }

    /// Wrap an existing pool. Call [`init_schema`](Self::init_schema) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        Ok(())
    }

    async fn get_document(&self, key: &str) -> Result<Option<String>> {
        let row = query("SELECT value FROM control_documents WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(|row| row.try_get::<String, _>("value").map_err(db_error))
            .transpose()
    }

    async fn put_document(&self, key: &str, value: &str) -> Result<()> {
        query(
            r#"
            INSERT INTO control_documents (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(db_error)
    }

    async fn delete_document(&self, key: &str) -> Result<()> {
        query("DELETE FROM control_documents WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_error)
    }
}

#[async_trait]
impl ControlPlaneStore for SqliteControlPlane {
    async fn load_state(&self) -> Result<Option<SchedulerState>> {
        match self.get_document(STATE_KEY).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, state: &SchedulerState) -> Result<()> {
        self.put_document(STATE_KEY, &serde_json::to_string(state)?)
            .await
    }

    async fn append_history(&self, entry: &MigrationHistoryEntry) -> Result<()> {
        query(
            r#"
            INSERT INTO migration_history (sha, source_tier, target_tier, state, error, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.sha.as_str())
        .bind(entry.source_tier.as_str())
        .bind(entry.target_tier.as_str())
        .bind(entry.state.as_str())
        .bind(entry.error.as_deref())
        .bind(timestamp(entry.timestamp))
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(db_error)
    }

    async fn list_history(&self, limit: usize, offset: usize) -> Result<Vec<MigrationHistoryEntry>> {
        let rows = query(
            r#"
            SELECT sha, source_tier, target_tier, state, error, timestamp
            FROM migration_history
            ORDER BY id DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(history_from_row).collect()
    }

    async fn load_policy(&self) -> Result<Option<MigrationPolicy>> {
        match self.get_document(POLICY_KEY).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_policy(&self, policy: &MigrationPolicy) -> Result<()> {
        self.put_document(POLICY_KEY, &serde_json::to_string(policy)?)
            .await
    }

    async fn set_alarm(&self, at: DateTime<Utc>) -> Result<()> {
        self.put_document(ALARM_KEY, &timestamp(at)).await
    }

    async fn get_alarm(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_document(ALARM_KEY)
            .await?
            .map(|value| parse_timestamp(&value))
            .transpose()
    }

    async fn delete_alarm(&self) -> Result<()> {
        self.delete_document(ALARM_KEY).await
    }
}

#[async_trait]
impl AccessPatternStore for SqliteControlPlane {
    async fn save_pattern(&self, pattern: &AccessPattern) -> Result<()> {
        query(
            r#"
            INSERT INTO access_patterns (
                sha, read_count, write_count, access_count,
                total_bytes_read, total_latency_ms, last_accessed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(sha) DO UPDATE SET
                read_count = excluded.read_count,
                write_count = excluded.write_count,
                access_count = excluded.access_count,
                total_bytes_read = excluded.total_bytes_read,
                total_latency_ms = excluded.total_latency_ms,
                last_accessed_at = excluded.last_accessed_at
            "#,
        )
        .bind(pattern.sha.as_str())
        .bind(pattern.read_count as i64)
        .bind(pattern.write_count as i64)
        .bind(pattern.access_count as i64)
        .bind(pattern.total_bytes_read as i64)
        .bind(pattern.total_latency_ms as i64)
        .bind(timestamp(pattern.last_accessed_at))
        .bind(timestamp(pattern.created_at))
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(db_error)
    }

    async fn load_patterns(&self) -> Result<Vec<AccessPattern>> {
        let rows = query(
            r#"
            SELECT sha, read_count, write_count, access_count,
                   total_bytes_read, total_latency_ms, last_accessed_at, created_at
            FROM access_patterns
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(pattern_from_row).collect()
    }
}

fn history_from_row(row: &SqliteRow) -> Result<MigrationHistoryEntry> {
    let sha: String = row.try_get("sha").map_err(db_error)?;
    let source_tier: String = row.try_get("source_tier").map_err(db_error)?;
    let target_tier: String = row.try_get("target_tier").map_err(db_error)?;
    let state: String = row.try_get("state").map_err(db_error)?;
    let at: String = row.try_get("timestamp").map_err(db_error)?;

    Ok(MigrationHistoryEntry {
        sha: ObjectId::parse(&sha)?,
        source_tier: Tier::from_str(&source_tier)?,
        target_tier: Tier::from_str(&target_tier)?,
        state: HistoryState::from_str(&state)?,
        timestamp: parse_timestamp(&at)?,
        error: row.try_get("error").map_err(db_error)?,
    })
}

fn pattern_from_row(row: &SqliteRow) -> Result<AccessPattern> {
    let sha: String = row.try_get("sha").map_err(db_error)?;
    let count = |column: &str| -> Result<u64> {
        row.try_get::<i64, _>(column)
            .map(|value| value.max(0) as u64)
            .map_err(db_error)
    };
    let last_accessed_at: String = row.try_get("last_accessed_at").map_err(db_error)?;
    let created_at: String = row.try_get("created_at").map_err(db_error)?;

    Ok(AccessPattern {
        sha: ObjectId::parse(&sha)?,
        read_count: count("read_count")?,
        write_count: count("write_count")?,
        access_count: count("access_count")?,
        total_bytes_read: count("total_bytes_read")?,
        total_latency_ms: count("total_latency_ms")?,
        last_accessed_at: parse_timestamp(&last_accessed_at)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CoreError::Deserialization(format!("bad timestamp `{value}`: {e}")))
}

fn db_error(e: sqlx::Error) -> CoreError {
    CoreError::storage(e.to_string())
}
