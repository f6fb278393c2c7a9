//! Daemon configuration.
//!
//! Built-in defaults, then a YAML or TOML file, then `EDGIT_*` environment
//! overrides. The merged result is validated before use.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::policy::{AccessTrackingConfig, MigrationPolicy, PromotionPolicy};

/// Root configuration structure for edgit
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EdgitConfig {
    #[serde(default)]
    pub migration: MigrationPolicy,

    #[serde(default)]
    pub access_tracking: AccessTrackingConfig,

    #[serde(default)]
    pub reader: ReaderConfig,

    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
}

impl EdgitConfig {
    /// Merges `/etc/edgit/edgit.yaml`, `./config/edgit.yaml` and `$EDGIT_CONFIG`,
    /// later files winning. `EDGIT_*` variables override all of them.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?
            .add_source(File::with_name("/etc/edgit/edgit").required(false))
            .add_source(File::with_name("./config/edgit").required(false));

        if let Ok(config_path) = std::env::var("EDGIT_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        // Example: EDGIT_MIGRATION__BATCH_SIZE=100
        builder = builder.add_source(
            Environment::with_prefix("EDGIT")
                .separator("__")
                .try_parsing(true),
        );

        let config: EdgitConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path (defaults fill the gaps)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: EdgitConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let migration = MigrationPolicy::default();
        let tracking = AccessTrackingConfig::default();
        builder
            .set_default("migration.hot_to_warm_age_ms", migration.hot_to_warm_age_ms)?
            .set_default("migration.warm_to_cold_age_ms", migration.warm_to_cold_age_ms)?
            .set_default(
                "migration.min_access_count_for_hot",
                migration.min_access_count_for_hot,
            )?
            .set_default("migration.max_hot_tier_bytes", migration.max_hot_tier_bytes)?
            .set_default("migration.batch_size", migration.batch_size as u64)?
            .set_default("migration.concurrency", migration.concurrency as u64)?
            .set_default("migration.migration_interval_ms", migration.migration_interval_ms)?
            .set_default(
                "migration.max_consecutive_failures",
                migration.max_consecutive_failures,
            )?
            .set_default("migration.backoff_base_delay_ms", migration.backoff_base_delay_ms)?
            .set_default("migration.backoff_multiplier", migration.backoff_multiplier)?
            .set_default("migration.max_backoff_delay_ms", migration.max_backoff_delay_ms)?
            .set_default("access_tracking.decay_factor", tracking.decay_factor)?
            .set_default(
                "access_tracking.min_age_for_decay_ms",
                tracking.min_age_for_decay_ms,
            )?
            .set_default(
                "access_tracking.decay_interval_secs",
                tracking.decay_interval_secs,
            )?
            .set_default("reader.promotion_policy", "none")?
            .set_default("reader.hot_enabled", true)?
            .set_default("reader.warm_enabled", true)?
            .set_default("reader.cold_enabled", true)?
            .set_default("control_plane.database_url", "sqlite://edgit-control.db")
    }

    /// Rejects policies the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.migration
            .validate()
            .map_err(|e| ConfigError::Message(format!("migration: {e}")))?;
        self.access_tracking
            .validate()
            .map_err(|e| ConfigError::Message(format!("access_tracking: {e}")))?;

        if !(self.reader.hot_enabled || self.reader.warm_enabled || self.reader.cold_enabled) {
            return Err(ConfigError::Message(
                "reader: at least one tier must be enabled".to_string(),
            ));
        }

        if self.control_plane.database_url.is_empty() {
            return Err(ConfigError::Message(
                "control_plane.database_url must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read-path configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub promotion_policy: PromotionPolicy,

    #[serde(default = "default_true")]
    pub hot_enabled: bool,

    #[serde(default = "default_true")]
    pub warm_enabled: bool,

    #[serde(default = "default_true")]
    pub cold_enabled: bool,

    /// Objects larger than this are never promoted to hot
    #[serde(default)]
    pub hot_max_size: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            promotion_policy: PromotionPolicy::None,
            hot_enabled: true,
            warm_enabled: true,
            cold_enabled: true,
            hot_max_size: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Durable control-plane (scheduler state, history, access patterns)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlPlaneConfig {
    pub database_url: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://edgit-control.db".to_string(),
        }
    }
}
