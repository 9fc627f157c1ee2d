//! Application configuration
//!
//! Layered with the `config` crate: serde defaults, then an optional
//! `config.toml`, then `OFFLINE_SYNC__SECTION__KEY` environment variables.

mod database;

use std::{path::Path, time::Duration};

use application::{ConflictStrategies, RetryPolicy, SyncEngineConfig};
use domain::KeyDerivationParams;
use serde::{Deserialize, Serialize};

pub use database::{DatabaseConfig, IN_MEMORY_PATH};

use crate::{
    adapters::{RemoteConfig, StorageConfig},
    persistence::EntityCacheConfig,
    telemetry::LoggingConfig,
};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OFFLINE_SYNC";

/// Separator between prefix, section and key in environment variables
pub const ENV_SEPARATOR: &str = "__";

/// Queue draining and conflict settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Items sent per drain (default: 50)
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Backoff for transient delivery failures
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Conflict strategy, with per entity type overrides
    #[serde(default)]
    pub conflicts: ConflictStrategies,
}

const fn default_max_batch() -> usize {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            retry: RetryPolicy::default(),
            conflicts: ConflictStrategies::default(),
        }
    }
}

/// In-memory read layer of the entity cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Capacity in megabytes (default: 16)
    #[serde(default = "default_memory_capacity_mb")]
    pub memory_capacity_mb: u64,

    /// Idle time before an entry is dropped, in seconds (default: 600)
    #[serde(default = "default_time_to_idle_secs")]
    pub time_to_idle_secs: u64,
}

const fn default_memory_capacity_mb() -> u64 {
    16
}

const fn default_time_to_idle_secs() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity_mb: default_memory_capacity_mb(),
            time_to_idle_secs: default_time_to_idle_secs(),
        }
    }
}

impl From<CacheConfig> for EntityCacheConfig {
    fn from(config: CacheConfig) -> Self {
        Self {
            memory_capacity_mb: config.memory_capacity_mb,
            time_to_idle: Duration::from_secs(config.time_to_idle_secs),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    /// Key derivation for newly enabled vaults
    #[serde(default)]
    pub vault: KeyDerivationParams,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from `config.toml` in the working directory and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_with(None, None)
    }

    /// Load from an explicit file (required to exist) and the environment
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        Self::load_with(Some(path), None)
    }

    fn load_with(
        path: Option<&Path>,
        env_overrides: Option<config::Map<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("config").required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env_overrides),
            );

        builder.build()?.try_deserialize()
    }

    /// Engine settings assembled from the sync and vault sections
    pub fn engine_config(&self) -> SyncEngineConfig {
        SyncEngineConfig {
            max_batch: self.sync.max_batch,
            retry: self.sync.retry.clone(),
            conflicts: self.sync.conflicts.clone(),
            kdf: self.vault.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use domain::{ConflictStrategy, EntityType};

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_without_sources() {
        let config = AppConfig::load_with(None, env(&[])).unwrap();
        assert_eq!(config.database, DatabaseConfig::default());
        assert_eq!(config.sync.max_batch, 50);
        assert_eq!(config.sync.retry.max_retries, 3);
        assert_eq!(config.sync.conflicts.default, ConflictStrategy::LocalWins);
        assert_eq!(config.vault.algorithm, "argon2id");
    }

    #[test]
    fn environment_overrides_nested_keys() {
        let config = AppConfig::load_with(
            None,
            env(&[
                ("OFFLINE_SYNC__SYNC__MAX_BATCH", "7"),
                ("OFFLINE_SYNC__SYNC__RETRY__MAX_RETRIES", "9"),
                ("OFFLINE_SYNC__REMOTE__BASE_URL", "https://sync.example.com"),
                ("OFFLINE_SYNC__DATABASE__PATH", ":memory:"),
            ]),
        )
        .unwrap();
        assert_eq!(config.sync.max_batch, 7);
        assert_eq!(config.sync.retry.max_retries, 9);
        assert_eq!(config.remote.base_url, "https://sync.example.com");
        assert!(config.database.pool_config().is_in_memory());
    }

    #[test]
    fn file_sets_conflict_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[sync.conflicts]
default = "manual"

[sync.conflicts.overrides]
invoices = "remote-wins"

[vault]
algorithm = "argon2id"
memory_kib = 8192
iterations = 3
parallelism = 1
"#
        )
        .unwrap();

        let config = AppConfig::load_with(Some(file.path()), env(&[])).unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.conflicts.default, ConflictStrategy::Manual);
        assert_eq!(
            engine
                .conflicts
                .for_type(&EntityType::new("invoices").unwrap()),
            ConflictStrategy::RemoteWins
        );
        assert_eq!(engine.kdf.memory_kib, 8192);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(AppConfig::load_from(Path::new("/nonexistent/offline-sync.toml")).is_err());
    }

    #[test]
    fn cache_config_converts_to_durations() {
        let cache: EntityCacheConfig = CacheConfig::default().into();
        assert_eq!(cache.time_to_idle, Duration::from_secs(600));
    }
}
