//! Infrastructure layer - Adapters for external systems
//!
//! Implements the application ports on SQLite (sqlx), a REST remote service
//! (reqwest) and Argon2id/XChaCha20-Poly1305, plus configuration loading and
//! logging setup.

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod persistence;
pub mod telemetry;

pub use adapters::*;
pub use bootstrap::{BootstrapError, SyncRuntime, assemble, build_runtime};
pub use config::{AppConfig, CacheConfig, DatabaseConfig, SyncConfig};
pub use persistence::{
    AsyncDatabase, AsyncDatabaseConfig, AsyncDatabaseError, SqliteConflictStore, SqliteDraftStore,
    SqliteEntityCache, SqliteIdRemap, SqlitePreferencesStore, SqliteSyncQueueStore,
    SqliteVaultMaterialStore,
};
pub use telemetry::{LogFormat, LoggingConfig, init_logging};
