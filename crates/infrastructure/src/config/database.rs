//! Database (SQLite) configuration.

use serde::{Deserialize, Serialize};

use crate::persistence::AsyncDatabaseConfig;

/// Path value that selects a throwaway in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// SQLite database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Maximum number of concurrent database connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Whether to run pending migrations on startup (default: true)
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_db_path() -> String {
    "offline-sync.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Pool settings for this database
    pub fn pool_config(&self) -> AsyncDatabaseConfig {
        if self.path == IN_MEMORY_PATH {
            AsyncDatabaseConfig::in_memory()
        } else {
            AsyncDatabaseConfig {
                max_connections: self.max_connections,
                ..AsyncDatabaseConfig::file(&self.path)
            }
        }
    }
}
