//! Storage platform adapter for the SQLite database file
//!
//! Usage is the allocated size of the database (`page_count * page_size`);
//! the quota comes from configuration. Persistence is granted when the
//! database lives on disk.

use application::{error::ApplicationError, ports::StoragePlatformPort};
use async_trait::async_trait;
use domain::StorageEstimate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::persistence::{AsyncDatabase, error::map_sqlx_error};

/// Storage quota configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bytes the installation may use; 0 means unknown (default: 500 MiB)
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
}

const fn default_quota_bytes() -> u64 {
    500 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota_bytes(),
        }
    }
}

/// Reports database file usage against a configured quota
#[derive(Debug, Clone)]
pub struct SqliteStoragePlatform {
    db: AsyncDatabase,
    quota_bytes: u64,
}

impl SqliteStoragePlatform {
    #[must_use]
    pub const fn new(db: AsyncDatabase, config: StorageConfig) -> Self {
        Self {
            db,
            quota_bytes: config.quota_bytes,
        }
    }
}

#[async_trait]
impl StoragePlatformPort for SqliteStoragePlatform {
    async fn estimate(&self) -> Result<StorageEstimate, ApplicationError> {
        let (page_count,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;
        let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
            .fetch_one(self.db.pool())
            .await
            .map_err(map_sqlx_error)?;

        let usage_bytes = u64::try_from(page_count.saturating_mul(page_size)).unwrap_or(0);
        Ok(StorageEstimate {
            usage_bytes,
            quota_bytes: self.quota_bytes,
        })
    }

    #[instrument(skip(self))]
    async fn request_persistence(&self) -> Result<bool, ApplicationError> {
        let granted = self.db.is_durable();
        debug!(granted, "Persistence requested");
        Ok(granted)
    }
}
