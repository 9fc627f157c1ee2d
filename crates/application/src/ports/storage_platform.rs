//! Storage platform port

use async_trait::async_trait;
use domain::StorageEstimate;
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for platform storage signals
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoragePlatformPort: Send + Sync {
    /// Current usage and quota
    async fn estimate(&self) -> Result<StorageEstimate, ApplicationError>;

    /// Ask the platform to keep local data from being evicted
    ///
    /// # Returns
    /// Whether persistence was granted
    async fn request_persistence(&self) -> Result<bool, ApplicationError>;
}
