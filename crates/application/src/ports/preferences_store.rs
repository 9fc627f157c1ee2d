//! Cache preferences storage port

use async_trait::async_trait;
use domain::CachePreferences;
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for the singleton preferences record
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PreferencesStorePort: Send + Sync {
    /// Load the stored preferences, `None` on first use
    async fn load(&self) -> Result<Option<CachePreferences>, ApplicationError>;

    /// Store the preferences, replacing any previous value
    async fn save(&self, preferences: &CachePreferences) -> Result<(), ApplicationError>;
}
