//! Vault material and draft storage ports

use async_trait::async_trait;
use domain::{Draft, DraftId, VaultMaterial};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for the singleton vault record (salt and verification tag)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VaultMaterialStorePort: Send + Sync {
    /// Load the vault record, `None` if the vault was never enabled
    async fn load(&self) -> Result<Option<VaultMaterial>, ApplicationError>;

    /// Store the vault record
    async fn save(&self, material: &VaultMaterial) -> Result<(), ApplicationError>;
}

/// Port for draft persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DraftStorePort: Send + Sync {
    /// Insert or replace a draft
    async fn save(&self, draft: &Draft) -> Result<(), ApplicationError>;

    /// Get a draft by ID
    async fn get(&self, id: &DraftId) -> Result<Option<Draft>, ApplicationError>;

    /// List all drafts, most recently updated first
    async fn list(&self) -> Result<Vec<Draft>, ApplicationError>;

    /// Delete a draft
    ///
    /// # Returns
    /// true if the draft was deleted, false if it didn't exist
    async fn delete(&self, id: &DraftId) -> Result<bool, ApplicationError>;

    /// Number of drafts stored encrypted
    async fn count_encrypted(&self) -> Result<usize, ApplicationError>;
}
