//! Entity cache port
//!
//! Durable read-through cache of remote entities, keyed by type and id.

use async_trait::async_trait;
use domain::{CachedEntity, EntityId, EntityType};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for cached entities
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EntityCachePort: Send + Sync {
    /// Get a cached entity
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, ApplicationError>;

    /// Insert or replace a cached entity
    async fn put(&self, entity: &CachedEntity) -> Result<(), ApplicationError>;

    /// Remove a cached entity
    ///
    /// # Returns
    /// true if an entry was removed
    async fn remove(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<bool, ApplicationError>;

    /// Remove every entity of a type
    async fn remove_type(&self, entity_type: &EntityType) -> Result<usize, ApplicationError>;

    /// List cached entities, optionally of one type
    async fn list(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<CachedEntity>, ApplicationError>;

    /// Sum of `size_bytes` over all entries
    async fn total_size(&self) -> Result<u64, ApplicationError>;

    /// Evict server-confirmed entries, least recently cached first, until the
    /// total size is at most `max_bytes`
    ///
    /// Optimistic entries that the server has not confirmed are never evicted.
    ///
    /// # Returns
    /// The number of entries evicted
    async fn evict_lru(&self, max_bytes: u64) -> Result<usize, ApplicationError>;

    /// Remove all entries
    async fn clear(&self) -> Result<usize, ApplicationError>;
}
