//! Identifier remapping port

use async_trait::async_trait;
use domain::{EntityId, EntityType};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Rows touched by a remap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapSummary {
    pub queue_items: usize,
    pub cached_entities: usize,
    pub conflicts: usize,
}

/// Port for replacing an entity id everywhere it is referenced
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdRemapPort: Send + Sync {
    /// Rewrite `from` to `to` across the queue, cache and conflict records
    /// in one transaction
    async fn remap(
        &self,
        entity_type: &EntityType,
        from: &EntityId,
        to: &EntityId,
    ) -> Result<RemapSummary, ApplicationError>;
}
