//! Sync queue storage port
//!
//! Persistence for queued mutations. Every method is a single atomic
//! write or read; callers never hold a transaction across calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{EntityId, EntityType, QueueItemId, SyncQueueItem, SyncStatus};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Item counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub synced: usize,
}

impl QueueStats {
    /// Items that still need delivery
    pub const fn outstanding(&self) -> usize {
        self.pending + self.in_flight + self.failed
    }
}

/// Port for the persistent sync queue
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SyncQueueStorePort: Send + Sync {
    /// Append a new item
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<(), ApplicationError>;

    /// Get an item by ID
    async fn get(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, ApplicationError>;

    /// List items in FIFO order, optionally filtered by status
    ///
    /// Order is `created_at`, ties broken by insertion order.
    async fn list(
        &self,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncQueueItem>, ApplicationError>;

    /// Overwrite an item's mutable fields
    async fn update(&self, item: &SyncQueueItem) -> Result<(), ApplicationError>;

    /// Atomically move a pending item to in_flight
    ///
    /// Succeeds only if the item is still pending and no other item for the
    /// same entity is in flight.
    ///
    /// # Returns
    /// true if the claim succeeded
    async fn try_claim(&self, id: &QueueItemId) -> Result<bool, ApplicationError>;

    /// Return an in_flight item to pending, leaving its other fields alone
    ///
    /// # Returns
    /// true if the item was in flight
    async fn release(&self, id: &QueueItemId) -> Result<bool, ApplicationError>;

    /// Move the freshness base of an entity's outstanding items forward to `at`
    ///
    /// # Returns
    /// The number of items whose base changed
    async fn advance_base(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<usize, ApplicationError>;

    /// Delete an item
    ///
    /// # Returns
    /// true if the item was deleted, false if it didn't exist
    async fn delete(&self, id: &QueueItemId) -> Result<bool, ApplicationError>;

    /// Delete all synced items
    ///
    /// # Returns
    /// The number of items deleted
    async fn delete_synced(&self) -> Result<usize, ApplicationError>;

    /// Count items per status
    async fn stats(&self) -> Result<QueueStats, ApplicationError>;
}
