//! Conflict record entity - Audit trail of divergent local and remote state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entities::SyncQueueItem,
    errors::DomainError,
    value_objects::{
        ConflictId, ConflictStrategy, EntityId, EntityType, QueueItemId, ResolutionChoice,
        SyncOperation,
    },
};

/// A detected divergence between a queued mutation and the remote entity
///
/// Records are never deleted; resolving one only flips `resolved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique identifier
    pub id: ConflictId,
    /// Queue item that ran into the conflict
    pub queue_item_id: QueueItemId,
    /// Entity type
    pub entity_type: EntityType,
    /// Entity identifier
    pub entity_id: EntityId,
    /// Mutation that was queued locally
    pub operation: SyncOperation,
    /// Local payload at the time of the conflict
    pub local_version: serde_json::Value,
    /// Remote snapshot at the time of the conflict, `None` if it was deleted remotely
    pub remote_version: Option<serde_json::Value>,
    /// Remote last-modified marker that triggered the conflict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_modified_at: Option<DateTime<Utc>>,
    /// Strategy applied when the conflict was detected
    pub strategy: ConflictStrategy,
    /// Whether a resolution has been chosen
    pub resolved: bool,
    /// Which side was kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionChoice>,
    /// When the conflict was detected
    pub timestamp: DateTime<Utc>,
    /// When the conflict was resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ConflictRecord {
    /// Create an unresolved record for a queue item
    pub fn detected(
        item: &SyncQueueItem,
        remote_version: Option<serde_json::Value>,
        remote_modified_at: Option<DateTime<Utc>>,
        strategy: ConflictStrategy,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            queue_item_id: item.id,
            entity_type: item.entity_type.clone(),
            entity_id: item.entity_id.clone(),
            operation: item.operation,
            local_version: item.payload.clone(),
            remote_version,
            remote_modified_at,
            strategy,
            resolved: false,
            resolution: None,
            timestamp: Utc::now(),
            resolved_at: None,
        }
    }

    /// Mark the conflict resolved in favour of one side
    pub fn resolve(&mut self, choice: ResolutionChoice) -> Result<(), DomainError> {
        if self.resolved {
            return Err(DomainError::ConflictAlreadyResolved(self.id.to_string()));
        }
        self.resolved = true;
        self.resolution = Some(choice);
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// Whether the remote side deleted the entity
    pub const fn remote_deleted(&self) -> bool {
        self.remote_version.is_none()
    }
}
