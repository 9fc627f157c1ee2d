//! Cached entity - Read-through local copy of a remote entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{EntityId, EntityType};

/// A locally cached entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
    /// Entity type
    pub entity_type: EntityType,
    /// Entity identifier (temporary for optimistic creates)
    pub entity_id: EntityId,
    /// Entity data
    pub data: serde_json::Value,
    /// Owning user, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// When this copy was written
    pub cached_at: DateTime<Utc>,
    /// Remote last-modified marker, `None` for optimistic local writes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_modified_at: Option<DateTime<Utc>>,
    /// Serialized size of `data`
    pub size_bytes: u64,
}

impl CachedEntity {
    /// Create a cache entry stamped now
    pub fn new(entity_type: EntityType, entity_id: EntityId, data: serde_json::Value) -> Self {
        let size_bytes = Self::measure(&data);
        Self {
            entity_type,
            entity_id,
            data,
            owner: None,
            cached_at: Utc::now(),
            remote_modified_at: None,
            size_bytes,
        }
    }

    /// Set the owning user
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the remote last-modified marker
    #[must_use]
    pub const fn with_remote_modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.remote_modified_at = Some(at);
        self
    }

    /// Whether this copy has not been confirmed by the server yet
    pub const fn is_optimistic(&self) -> bool {
        self.entity_id.is_temp() || self.remote_modified_at.is_none()
    }

    /// Key used by in-memory cache layers
    pub fn cache_key(&self) -> String {
        Self::key_for(&self.entity_type, &self.entity_id)
    }

    /// Key for an entity type and id
    pub fn key_for(entity_type: &EntityType, entity_id: &EntityId) -> String {
        format!("{entity_type}/{entity_id}")
    }

    fn measure(data: &serde_json::Value) -> u64 {
        // Serializing a Value cannot fail
        serde_json::to_vec(data).map_or(0, |bytes| bytes.len() as u64)
    }
}
