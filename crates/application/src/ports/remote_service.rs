//! Remote service port
//!
//! The backend is an opaque CRUD service per entity type. Update and delete
//! carry the time the mutation was queued; the service reports a conflict if
//! its copy was modified after that, unless the call is forced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::EntityType;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote copy of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntity {
    /// Server-issued identifier
    pub id: String,
    /// Entity data
    pub data: serde_json::Value,
    /// Last-modified marker
    pub last_modified: DateTime<Utc>,
}

/// Result of a mutating remote call
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// Mutation applied; the entity as stored by the server
    Applied(RemoteEntity),
    /// Entity deleted
    Deleted,
    /// Remote copy changed since the base time; its current state, `None` if deleted
    Conflict(Option<RemoteEntity>),
}

/// Remote call failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Transient, worth retrying
    #[error("Network error: {0}")]
    Network(String),

    /// Permanent refusal
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Port for the remote CRUD service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteServicePort: Send + Sync {
    /// Create an entity; the server assigns the id
    async fn create(
        &self,
        entity_type: &EntityType,
        payload: &serde_json::Value,
    ) -> Result<RemoteOutcome, RemoteError>;

    /// Replace an entity's data
    async fn update(
        &self,
        entity_type: &EntityType,
        id: &str,
        payload: &serde_json::Value,
        base: DateTime<Utc>,
        force: bool,
    ) -> Result<RemoteOutcome, RemoteError>;

    /// Delete an entity
    async fn delete(
        &self,
        entity_type: &EntityType,
        id: &str,
        base: DateTime<Utc>,
        force: bool,
    ) -> Result<RemoteOutcome, RemoteError>;

    /// Fetch an entity, `None` if it does not exist
    async fn fetch(
        &self,
        entity_type: &EntityType,
        id: &str,
    ) -> Result<Option<RemoteEntity>, RemoteError>;
}
