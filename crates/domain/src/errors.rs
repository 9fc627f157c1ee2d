//! Domain-level errors

use thiserror::Error;

use crate::value_objects::SyncStatus;

/// Errors that can occur in the domain layer
#[derive(Debug, Error)]
pub enum DomainError {
    /// Entity type name is empty or malformed
    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    /// Entity identifier is empty or collides with the temporary namespace
    #[error("Invalid entity id: {0}")]
    InvalidEntityId(String),

    /// Queue item cannot move between the given states
    #[error("Invalid queue transition from {from} to {to}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },

    /// Conflict was already resolved
    #[error("Conflict {0} is already resolved")]
    ConflictAlreadyResolved(String),

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}
