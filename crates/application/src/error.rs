//! Application-level errors

use domain::DomainError;
use thiserror::Error;

use crate::ports::RemoteError;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Local persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transient failure talking to the remote service
    #[error("Network error: {0}")]
    Network(String),

    /// Remote service refused the request permanently
    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Operation needs the vault to be unlocked
    #[error("Vault is locked")]
    VaultLocked,

    /// Passphrase verification failed
    #[error("Authentication failed")]
    Auth,

    /// Input rejected
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<RemoteError> for ApplicationError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(message) => Self::Network(message),
            RemoteError::Rejected { status, message } => Self::RemoteRejected { status, message },
        }
    }
}
