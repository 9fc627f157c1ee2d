//! Two-phase entity identifiers
//!
//! Records created while offline get a temporary id from a namespace that can
//! never collide with server ids. Once the queued CREATE is confirmed, every
//! reference to the temporary id is remapped to the id the server issued.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Prefix marking the temporary id namespace
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Identifier of a (possibly not yet synced) remote entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityId {
    /// Locally allocated id for an optimistic create
    Temp(Uuid),
    /// Id issued by the remote service
    Server(String),
}

impl EntityId {
    /// Allocate a fresh temporary id
    pub fn new_temp() -> Self {
        Self::Temp(Uuid::new_v4())
    }

    /// Wrap a server-issued id
    ///
    /// # Errors
    /// Rejects empty ids and ids inside the temporary namespace.
    pub fn server(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() || id.starts_with(TEMP_ID_PREFIX) {
            return Err(DomainError::InvalidEntityId(id));
        }
        Ok(Self::Server(id))
    }

    /// Parse the string form produced by `Display`
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s.strip_prefix(TEMP_ID_PREFIX) {
            Some(rest) => Uuid::parse_str(rest)
                .map(Self::Temp)
                .map_err(|_| DomainError::InvalidEntityId(s.to_string())),
            None => Self::server(s),
        }
    }

    /// Whether this id still lives in the temporary namespace
    pub const fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(uuid) => write!(f, "{TEMP_ID_PREFIX}{uuid}"),
            Self::Server(id) => f.write_str(id),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for EntityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
