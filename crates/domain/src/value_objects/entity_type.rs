//! Entity type name (the remote collection a record belongs to)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Maximum accepted length of an entity type name
const MAX_LEN: usize = 64;

/// Name of a remote entity collection, e.g. `invoices` or `customers`
///
/// Names are lowercase ASCII letters, digits, `_` and `-` because they are
/// used verbatim as path segments against the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityType(String);

impl EntityType {
    /// Validate and create an entity type
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if name.is_empty() || name.len() > MAX_LEN || !valid_chars {
            return Err(DomainError::InvalidEntityType(name));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.0
    }
}

impl std::str::FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
