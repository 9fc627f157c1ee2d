//! Identifier for locally saved free-text drafts

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique draft identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(Uuid);

impl DraftId {
    /// Create a new random draft ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a draft ID from a string
    ///
    /// # Errors
    /// Returns an error if the string is not a valid UUID
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DraftId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
