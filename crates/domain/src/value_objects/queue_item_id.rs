//! Identifier of a pending mutation in the sync queue

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique sync queue item identifier
///
/// Backed by a UUIDv7 so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    /// Create a new time-ordered queue item ID
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse a queue item ID from a string
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

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for QueueItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
