//! Lifecycle status of a queue item

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a sync queue item
///
/// ```text
/// pending ──claim──> in_flight ──ok──> synced
///    ^                   │
///    └──── retry ────────┤
///                        └──ceiling──> failed ──retry_failed──> pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Waiting to be sent
    Pending,
    /// Currently being sent to the remote service
    InFlight,
    /// Retry ceiling exceeded or rejected permanently
    Failed,
    /// Accepted by the remote service
    Synced,
}

impl SyncStatus {
    /// Stable storage representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Failed => "failed",
            Self::Synced => "synced",
        }
    }

    /// Whether the item still has work outstanding
    pub const fn is_outstanding(&self) -> bool {
        !matches!(self, Self::Synced)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" | "in-flight" => Ok(Self::InFlight),
            "failed" => Ok(Self::Failed),
            "synced" => Ok(Self::Synced),
            _ => Err(format!("Unknown status: {s}")),
        }
    }
}
