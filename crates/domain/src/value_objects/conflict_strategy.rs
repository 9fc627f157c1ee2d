//! Conflict resolution strategies and manual choices

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a detected conflict is handled during drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Apply the local mutation anyway and flag the conflict for review
    #[default]
    LocalWins,
    /// Apply nothing; wait for the user to choose
    Manual,
    /// Drop the local mutation and adopt the remote snapshot
    RemoteWins,
}

impl ConflictStrategy {
    /// Stable storage representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LocalWins => "local-wins",
            Self::Manual => "manual",
            Self::RemoteWins => "remote-wins",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-wins" | "local_wins" => Ok(Self::LocalWins),
            "manual" => Ok(Self::Manual),
            "remote-wins" | "remote_wins" => Ok(Self::RemoteWins),
            _ => Err(format!("Unknown conflict strategy: {s}")),
        }
    }
}

/// The side a user keeps when resolving a conflict by hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionChoice {
    /// Keep the locally queued payload
    Local,
    /// Keep the remote snapshot
    Remote,
}

impl ResolutionChoice {
    /// Stable storage representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(format!("Unknown resolution choice: {s}")),
        }
    }
}
