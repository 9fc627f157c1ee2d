//! Events published by the sync engine
//!
//! Payloads are hints. Observers re-query the authoritative state
//! instead of relying on them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    entities::VaultState,
    value_objects::{ConflictId, Connectivity, EntityId, EntityType, QueueItemId, SyncStatus},
};

/// Name under which observers subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncEventKind {
    /// Any queue item was added, changed or removed
    SyncQueueChanged,
    /// A drain began
    SyncStarted,
    /// A drain finished
    SyncComplete,
    /// An item exhausted its retries or was rejected
    SyncError,
    /// A conflict was recorded or resolved
    SyncConflicts,
    /// Failed items were reset for another attempt
    RetrySync,
    /// Connectivity was lost
    OfflineModeActivated,
    /// Connectivity was regained
    OnlineModeActivated,
    /// Cache preferences were saved
    CachePreferencesChanged,
    /// The draft vault changed state
    VaultStateChanged,
}

impl SyncEventKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 10] = [
        Self::SyncQueueChanged,
        Self::SyncStarted,
        Self::SyncComplete,
        Self::SyncError,
        Self::SyncConflicts,
        Self::RetrySync,
        Self::OfflineModeActivated,
        Self::OnlineModeActivated,
        Self::CachePreferencesChanged,
        Self::VaultStateChanged,
    ];

    /// Wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SyncQueueChanged => "sync-queue-changed",
            Self::SyncStarted => "sync-started",
            Self::SyncComplete => "sync-complete",
            Self::SyncError => "sync-error",
            Self::SyncConflicts => "sync-conflicts",
            Self::RetrySync => "retry-sync",
            Self::OfflineModeActivated => "offline-mode-activated",
            Self::OnlineModeActivated => "online-mode-activated",
            Self::CachePreferencesChanged => "cache-preferences-changed",
            Self::VaultStateChanged => "vault-state-changed",
        }
    }
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event: {s}"))
    }
}

/// An event with its hint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    SyncQueueChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<QueueItemId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<SyncStatus>,
    },
    SyncStarted,
    SyncComplete {
        synced: usize,
        conflicts: usize,
        retried: usize,
        failed: usize,
        deferred: usize,
    },
    SyncError {
        item_id: QueueItemId,
        entity_type: EntityType,
        entity_id: EntityId,
        retries: u32,
        error: String,
    },
    SyncConflicts {
        conflict_id: ConflictId,
        entity_type: EntityType,
        entity_id: EntityId,
        resolved: bool,
    },
    RetrySync {
        reset: usize,
    },
    OfflineModeActivated,
    OnlineModeActivated {
        connectivity: Connectivity,
    },
    CachePreferencesChanged,
    VaultStateChanged {
        state: VaultState,
    },
}

impl SyncEvent {
    /// The kind observers subscribe to
    pub const fn kind(&self) -> SyncEventKind {
        match self {
            Self::SyncQueueChanged { .. } => SyncEventKind::SyncQueueChanged,
            Self::SyncStarted => SyncEventKind::SyncStarted,
            Self::SyncComplete { .. } => SyncEventKind::SyncComplete,
            Self::SyncError { .. } => SyncEventKind::SyncError,
            Self::SyncConflicts { .. } => SyncEventKind::SyncConflicts,
            Self::RetrySync { .. } => SyncEventKind::RetrySync,
            Self::OfflineModeActivated => SyncEventKind::OfflineModeActivated,
            Self::OnlineModeActivated { .. } => SyncEventKind::OnlineModeActivated,
            Self::CachePreferencesChanged => SyncEventKind::CachePreferencesChanged,
            Self::VaultStateChanged { .. } => SyncEventKind::VaultStateChanged,
        }
    }

    /// Queue changed without a specific item
    pub const fn queue_changed() -> Self {
        Self::SyncQueueChanged {
            item_id: None,
            status: None,
        }
    }

    /// Queue item moved to a new status
    pub const fn item_changed(item_id: QueueItemId, status: SyncStatus) -> Self {
        Self::SyncQueueChanged {
            item_id: Some(item_id),
            status: Some(status),
        }
    }
}
