//! Sync queue item entity - A locally recorded mutation awaiting delivery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::DomainError,
    value_objects::{EntityId, EntityType, QueueItemId, SyncOperation, SyncStatus},
};

/// A pending mutation in the persistent sync queue
///
/// `base_at` is the freshness base sent to the remote service: a remote
/// entity modified after it counts as a conflict. It starts at `created_at`
/// and only moves forward when an earlier mutation of the same entity syncs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Unique identifier
    pub id: QueueItemId,
    /// Entity type the mutation targets
    pub entity_type: EntityType,
    /// Entity the mutation targets
    pub entity_id: EntityId,
    /// Kind of mutation
    pub operation: SyncOperation,
    /// Full entity data for create/update, ignored for delete
    pub payload: serde_json::Value,
    /// Lifecycle status
    pub status: SyncStatus,
    /// Failed delivery attempts so far
    pub retries: u32,
    /// Error from the most recent failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Earliest time the item may be sent again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt: Option<DateTime<Utc>>,
    /// Apply remotely without the freshness precondition
    #[serde(default)]
    pub force: bool,
    /// When the mutation was queued
    pub created_at: DateTime<Utc>,
    /// Remote modification time this mutation was made against
    pub base_at: DateTime<Utc>,
    /// When the item last changed state
    pub updated_at: DateTime<Utc>,
}

impl SyncQueueItem {
    /// Create a new pending item
    pub fn new(
        operation: SyncOperation,
        entity_type: EntityType,
        entity_id: EntityId,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: QueueItemId::new(),
            entity_type,
            entity_id,
            operation,
            payload,
            status: SyncStatus::Pending,
            retries: 0,
            last_error: None,
            next_attempt: None,
            force: false,
            created_at: now,
            base_at: now,
            updated_at: now,
        }
    }

    /// Mark the item to be applied without the freshness precondition
    #[must_use]
    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Whether the item is pending and past its backoff window
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SyncStatus::Pending && self.next_attempt.is_none_or(|at| at <= now)
    }

    /// Move the freshness base forward; never moves it back
    ///
    /// # Returns
    /// true if the base changed
    pub fn advance_base(&mut self, at: DateTime<Utc>) -> bool {
        if at > self.base_at {
            self.base_at = at;
            true
        } else {
            false
        }
    }

    /// Pending -> in_flight
    pub fn mark_in_flight(&mut self) -> Result<(), DomainError> {
        self.transition(SyncStatus::Pending, SyncStatus::InFlight)
    }

    /// In_flight -> synced
    pub fn mark_synced(&mut self) -> Result<(), DomainError> {
        self.transition(SyncStatus::InFlight, SyncStatus::Synced)?;
        self.next_attempt = None;
        Ok(())
    }

    /// Record a transient delivery failure
    ///
    /// Returns `true` when the retry ceiling was reached and the item is now
    /// `failed`; otherwise the item is back to `pending` and due at `next_attempt`.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        max_retries: u32,
        next_attempt: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        self.ensure_status(SyncStatus::InFlight, SyncStatus::Pending)?;
        self.retries = self.retries.saturating_add(1);
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();

        if self.retries >= max_retries {
            self.status = SyncStatus::Failed;
            self.next_attempt = None;
            Ok(true)
        } else {
            self.status = SyncStatus::Pending;
            self.next_attempt = Some(next_attempt);
            Ok(false)
        }
    }

    /// Fail without further retries, e.g. after a permanent remote rejection
    pub fn fail_permanently(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        self.transition(SyncStatus::InFlight, SyncStatus::Failed)?;
        self.retries = self.retries.saturating_add(1);
        self.last_error = Some(error.into());
        self.next_attempt = None;
        Ok(())
    }

    /// Failed -> pending, with a fresh retry budget and no backoff
    ///
    /// The last error stays visible until the next attempt overwrites it.
    pub fn reset_to_pending(&mut self) -> Result<(), DomainError> {
        self.transition(SyncStatus::Failed, SyncStatus::Pending)?;
        self.retries = 0;
        self.next_attempt = None;
        Ok(())
    }

    /// Return an item abandoned mid-flight (e.g. by a crash) to pending
    pub fn recover_in_flight(&mut self) -> Result<(), DomainError> {
        self.transition(SyncStatus::InFlight, SyncStatus::Pending)
    }

    fn transition(&mut self, from: SyncStatus, to: SyncStatus) -> Result<(), DomainError> {
        self.ensure_status(from, to)?;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_status(&self, expected: SyncStatus, to: SyncStatus) -> Result<(), DomainError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}
