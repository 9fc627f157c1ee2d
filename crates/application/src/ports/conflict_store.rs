//! Conflict record storage port

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{ConflictId, ConflictRecord, ResolutionChoice, SyncQueueItem};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for conflict records
///
/// Records are an audit trail and are never deleted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConflictStorePort: Send + Sync {
    /// Persist a new record
    async fn save(&self, record: &ConflictRecord) -> Result<(), ApplicationError>;

    /// Get a record by ID
    async fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>, ApplicationError>;

    /// List records, newest first
    async fn list(&self, unresolved_only: bool) -> Result<Vec<ConflictRecord>, ApplicationError>;

    /// Atomically mark an unresolved record resolved
    ///
    /// `follow_up` is added to the sync queue in the same write, so a
    /// resolution is never recorded without the mutation it requires.
    ///
    /// # Returns
    /// false if the record does not exist or was already resolved; nothing
    /// is queued in that case
    async fn mark_resolved(
        &self,
        id: &ConflictId,
        choice: ResolutionChoice,
        resolved_at: DateTime<Utc>,
        follow_up: Option<SyncQueueItem>,
    ) -> Result<bool, ApplicationError>;

    /// Number of unresolved records
    async fn count_unresolved(&self) -> Result<usize, ApplicationError>;
}
