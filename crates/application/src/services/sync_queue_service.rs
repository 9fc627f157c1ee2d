//! Sync Queue Service - Persistent mutation queue and drain loop
//!
//! Mutations are recorded locally first and delivered later. A drain sends
//! due items oldest-first per entity, with at most one item per entity in
//! flight, and routes remote conflicts to the [`ConflictResolver`].

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::Utc;
use domain::{
    CachedEntity, EntityId, EntityType, QueueItemId, SyncEvent, SyncOperation, SyncQueueItem,
    SyncStatus,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    backoff::RetryPolicy,
    error::ApplicationError,
    ports::{IdRemapPort, QueueStats, RemoteEntity, RemoteOutcome, RemoteServicePort, SyncQueueStorePort},
    services::{
        CacheManager, ConflictResolver, EventNotifier, conflict_resolver::server_id,
    },
};

/// Summary of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Items sent to the remote service
    pub attempted: usize,
    /// Items accepted by the remote service
    pub synced: usize,
    /// Items that ran into a conflict
    pub conflicts: usize,
    /// Items that failed transiently and will be retried
    pub retried: usize,
    /// Items that are now failed
    pub failed: usize,
    /// Pending items left for a later drain
    pub deferred: usize,
    /// The drain did not run (already draining, or not allowed)
    pub skipped: bool,
}

impl DrainReport {
    /// A drain that did not run
    pub const fn skipped() -> Self {
        Self {
            attempted: 0,
            synced: 0,
            conflicts: 0,
            retried: 0,
            failed: 0,
            deferred: 0,
            skipped: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Synced,
    Conflict,
    Retrying,
    Failed,
}

/// Releases the draining flag when dropped, including on error or panic
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Service owning the sync queue
pub struct SyncQueueService {
    queue: Arc<dyn SyncQueueStorePort>,
    remote: Arc<dyn RemoteServicePort>,
    id_remap: Arc<dyn IdRemapPort>,
    cache: Arc<CacheManager>,
    resolver: Arc<ConflictResolver>,
    notifier: Arc<EventNotifier>,
    policy: RetryPolicy,
    draining: AtomicBool,
    /// Claimed items a failed drain could not put back
    stranded: Mutex<Vec<QueueItemId>>,
}

impl std::fmt::Debug for SyncQueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueueService")
            .field("policy", &self.policy)
            .field("draining", &self.draining.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SyncQueueService {
    /// Create a new sync queue service
    pub fn new(
        queue: Arc<dyn SyncQueueStorePort>,
        remote: Arc<dyn RemoteServicePort>,
        id_remap: Arc<dyn IdRemapPort>,
        cache: Arc<CacheManager>,
        resolver: Arc<ConflictResolver>,
        notifier: Arc<EventNotifier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            remote,
            id_remap,
            cache,
            resolver,
            notifier,
            policy,
            draining: AtomicBool::new(false),
            stranded: Mutex::new(Vec::new()),
        }
    }

    /// Record a mutation for later delivery
    ///
    /// Never touches the network. The local cache is updated optimistically:
    /// creates and updates write the payload, deletes evict the entity.
    #[instrument(skip(self, payload), fields(operation = %operation, entity_type = %entity_type, entity_id = %entity_id))]
    pub async fn enqueue(
        &self,
        operation: SyncOperation,
        entity_type: EntityType,
        entity_id: EntityId,
        payload: serde_json::Value,
    ) -> Result<SyncQueueItem, ApplicationError> {
        let item = SyncQueueItem::new(operation, entity_type, entity_id, payload);
        self.queue.enqueue(&item).await?;

        match operation {
            SyncOperation::Create | SyncOperation::Update => {
                let optimistic = CachedEntity::new(
                    item.entity_type.clone(),
                    item.entity_id.clone(),
                    item.payload.clone(),
                );
                self.cache.store(&optimistic).await?;
            },
            SyncOperation::Delete => {
                self.cache.evict(&item.entity_type, &item.entity_id).await?;
            },
        }

        info!(item_id = %item.id, "Mutation queued");
        self.notifier
            .publish(&SyncEvent::item_changed(item.id, SyncStatus::Pending));
        Ok(item)
    }

    /// Queue the creation of a new entity under a temporary id
    ///
    /// The temporary id is replaced everywhere once the server confirms.
    pub async fn enqueue_create(
        &self,
        entity_type: EntityType,
        payload: serde_json::Value,
    ) -> Result<SyncQueueItem, ApplicationError> {
        self.enqueue(
            SyncOperation::Create,
            entity_type,
            EntityId::new_temp(),
            payload,
        )
        .await
    }

    /// Send up to `max_batch` due items to the remote service
    ///
    /// A drain started while another is running returns a skipped report
    /// without touching the queue or the network.
    #[instrument(skip(self))]
    pub async fn drain(&self, max_batch: usize) -> Result<DrainReport, ApplicationError> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!("Drain already in progress");
            return Ok(DrainReport::skipped());
        };

        let stranded = std::mem::take(&mut *self.stranded.lock());
        for id in stranded {
            self.release_claim(id).await;
        }

        self.notifier.publish(&SyncEvent::SyncStarted);
        let mut report = DrainReport::default();
        let mut attempted: HashSet<QueueItemId> = HashSet::new();

        // Each round sends the head item of every entity; entities advance by
        // one item per round so later items see remapped ids and new bases.
        'rounds: loop {
            let heads = self.due_heads(&attempted).await?;
            if heads.is_empty() {
                break;
            }

            for item in heads {
                if report.attempted >= max_batch {
                    debug!(max_batch, "Batch limit reached");
                    break 'rounds;
                }
                attempted.insert(item.id);

                if !self.queue.try_claim(&item.id).await? {
                    debug!(item_id = %item.id, "Entity busy, leaving item for later");
                    continue;
                }
                report.attempted += 1;
                self.notifier
                    .publish(&SyncEvent::item_changed(item.id, SyncStatus::InFlight));

                let item_id = item.id;
                let outcome = match self.process(item).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        self.release_claim(item_id).await;
                        return Err(err);
                    },
                };
                match outcome {
                    ItemOutcome::Synced => report.synced += 1,
                    ItemOutcome::Conflict => report.conflicts += 1,
                    ItemOutcome::Retrying => report.retried += 1,
                    ItemOutcome::Failed => report.failed += 1,
                }
            }
        }

        report.deferred = self.queue.stats().await?.pending;
        info!(
            attempted = report.attempted,
            synced = report.synced,
            conflicts = report.conflicts,
            retried = report.retried,
            failed = report.failed,
            deferred = report.deferred,
            "Drain finished"
        );
        self.notifier.publish(&SyncEvent::SyncComplete {
            synced: report.synced,
            conflicts: report.conflicts,
            retried: report.retried,
            failed: report.failed,
            deferred: report.deferred,
        });
        Ok(report)
    }

    /// Reset every failed item to pending, bypassing backoff
    ///
    /// # Returns
    /// The number of items reset
    #[instrument(skip(self))]
    pub async fn retry_failed(&self) -> Result<usize, ApplicationError> {
        let failed = self.queue.list(Some(SyncStatus::Failed)).await?;
        let mut reset = 0;
        for mut item in failed {
            item.reset_to_pending()?;
            self.queue.update(&item).await?;
            reset += 1;
        }

        info!(reset, "Failed items reset to pending");
        self.notifier.publish(&SyncEvent::RetrySync { reset });
        if reset > 0 {
            self.notifier.publish(&SyncEvent::queue_changed());
        }
        Ok(reset)
    }

    /// Delete synced items left behind by deferred deletes
    ///
    /// # Returns
    /// The number of items deleted
    #[instrument(skip(self))]
    pub async fn clear_synced(&self) -> Result<usize, ApplicationError> {
        let removed = self.queue.delete_synced().await?;
        if removed > 0 {
            info!(removed, "Cleared synced items");
            self.notifier.publish(&SyncEvent::queue_changed());
        }
        Ok(removed)
    }

    /// Return items left in flight by an interrupted process to pending
    ///
    /// Does nothing while this instance is draining.
    #[instrument(skip(self))]
    pub async fn recover_stale_in_flight(&self) -> Result<usize, ApplicationError> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            return Ok(0);
        };
        let stale = self.queue.list(Some(SyncStatus::InFlight)).await?;
        let mut recovered = 0;
        for mut item in stale {
            item.recover_in_flight()?;
            self.queue.update(&item).await?;
            recovered += 1;
        }
        if recovered > 0 {
            warn!(recovered, "Recovered items abandoned in flight");
            self.notifier.publish(&SyncEvent::queue_changed());
        }
        Ok(recovered)
    }

    /// Item counts per status
    pub async fn stats(&self) -> Result<QueueStats, ApplicationError> {
        self.queue.stats().await
    }

    /// Items in FIFO order, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncQueueItem>, ApplicationError> {
        self.queue.list(status).await
    }

    /// Get an item by ID
    pub async fn get(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, ApplicationError> {
        self.queue.get(id).await
    }

    /// Whether a drain is running on this instance
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// The oldest outstanding item of every entity, if it is due and was not
    /// already attempted in this drain
    async fn due_heads(
        &self,
        attempted: &HashSet<QueueItemId>,
    ) -> Result<Vec<SyncQueueItem>, ApplicationError> {
        let now = Utc::now();
        let mut seen: HashSet<(EntityType, EntityId)> = HashSet::new();
        let mut heads = Vec::new();

        for item in self.queue.list(None).await? {
            if item.status == SyncStatus::Synced {
                continue;
            }
            // Anything behind an entity's head waits, whatever the head's state
            if !seen.insert((item.entity_type.clone(), item.entity_id.clone())) {
                continue;
            }
            if item.is_due(now) && !attempted.contains(&item.id) {
                heads.push(item);
            }
        }
        Ok(heads)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, operation = %item.operation, entity_type = %item.entity_type, entity_id = %item.entity_id))]
    async fn process(&self, item: SyncQueueItem) -> Result<ItemOutcome, ApplicationError> {
        let mut item = item;
        item.mark_in_flight()?;
        match self.send(&item).await {
            Ok(RemoteOutcome::Applied(entity)) => self.complete(item, Some(entity)).await,
            Ok(RemoteOutcome::Deleted) => self.complete(item, None).await,
            Ok(RemoteOutcome::Conflict(remote)) => self.route_conflict(item, remote).await,
            Err(err) => self.record_failure(item, err).await,
        }
    }

    async fn send(&self, item: &SyncQueueItem) -> Result<RemoteOutcome, ApplicationError> {
        let outcome = match item.operation {
            SyncOperation::Create => self.remote.create(&item.entity_type, &item.payload).await?,
            SyncOperation::Update => {
                let id = server_id(&item.entity_id)?;
                self.remote
                    .update(&item.entity_type, id, &item.payload, item.base_at, item.force)
                    .await?
            },
            SyncOperation::Delete => {
                let id = server_id(&item.entity_id)?;
                self.remote
                    .delete(&item.entity_type, id, item.base_at, item.force)
                    .await?
            },
        };
        Ok(outcome)
    }

    /// The remote accepted the mutation
    async fn complete(
        &self,
        item: SyncQueueItem,
        entity: Option<RemoteEntity>,
    ) -> Result<ItemOutcome, ApplicationError> {
        let mut done = item.clone();
        match self.apply_confirmation(&mut done, entity).await {
            Ok(()) => {},
            Err(err @ ApplicationError::Domain(_)) => return self.record_failure(item, err).await,
            Err(err) => return Err(err),
        }
        self.finish(done).await?;
        Ok(ItemOutcome::Synced)
    }

    async fn apply_confirmation(
        &self,
        item: &mut SyncQueueItem,
        entity: Option<RemoteEntity>,
    ) -> Result<(), ApplicationError> {
        match (item.operation, entity) {
            (SyncOperation::Delete, _) => {
                self.cache.evict(&item.entity_type, &item.entity_id).await?;
            },
            (operation, Some(entity)) => {
                if operation == SyncOperation::Create {
                    self.adopt_server_id(item, &entity.id).await?;
                }
                self.queue
                    .advance_base(&item.entity_type, &item.entity_id, entity.last_modified)
                    .await?;
                let confirmed =
                    CachedEntity::new(item.entity_type.clone(), item.entity_id.clone(), entity.data)
                        .with_remote_modified_at(entity.last_modified);
                self.cache.store(&confirmed).await?;
            },
            (_, None) => {
                debug!("Remote acknowledged without returning the entity");
            },
        }
        Ok(())
    }

    /// The remote copy changed since the item was queued
    async fn route_conflict(
        &self,
        item: SyncQueueItem,
        remote: Option<RemoteEntity>,
    ) -> Result<ItemOutcome, ApplicationError> {
        let mut item = item;
        if item.operation == SyncOperation::Create {
            // A create can only conflict with an entity that already exists
            let Some(existing) = remote.as_ref() else {
                let err = ApplicationError::RemoteRejected {
                    status: 409,
                    message: "Create conflicted without a remote entity".to_string(),
                };
                return self.record_failure(item, err).await;
            };
            let original = item.clone();
            if let Err(err) = self.adopt_server_id(&mut item, &existing.id).await {
                return match err {
                    ApplicationError::Domain(_) => self.record_failure(original, err).await,
                    other => Err(other),
                };
            }
        }

        match self.resolver.handle_conflict(&item, remote).await {
            Ok(record) => {
                debug!(conflict_id = %record.id, "Conflict handed to resolver");
                self.finish(item).await?;
                Ok(ItemOutcome::Conflict)
            },
            Err(err) => self.record_failure(item, err).await,
        }
    }

    /// Replace a temporary id with the server's id everywhere
    async fn adopt_server_id(
        &self,
        item: &mut SyncQueueItem,
        issued: &str,
    ) -> Result<(), ApplicationError> {
        let confirmed = EntityId::server(issued)?;
        if confirmed == item.entity_id {
            return Ok(());
        }
        let summary = self
            .id_remap
            .remap(&item.entity_type, &item.entity_id, &confirmed)
            .await?;
        info!(
            from = %item.entity_id,
            to = %confirmed,
            queue_items = summary.queue_items,
            cached_entities = summary.cached_entities,
            conflicts = summary.conflicts,
            "Remapped entity id"
        );
        item.entity_id = confirmed;
        Ok(())
    }

    /// Put a claimed item back to pending after the drain aborted on it
    ///
    /// If that fails too, the next drain on this instance tries again.
    async fn release_claim(&self, id: QueueItemId) {
        match self.queue.release(&id).await {
            Ok(true) => {
                warn!(item_id = %id, "Returned item to pending after aborted drain");
                self.notifier
                    .publish(&SyncEvent::item_changed(id, SyncStatus::Pending));
            },
            Ok(false) => {},
            Err(err) => {
                warn!(item_id = %id, error = %err, "Could not release item, retrying on next drain");
                self.stranded.lock().push(id);
            },
        }
    }

    /// Mark synced and remove; a failed removal leaves a synced row for `clear_synced`
    async fn finish(&self, mut item: SyncQueueItem) -> Result<(), ApplicationError> {
        item.mark_synced()?;
        self.queue.update(&item).await?;
        self.queue.delete(&item.id).await?;
        self.notifier
            .publish(&SyncEvent::item_changed(item.id, SyncStatus::Synced));
        Ok(())
    }

    /// Record a failed attempt; storage and internal errors abort the drain
    async fn record_failure(
        &self,
        mut item: SyncQueueItem,
        err: ApplicationError,
    ) -> Result<ItemOutcome, ApplicationError> {
        if matches!(
            err,
            ApplicationError::Storage(_)
                | ApplicationError::Internal(_)
                | ApplicationError::Configuration(_)
        ) {
            return Err(err);
        }

        let message = err.to_string();
        let failed = if err.is_retryable() {
            let next_attempt = self
                .policy
                .next_attempt(Utc::now(), item.retries.saturating_add(1));
            item.record_failure(message.clone(), self.policy.max_retries, next_attempt)?
        } else {
            item.fail_permanently(message.clone())?;
            true
        };

        self.queue.update(&item).await?;
        self.notifier
            .publish(&SyncEvent::item_changed(item.id, item.status));

        if failed {
            warn!(retries = item.retries, error = %message, "Item failed");
            self.notifier.publish(&SyncEvent::SyncError {
                item_id: item.id,
                entity_type: item.entity_type.clone(),
                entity_id: item.entity_id.clone(),
                retries: item.retries,
                error: message,
            });
            Ok(ItemOutcome::Failed)
        } else {
            debug!(retries = item.retries, next_attempt = ?item.next_attempt, error = %message, "Item will be retried");
            Ok(ItemOutcome::Retrying)
        }
    }
}
