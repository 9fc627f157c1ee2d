//! Conflict Resolver - Applies conflict policies and manual resolutions
//!
//! A conflict is reported by the remote service when its copy of an entity
//! was modified after the local mutation was queued. The configured
//! strategy for the entity type decides what happens next:
//!
//! - `local-wins`: the mutation is force-applied and the conflict is kept
//!   for review. An update to an entity the remote has deleted re-creates it
//!   under a new server id.
//! - `remote-wins`: the mutation is dropped and the cache adopts the remote copy
//! - `manual`: nothing is applied until the user picks a side

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use domain::{
    CachedEntity, ConflictId, ConflictRecord, ConflictStrategy, EntityId, EntityType,
    ResolutionChoice, SyncEvent, SyncOperation, SyncQueueItem, SyncStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ApplicationError,
    ports::{
        ConflictStorePort, IdRemapPort, RemoteEntity, RemoteOutcome, RemoteServicePort,
        SyncQueueStorePort,
    },
    services::{CacheManager, EventNotifier},
};

/// Conflict strategy per entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictStrategies {
    /// Strategy for types without an override
    #[serde(default)]
    pub default: ConflictStrategy,
    /// Per entity type overrides
    #[serde(default)]
    pub overrides: HashMap<EntityType, ConflictStrategy>,
}

impl ConflictStrategies {
    /// Use one strategy for every type
    pub fn uniform(strategy: ConflictStrategy) -> Self {
        Self {
            default: strategy,
            overrides: HashMap::new(),
        }
    }

    /// Override the strategy for one type
    #[must_use]
    pub fn with_override(mut self, entity_type: EntityType, strategy: ConflictStrategy) -> Self {
        self.overrides.insert(entity_type, strategy);
        self
    }

    /// Strategy for an entity type
    pub fn for_type(&self, entity_type: &EntityType) -> ConflictStrategy {
        self.overrides
            .get(entity_type)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Service that records conflicts and applies resolutions
pub struct ConflictResolver {
    conflicts: Arc<dyn ConflictStorePort>,
    queue: Arc<dyn SyncQueueStorePort>,
    remote: Arc<dyn RemoteServicePort>,
    id_remap: Arc<dyn IdRemapPort>,
    cache: Arc<CacheManager>,
    notifier: Arc<EventNotifier>,
    strategies: ConflictStrategies,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("strategies", &self.strategies)
            .finish_non_exhaustive()
    }
}

impl ConflictResolver {
    /// Create a new conflict resolver
    pub fn new(
        conflicts: Arc<dyn ConflictStorePort>,
        queue: Arc<dyn SyncQueueStorePort>,
        remote: Arc<dyn RemoteServicePort>,
        id_remap: Arc<dyn IdRemapPort>,
        cache: Arc<CacheManager>,
        notifier: Arc<EventNotifier>,
        strategies: ConflictStrategies,
    ) -> Self {
        Self {
            conflicts,
            queue,
            remote,
            id_remap,
            cache,
            notifier,
            strategies,
        }
    }

    /// Strategy configured for an entity type
    pub fn strategy_for(&self, entity_type: &EntityType) -> ConflictStrategy {
        self.strategies.for_type(entity_type)
    }

    /// Handle a conflict reported while draining `item`
    ///
    /// On success the caller may consider the queue item done. A network
    /// error while force-applying leaves nothing recorded, so the item can be
    /// retried and will conflict again.
    #[instrument(skip(self, item, remote), fields(item_id = %item.id, entity_type = %item.entity_type, entity_id = %item.entity_id))]
    pub async fn handle_conflict(
        &self,
        item: &SyncQueueItem,
        remote: Option<RemoteEntity>,
    ) -> Result<ConflictRecord, ApplicationError> {
        let strategy = self.strategy_for(&item.entity_type);
        let remote_modified_at = remote.as_ref().map(|r| r.last_modified);
        let remote_data = remote.as_ref().map(|r| r.data.clone());
        let mut record =
            ConflictRecord::detected(item, remote_data, remote_modified_at, strategy);

        warn!(
            strategy = %strategy,
            remote_deleted = record.remote_deleted(),
            "Conflict detected"
        );

        match strategy {
            ConflictStrategy::LocalWins => {
                let applied = self.force_apply(item, remote.is_none()).await?;
                let mut entity_id = item.entity_id.clone();
                if let Some(applied) = applied.as_ref() {
                    let issued = EntityId::server(&applied.id)?;
                    if issued != entity_id {
                        let summary = self
                            .id_remap
                            .remap(&item.entity_type, &entity_id, &issued)
                            .await?;
                        info!(
                            from = %entity_id,
                            to = %issued,
                            queue_items = summary.queue_items,
                            "Re-created remotely deleted entity"
                        );
                        entity_id = issued;
                        record.entity_id = entity_id.clone();
                    }
                    self.queue
                        .advance_base(&item.entity_type, &entity_id, applied.last_modified)
                        .await?;
                }
                self.cache_local(
                    &item.entity_type,
                    &entity_id,
                    item.operation,
                    &item.payload,
                    applied.as_ref(),
                )
                .await?;
            },
            ConflictStrategy::RemoteWins => {
                record.resolve(ResolutionChoice::Remote)?;
                self.cache_remote(&item.entity_type, &item.entity_id, remote.as_ref())
                    .await?;
            },
            ConflictStrategy::Manual => {
                debug!("Leaving local copy in cache until resolved");
            },
        }

        self.conflicts.save(&record).await?;
        info!(conflict_id = %record.id, resolved = record.resolved, "Conflict recorded");
        self.publish_conflict(&record);
        Ok(record)
    }

    /// Resolve a conflict by keeping one side
    ///
    /// `local` makes the local payload authoritative again: under local-wins it
    /// was already applied, otherwise a forced mutation is queued. `remote`
    /// makes the remote snapshot authoritative: under local-wins the snapshot
    /// is pushed back with a forced mutation.
    #[instrument(skip(self), fields(conflict_id = %id, choice = %choice))]
    pub async fn resolve(
        &self,
        id: &ConflictId,
        choice: ResolutionChoice,
    ) -> Result<ConflictRecord, ApplicationError> {
        let mut record = self
            .conflicts
            .get(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("Conflict {id}")))?;

        if record.resolved {
            return Err(ApplicationError::InvalidOperation(format!(
                "Conflict {id} is already resolved"
            )));
        }

        let follow_up = match choice {
            ResolutionChoice::Local => {
                self.cache_local(
                    &record.entity_type,
                    &record.entity_id,
                    record.operation,
                    &record.local_version,
                    None,
                )
                .await?;
                (record.strategy != ConflictStrategy::LocalWins)
                    .then(|| Self::reapply_local(&record))
                    .flatten()
            },
            ResolutionChoice::Remote => {
                let snapshot = record.remote_version.clone().map(|data| RemoteEntity {
                    id: record.entity_id.to_string(),
                    data,
                    last_modified: record.remote_modified_at.unwrap_or(record.timestamp),
                });
                self.cache_remote(&record.entity_type, &record.entity_id, snapshot.as_ref())
                    .await?;
                (record.strategy == ConflictStrategy::LocalWins)
                    .then(|| Self::restore_remote(&record))
                    .flatten()
            },
        };

        // The resolution and its follow-up are committed together, after the cache
        let resolved_at = Utc::now();
        if !self
            .conflicts
            .mark_resolved(id, choice, resolved_at, follow_up.clone())
            .await?
        {
            return Err(ApplicationError::InvalidOperation(format!(
                "Conflict {id} is already resolved"
            )));
        }
        record.resolved = true;
        record.resolution = Some(choice);
        record.resolved_at = Some(resolved_at);

        if let Some(item) = follow_up {
            info!(item_id = %item.id, operation = %item.operation, "Queued forced re-apply");
            self.notifier
                .publish(&SyncEvent::item_changed(item.id, SyncStatus::Pending));
        }

        info!("Conflict resolved");
        self.publish_conflict(&record);
        Ok(record)
    }

    /// Get a conflict by ID
    pub async fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>, ApplicationError> {
        self.conflicts.get(id).await
    }

    /// Unresolved conflicts, newest first
    pub async fn list_unresolved(&self) -> Result<Vec<ConflictRecord>, ApplicationError> {
        self.conflicts.list(true).await
    }

    /// All conflicts including resolved ones, newest first
    pub async fn list_all(&self) -> Result<Vec<ConflictRecord>, ApplicationError> {
        self.conflicts.list(false).await
    }

    /// Number of unresolved conflicts
    pub async fn unresolved_count(&self) -> Result<usize, ApplicationError> {
        self.conflicts.count_unresolved().await
    }

    /// Apply the queued mutation without the freshness precondition
    ///
    /// A write to an entity the remote no longer has becomes a create, and a
    /// delete of it is already done.
    ///
    /// # Returns
    /// The entity as stored remotely, `None` for deletes
    async fn force_apply(
        &self,
        item: &SyncQueueItem,
        remote_deleted: bool,
    ) -> Result<Option<RemoteEntity>, ApplicationError> {
        let id = server_id(&item.entity_id)?;
        let outcome = match (item.operation, remote_deleted) {
            (SyncOperation::Delete, true) => {
                debug!("Remote already deleted the entity");
                return Ok(None);
            },
            (SyncOperation::Delete, false) => {
                self.remote
                    .delete(&item.entity_type, id, item.base_at, true)
                    .await?
            },
            (_, true) => self.remote.create(&item.entity_type, &item.payload).await?,
            (_, false) => {
                self.remote
                    .update(&item.entity_type, id, &item.payload, item.base_at, true)
                    .await?
            },
        };

        match outcome {
            RemoteOutcome::Applied(entity) => Ok(Some(entity)),
            RemoteOutcome::Deleted => Ok(None),
            RemoteOutcome::Conflict(_) => Err(ApplicationError::Network(
                "Remote reported a conflict for a forced write".to_string(),
            )),
        }
    }

    async fn cache_local(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        operation: SyncOperation,
        payload: &serde_json::Value,
        applied: Option<&RemoteEntity>,
    ) -> Result<(), ApplicationError> {
        if operation == SyncOperation::Delete {
            self.cache.evict(entity_type, entity_id).await?;
            return Ok(());
        }
        let mut entity = CachedEntity::new(entity_type.clone(), entity_id.clone(), payload.clone());
        if let Some(applied) = applied {
            entity = entity.with_remote_modified_at(applied.last_modified);
        }
        self.cache.store(&entity).await?;
        Ok(())
    }

    async fn cache_remote(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        remote: Option<&RemoteEntity>,
    ) -> Result<(), ApplicationError> {
        match remote {
            Some(remote) => {
                let entity =
                    CachedEntity::new(entity_type.clone(), entity_id.clone(), remote.data.clone())
                        .with_remote_modified_at(remote.last_modified);
                self.cache.store(&entity).await?;
            },
            None => {
                self.cache.evict(entity_type, entity_id).await?;
            },
        }
        Ok(())
    }

    /// Forced mutation that makes the local payload authoritative
    fn reapply_local(record: &ConflictRecord) -> Option<SyncQueueItem> {
        let operation = match (record.operation, record.remote_deleted()) {
            // Nothing left to delete
            (SyncOperation::Delete, true) => return None,
            (SyncOperation::Delete, false) => SyncOperation::Delete,
            (_, true) => SyncOperation::Create,
            (_, false) => SyncOperation::Update,
        };
        Some(
            SyncQueueItem::new(
                operation,
                record.entity_type.clone(),
                record.entity_id.clone(),
                record.local_version.clone(),
            )
            .forced(),
        )
    }

    /// Forced mutation that puts the remote snapshot back after local-wins
    fn restore_remote(record: &ConflictRecord) -> Option<SyncQueueItem> {
        let (operation, payload) = match (&record.remote_version, record.operation) {
            (Some(data), SyncOperation::Delete) => (SyncOperation::Create, data.clone()),
            (Some(data), _) => (SyncOperation::Update, data.clone()),
            (None, SyncOperation::Delete) => return None,
            (None, _) => (SyncOperation::Delete, serde_json::Value::Null),
        };
        Some(
            SyncQueueItem::new(
                operation,
                record.entity_type.clone(),
                record.entity_id.clone(),
                payload,
            )
            .forced(),
        )
    }

    fn publish_conflict(&self, record: &ConflictRecord) {
        self.notifier.publish(&SyncEvent::SyncConflicts {
            conflict_id: record.id,
            entity_type: record.entity_type.clone(),
            entity_id: record.entity_id.clone(),
            resolved: record.resolved,
        });
    }
}

/// The server id of an entity, rejecting ids that were never synced
pub(crate) fn server_id(entity_id: &EntityId) -> Result<&str, ApplicationError> {
    match entity_id {
        EntityId::Server(id) => Ok(id),
        EntityId::Temp(_) => Err(ApplicationError::InvalidOperation(format!(
            "Entity {entity_id} has no server id yet"
        ))),
    }
}
