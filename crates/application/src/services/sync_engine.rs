//! Sync Engine - Wires the sync services together and tracks connectivity

use std::sync::Arc;

use domain::{CachedEntity, Connectivity, EntityId, EntityType, KeyDerivationParams, SyncEvent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    backoff::RetryPolicy,
    error::ApplicationError,
    ports::{
        ConflictStorePort, DraftStorePort, EntityCachePort, IdRemapPort, PreferencesStorePort,
        RemoteServicePort, StoragePlatformPort, SyncQueueStorePort, VaultCryptoPort,
        VaultMaterialStorePort,
    },
    services::{
        CacheManager, ConflictResolver, ConflictStrategies, DrainReport, DraftVault, EventNotifier,
        SyncQueueService,
    },
};

fn default_max_batch() -> usize {
    50
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEngineConfig {
    /// Items sent per drain
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Backoff for transient delivery failures
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Conflict strategy per entity type
    #[serde(default)]
    pub conflicts: ConflictStrategies,
    /// Key derivation for newly enabled vaults
    #[serde(default)]
    pub kdf: KeyDerivationParams,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            retry: RetryPolicy::default(),
            conflicts: ConflictStrategies::default(),
            kdf: KeyDerivationParams::default(),
        }
    }
}

/// Adapters the engine runs on
#[derive(Clone)]
pub struct SyncEnginePorts {
    pub queue: Arc<dyn SyncQueueStorePort>,
    pub conflicts: Arc<dyn ConflictStorePort>,
    pub cache: Arc<dyn EntityCachePort>,
    pub id_remap: Arc<dyn IdRemapPort>,
    pub preferences: Arc<dyn PreferencesStorePort>,
    pub vault_material: Arc<dyn VaultMaterialStorePort>,
    pub drafts: Arc<dyn DraftStorePort>,
    pub vault_crypto: Arc<dyn VaultCryptoPort>,
    pub remote: Arc<dyn RemoteServicePort>,
    pub platform: Arc<dyn StoragePlatformPort>,
}

/// Entry point for applications embedding the sync engine
pub struct SyncEngine {
    queue: Arc<SyncQueueService>,
    resolver: Arc<ConflictResolver>,
    cache: Arc<CacheManager>,
    vault: Arc<DraftVault>,
    notifier: Arc<EventNotifier>,
    remote: Arc<dyn RemoteServicePort>,
    connectivity: RwLock<Connectivity>,
    max_batch: usize,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("connectivity", &*self.connectivity.read())
            .field("max_batch", &self.max_batch)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Build the engine; starts offline until connectivity is reported
    pub fn new(ports: SyncEnginePorts, config: SyncEngineConfig, notifier: Arc<EventNotifier>) -> Self {
        let cache = Arc::new(CacheManager::new(
            ports.preferences,
            ports.cache,
            ports.platform,
            Arc::clone(&notifier),
        ));
        let resolver = Arc::new(ConflictResolver::new(
            ports.conflicts,
            Arc::clone(&ports.queue),
            Arc::clone(&ports.remote),
            Arc::clone(&ports.id_remap),
            Arc::clone(&cache),
            Arc::clone(&notifier),
            config.conflicts,
        ));
        let queue = Arc::new(SyncQueueService::new(
            ports.queue,
            Arc::clone(&ports.remote),
            ports.id_remap,
            Arc::clone(&cache),
            Arc::clone(&resolver),
            Arc::clone(&notifier),
            config.retry,
        ));
        let vault = Arc::new(DraftVault::new(
            ports.vault_material,
            ports.drafts,
            ports.vault_crypto,
            Arc::clone(&notifier),
            config.kdf,
        ));

        Self {
            queue,
            resolver,
            cache,
            vault,
            notifier,
            remote: ports.remote,
            connectivity: RwLock::new(Connectivity::Offline),
            max_batch: config.max_batch.max(1),
        }
    }

    /// Recover state left behind by an interrupted process
    ///
    /// # Returns
    /// The number of queue items returned to pending
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<usize, ApplicationError> {
        let recovered = self.queue.recover_stale_in_flight().await?;
        let stats = self.queue.stats().await?;
        info!(
            recovered,
            pending = stats.pending,
            failed = stats.failed,
            "Sync engine started"
        );
        Ok(recovered)
    }

    /// Last reported connectivity
    pub fn connectivity(&self) -> Connectivity {
        *self.connectivity.read()
    }

    /// Report a connectivity change
    ///
    /// Going offline halts new drains. Coming online drains the queue when
    /// the WiFi-only preference allows it.
    ///
    /// # Returns
    /// The report of the automatic drain, if one ran
    #[instrument(skip(self))]
    pub async fn set_connectivity(
        &self,
        connectivity: Connectivity,
    ) -> Result<Option<DrainReport>, ApplicationError> {
        let previous = std::mem::replace(&mut *self.connectivity.write(), connectivity);
        if previous == connectivity {
            return Ok(None);
        }

        if !connectivity.is_online() {
            info!("Offline mode activated");
            self.notifier.publish(&SyncEvent::OfflineModeActivated);
            return Ok(None);
        }

        info!(?connectivity, "Online mode activated");
        self.notifier
            .publish(&SyncEvent::OnlineModeActivated { connectivity });
        if !self.can_sync().await? {
            debug!("Sync not allowed on this network");
            return Ok(None);
        }
        self.drain().await.map(Some)
    }

    /// Whether drains may run right now
    pub async fn can_sync(&self) -> Result<bool, ApplicationError> {
        let wifi_only = self.cache.get_preferences().await?.sync_on_wifi_only;
        Ok(self.connectivity().allows_sync(wifi_only))
    }

    /// Drain the queue with the configured batch size, then enforce the cache quota
    ///
    /// Returns a skipped report when offline or on a network the WiFi-only
    /// preference excludes.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainReport, ApplicationError> {
        if !self.can_sync().await? {
            debug!(connectivity = ?self.connectivity(), "Drain skipped");
            return Ok(DrainReport::skipped());
        }
        let report = self.queue.drain(self.max_batch).await?;
        if !report.skipped {
            self.cache.enforce_quota().await?;
        }
        Ok(report)
    }

    /// Read an entity, from cache or else from the remote service
    ///
    /// Remote reads happen only while online and only for entities with a
    /// server id; a fetched entity is cached if its type is cached.
    #[instrument(skip(self), fields(entity_type = %entity_type, entity_id = %entity_id))]
    pub async fn read(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, ApplicationError> {
        if let Some(hit) = self.cache.cached(entity_type, entity_id).await? {
            debug!("Cache hit");
            return Ok(Some(hit));
        }

        let EntityId::Server(id) = entity_id else {
            return Ok(None);
        };
        if !self.connectivity().is_online() {
            debug!("Cache miss while offline");
            return Ok(None);
        }

        let Some(remote) = self.remote.fetch(entity_type, id).await? else {
            return Ok(None);
        };
        let entity = CachedEntity::new(entity_type.clone(), entity_id.clone(), remote.data)
            .with_remote_modified_at(remote.last_modified);
        if self.cache.store(&entity).await? {
            self.cache.enforce_quota().await?;
        }
        Ok(Some(entity))
    }

    pub fn queue(&self) -> &Arc<SyncQueueService> {
        &self.queue
    }

    pub fn conflicts(&self) -> &Arc<ConflictResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn vault(&self) -> &Arc<DraftVault> {
        &self.vault
    }

    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use domain::{SyncEventKind, SyncOperation};
    use serde_json::json;

    use super::*;
    use crate::testing::{
        FakeRemote, FakeStoragePlatform, FakeVaultCrypto, InMemoryConflictStore,
        InMemoryDraftStore, InMemoryEntityCache, InMemoryIdRemap, InMemoryPreferencesStore,
        InMemoryQueueStore, InMemoryVaultStore, count_kind, record_all_events, records, server_id,
    };

    struct Fixture {
        engine: SyncEngine,
        remote: Arc<FakeRemote>,
        cache: Arc<InMemoryEntityCache>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(InMemoryQueueStore::default());
        let cache = Arc::new(InMemoryEntityCache::default());
        let conflicts = Arc::new(InMemoryConflictStore::with_queue(Arc::clone(&queue)));
        let remote = Arc::new(FakeRemote::new());
        let ports = SyncEnginePorts {
            queue: queue.clone(),
            conflicts: conflicts.clone(),
            cache: cache.clone(),
            id_remap: Arc::new(InMemoryIdRemap {
                queue,
                cache: Arc::clone(&cache),
                conflicts,
            }),
            preferences: Arc::new(InMemoryPreferencesStore::default()),
            vault_material: Arc::new(InMemoryVaultStore::default()),
            drafts: Arc::new(InMemoryDraftStore::default()),
            vault_crypto: Arc::new(FakeVaultCrypto::default()),
            remote: remote.clone(),
            platform: Arc::new(FakeStoragePlatform::new(1024, 4096, true)),
        };
        let config = SyncEngineConfig {
            retry: RetryPolicy::immediate(3),
            ..SyncEngineConfig::default()
        };
        Fixture {
            engine: SyncEngine::new(ports, config, Arc::new(EventNotifier::new())),
            remote,
            cache,
        }
    }

    #[tokio::test]
    async fn offline_enqueue_syncs_when_wifi_returns() {
        let f = fixture();
        let events = record_all_events(f.engine.notifier());

        f.engine
            .queue()
            .enqueue_create(records(), json!({"name": "R1"}))
            .await
            .unwrap();
        assert!(f.engine.drain().await.unwrap().skipped);
        assert_eq!(f.remote.call_count().await, 0);

        let report = f
            .engine
            .set_connectivity(Connectivity::Wifi)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(f.engine.queue().stats().await.unwrap().outstanding(), 0);
        assert_eq!(count_kind(&events.lock(), SyncEventKind::OnlineModeActivated), 1);
    }

    #[tokio::test]
    async fn wifi_only_blocks_cellular() {
        let f = fixture();
        let mut prefs = f.engine.cache().get_preferences().await.unwrap();
        prefs.sync_on_wifi_only = true;
        f.engine.cache().set_preferences(prefs).await.unwrap();
        f.engine
            .queue()
            .enqueue(SyncOperation::Update, records(), server_id("r1"), json!({}))
            .await
            .unwrap();

        let report = f.engine.set_connectivity(Connectivity::Cellular).await.unwrap();
        assert!(report.is_none());
        assert!(f.engine.drain().await.unwrap().skipped);
        assert_eq!(f.remote.call_count().await, 0);
    }

    #[tokio::test]
    async fn going_offline_publishes_and_halts() {
        let f = fixture();
        let events = record_all_events(f.engine.notifier());
        f.engine.set_connectivity(Connectivity::Wifi).await.unwrap();
        assert!(f.engine.set_connectivity(Connectivity::Offline).await.unwrap().is_none());

        assert_eq!(count_kind(&events.lock(), SyncEventKind::OfflineModeActivated), 1);
        assert!(!f.engine.can_sync().await.unwrap());
    }

    #[tokio::test]
    async fn unchanged_connectivity_is_ignored() {
        let f = fixture();
        let events = record_all_events(f.engine.notifier());
        f.engine.set_connectivity(Connectivity::Offline).await.unwrap();
        assert!(events.lock().is_empty());
    }

    #[tokio::test]
    async fn read_through_fetches_and_caches() {
        let f = fixture();
        f.remote
            .put(&records(), "r9", json!({"v": 9}), Utc::now() - Duration::minutes(1))
            .await;

        assert!(f.engine.read(&records(), &server_id("r9")).await.unwrap().is_none());

        f.engine.set_connectivity(Connectivity::Wifi).await.unwrap();
        let entity = f.engine.read(&records(), &server_id("r9")).await.unwrap().unwrap();
        assert_eq!(entity.data, json!({"v": 9}));
        assert_eq!(f.cache.data(&records(), &server_id("r9")).await, Some(json!({"v": 9})));

        // Served from cache from now on
        let calls = f.remote.call_count().await;
        f.engine.read(&records(), &server_id("r9")).await.unwrap();
        assert_eq!(f.remote.call_count().await, calls);
    }

    #[tokio::test]
    async fn read_through_respects_disabled_type() {
        let f = fixture();
        f.remote
            .put(&records(), "r9", json!({"v": 9}), Utc::now())
            .await;
        f.engine
            .cache()
            .set_entity_caching(records(), false)
            .await
            .unwrap();
        f.engine.set_connectivity(Connectivity::Wifi).await.unwrap();

        let entity = f.engine.read(&records(), &server_id("r9")).await.unwrap();
        assert!(entity.is_some());
        assert!(f.cache.data(&records(), &server_id("r9")).await.is_none());
    }

    #[tokio::test]
    async fn start_recovers_abandoned_items() {
        let f = fixture();
        assert_eq!(f.engine.start().await.unwrap(), 0);
    }
}
