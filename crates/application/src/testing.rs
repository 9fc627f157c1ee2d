//! In-memory port implementations for service tests

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CachePreferences, CachedEntity, ConflictId, ConflictRecord, Draft, DraftBody, DraftId,
    EntityId, EntityType, KeyDerivationParams, QueueItemId, ResolutionChoice, StorageEstimate,
    SyncEvent, SyncEventKind, SyncQueueItem, SyncStatus, VaultMaterial,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, Notify};

use crate::{
    error::ApplicationError,
    ports::{
        ConflictStorePort, DraftStorePort, EntityCachePort, IdRemapPort, PreferencesStorePort,
        QueueStats, RemapSummary, RemoteEntity, RemoteError, RemoteOutcome, RemoteServicePort,
        SealedBox, StoragePlatformPort, SyncQueueStorePort, VAULT_KEY_LEN, VaultCryptoPort,
        VaultKey, VaultMaterialStorePort,
    },
    services::{EventHandler, EventNotifier},
};

pub fn records() -> EntityType {
    EntityType::new("records").unwrap()
}

pub fn server_id(id: &str) -> EntityId {
    EntityId::server(id).unwrap()
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Default)]
pub struct InMemoryQueueStore {
    pub items: Arc<Mutex<Vec<SyncQueueItem>>>,
    pub fail_writes: AtomicBool,
}

impl InMemoryQueueStore {
    fn check_writable(&self) -> Result<(), ApplicationError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ApplicationError::Storage("disk I/O error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncQueueStorePort for InMemoryQueueStore {
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<(), ApplicationError> {
        self.check_writable()?;
        self.items.lock().await.push(item.clone());
        Ok(())
    }

    async fn get(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, ApplicationError> {
        Ok(self.items.lock().await.iter().find(|i| i.id == *id).cloned())
    }

    async fn list(
        &self,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncQueueItem>, ApplicationError> {
        let mut items: Vec<SyncQueueItem> = self
            .items
            .lock()
            .await
            .iter()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn update(&self, item: &SyncQueueItem) -> Result<(), ApplicationError> {
        self.check_writable()?;
        let mut items = self.items.lock().await;
        if let Some(existing) = items.iter_mut().find(|i| i.id == item.id) {
            *existing = item.clone();
        }
        Ok(())
    }

    async fn try_claim(&self, id: &QueueItemId) -> Result<bool, ApplicationError> {
        self.check_writable()?;
        let mut items = self.items.lock().await;
        let Some(target) = items.iter().find(|i| i.id == *id).cloned() else {
            return Ok(false);
        };
        let entity_busy = items.iter().any(|i| {
            i.status == SyncStatus::InFlight
                && i.entity_type == target.entity_type
                && i.entity_id == target.entity_id
        });
        if target.status != SyncStatus::Pending || entity_busy {
            return Ok(false);
        }
        if let Some(item) = items.iter_mut().find(|i| i.id == *id) {
            item.mark_in_flight()?;
        }
        Ok(true)
    }

    async fn release(&self, id: &QueueItemId) -> Result<bool, ApplicationError> {
        self.check_writable()?;
        let mut items = self.items.lock().await;
        match items
            .iter_mut()
            .find(|i| i.id == *id && i.status == SyncStatus::InFlight)
        {
            Some(item) => {
                item.recover_in_flight()?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn advance_base(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<usize, ApplicationError> {
        self.check_writable()?;
        Ok(self
            .items
            .lock()
            .await
            .iter_mut()
            .filter(|i| {
                i.status != SyncStatus::Synced
                    && i.entity_type == *entity_type
                    && i.entity_id == *entity_id
            })
            .map(|i| i.advance_base(at))
            .filter(|changed| *changed)
            .count())
    }

    async fn delete(&self, id: &QueueItemId) -> Result<bool, ApplicationError> {
        self.check_writable()?;
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|i| i.id != *id);
        Ok(items.len() != before)
    }

    async fn delete_synced(&self) -> Result<usize, ApplicationError> {
        self.check_writable()?;
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|i| i.status != SyncStatus::Synced);
        Ok(before - items.len())
    }

    async fn stats(&self) -> Result<QueueStats, ApplicationError> {
        let items = self.items.lock().await;
        let count = |status| items.iter().filter(|i| i.status == status).count();
        Ok(QueueStats {
            pending: count(SyncStatus::Pending),
            in_flight: count(SyncStatus::InFlight),
            failed: count(SyncStatus::Failed),
            synced: count(SyncStatus::Synced),
        })
    }
}

// ============================================================================
// Conflicts
// ============================================================================

#[derive(Default)]
pub struct InMemoryConflictStore {
    pub records: Arc<Mutex<Vec<ConflictRecord>>>,
    /// Receives follow-up items queued on resolution
    pub queue: Arc<InMemoryQueueStore>,
}

impl InMemoryConflictStore {
    pub fn with_queue(queue: Arc<InMemoryQueueStore>) -> Self {
        Self {
            records: Arc::default(),
            queue,
        }
    }
}

#[async_trait]
impl ConflictStorePort for InMemoryConflictStore {
    async fn save(&self, record: &ConflictRecord) -> Result<(), ApplicationError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>, ApplicationError> {
        Ok(self.records.lock().await.iter().find(|r| r.id == *id).cloned())
    }

    async fn list(&self, unresolved_only: bool) -> Result<Vec<ConflictRecord>, ApplicationError> {
        let mut records: Vec<ConflictRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| !unresolved_only || !r.resolved)
            .cloned()
            .collect();
        records.reverse();
        Ok(records)
    }

    async fn mark_resolved(
        &self,
        id: &ConflictId,
        choice: ResolutionChoice,
        resolved_at: DateTime<Utc>,
        follow_up: Option<SyncQueueItem>,
    ) -> Result<bool, ApplicationError> {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.id == *id && !r.resolved) {
            Some(record) => {
                if let Some(item) = follow_up {
                    self.queue.enqueue(&item).await?;
                }
                record.resolved = true;
                record.resolution = Some(choice);
                record.resolved_at = Some(resolved_at);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn count_unresolved(&self) -> Result<usize, ApplicationError> {
        Ok(self.records.lock().await.iter().filter(|r| !r.resolved).count())
    }
}

// ============================================================================
// Entity cache
// ============================================================================

#[derive(Default)]
pub struct InMemoryEntityCache {
    pub entries: Arc<Mutex<BTreeMap<(EntityType, EntityId), CachedEntity>>>,
}

impl InMemoryEntityCache {
    pub async fn data(&self, entity_type: &EntityType, id: &EntityId) -> Option<serde_json::Value> {
        self.entries
            .lock()
            .await
            .get(&(entity_type.clone(), id.clone()))
            .map(|e| e.data.clone())
    }
}

#[async_trait]
impl EntityCachePort for InMemoryEntityCache {
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, ApplicationError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(entity_type.clone(), entity_id.clone()))
            .cloned())
    }

    async fn put(&self, entity: &CachedEntity) -> Result<(), ApplicationError> {
        self.entries.lock().await.insert(
            (entity.entity_type.clone(), entity.entity_id.clone()),
            entity.clone(),
        );
        Ok(())
    }

    async fn remove(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<bool, ApplicationError> {
        Ok(self
            .entries
            .lock()
            .await
            .remove(&(entity_type.clone(), entity_id.clone()))
            .is_some())
    }

    async fn remove_type(&self, entity_type: &EntityType) -> Result<usize, ApplicationError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(t, _), _| t != entity_type);
        Ok(before - entries.len())
    }

    async fn list(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<CachedEntity>, ApplicationError> {
        Ok(self
            .entries
            .lock()
            .await
            .values()
            .filter(|e| entity_type.as_ref().is_none_or(|t| e.entity_type == *t))
            .cloned()
            .collect())
    }

    async fn total_size(&self) -> Result<u64, ApplicationError> {
        Ok(self.entries.lock().await.values().map(|e| e.size_bytes).sum())
    }

    async fn evict_lru(&self, max_bytes: u64) -> Result<usize, ApplicationError> {
        let mut entries = self.entries.lock().await;
        let mut total: u64 = entries.values().map(|e| e.size_bytes).sum();
        let mut candidates: Vec<(DateTime<Utc>, (EntityType, EntityId), u64)> = entries
            .iter()
            .filter(|(_, e)| !e.is_optimistic())
            .map(|(k, e)| (e.cached_at, k.clone(), e.size_bytes))
            .collect();
        candidates.sort_by_key(|(at, _, _)| *at);

        let mut evicted = 0;
        for (_, key, size) in candidates {
            if total <= max_bytes {
                break;
            }
            entries.remove(&key);
            total -= size;
            evicted += 1;
        }
        Ok(evicted)
    }

    async fn clear(&self) -> Result<usize, ApplicationError> {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

// ============================================================================
// Id remap
// ============================================================================

pub struct InMemoryIdRemap {
    pub queue: Arc<InMemoryQueueStore>,
    pub cache: Arc<InMemoryEntityCache>,
    pub conflicts: Arc<InMemoryConflictStore>,
}

#[async_trait]
impl IdRemapPort for InMemoryIdRemap {
    async fn remap(
        &self,
        entity_type: &EntityType,
        from: &EntityId,
        to: &EntityId,
    ) -> Result<RemapSummary, ApplicationError> {
        let mut summary = RemapSummary::default();

        for item in self.queue.items.lock().await.iter_mut() {
            if item.entity_type == *entity_type && item.entity_id == *from {
                item.entity_id = to.clone();
                summary.queue_items += 1;
            }
        }

        let mut entries = self.cache.entries.lock().await;
        if let Some(mut entry) = entries.remove(&(entity_type.clone(), from.clone())) {
            entry.entity_id = to.clone();
            entries.insert((entity_type.clone(), to.clone()), entry);
            summary.cached_entities += 1;
        }

        for record in self.conflicts.records.lock().await.iter_mut() {
            if record.entity_type == *entity_type && record.entity_id == *from {
                record.entity_id = to.clone();
                summary.conflicts += 1;
            }
        }
        Ok(summary)
    }
}

// ============================================================================
// Preferences, vault and drafts
// ============================================================================

#[derive(Default)]
pub struct InMemoryPreferencesStore {
    pub value: Mutex<Option<CachePreferences>>,
    pub saves: AtomicUsize,
}

#[async_trait]
impl PreferencesStorePort for InMemoryPreferencesStore {
    async fn load(&self) -> Result<Option<CachePreferences>, ApplicationError> {
        Ok(self.value.lock().await.clone())
    }

    async fn save(&self, preferences: &CachePreferences) -> Result<(), ApplicationError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.value.lock().await = Some(preferences.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVaultStore {
    pub value: Mutex<Option<VaultMaterial>>,
}

#[async_trait]
impl VaultMaterialStorePort for InMemoryVaultStore {
    async fn load(&self) -> Result<Option<VaultMaterial>, ApplicationError> {
        Ok(self.value.lock().await.clone())
    }

    async fn save(&self, material: &VaultMaterial) -> Result<(), ApplicationError> {
        *self.value.lock().await = Some(material.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDraftStore {
    pub drafts: Mutex<HashMap<DraftId, Draft>>,
    /// Every body ever written, to check plaintext never reappears
    pub writes: Mutex<Vec<DraftBody>>,
}

#[async_trait]
impl DraftStorePort for InMemoryDraftStore {
    async fn save(&self, draft: &Draft) -> Result<(), ApplicationError> {
        self.writes.lock().await.push(draft.body.clone());
        self.drafts.lock().await.insert(draft.id, draft.clone());
        Ok(())
    }

    async fn get(&self, id: &DraftId) -> Result<Option<Draft>, ApplicationError> {
        Ok(self.drafts.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Draft>, ApplicationError> {
        let mut drafts: Vec<Draft> = self.drafts.lock().await.values().cloned().collect();
        drafts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(drafts)
    }

    async fn delete(&self, id: &DraftId) -> Result<bool, ApplicationError> {
        Ok(self.drafts.lock().await.remove(id).is_some())
    }

    async fn count_encrypted(&self) -> Result<usize, ApplicationError> {
        Ok(self
            .drafts
            .lock()
            .await
            .values()
            .filter(|d| d.is_encrypted())
            .count())
    }
}

/// Keyed XOR "cipher" with a key fingerprint; only for exercising the vault
/// state machine without paying for Argon2
#[derive(Default)]
pub struct FakeVaultCrypto {
    nonce_counter: AtomicUsize,
    pub derivations: AtomicUsize,
}

const FINGERPRINT_LEN: usize = 8;

#[async_trait]
impl VaultCryptoPort for FakeVaultCrypto {
    fn generate_salt(&self) -> Vec<u8> {
        vec![0x5a; 16]
    }

    async fn derive_key(
        &self,
        passphrase: &SecretString,
        salt: &[u8],
        _params: &KeyDerivationParams,
    ) -> Result<VaultKey, ApplicationError> {
        self.derivations.fetch_add(1, Ordering::SeqCst);
        let pass = passphrase.expose_secret().as_bytes();
        let mut key = [0u8; VAULT_KEY_LEN];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = pass[i % pass.len()] ^ salt[i % salt.len()] ^ (i as u8);
        }
        Ok(VaultKey::new(key))
    }

    fn seal(&self, key: &VaultKey, plaintext: &[u8]) -> Result<SealedBox, ApplicationError> {
        let n = self.nonce_counter.fetch_add(1, Ordering::SeqCst);
        let nonce = vec![n as u8; 24];
        let key = key.expose();
        let mut ciphertext = key[..FINGERPRINT_LEN].to_vec();
        ciphertext.extend(
            plaintext
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ key[i % VAULT_KEY_LEN] ^ nonce[0]),
        );
        Ok(SealedBox { nonce, ciphertext })
    }

    fn open(
        &self,
        key: &VaultKey,
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ApplicationError> {
        let key = key.expose();
        if ciphertext.len() < FINGERPRINT_LEN || ciphertext[..FINGERPRINT_LEN] != key[..FINGERPRINT_LEN] {
            return Err(ApplicationError::Auth);
        }
        Ok(ciphertext[FINGERPRINT_LEN..]
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % VAULT_KEY_LEN] ^ nonce[0])
            .collect())
    }
}

// ============================================================================
// Storage platform
// ============================================================================

pub struct FakeStoragePlatform {
    pub estimate: StorageEstimate,
    pub grant: bool,
    pub persistence_requests: AtomicUsize,
}

impl FakeStoragePlatform {
    pub fn new(usage_bytes: u64, quota_bytes: u64, grant: bool) -> Self {
        Self {
            estimate: StorageEstimate {
                usage_bytes,
                quota_bytes,
            },
            grant,
            persistence_requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StoragePlatformPort for FakeStoragePlatform {
    async fn estimate(&self) -> Result<StorageEstimate, ApplicationError> {
        Ok(self.estimate)
    }

    async fn request_persistence(&self) -> Result<bool, ApplicationError> {
        self.persistence_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.grant)
    }
}

// ============================================================================
// Remote service
// ============================================================================

/// A recorded remote call
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create {
        entity_type: EntityType,
        payload: serde_json::Value,
    },
    Update {
        id: String,
        payload: serde_json::Value,
        force: bool,
    },
    Delete {
        id: String,
        force: bool,
    },
    Fetch {
        id: String,
    },
}

/// Remote CRUD service with last-modified conflict detection
#[derive(Default)]
pub struct FakeRemote {
    pub entities: Mutex<HashMap<(EntityType, String), RemoteEntity>>,
    pub calls: Mutex<Vec<RemoteCall>>,
    pub failures: Mutex<VecDeque<RemoteError>>,
    next_id: AtomicUsize,
    pause: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a remote entity
    pub async fn put(
        &self,
        entity_type: &EntityType,
        id: &str,
        data: serde_json::Value,
        last_modified: DateTime<Utc>,
    ) {
        self.entities.lock().await.insert(
            (entity_type.clone(), id.to_string()),
            RemoteEntity {
                id: id.to_string(),
                data,
                last_modified,
            },
        );
    }

    pub async fn entity(&self, entity_type: &EntityType, id: &str) -> Option<RemoteEntity> {
        self.entities
            .lock()
            .await
            .get(&(entity_type.clone(), id.to_string()))
            .cloned()
    }

    /// Fail the next `n` calls with `error`
    pub async fn fail_next(&self, n: usize, error: RemoteError) {
        let mut failures = self.failures.lock().await;
        for _ in 0..n {
            failures.push_back(error.clone());
        }
    }

    /// Block the next mutating call until `release` is notified; `entered`
    /// is notified when the call arrives
    pub async fn pause_next(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.pause.lock().await = Some((Arc::clone(&entered), Arc::clone(&release)));
        (entered, release)
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn begin(&self, call: RemoteCall) -> Result<(), RemoteError> {
        self.calls.lock().await.push(call);
        let pause = self.pause.lock().await.take();
        if let Some((entered, release)) = pause {
            entered.notify_one();
            release.notified().await;
        }
        match self.failures.lock().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn conflicting(
        &self,
        entity_type: &EntityType,
        id: &str,
        base: DateTime<Utc>,
        force: bool,
    ) -> Option<Option<RemoteEntity>> {
        // Forcing skips the freshness check but cannot write to a missing entity
        match self.entity(entity_type, id).await {
            None => Some(None),
            Some(_) if force => None,
            Some(current) if current.last_modified > base => Some(Some(current)),
            Some(_) => None,
        }
    }
}

#[async_trait]
impl RemoteServicePort for FakeRemote {
    async fn create(
        &self,
        entity_type: &EntityType,
        payload: &serde_json::Value,
    ) -> Result<RemoteOutcome, RemoteError> {
        self.begin(RemoteCall::Create {
            entity_type: entity_type.clone(),
            payload: payload.clone(),
        })
        .await?;
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let entity = RemoteEntity {
            id: id.clone(),
            data: payload.clone(),
            last_modified: Utc::now(),
        };
        self.entities
            .lock()
            .await
            .insert((entity_type.clone(), id), entity.clone());
        Ok(RemoteOutcome::Applied(entity))
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        id: &str,
        payload: &serde_json::Value,
        base: DateTime<Utc>,
        force: bool,
    ) -> Result<RemoteOutcome, RemoteError> {
        self.begin(RemoteCall::Update {
            id: id.to_string(),
            payload: payload.clone(),
            force,
        })
        .await?;
        if let Some(current) = self.conflicting(entity_type, id, base, force).await {
            return Ok(RemoteOutcome::Conflict(current));
        }
        let entity = RemoteEntity {
            id: id.to_string(),
            data: payload.clone(),
            last_modified: Utc::now(),
        };
        self.entities
            .lock()
            .await
            .insert((entity_type.clone(), id.to_string()), entity.clone());
        Ok(RemoteOutcome::Applied(entity))
    }

    async fn delete(
        &self,
        entity_type: &EntityType,
        id: &str,
        base: DateTime<Utc>,
        force: bool,
    ) -> Result<RemoteOutcome, RemoteError> {
        self.begin(RemoteCall::Delete {
            id: id.to_string(),
            force,
        })
        .await?;
        if let Some(current @ Some(_)) = self.conflicting(entity_type, id, base, force).await {
            return Ok(RemoteOutcome::Conflict(current));
        }
        self.entities
            .lock()
            .await
            .remove(&(entity_type.clone(), id.to_string()));
        Ok(RemoteOutcome::Deleted)
    }

    async fn fetch(
        &self,
        entity_type: &EntityType,
        id: &str,
    ) -> Result<Option<RemoteEntity>, RemoteError> {
        self.begin(RemoteCall::Fetch { id: id.to_string() }).await?;
        Ok(self.entity(entity_type, id).await)
    }
}

// ============================================================================
// Event capture
// ============================================================================

/// Records every published event of the given kinds
pub fn record_events(
    notifier: &EventNotifier,
    kinds: &[SyncEventKind],
) -> Arc<parking_lot::Mutex<Vec<SyncEvent>>> {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: EventHandler = Arc::new(move |event: &SyncEvent| {
        sink.lock().push(event.clone());
    });
    for kind in kinds {
        notifier.subscribe(*kind, Arc::clone(&handler));
    }
    seen
}

/// Records every published event
pub fn record_all_events(notifier: &EventNotifier) -> Arc<parking_lot::Mutex<Vec<SyncEvent>>> {
    record_events(notifier, &SyncEventKind::ALL)
}

pub fn count_kind(events: &[SyncEvent], kind: SyncEventKind) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}
