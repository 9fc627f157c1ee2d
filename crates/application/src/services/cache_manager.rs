//! Cache Manager - Cache preferences, quota enforcement and storage reporting

use std::sync::Arc;

use domain::{
    CachePreferences, CachedEntity, EntityId, EntityType, StorageReport, SyncEvent,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ApplicationError,
    ports::{EntityCachePort, PreferencesStorePort, StoragePlatformPort},
    services::EventNotifier,
};

/// Gatekeeper for everything written to the local entity cache
pub struct CacheManager {
    preferences: Arc<dyn PreferencesStorePort>,
    cache: Arc<dyn EntityCachePort>,
    platform: Arc<dyn StoragePlatformPort>,
    notifier: Arc<EventNotifier>,
    persistence: OnceCell<bool>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("persistence", &self.persistence.get())
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Create a new cache manager
    pub fn new(
        preferences: Arc<dyn PreferencesStorePort>,
        cache: Arc<dyn EntityCachePort>,
        platform: Arc<dyn StoragePlatformPort>,
        notifier: Arc<EventNotifier>,
    ) -> Self {
        Self {
            preferences,
            cache,
            platform,
            notifier,
            persistence: OnceCell::new(),
        }
    }

    /// Current preferences, persisting the defaults on first use
    #[instrument(skip(self))]
    pub async fn get_preferences(&self) -> Result<CachePreferences, ApplicationError> {
        if let Some(preferences) = self.preferences.load().await? {
            return Ok(preferences);
        }
        let defaults = CachePreferences::default();
        self.preferences.save(&defaults).await?;
        info!("Created default cache preferences");
        Ok(defaults)
    }

    /// Replace all preferences
    #[instrument(skip(self, preferences), fields(max_mb = preferences.max_cache_size_mb, wifi_only = preferences.sync_on_wifi_only))]
    pub async fn set_preferences(
        &self,
        mut preferences: CachePreferences,
    ) -> Result<CachePreferences, ApplicationError> {
        preferences.validate()?;
        let previous = self.get_preferences().await?;
        preferences.touch();
        self.preferences.save(&preferences).await?;

        for (entity_type, enabled) in &preferences.entity_toggles {
            if !enabled && previous.is_cached(entity_type) {
                self.cache.remove_type(entity_type).await?;
            }
        }

        info!("Cache preferences updated");
        self.notifier.publish(&SyncEvent::CachePreferencesChanged);
        self.enforce_quota().await?;
        Ok(preferences)
    }

    /// Turn caching on or off for one entity type
    ///
    /// Disabling drops the type's cached entities.
    #[instrument(skip(self), fields(entity_type = %entity_type))]
    pub async fn set_entity_caching(
        &self,
        entity_type: EntityType,
        enabled: bool,
    ) -> Result<CachePreferences, ApplicationError> {
        let mut preferences = self.get_preferences().await?;
        preferences.set_entity_caching(entity_type.clone(), enabled);
        self.preferences.save(&preferences).await?;

        if !enabled {
            let removed = self.cache.remove_type(&entity_type).await?;
            debug!(removed, "Dropped cached entities for disabled type");
        }

        info!(enabled, "Entity caching toggled");
        self.notifier.publish(&SyncEvent::CachePreferencesChanged);
        Ok(preferences)
    }

    /// Whether entities of this type may be cached
    pub async fn should_cache(&self, entity_type: &EntityType) -> Result<bool, ApplicationError> {
        Ok(self.get_preferences().await?.is_cached(entity_type))
    }

    /// Write an entity to the cache if its type is cached
    ///
    /// # Returns
    /// true if the entity was stored
    #[instrument(skip(self, entity), fields(entity_type = %entity.entity_type, entity_id = %entity.entity_id))]
    pub async fn store(&self, entity: &CachedEntity) -> Result<bool, ApplicationError> {
        if !self.should_cache(&entity.entity_type).await? {
            debug!("Entity type not cached, skipping");
            return Ok(false);
        }
        self.cache.put(entity).await?;
        Ok(true)
    }

    /// Read a cached entity
    pub async fn cached(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, ApplicationError> {
        self.cache.get(entity_type, entity_id).await
    }

    /// List cached entities
    pub async fn list_cached(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<CachedEntity>, ApplicationError> {
        self.cache.list(entity_type).await
    }

    /// Drop one cached entity
    pub async fn evict(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<bool, ApplicationError> {
        self.cache.remove(entity_type, entity_id).await
    }

    /// Evict least recently cached entities until under the configured ceiling
    ///
    /// # Returns
    /// The number of entities evicted
    #[instrument(skip(self))]
    pub async fn enforce_quota(&self) -> Result<usize, ApplicationError> {
        let limit = self.get_preferences().await?.max_cache_bytes();
        let used = self.cache.total_size().await?;
        if used <= limit {
            return Ok(0);
        }
        let evicted = self.cache.evict_lru(limit).await?;
        let remaining = self.cache.total_size().await?;
        if remaining > limit {
            warn!(
                remaining,
                limit, "Cache still over quota; remaining entries are unsynced local writes"
            );
        }
        info!(evicted, used, limit, "Evicted cached entities over quota");
        Ok(evicted)
    }

    /// Remove every cached entity
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<usize, ApplicationError> {
        let removed = self.cache.clear().await?;
        info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Live storage usage, quota and cache figures
    #[instrument(skip(self))]
    pub async fn storage_report(&self) -> Result<StorageReport, ApplicationError> {
        let estimate = self.platform.estimate().await?;
        let cache_bytes = self.cache.total_size().await?;
        let limit = self.get_preferences().await?.max_cache_bytes();
        Ok(StorageReport::new(
            estimate,
            cache_bytes,
            limit,
            self.persistence.get().copied(),
        ))
    }

    /// Ask the platform to keep local data from eviction
    ///
    /// The platform is asked once; later calls return the same answer.
    #[instrument(skip(self))]
    pub async fn request_persistence(&self) -> Result<bool, ApplicationError> {
        let granted = self
            .persistence
            .get_or_try_init(|| async {
                let granted = self.platform.request_persistence().await?;
                info!(granted, "Storage persistence requested");
                Ok::<bool, ApplicationError>(granted)
            })
            .await?;
        Ok(*granted)
    }
}
