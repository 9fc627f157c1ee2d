//! Cache preferences - Singleton settings governing what is cached locally

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{errors::DomainError, value_objects::EntityType};

/// Default cache ceiling in megabytes
pub const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 100;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// User-controlled caching preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePreferences {
    /// Per entity type caching toggles; an absent type is cached
    #[serde(default)]
    pub entity_toggles: BTreeMap<EntityType, bool>,
    /// Cache ceiling in megabytes
    pub max_cache_size_mb: u64,
    /// Only sync over unmetered connections
    pub sync_on_wifi_only: bool,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Default for CachePreferences {
    fn default() -> Self {
        Self {
            entity_toggles: BTreeMap::new(),
            max_cache_size_mb: DEFAULT_MAX_CACHE_SIZE_MB,
            sync_on_wifi_only: false,
            updated_at: Utc::now(),
        }
    }
}

impl CachePreferences {
    /// Whether entities of this type may be cached
    pub fn is_cached(&self, entity_type: &EntityType) -> bool {
        self.entity_toggles.get(entity_type).copied().unwrap_or(true)
    }

    /// Toggle caching for one entity type
    pub fn set_entity_caching(&mut self, entity_type: EntityType, enabled: bool) {
        self.entity_toggles.insert(entity_type, enabled);
        self.touch();
    }

    /// Cache ceiling in bytes
    pub const fn max_cache_bytes(&self) -> u64 {
        self.max_cache_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Reject nonsensical settings
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_cache_size_mb == 0 {
            return Err(DomainError::ValidationError(
                "max_cache_size_mb must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Bump the modification time
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
