//! SQLite cache preferences store

use std::collections::BTreeMap;

use application::{error::ApplicationError, ports::PreferencesStorePort};
use async_trait::async_trait;
use domain::{CachePreferences, EntityType};
use sqlx::SqlitePool;
use tracing::instrument;

use super::error::{corrupt, format_datetime, map_sqlx_error, parse_datetime};

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    entity_toggles: String,
    max_cache_size_mb: i64,
    sync_on_wifi_only: bool,
    updated_at: String,
}

/// Singleton preferences row in `cache_preferences`
#[derive(Debug, Clone)]
pub struct SqlitePreferencesStore {
    pool: SqlitePool,
}

impl SqlitePreferencesStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferencesStorePort for SqlitePreferencesStore {
    async fn load(&self) -> Result<Option<CachePreferences>, ApplicationError> {
        let row: Option<PreferencesRow> = sqlx::query_as(
            "SELECT entity_toggles, max_cache_size_mb, sync_on_wifi_only, updated_at
             FROM cache_preferences WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| {
            Ok(CachePreferences {
                entity_toggles: serde_json::from_str::<BTreeMap<EntityType, bool>>(
                    &row.entity_toggles,
                )
                .map_err(|e| corrupt("entity_toggles", e))?,
                max_cache_size_mb: u64::try_from(row.max_cache_size_mb)
                    .map_err(|e| corrupt("max_cache_size_mb", e))?,
                sync_on_wifi_only: row.sync_on_wifi_only,
                updated_at: parse_datetime(&row.updated_at)?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, preferences), fields(max_mb = preferences.max_cache_size_mb))]
    async fn save(&self, preferences: &CachePreferences) -> Result<(), ApplicationError> {
        let toggles = serde_json::to_string(&preferences.entity_toggles)
            .map_err(|e| ApplicationError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO cache_preferences (
                id, entity_toggles, max_cache_size_mb, sync_on_wifi_only, updated_at
            ) VALUES (1, $1, $2, $3, $4)
            ON CONFLICT(id) DO UPDATE SET
                entity_toggles = excluded.entity_toggles,
                max_cache_size_mb = excluded.max_cache_size_mb,
                sync_on_wifi_only = excluded.sync_on_wifi_only,
                updated_at = excluded.updated_at",
        )
        .bind(toggles)
        .bind(i64::try_from(preferences.max_cache_size_mb).unwrap_or(i64::MAX))
        .bind(preferences.sync_on_wifi_only)
        .bind(format_datetime(preferences.updated_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
