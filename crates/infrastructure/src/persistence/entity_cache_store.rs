//! SQLite entity cache with a moka read layer
//!
//! SQLite is the source of truth. The moka layer only holds recently read
//! or written rows and is invalidated on every write path, including the
//! id remap which rewrites rows behind this store's back.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use application::{error::ApplicationError, ports::EntityCachePort};
use async_trait::async_trait;
use domain::{CachedEntity, EntityId, EntityType, TEMP_ID_PREFIX};
use moka::future::Cache;
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use super::error::{
    corrupt, format_datetime, map_sqlx_error, parse_datetime, parse_json, parse_optional_datetime,
};

const SELECT_ENTITY: &str =
    "SELECT entity_type, entity_id, data, owner, cached_at, remote_modified_at, size_bytes
     FROM cached_entities";

/// Configuration for the in-memory read layer
#[derive(Debug, Clone, Copy)]
pub struct EntityCacheConfig {
    /// Read layer capacity in megabytes
    pub memory_capacity_mb: u64,
    /// Drop entries not read for this long
    pub time_to_idle: Duration,
}

impl Default for EntityCacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity_mb: 16,
            time_to_idle: Duration::from_secs(600),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntityRow {
    entity_type: String,
    entity_id: String,
    data: String,
    owner: Option<String>,
    cached_at: String,
    remote_modified_at: Option<String>,
    size_bytes: i64,
}

impl EntityRow {
    fn into_entity(self) -> Result<CachedEntity, ApplicationError> {
        Ok(CachedEntity {
            entity_type: EntityType::new(self.entity_type)?,
            entity_id: EntityId::parse(&self.entity_id)?,
            data: parse_json("data", &self.data)?,
            owner: self.owner,
            cached_at: parse_datetime(&self.cached_at)?,
            remote_modified_at: parse_optional_datetime(self.remote_modified_at.as_deref())?,
            size_bytes: u64::try_from(self.size_bytes).map_err(|e| corrupt("size_bytes", e))?,
        })
    }
}

/// Durable entity cache in `cached_entities`
pub struct SqliteEntityCache {
    pool: SqlitePool,
    memory: Cache<String, CachedEntity>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for SqliteEntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEntityCache")
            .field("memory_entries", &self.memory.entry_count())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SqliteEntityCache {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, EntityCacheConfig::default())
    }

    #[must_use]
    pub fn with_config(pool: SqlitePool, config: EntityCacheConfig) -> Self {
        let memory = Cache::builder()
            .max_capacity(config.memory_capacity_mb.saturating_mul(1024 * 1024))
            .time_to_idle(config.time_to_idle)
            .weigher(|_key: &String, value: &CachedEntity| -> u32 {
                value.size_bytes.try_into().unwrap_or(u32::MAX)
            })
            .build();

        Self {
            pool,
            memory,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Drop one entity from the read layer
    pub async fn invalidate(&self, entity_type: &EntityType, entity_id: &EntityId) {
        self.memory
            .invalidate(&CachedEntity::key_for(entity_type, entity_id))
            .await;
    }

    /// Read layer hit and miss counters
    pub fn memory_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    async fn load(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, ApplicationError> {
        let row: Option<EntityRow> = sqlx::query_as(&format!(
            "{SELECT_ENTITY} WHERE entity_type = $1 AND entity_id = $2"
        ))
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(EntityRow::into_entity).transpose()
    }
}

#[async_trait]
impl EntityCachePort for SqliteEntityCache {
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, ApplicationError> {
        let key = CachedEntity::key_for(entity_type, entity_id);
        if let Some(entity) = self.memory.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entity));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let entity = self.load(entity_type, entity_id).await?;
        if let Some(entity) = &entity {
            self.memory.insert(key, entity.clone()).await;
        }
        Ok(entity)
    }

    #[instrument(skip(self, entity), fields(key = %entity.cache_key(), size = entity.size_bytes))]
    async fn put(&self, entity: &CachedEntity) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO cached_entities (
                entity_type, entity_id, data, owner, cached_at, remote_modified_at, size_bytes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT(entity_type, entity_id) DO UPDATE SET
                data = excluded.data,
                owner = excluded.owner,
                cached_at = excluded.cached_at,
                remote_modified_at = excluded.remote_modified_at,
                size_bytes = excluded.size_bytes",
        )
        .bind(entity.entity_type.as_str())
        .bind(entity.entity_id.to_string())
        .bind(entity.data.to_string())
        .bind(&entity.owner)
        .bind(format_datetime(entity.cached_at))
        .bind(entity.remote_modified_at.map(format_datetime))
        .bind(i64::try_from(entity.size_bytes).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.memory.insert(entity.cache_key(), entity.clone()).await;
        debug!("Entity cached");
        Ok(())
    }

    async fn remove(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<bool, ApplicationError> {
        let result =
            sqlx::query("DELETE FROM cached_entities WHERE entity_type = $1 AND entity_id = $2")
                .bind(entity_type.as_str())
                .bind(entity_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        self.invalidate(entity_type, entity_id).await;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn remove_type(&self, entity_type: &EntityType) -> Result<usize, ApplicationError> {
        let result = sqlx::query("DELETE FROM cached_entities WHERE entity_type = $1")
            .bind(entity_type.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        self.memory.invalidate_all();
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn list(
        &self,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<CachedEntity>, ApplicationError> {
        let rows: Vec<EntityRow> = match entity_type {
            Some(entity_type) => {
                sqlx::query_as(&format!(
                    "{SELECT_ENTITY} WHERE entity_type = $1 ORDER BY cached_at ASC"
                ))
                .bind(entity_type.as_str().to_string())
                .fetch_all(&self.pool)
                .await
            },
            None => {
                sqlx::query_as(&format!("{SELECT_ENTITY} ORDER BY cached_at ASC"))
                    .fetch_all(&self.pool)
                    .await
            },
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    async fn total_size(&self) -> Result<u64, ApplicationError> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(size_bytes), 0) FROM cached_entities")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Evict confirmed entries, oldest write first, until the total fits
    ///
    /// Optimistic entries are never evicted, so the result may still exceed
    /// `max_bytes`.
    #[instrument(skip(self))]
    async fn evict_lru(&self, max_bytes: u64) -> Result<usize, ApplicationError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(size_bytes), 0) FROM cached_entities")
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let mut total = u64::try_from(total).unwrap_or(0);
        if total <= max_bytes {
            return Ok(0);
        }

        let candidates: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT entity_type, entity_id, size_bytes FROM cached_entities
             WHERE remote_modified_at IS NOT NULL AND entity_id NOT LIKE $1 || '%'
             ORDER BY cached_at ASC",
        )
        .bind(TEMP_ID_PREFIX)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut evicted = Vec::new();
        for (entity_type, entity_id, size) in candidates {
            if total <= max_bytes {
                break;
            }
            sqlx::query("DELETE FROM cached_entities WHERE entity_type = $1 AND entity_id = $2")
                .bind(&entity_type)
                .bind(&entity_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            total = total.saturating_sub(u64::try_from(size).unwrap_or(0));
            evicted.push(format!("{entity_type}/{entity_id}"));
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        for key in &evicted {
            self.memory.invalidate(key).await;
        }
        info!(evicted = evicted.len(), remaining_bytes = total, "Cache entries evicted");
        Ok(evicted.len())
    }

    async fn clear(&self) -> Result<usize, ApplicationError> {
        let result = sqlx::query("DELETE FROM cached_entities")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        self.memory.invalidate_all();
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}
