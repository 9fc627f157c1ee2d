//! Temporary-to-server id remapping
//!
//! Rewrites every reference to a temporary id in one transaction so that a
//! crash can never leave the queue pointing at an id the cache no longer has.

use std::sync::Arc;

use application::{
    error::ApplicationError,
    ports::{IdRemapPort, RemapSummary},
};
use async_trait::async_trait;
use domain::{EntityId, EntityType};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::{entity_cache_store::SqliteEntityCache, error::map_sqlx_error};

/// Id remap over the queue, cache and conflict tables
#[derive(Debug, Clone)]
pub struct SqliteIdRemap {
    pool: SqlitePool,
    cache: Arc<SqliteEntityCache>,
}

impl SqliteIdRemap {
    #[must_use]
    pub const fn new(pool: SqlitePool, cache: Arc<SqliteEntityCache>) -> Self {
        Self { pool, cache }
    }
}

fn affected(rows: u64) -> usize {
    usize::try_from(rows).unwrap_or(usize::MAX)
}

#[async_trait]
impl IdRemapPort for SqliteIdRemap {
    #[instrument(skip(self), fields(entity_type = %entity_type, from = %from, to = %to))]
    async fn remap(
        &self,
        entity_type: &EntityType,
        from: &EntityId,
        to: &EntityId,
    ) -> Result<RemapSummary, ApplicationError> {
        let from_text = from.to_string();
        let to_text = to.to_string();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let queue = sqlx::query(
            "UPDATE sync_queue SET entity_id = $3 WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type.as_str())
        .bind(&from_text)
        .bind(&to_text)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        // A server copy fetched under the new id loses to the optimistic row
        let cached = sqlx::query(
            "UPDATE OR REPLACE cached_entities SET entity_id = $3
             WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type.as_str())
        .bind(&from_text)
        .bind(&to_text)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let conflicts = sqlx::query(
            "UPDATE conflict_records SET entity_id = $3 WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type.as_str())
        .bind(&from_text)
        .bind(&to_text)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        self.cache.invalidate(entity_type, from).await;
        self.cache.invalidate(entity_type, to).await;

        let summary = RemapSummary {
            queue_items: affected(queue.rows_affected()),
            cached_entities: affected(cached.rows_affected()),
            conflicts: affected(conflicts.rows_affected()),
        };
        debug!(?summary, "Entity id remapped");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use application::ports::{ConflictStorePort, EntityCachePort, SyncQueueStorePort};
    use chrono::Utc;
    use domain::{
        CachedEntity, ConflictRecord, ConflictStrategy, SyncOperation, SyncQueueItem,
    };
    use serde_json::json;

    use super::*;
    use crate::persistence::{AsyncDatabase, SqliteConflictStore, SqliteSyncQueueStore};

    struct Stores {
        _db: AsyncDatabase,
        queue: SqliteSyncQueueStore,
        conflicts: SqliteConflictStore,
        cache: Arc<SqliteEntityCache>,
        remap: SqliteIdRemap,
    }

    async fn setup() -> Stores {
        let db = AsyncDatabase::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let pool = db.pool().clone();
        let cache = Arc::new(SqliteEntityCache::new(pool.clone()));
        Stores {
            queue: SqliteSyncQueueStore::new(pool.clone()),
            conflicts: SqliteConflictStore::new(pool.clone()),
            remap: SqliteIdRemap::new(pool, Arc::clone(&cache)),
            cache,
            _db: db,
        }
    }

    fn records() -> EntityType {
        EntityType::new("records").unwrap()
    }

    #[tokio::test]
    async fn remap_rewrites_every_reference() {
        let stores = setup().await;
        let temp = EntityId::new_temp();
        let server = EntityId::server("srv-1").unwrap();

        let create = SyncQueueItem::new(SyncOperation::Create, records(), temp.clone(), json!(1));
        let update = SyncQueueItem::new(SyncOperation::Update, records(), temp.clone(), json!(2));
        stores.queue.enqueue(&create).await.unwrap();
        stores.queue.enqueue(&update).await.unwrap();
        stores
            .cache
            .put(&CachedEntity::new(records(), temp.clone(), json!(2)))
            .await
            .unwrap();
        stores
            .conflicts
            .save(&ConflictRecord::detected(
                &update,
                None,
                None,
                ConflictStrategy::Manual,
            ))
            .await
            .unwrap();

        // Warm the read layer under the old id
        assert!(stores.cache.get(&records(), &temp).await.unwrap().is_some());

        let summary = stores.remap.remap(&records(), &temp, &server).await.unwrap();
        assert_eq!(
            summary,
            RemapSummary {
                queue_items: 2,
                cached_entities: 1,
                conflicts: 1,
            }
        );

        assert_eq!(
            stores.queue.get(&update.id).await.unwrap().unwrap().entity_id,
            server
        );
        assert!(stores.cache.get(&records(), &temp).await.unwrap().is_none());
        assert_eq!(
            stores.cache.get(&records(), &server).await.unwrap().unwrap().data,
            json!(2)
        );
        assert_eq!(stores.conflicts.list(false).await.unwrap()[0].entity_id, server);
    }

    #[tokio::test]
    async fn optimistic_row_replaces_existing_server_copy() {
        let stores = setup().await;
        let temp = EntityId::new_temp();
        let server = EntityId::server("srv-1").unwrap();
        stores
            .cache
            .put(
                &CachedEntity::new(records(), server.clone(), json!("fetched"))
                    .with_remote_modified_at(Utc::now()),
            )
            .await
            .unwrap();
        stores
            .cache
            .put(&CachedEntity::new(records(), temp.clone(), json!("local")))
            .await
            .unwrap();

        stores.remap.remap(&records(), &temp, &server).await.unwrap();

        let entries = stores.cache.list(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data, json!("local"));
    }

    #[tokio::test]
    async fn unknown_id_is_a_no_op() {
        let stores = setup().await;
        let summary = stores
            .remap
            .remap(
                &records(),
                &EntityId::new_temp(),
                &EntityId::server("srv-2").unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(summary, RemapSummary::default());
    }
}
