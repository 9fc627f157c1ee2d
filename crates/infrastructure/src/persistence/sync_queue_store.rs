//! SQLite sync queue store
//!
//! Items are ordered by `created_at`, ties broken by the insertion sequence.
//! Claiming an item is one conditional UPDATE, so two drains can never
//! put two items of the same entity in flight.

use application::{
    error::ApplicationError,
    ports::{QueueStats, SyncQueueStorePort},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{EntityId, EntityType, QueueItemId, SyncOperation, SyncQueueItem, SyncStatus};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::error::{
    corrupt, format_datetime, map_sqlx_error, parse_datetime, parse_json, parse_optional_datetime,
};

const SELECT_ITEM: &str = "SELECT id, entity_type, entity_id, operation, payload, status, retries,
        last_error, next_attempt, force, created_at, base_at, updated_at
     FROM sync_queue";

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: String,
    entity_type: String,
    entity_id: String,
    operation: String,
    payload: String,
    status: String,
    retries: i64,
    last_error: Option<String>,
    next_attempt: Option<String>,
    force: bool,
    created_at: String,
    base_at: String,
    updated_at: String,
}

impl QueueRow {
    fn into_item(self) -> Result<SyncQueueItem, ApplicationError> {
        Ok(SyncQueueItem {
            id: QueueItemId::parse(&self.id).map_err(|e| corrupt("queue item id", e))?,
            entity_type: EntityType::new(self.entity_type)?,
            entity_id: EntityId::parse(&self.entity_id)?,
            operation: self
                .operation
                .parse::<SyncOperation>()
                .map_err(|e| corrupt("operation", e))?,
            payload: parse_json("payload", &self.payload)?,
            status: self
                .status
                .parse::<SyncStatus>()
                .map_err(|e| corrupt("status", e))?,
            retries: u32::try_from(self.retries).map_err(|e| corrupt("retries", e))?,
            last_error: self.last_error,
            next_attempt: parse_optional_datetime(self.next_attempt.as_deref())?,
            force: self.force,
            created_at: parse_datetime(&self.created_at)?,
            base_at: parse_datetime(&self.base_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

/// Insert a queue item through any executor, so other stores can queue
/// items inside their own transactions
pub(crate) async fn insert_item<'e, E>(
    executor: E,
    item: &SyncQueueItem,
) -> Result<(), ApplicationError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO sync_queue (
            id, entity_type, entity_id, operation, payload, status, retries,
            last_error, next_attempt, force, created_at, base_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(item.id.to_string())
    .bind(item.entity_type.as_str())
    .bind(item.entity_id.to_string())
    .bind(item.operation.as_str())
    .bind(item.payload.to_string())
    .bind(item.status.as_str())
    .bind(i64::from(item.retries))
    .bind(&item.last_error)
    .bind(item.next_attempt.map(format_datetime))
    .bind(item.force)
    .bind(format_datetime(item.created_at))
    .bind(format_datetime(item.base_at))
    .bind(format_datetime(item.updated_at))
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

/// Sync queue persisted in the `sync_queue` table
#[derive(Debug, Clone)]
pub struct SqliteSyncQueueStore {
    pool: SqlitePool,
}

impl SqliteSyncQueueStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncQueueStorePort for SqliteSyncQueueStore {
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<(), ApplicationError> {
        insert_item(&self.pool, item).await?;
        debug!("Queue item stored");
        Ok(())
    }

    async fn get(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, ApplicationError> {
        let row: Option<QueueRow> = sqlx::query_as(&format!("{SELECT_ITEM} WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(QueueRow::into_item).transpose()
    }

    async fn list(
        &self,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncQueueItem>, ApplicationError> {
        let rows: Vec<QueueRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "{SELECT_ITEM} WHERE status = $1 ORDER BY created_at ASC, seq ASC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            },
            None => {
                sqlx::query_as(&format!("{SELECT_ITEM} ORDER BY created_at ASC, seq ASC"))
                    .fetch_all(&self.pool)
                    .await
            },
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(QueueRow::into_item).collect()
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, status = %item.status))]
    async fn update(&self, item: &SyncQueueItem) -> Result<(), ApplicationError> {
        sqlx::query(
            "UPDATE sync_queue SET
                entity_id = $2, payload = $3, status = $4, retries = $5, last_error = $6,
                next_attempt = $7, force = $8, base_at = $9, updated_at = $10
             WHERE id = $1",
        )
        .bind(item.id.to_string())
        .bind(item.entity_id.to_string())
        .bind(item.payload.to_string())
        .bind(item.status.as_str())
        .bind(i64::from(item.retries))
        .bind(&item.last_error)
        .bind(item.next_attempt.map(format_datetime))
        .bind(item.force)
        .bind(format_datetime(item.base_at))
        .bind(format_datetime(item.updated_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn try_claim(&self, id: &QueueItemId) -> Result<bool, ApplicationError> {
        let result = sqlx::query(
            "UPDATE sync_queue SET status = 'in_flight', updated_at = $2
             WHERE id = $1
               AND status = 'pending'
               AND NOT EXISTS (
                   SELECT 1 FROM sync_queue AS busy
                   WHERE busy.entity_type = sync_queue.entity_type
                     AND busy.entity_id = sync_queue.entity_id
                     AND busy.status = 'in_flight'
               )",
        )
        .bind(id.to_string())
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, id: &QueueItemId) -> Result<bool, ApplicationError> {
        let result = sqlx::query(
            "UPDATE sync_queue SET status = 'pending', updated_at = $2
             WHERE id = $1 AND status = 'in_flight'",
        )
        .bind(id.to_string())
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn advance_base(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<usize, ApplicationError> {
        let result = sqlx::query(
            "UPDATE sync_queue SET base_at = $3
             WHERE entity_type = $1 AND entity_id = $2
               AND status != 'synced' AND base_at < $3",
        )
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .bind(format_datetime(at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn delete(&self, id: &QueueItemId) -> Result<bool, ApplicationError> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_synced(&self) -> Result<usize, ApplicationError> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE status = 'synced'")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn stats(&self) -> Result<QueueStats, ApplicationError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or(0);
            match status.parse::<SyncStatus>() {
                Ok(SyncStatus::Pending) => stats.pending = count,
                Ok(SyncStatus::InFlight) => stats.in_flight = count,
                Ok(SyncStatus::Failed) => stats.failed = count,
                Ok(SyncStatus::Synced) => stats.synced = count,
                Err(e) => return Err(corrupt("status", e)),
            }
        }
        Ok(stats)
    }
}
