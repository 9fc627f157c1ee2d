//! SQLite conflict record store

use application::{error::ApplicationError, ports::ConflictStorePort};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ConflictId, ConflictRecord, ConflictStrategy, EntityId, EntityType, QueueItemId,
    ResolutionChoice, SyncOperation, SyncQueueItem,
};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::{
    error::{
        corrupt, format_datetime, map_sqlx_error, parse_datetime, parse_json,
        parse_optional_datetime,
    },
    sync_queue_store::insert_item,
};

const SELECT_RECORD: &str = "SELECT id, queue_item_id, entity_type, entity_id, operation,
        local_version, remote_version, remote_modified_at, strategy, resolved, resolution,
        timestamp, resolved_at
     FROM conflict_records";

#[derive(sqlx::FromRow)]
struct ConflictRow {
    id: String,
    queue_item_id: String,
    entity_type: String,
    entity_id: String,
    operation: String,
    local_version: String,
    remote_version: Option<String>,
    remote_modified_at: Option<String>,
    strategy: String,
    resolved: bool,
    resolution: Option<String>,
    timestamp: String,
    resolved_at: Option<String>,
}

impl ConflictRow {
    fn into_record(self) -> Result<ConflictRecord, ApplicationError> {
        Ok(ConflictRecord {
            id: ConflictId::parse(&self.id).map_err(|e| corrupt("conflict id", e))?,
            queue_item_id: QueueItemId::parse(&self.queue_item_id)
                .map_err(|e| corrupt("queue item id", e))?,
            entity_type: EntityType::new(self.entity_type)?,
            entity_id: EntityId::parse(&self.entity_id)?,
            operation: self
                .operation
                .parse::<SyncOperation>()
                .map_err(|e| corrupt("operation", e))?,
            local_version: parse_json("local_version", &self.local_version)?,
            remote_version: self
                .remote_version
                .as_deref()
                .map(|v| parse_json("remote_version", v))
                .transpose()?,
            remote_modified_at: parse_optional_datetime(self.remote_modified_at.as_deref())?,
            strategy: self
                .strategy
                .parse::<ConflictStrategy>()
                .map_err(|e| corrupt("strategy", e))?,
            resolved: self.resolved,
            resolution: self
                .resolution
                .as_deref()
                .map(str::parse::<ResolutionChoice>)
                .transpose()
                .map_err(|e| corrupt("resolution", e))?,
            timestamp: parse_datetime(&self.timestamp)?,
            resolved_at: parse_optional_datetime(self.resolved_at.as_deref())?,
        })
    }
}

/// Conflict audit trail persisted in `conflict_records`
#[derive(Debug, Clone)]
pub struct SqliteConflictStore {
    pool: SqlitePool,
}

impl SqliteConflictStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConflictStorePort for SqliteConflictStore {
    #[instrument(skip(self, record), fields(conflict_id = %record.id, entity_id = %record.entity_id))]
    async fn save(&self, record: &ConflictRecord) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO conflict_records (
                id, queue_item_id, entity_type, entity_id, operation, local_version,
                remote_version, remote_modified_at, strategy, resolved, resolution,
                timestamp, resolved_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT(id) DO UPDATE SET
                entity_id = excluded.entity_id,
                resolved = excluded.resolved,
                resolution = excluded.resolution,
                resolved_at = excluded.resolved_at",
        )
        .bind(record.id.to_string())
        .bind(record.queue_item_id.to_string())
        .bind(record.entity_type.as_str())
        .bind(record.entity_id.to_string())
        .bind(record.operation.as_str())
        .bind(record.local_version.to_string())
        .bind(record.remote_version.as_ref().map(ToString::to_string))
        .bind(record.remote_modified_at.map(format_datetime))
        .bind(record.strategy.as_str())
        .bind(record.resolved)
        .bind(record.resolution.map(|r| r.as_str()))
        .bind(format_datetime(record.timestamp))
        .bind(record.resolved_at.map(format_datetime))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("Conflict record saved");
        Ok(())
    }

    async fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>, ApplicationError> {
        let row: Option<ConflictRow> = sqlx::query_as(&format!("{SELECT_RECORD} WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(ConflictRow::into_record).transpose()
    }

    async fn list(&self, unresolved_only: bool) -> Result<Vec<ConflictRecord>, ApplicationError> {
        let sql = if unresolved_only {
            format!("{SELECT_RECORD} WHERE resolved = 0 ORDER BY timestamp DESC")
        } else {
            format!("{SELECT_RECORD} ORDER BY timestamp DESC")
        };
        let rows: Vec<ConflictRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(ConflictRow::into_record).collect()
    }

    #[instrument(skip(self))]
    async fn mark_resolved(
        &self,
        id: &ConflictId,
        choice: ResolutionChoice,
        resolved_at: DateTime<Utc>,
        follow_up: Option<SyncQueueItem>,
    ) -> Result<bool, ApplicationError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            "UPDATE conflict_records SET resolved = 1, resolution = $2, resolved_at = $3
             WHERE id = $1 AND resolved = 0",
        )
        .bind(id.to_string())
        .bind(choice.as_str())
        .bind(format_datetime(resolved_at))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() != 1 {
            return Ok(false);
        }

        if let Some(item) = &follow_up {
            insert_item(&mut *tx, item).await?;
            debug!(item_id = %item.id, "Queued resolution follow-up");
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }

    async fn count_unresolved(&self) -> Result<usize, ApplicationError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conflict_records WHERE resolved = 0")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
