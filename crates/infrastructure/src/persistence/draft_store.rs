//! SQLite draft store implementation
//!
//! A draft row is either plaintext (`text`) or sealed (`ciphertext`, `nonce`,
//! `kdf_params`); the table CHECK enforces exactly one shape.

use application::{error::ApplicationError, ports::DraftStorePort};
use async_trait::async_trait;
use domain::{Draft, DraftBody, DraftId, EncryptedDraft, KeyDerivationParams};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::error::{corrupt, format_datetime, map_sqlx_error, parse_datetime};

const SELECT_DRAFT: &str =
    "SELECT id, label, kind, text, ciphertext, nonce, kdf_params, created_at, updated_at
     FROM drafts";

#[derive(sqlx::FromRow)]
struct DraftRow {
    id: String,
    label: String,
    kind: String,
    text: Option<String>,
    ciphertext: Option<Vec<u8>>,
    nonce: Option<Vec<u8>>,
    kdf_params: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DraftRow {
    fn into_draft(self) -> Result<Draft, ApplicationError> {
        let id = DraftId::parse(&self.id).map_err(|e| corrupt("draft id", e))?;
        let body = match (self.kind.as_str(), self.text, self.ciphertext, self.nonce) {
            ("plaintext", Some(text), None, _) => DraftBody::Plaintext { text },
            ("encrypted", None, Some(ciphertext), Some(nonce)) => {
                let params = self
                    .kdf_params
                    .as_deref()
                    .map(serde_json::from_str::<KeyDerivationParams>)
                    .transpose()
                    .map_err(|e| corrupt("kdf_params", e))?
                    .unwrap_or_default();
                DraftBody::Encrypted(EncryptedDraft {
                    id,
                    ciphertext,
                    nonce,
                    key_derivation_params: params,
                })
            },
            (kind, ..) => return Err(corrupt("draft body", format!("kind {kind}"))),
        };

        Ok(Draft {
            id,
            label: self.label,
            body,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

/// Drafts persisted in the `drafts` table
#[derive(Debug, Clone)]
pub struct SqliteDraftStore {
    pool: SqlitePool,
}

impl SqliteDraftStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DraftStorePort for SqliteDraftStore {
    #[instrument(skip(self, draft), fields(draft_id = %draft.id, encrypted = draft.is_encrypted()))]
    async fn save(&self, draft: &Draft) -> Result<(), ApplicationError> {
        let (kind, text, ciphertext, nonce, kdf_params) = match &draft.body {
            DraftBody::Plaintext { text } => ("plaintext", Some(text.as_str()), None, None, None),
            DraftBody::Encrypted(sealed) => (
                "encrypted",
                None,
                Some(sealed.ciphertext.as_slice()),
                Some(sealed.nonce.as_slice()),
                Some(
                    serde_json::to_string(&sealed.key_derivation_params)
                        .map_err(|e| ApplicationError::Internal(e.to_string()))?,
                ),
            ),
        };

        sqlx::query(
            "INSERT INTO drafts (
                id, label, kind, text, ciphertext, nonce, kdf_params, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                kind = excluded.kind,
                text = excluded.text,
                ciphertext = excluded.ciphertext,
                nonce = excluded.nonce,
                kdf_params = excluded.kdf_params,
                updated_at = excluded.updated_at",
        )
        .bind(draft.id.to_string())
        .bind(&draft.label)
        .bind(kind)
        .bind(text)
        .bind(ciphertext)
        .bind(nonce)
        .bind(kdf_params)
        .bind(format_datetime(draft.created_at))
        .bind(format_datetime(draft.updated_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("Saved draft");
        Ok(())
    }

    async fn get(&self, id: &DraftId) -> Result<Option<Draft>, ApplicationError> {
        let row: Option<DraftRow> = sqlx::query_as(&format!("{SELECT_DRAFT} WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DraftRow::into_draft).transpose()
    }

    async fn list(&self) -> Result<Vec<Draft>, ApplicationError> {
        let rows: Vec<DraftRow> =
            sqlx::query_as(&format!("{SELECT_DRAFT} ORDER BY updated_at DESC"))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        rows.into_iter().map(DraftRow::into_draft).collect()
    }

    async fn delete(&self, id: &DraftId) -> Result<bool, ApplicationError> {
        let result = sqlx::query("DELETE FROM drafts WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_encrypted(&self) -> Result<usize, ApplicationError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM drafts WHERE kind = 'encrypted'")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
