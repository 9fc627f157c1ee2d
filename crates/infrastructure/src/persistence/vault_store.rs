//! SQLite vault material store
//!
//! One row (`id = 1`) holding the salt and the sealed verification marker.

use application::{error::ApplicationError, ports::VaultMaterialStorePort};
use async_trait::async_trait;
use domain::{KeyDerivationParams, VaultMaterial};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::error::{corrupt, format_datetime, map_sqlx_error, parse_datetime};

#[derive(sqlx::FromRow)]
struct MaterialRow {
    salt: Vec<u8>,
    verification_nonce: Vec<u8>,
    verification_tag: Vec<u8>,
    kdf_params: String,
    enabled: bool,
    updated_at: String,
}

/// Vault material persisted in `vault_material`
#[derive(Debug, Clone)]
pub struct SqliteVaultMaterialStore {
    pool: SqlitePool,
}

impl SqliteVaultMaterialStore {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VaultMaterialStorePort for SqliteVaultMaterialStore {
    async fn load(&self) -> Result<Option<VaultMaterial>, ApplicationError> {
        let row: Option<MaterialRow> = sqlx::query_as(
            "SELECT salt, verification_nonce, verification_tag, kdf_params, enabled, updated_at
             FROM vault_material WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| {
            Ok(VaultMaterial {
                salt: row.salt,
                verification_nonce: row.verification_nonce,
                verification_tag: row.verification_tag,
                kdf_params: serde_json::from_str::<KeyDerivationParams>(&row.kdf_params)
                    .map_err(|e| corrupt("kdf_params", e))?,
                enabled: row.enabled,
                updated_at: parse_datetime(&row.updated_at)?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, material), fields(enabled = material.enabled))]
    async fn save(&self, material: &VaultMaterial) -> Result<(), ApplicationError> {
        let kdf_params = serde_json::to_string(&material.kdf_params)
            .map_err(|e| ApplicationError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO vault_material (
                id, salt, verification_nonce, verification_tag, kdf_params, enabled, updated_at
            ) VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT(id) DO UPDATE SET
                salt = excluded.salt,
                verification_nonce = excluded.verification_nonce,
                verification_tag = excluded.verification_tag,
                kdf_params = excluded.kdf_params,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
        )
        .bind(&material.salt)
        .bind(&material.verification_nonce)
        .bind(&material.verification_tag)
        .bind(kdf_params)
        .bind(material.enabled)
        .bind(format_datetime(material.updated_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("Vault material saved");
        Ok(())
    }
}
