//! Engine assembly from configuration
//!
//! Opens the database, runs migrations and wires every SQLite store and
//! adapter into a [`SyncEngine`].

use std::sync::Arc;

use application::{
    EventNotifier, SyncEngine, SyncEnginePorts,
    ports::{RemoteError, RemoteServicePort},
};
use tracing::{info, instrument};

use crate::{
    adapters::{Argon2ChaChaVaultCrypto, HttpRemoteAdapter, SqliteStoragePlatform},
    config::AppConfig,
    persistence::{
        AsyncDatabase, AsyncDatabaseError, SqliteConflictStore, SqliteDraftStore,
        SqliteEntityCache, SqliteIdRemap, SqlitePreferencesStore, SqliteSyncQueueStore,
        SqliteVaultMaterialStore,
    },
};

/// Errors while assembling the engine
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Database(#[from] AsyncDatabaseError),

    #[error("Remote client error: {0}")]
    Remote(#[from] RemoteError),
}

/// A ready engine and the database it runs on
#[derive(Debug)]
pub struct SyncRuntime {
    pub engine: Arc<SyncEngine>,
    pub database: AsyncDatabase,
}

impl SyncRuntime {
    /// Close the database pool
    pub async fn shutdown(&self) {
        self.database.close().await;
    }
}

/// Build an engine against the configured database and remote service
#[instrument(skip_all, fields(database = %config.database.path, remote = %config.remote.base_url))]
pub async fn build_runtime(
    config: &AppConfig,
    notifier: Arc<EventNotifier>,
) -> Result<SyncRuntime, BootstrapError> {
    let database = AsyncDatabase::new(&config.database.pool_config()).await?;
    if config.database.run_migrations {
        database.migrate().await?;
    }

    let remote = Arc::new(HttpRemoteAdapter::new(&config.remote)?);
    let engine = assemble(&database, config, remote, notifier);
    info!("Sync runtime ready");

    Ok(SyncRuntime {
        engine: Arc::new(engine),
        database,
    })
}

/// Wire the SQLite stores around an arbitrary remote service
pub fn assemble(
    database: &AsyncDatabase,
    config: &AppConfig,
    remote: Arc<dyn RemoteServicePort>,
    notifier: Arc<EventNotifier>,
) -> SyncEngine {
    let pool = database.pool().clone();
    let cache = Arc::new(SqliteEntityCache::with_config(
        pool.clone(),
        config.cache.into(),
    ));

    let ports = SyncEnginePorts {
        queue: Arc::new(SqliteSyncQueueStore::new(pool.clone())),
        conflicts: Arc::new(SqliteConflictStore::new(pool.clone())),
        id_remap: Arc::new(SqliteIdRemap::new(pool.clone(), Arc::clone(&cache))),
        cache,
        preferences: Arc::new(SqlitePreferencesStore::new(pool.clone())),
        vault_material: Arc::new(SqliteVaultMaterialStore::new(pool.clone())),
        drafts: Arc::new(SqliteDraftStore::new(pool)),
        vault_crypto: Arc::new(Argon2ChaChaVaultCrypto::new()),
        remote,
        platform: Arc::new(SqliteStoragePlatform::new(database.clone(), config.storage)),
    };

    SyncEngine::new(ports, config.engine_config(), notifier)
}
