//! Persistence module
//!
//! SQLite-backed stores for the sync queue, conflicts, the entity cache,
//! cache preferences, vault material and drafts. All stores share one pool.

pub mod async_connection;
pub mod conflict_store;
pub mod draft_store;
pub mod entity_cache_store;
pub mod error;
pub mod id_remap;
pub mod preferences_store;
pub mod sync_queue_store;
pub mod vault_store;

pub use async_connection::{AsyncDatabase, AsyncDatabaseConfig, AsyncDatabaseError};
pub use conflict_store::SqliteConflictStore;
pub use draft_store::SqliteDraftStore;
pub use entity_cache_store::{EntityCacheConfig, SqliteEntityCache};
pub use id_remap::SqliteIdRemap;
pub use preferences_store::SqlitePreferencesStore;
pub use sync_queue_store::SqliteSyncQueueStore;
pub use vault_store::SqliteVaultMaterialStore;
