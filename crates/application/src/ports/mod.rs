//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod conflict_store;
mod entity_cache;
mod id_remap;
mod preferences_store;
mod remote_service;
mod storage_platform;
mod sync_queue_store;
mod vault_crypto;
mod vault_store;

pub use conflict_store::ConflictStorePort;
#[cfg(test)]
pub use conflict_store::MockConflictStorePort;
pub use entity_cache::EntityCachePort;
#[cfg(test)]
pub use entity_cache::MockEntityCachePort;
#[cfg(test)]
pub use id_remap::MockIdRemapPort;
pub use id_remap::{IdRemapPort, RemapSummary};
#[cfg(test)]
pub use preferences_store::MockPreferencesStorePort;
pub use preferences_store::PreferencesStorePort;
#[cfg(test)]
pub use remote_service::MockRemoteServicePort;
pub use remote_service::{RemoteEntity, RemoteError, RemoteOutcome, RemoteServicePort};
#[cfg(test)]
pub use storage_platform::MockStoragePlatformPort;
pub use storage_platform::StoragePlatformPort;
#[cfg(test)]
pub use sync_queue_store::MockSyncQueueStorePort;
pub use sync_queue_store::{QueueStats, SyncQueueStorePort};
#[cfg(test)]
pub use vault_crypto::MockVaultCryptoPort;
pub use vault_crypto::{SealedBox, VAULT_KEY_LEN, VaultCryptoPort, VaultKey};
#[cfg(test)]
pub use vault_store::{MockDraftStorePort, MockVaultMaterialStorePort};
pub use vault_store::{DraftStorePort, VaultMaterialStorePort};
