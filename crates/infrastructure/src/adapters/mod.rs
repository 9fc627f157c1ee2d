//! Infrastructure adapters
//!
//! Adapters connect application ports to concrete implementations.

mod http_remote_adapter;
mod storage_platform_adapter;
mod vault_crypto_adapter;

pub use http_remote_adapter::{HttpRemoteAdapter, RemoteConfig};
pub use storage_platform_adapter::{SqliteStoragePlatform, StorageConfig};
pub use vault_crypto_adapter::Argon2ChaChaVaultCrypto;
