//! Domain entities - Objects with identity and lifecycle

mod cache_preferences;
mod cached_entity;
mod conflict_record;
mod draft;
mod storage_estimate;
mod sync_queue_item;
mod vault_material;

pub use cache_preferences::{CachePreferences, DEFAULT_MAX_CACHE_SIZE_MB};
pub use cached_entity::CachedEntity;
pub use conflict_record::ConflictRecord;
pub use draft::{Draft, DraftBody, EncryptedDraft, KeyDerivationParams};
pub use storage_estimate::{StorageEstimate, StorageReport};
pub use sync_queue_item::SyncQueueItem;
pub use vault_material::{MIN_PASSPHRASE_LEN, VERIFICATION_MARKER, VaultMaterial, VaultState};
