//! Vault material - Persisted salt and verification data for draft encryption

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::KeyDerivationParams;

/// Minimum passphrase length
pub const MIN_PASSPHRASE_LEN: usize = 6;

/// Plaintext sealed into the verification tag
pub const VERIFICATION_MARKER: &[u8] = b"offline-sync-vault-verification-v1";

/// The single persisted vault record; never contains the derived key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMaterial {
    /// Per-install salt, generated once
    pub salt: Vec<u8>,
    /// Nonce used to seal the verification marker
    pub verification_nonce: Vec<u8>,
    /// Sealed verification marker
    pub verification_tag: Vec<u8>,
    /// Parameters the key is derived with
    pub kdf_params: KeyDerivationParams,
    /// Whether new drafts are encrypted
    pub enabled: bool,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for VaultMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultMaterial")
            .field("salt_len", &self.salt.len())
            .field("kdf_params", &self.kdf_params)
            .field("enabled", &self.enabled)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Session state of the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    /// Encryption is off
    Disabled,
    /// Encryption is on but no key is held
    Locked,
    /// Encryption is on and the session key is held
    Unlocked,
}

impl VaultState {
    /// Stable display name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
        }
    }
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
