//! Vault cryptography port
//!
//! Password-based key derivation and authenticated encryption for drafts.

use std::fmt;

use async_trait::async_trait;
use domain::KeyDerivationParams;
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretBox, SecretString};

use crate::error::ApplicationError;

/// Length of a derived draft key in bytes
pub const VAULT_KEY_LEN: usize = 32;

/// Derived draft key; zeroized on drop
pub struct VaultKey(SecretBox<[u8; VAULT_KEY_LEN]>);

impl VaultKey {
    /// Wrap raw key bytes
    pub fn new(bytes: [u8; VAULT_KEY_LEN]) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Borrow the raw key bytes
    pub fn expose(&self) -> &[u8; VAULT_KEY_LEN] {
        self.0.expose_secret()
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Ciphertext with the nonce it was sealed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Port for vault cryptography
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VaultCryptoPort: Send + Sync {
    /// Generate a fresh random salt
    fn generate_salt(&self) -> Vec<u8>;

    /// Derive a key from a passphrase
    async fn derive_key(
        &self,
        passphrase: &SecretString,
        salt: &[u8],
        params: &KeyDerivationParams,
    ) -> Result<VaultKey, ApplicationError>;

    /// Encrypt with a fresh random nonce
    fn seal(&self, key: &VaultKey, plaintext: &[u8]) -> Result<SealedBox, ApplicationError>;

    /// Decrypt and authenticate
    ///
    /// Fails with `ApplicationError::Auth` if the key is wrong or the data was tampered with.
    fn open(
        &self,
        key: &VaultKey,
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ApplicationError>;
}
