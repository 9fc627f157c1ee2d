//! Argon2id + XChaCha20-Poly1305 vault cryptography
//!
//! Keys are derived from the passphrase with Argon2id on a blocking thread.
//! Every seal uses a fresh random 192-bit nonce.

use application::{
    error::ApplicationError,
    ports::{SealedBox, VAULT_KEY_LEN, VaultCryptoPort, VaultKey},
};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use domain::KeyDerivationParams;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};

/// Nonce size for XChaCha20-Poly1305 (24 bytes)
const NONCE_SIZE: usize = 24;

/// Salt size generated for new vaults
const SALT_SIZE: usize = 16;

const SUPPORTED_ALGORITHM: &str = "argon2id";

/// Vault crypto backed by Argon2id and XChaCha20-Poly1305
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2ChaChaVaultCrypto;

impl Argon2ChaChaVaultCrypto {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn argon2(params: &KeyDerivationParams) -> Result<Argon2<'static>, ApplicationError> {
        if params.algorithm != SUPPORTED_ALGORITHM {
            return Err(ApplicationError::Configuration(format!(
                "Unsupported key derivation algorithm: {}",
                params.algorithm
            )));
        }
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(VAULT_KEY_LEN),
        )
        .map_err(|e| ApplicationError::Configuration(format!("Invalid Argon2 parameters: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn cipher(key: &VaultKey) -> Result<XChaCha20Poly1305, ApplicationError> {
        XChaCha20Poly1305::new_from_slice(key.expose())
            .map_err(|e| ApplicationError::Internal(format!("Invalid vault key: {e}")))
    }
}

#[async_trait]
impl VaultCryptoPort for Argon2ChaChaVaultCrypto {
    fn generate_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    #[instrument(skip(self, passphrase, salt), fields(memory_kib = params.memory_kib, iterations = params.iterations))]
    async fn derive_key(
        &self,
        passphrase: &SecretString,
        salt: &[u8],
        params: &KeyDerivationParams,
    ) -> Result<VaultKey, ApplicationError> {
        let argon2 = Self::argon2(params)?;
        let passphrase = SecretString::from(passphrase.expose_secret().to_owned());
        let salt = salt.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut key = [0u8; VAULT_KEY_LEN];
            argon2
                .hash_password_into(passphrase.expose_secret().as_bytes(), &salt, &mut key)
                .map_err(|e| ApplicationError::Internal(format!("Key derivation failed: {e}")))?;
            debug!("Vault key derived");
            Ok(VaultKey::new(key))
        })
        .await
        .map_err(|e| ApplicationError::Internal(format!("Key derivation task failed: {e}")))?
    }

    fn seal(&self, key: &VaultKey, plaintext: &[u8]) -> Result<SealedBox, ApplicationError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = Self::cipher(key)?
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| ApplicationError::Internal(format!("Encryption failed: {e}")))?;

        Ok(SealedBox {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    fn open(
        &self,
        key: &VaultKey,
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ApplicationError> {
        if nonce.len() != NONCE_SIZE {
            return Err(ApplicationError::Auth);
        }
        Self::cipher(key)?
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                warn!("Decryption failed - wrong key or tampered data");
                ApplicationError::Auth
            })
    }
}
