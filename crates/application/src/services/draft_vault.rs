//! Draft Vault - Optional passphrase encryption of drafts at rest
//!
//! The vault moves between three states: disabled, locked and unlocked.
//! Only the salt and a sealed verification marker are persisted; the
//! derived key lives in memory for the session and is zeroized on lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::{
    Draft, DraftBody, DraftId, EncryptedDraft, KeyDerivationParams, MIN_PASSPHRASE_LEN,
    SyncEvent, VERIFICATION_MARKER, VaultMaterial, VaultState,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::ApplicationError,
    ports::{DraftStorePort, VaultCryptoPort, VaultKey, VaultMaterialStorePort},
    services::EventNotifier,
};

/// A draft with its text readable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedDraft {
    pub id: DraftId,
    pub label: String,
    pub text: String,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Draft metadata without its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftSummary {
    pub id: DraftId,
    pub label: String,
    pub encrypted: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Draft> for DraftSummary {
    fn from(draft: &Draft) -> Self {
        Self {
            id: draft.id,
            label: draft.label.clone(),
            encrypted: draft.is_encrypted(),
            updated_at: draft.updated_at,
        }
    }
}

/// Key held for the session together with the parameters it was derived with
struct Session {
    key: VaultKey,
    params: KeyDerivationParams,
}

/// Service encrypting drafts with a passphrase-derived key
pub struct DraftVault {
    material: Arc<dyn VaultMaterialStorePort>,
    drafts: Arc<dyn DraftStorePort>,
    crypto: Arc<dyn VaultCryptoPort>,
    notifier: Arc<EventNotifier>,
    kdf_params: KeyDerivationParams,
    session: RwLock<Option<Session>>,
}

impl std::fmt::Debug for DraftVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftVault")
            .field("kdf_params", &self.kdf_params)
            .finish_non_exhaustive()
    }
}

impl DraftVault {
    /// Create a new draft vault
    ///
    /// `kdf_params` apply to newly created vault material; existing material
    /// keeps the parameters it was created with.
    pub fn new(
        material: Arc<dyn VaultMaterialStorePort>,
        drafts: Arc<dyn DraftStorePort>,
        crypto: Arc<dyn VaultCryptoPort>,
        notifier: Arc<EventNotifier>,
        kdf_params: KeyDerivationParams,
    ) -> Self {
        Self {
            material,
            drafts,
            crypto,
            notifier,
            kdf_params,
            session: RwLock::new(None),
        }
    }

    /// Current vault state
    pub async fn state(&self) -> Result<VaultState, ApplicationError> {
        let enabled = self
            .material
            .load()
            .await?
            .is_some_and(|material| material.enabled);
        Ok(self.state_for(enabled).await)
    }

    async fn state_for(&self, enabled: bool) -> VaultState {
        if !enabled {
            VaultState::Disabled
        } else if self.session.read().await.is_some() {
            VaultState::Unlocked
        } else {
            VaultState::Locked
        }
    }

    /// Turn encryption on and unlock
    ///
    /// The salt is generated once per install and reused. When encrypted
    /// drafts from an earlier enablement exist, the passphrase must match
    /// the one they were sealed with.
    #[instrument(skip_all)]
    pub async fn enable(
        &self,
        passphrase: &SecretString,
        confirmation: &SecretString,
    ) -> Result<(), ApplicationError> {
        validate_passphrase(passphrase, confirmation)?;

        let existing = self.material.load().await?;
        if existing.as_ref().is_some_and(|material| material.enabled) {
            return Err(ApplicationError::InvalidOperation(
                "Draft encryption is already enabled".to_string(),
            ));
        }

        let encrypted = self.drafts.count_encrypted().await?;
        let (material, key) = match existing {
            Some(previous) if encrypted > 0 => {
                debug!(encrypted, "Verifying passphrase against existing drafts");
                let key = self.verify(passphrase, &previous).await?;
                (previous, key)
            },
            previous => {
                let salt = previous
                    .map(|material| material.salt)
                    .unwrap_or_else(|| self.crypto.generate_salt());
                let key = self
                    .crypto
                    .derive_key(passphrase, &salt, &self.kdf_params)
                    .await?;
                let sealed = self.crypto.seal(&key, VERIFICATION_MARKER)?;
                let material = VaultMaterial {
                    salt,
                    verification_nonce: sealed.nonce,
                    verification_tag: sealed.ciphertext,
                    kdf_params: self.kdf_params.clone(),
                    enabled: false,
                    updated_at: Utc::now(),
                };
                (material, key)
            },
        };

        let material = VaultMaterial {
            enabled: true,
            updated_at: Utc::now(),
            ..material
        };
        self.material.save(&material).await?;
        *self.session.write().await = Some(Session {
            key,
            params: material.kdf_params,
        });

        info!("Draft encryption enabled");
        self.publish(VaultState::Unlocked);
        Ok(())
    }

    /// Derive the key and hold it for the session
    ///
    /// Every failure is reported as the same `Auth` error.
    #[instrument(skip_all)]
    pub async fn unlock(&self, passphrase: &SecretString) -> Result<VaultState, ApplicationError> {
        let Some(material) = self.material.load().await? else {
            return Err(ApplicationError::InvalidOperation(
                "Draft encryption was never enabled".to_string(),
            ));
        };

        let key = self.verify(passphrase, &material).await?;
        *self.session.write().await = Some(Session {
            key,
            params: material.kdf_params.clone(),
        });

        let state = self.state_for(material.enabled).await;
        info!(%state, "Vault unlocked");
        self.publish(state);
        Ok(state)
    }

    /// Drop the session key; no-op while disabled
    #[instrument(skip(self))]
    pub async fn lock(&self) -> Result<VaultState, ApplicationError> {
        let state = self.state().await?;
        if state == VaultState::Disabled {
            return Ok(state);
        }
        self.session.write().await.take();
        info!("Vault locked");
        self.publish(VaultState::Locked);
        Ok(VaultState::Locked)
    }

    /// Stop encrypting new drafts
    ///
    /// Encrypted drafts stay encrypted and stay readable while the session
    /// key is held.
    #[instrument(skip(self))]
    pub async fn disable(&self) -> Result<(), ApplicationError> {
        let Some(material) = self.material.load().await? else {
            return Ok(());
        };
        if !material.enabled {
            return Ok(());
        }
        self.material
            .save(&VaultMaterial {
                enabled: false,
                updated_at: Utc::now(),
                ..material
            })
            .await?;
        info!("Draft encryption disabled");
        self.publish(VaultState::Disabled);
        Ok(())
    }

    /// Encrypt every plaintext draft in place
    ///
    /// # Returns
    /// The number of drafts encrypted
    #[instrument(skip(self))]
    pub async fn encrypt_all_drafts(&self) -> Result<usize, ApplicationError> {
        match self.state().await? {
            VaultState::Disabled => {
                return Err(ApplicationError::InvalidOperation(
                    "Draft encryption is disabled".to_string(),
                ));
            },
            VaultState::Locked => return Err(ApplicationError::VaultLocked),
            VaultState::Unlocked => {},
        }

        let session = self.session.read().await;
        let session = session.as_ref().ok_or(ApplicationError::VaultLocked)?;
        let mut encrypted = 0;
        for mut draft in self.drafts.list().await? {
            let DraftBody::Plaintext { text } = &draft.body else {
                continue;
            };
            let body = self.seal(session, draft.id, text)?;
            draft.replace_body(body);
            self.drafts.save(&draft).await?;
            encrypted += 1;
        }

        info!(encrypted, "Encrypted drafts");
        Ok(encrypted)
    }

    /// Decrypt every encrypted draft back to plaintext
    ///
    /// Only allowed after `disable`, with the session key still held.
    ///
    /// # Returns
    /// The number of drafts decrypted
    #[instrument(skip(self))]
    pub async fn decrypt_all_drafts(&self) -> Result<usize, ApplicationError> {
        if self.state().await? != VaultState::Disabled {
            return Err(ApplicationError::InvalidOperation(
                "Disable draft encryption before decrypting drafts".to_string(),
            ));
        }
        if self.drafts.count_encrypted().await? == 0 {
            return Ok(0);
        }

        let session = self.session.read().await;
        let session = session.as_ref().ok_or(ApplicationError::VaultLocked)?;
        let mut decrypted = 0;
        for mut draft in self.drafts.list().await? {
            let DraftBody::Encrypted(sealed) = &draft.body else {
                continue;
            };
            let text = self.open(session, sealed)?;
            draft.replace_body(DraftBody::Plaintext { text });
            self.drafts.save(&draft).await?;
            decrypted += 1;
        }

        info!(decrypted, "Decrypted drafts");
        Ok(decrypted)
    }

    /// Create or overwrite a draft
    ///
    /// The text is sealed when encryption is enabled or when the draft was
    /// already encrypted; an encrypted draft is never written back as
    /// plaintext.
    #[instrument(skip(self, text))]
    pub async fn save_draft(
        &self,
        id: Option<DraftId>,
        label: &str,
        text: &str,
    ) -> Result<Draft, ApplicationError> {
        let state = self.state().await?;
        if state == VaultState::Locked {
            return Err(ApplicationError::VaultLocked);
        }

        let existing = match id {
            Some(id) => self.drafts.get(&id).await?,
            None => None,
        };
        let must_encrypt = state == VaultState::Unlocked
            || existing.as_ref().is_some_and(Draft::is_encrypted);

        let mut draft = match existing {
            Some(mut draft) => {
                draft.label = label.to_string();
                draft
            },
            None => Draft::plaintext(id.unwrap_or_default(), label, ""),
        };

        let body = if must_encrypt {
            let session = self.session.read().await;
            let session = session.as_ref().ok_or(ApplicationError::VaultLocked)?;
            self.seal(session, draft.id, text)?
        } else {
            DraftBody::Plaintext {
                text: text.to_string(),
            }
        };
        draft.replace_body(body);
        self.drafts.save(&draft).await?;

        debug!(draft_id = %draft.id, encrypted = draft.is_encrypted(), "Draft saved");
        Ok(draft)
    }

    /// Read a draft's text
    #[instrument(skip(self))]
    pub async fn read_draft(&self, id: &DraftId) -> Result<OpenedDraft, ApplicationError> {
        self.ensure_not_locked().await?;

        let draft = self
            .drafts
            .get(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("Draft {id} not found")))?;

        let text = match &draft.body {
            DraftBody::Plaintext { text } => text.clone(),
            DraftBody::Encrypted(sealed) => {
                let session = self.session.read().await;
                let session = session.as_ref().ok_or(ApplicationError::VaultLocked)?;
                self.open(session, sealed)?
            },
        };

        Ok(OpenedDraft {
            id: draft.id,
            label: draft.label.clone(),
            text,
            encrypted: draft.is_encrypted(),
            created_at: draft.created_at,
            updated_at: draft.updated_at,
        })
    }

    /// Draft metadata, most recently updated first
    pub async fn list_drafts(&self) -> Result<Vec<DraftSummary>, ApplicationError> {
        self.ensure_not_locked().await?;
        Ok(self.drafts.list().await?.iter().map(DraftSummary::from).collect())
    }

    /// Delete a draft
    pub async fn delete_draft(&self, id: &DraftId) -> Result<bool, ApplicationError> {
        self.ensure_not_locked().await?;
        self.drafts.delete(id).await
    }

    async fn ensure_not_locked(&self) -> Result<(), ApplicationError> {
        if self.state().await? == VaultState::Locked {
            return Err(ApplicationError::VaultLocked);
        }
        Ok(())
    }

    /// Re-derive the key from stored material and check the verification tag
    async fn verify(
        &self,
        passphrase: &SecretString,
        material: &VaultMaterial,
    ) -> Result<VaultKey, ApplicationError> {
        let key = self
            .crypto
            .derive_key(passphrase, &material.salt, &material.kdf_params)
            .await
            .map_err(|err| {
                warn!(error = %err, "Key derivation failed");
                ApplicationError::Auth
            })?;

        match self.crypto.open(
            &key,
            &material.verification_nonce,
            &material.verification_tag,
        ) {
            Ok(marker) if marker == VERIFICATION_MARKER => Ok(key),
            _ => {
                warn!("Vault passphrase rejected");
                Err(ApplicationError::Auth)
            },
        }
    }

    fn seal(&self, session: &Session, id: DraftId, text: &str) -> Result<DraftBody, ApplicationError> {
        let sealed = self.crypto.seal(&session.key, text.as_bytes())?;
        Ok(DraftBody::Encrypted(EncryptedDraft {
            id,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            key_derivation_params: session.params.clone(),
        }))
    }

    fn open(&self, session: &Session, sealed: &EncryptedDraft) -> Result<String, ApplicationError> {
        let plaintext = self
            .crypto
            .open(&session.key, &sealed.nonce, &sealed.ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| ApplicationError::Internal(format!("Draft is not valid UTF-8: {e}")))
    }

    fn publish(&self, state: VaultState) {
        self.notifier.publish(&SyncEvent::VaultStateChanged { state });
    }
}

fn validate_passphrase(
    passphrase: &SecretString,
    confirmation: &SecretString,
) -> Result<(), ApplicationError> {
    let passphrase = passphrase.expose_secret();
    if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
        return Err(ApplicationError::Validation(format!(
            "Passphrase must be at least {MIN_PASSPHRASE_LEN} characters"
        )));
    }
    if passphrase != confirmation.expose_secret() {
        return Err(ApplicationError::Validation(
            "Passphrase confirmation does not match".to_string(),
        ));
    }
    Ok(())
}
