//! Draft entity - User text that may be stored encrypted at rest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::DraftId;

/// Parameters the draft key was derived with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyDerivationParams {
    /// KDF name
    pub algorithm: String,
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            algorithm: "argon2id".to_string(),
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Sealed draft text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDraft {
    /// Draft this ciphertext belongs to
    pub id: DraftId,
    /// Authenticated ciphertext
    pub ciphertext: Vec<u8>,
    /// Per-draft nonce
    pub nonce: Vec<u8>,
    /// How the sealing key was derived
    pub key_derivation_params: KeyDerivationParams,
}

/// Stored form of a draft's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DraftBody {
    /// Stored as-is
    Plaintext { text: String },
    /// Stored sealed
    Encrypted(EncryptedDraft),
}

/// A locally stored draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Unique identifier
    pub id: DraftId,
    /// Short non-secret label
    pub label: String,
    /// Text, plain or sealed
    pub body: DraftBody,
    /// When the draft was created
    pub created_at: DateTime<Utc>,
    /// When the draft was last saved
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    /// Create a plaintext draft
    pub fn plaintext(id: DraftId, label: impl Into<String>, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            label: label.into(),
            body: DraftBody::Plaintext { text: text.into() },
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the text is sealed
    pub const fn is_encrypted(&self) -> bool {
        matches!(self.body, DraftBody::Encrypted(_))
    }

    /// Replace the body, keeping identity and creation time
    pub fn replace_body(&mut self, body: DraftBody) {
        self.body = body;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_draft_is_not_encrypted() {
        let draft = Draft::plaintext(DraftId::new(), "note", "hello");
        assert!(!draft.is_encrypted());
        assert_eq!(
            draft.body,
            DraftBody::Plaintext {
                text: "hello".to_string()
            }
        );
    }

    #[test]
    fn replace_body_keeps_identity() {
        let mut draft = Draft::plaintext(DraftId::new(), "note", "hello");
        let id = draft.id;
        let created = draft.created_at;
        draft.replace_body(DraftBody::Encrypted(EncryptedDraft {
            id,
            ciphertext: vec![1, 2, 3],
            nonce: vec![0; 24],
            key_derivation_params: KeyDerivationParams::default(),
        }));
        assert!(draft.is_encrypted());
        assert_eq!(draft.id, id);
        assert_eq!(draft.created_at, created);
    }

    #[test]
    fn default_kdf_is_argon2id() {
        assert_eq!(KeyDerivationParams::default().algorithm, "argon2id");
    }
}
