//! # Group Encryption
//!
//! Symmetric AES-256-GCM encryption under a key shared by every group member.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      GROUP KEY LIFECYCLE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  admin: generate_symmetric_key ──► export (base64) ──► members         │
//! │                                     (over direct messages)             │
//! │                                                                         │
//! │  member: import_symmetric_key ──► GroupKeyRing::set_key(group_id)     │
//! │                                                                         │
//! │  rotate(group_id): new key replaces the old one wholesale. Messages   │
//! │  under the old key can no longer be decrypted through the ring.       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no forward secrecy at this layer; a leaked group key exposes
//! every message sent under it until the next rotation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::codec::{self, base64_bytes};
use crate::crypto::{self, CryptoProvider, Nonce, SymmetricKey, KEY_SIZE};
use crate::error::{Error, Result};

/// An encrypted group message as it travels over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedGroupMessage {
    /// AES-GCM ciphertext with the 16-byte tag appended
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// 12-byte AES-GCM nonce
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

impl EncryptedGroupMessage {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Pre-shared key encryption for groups
#[derive(Clone)]
pub struct GroupCipher {
    provider: Arc<dyn CryptoProvider>,
}

impl GroupCipher {
    /// Create a group cipher over the given provider
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    /// Generate a new extractable group key
    pub fn generate_symmetric_key(&self) -> Result<SymmetricKey> {
        SymmetricKey::random(self.provider.as_ref())
    }

    /// Encrypt under a group key with a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> Result<EncryptedGroupMessage> {
        let (nonce, ciphertext) = crypto::encrypt(self.provider.as_ref(), key, plaintext, &[])?;
        Ok(EncryptedGroupMessage {
            ciphertext,
            nonce: nonce.as_bytes().to_vec(),
        })
    }

    /// Decrypt a group message
    ///
    /// `AuthenticationFailed` on a wrong key, a nonce of the wrong length, or
    /// any tampering.
    pub fn decrypt(&self, message: &EncryptedGroupMessage, key: &SymmetricKey) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(&message.nonce).ok_or(Error::AuthenticationFailed)?;
        crypto::decrypt(self.provider.as_ref(), key, &nonce, &message.ciphertext, &[])
    }

    /// Export a group key as base64 raw bytes
    ///
    /// `KeyNotExtractable` for keys derived from ECDH or a password.
    pub fn export_symmetric_key(&self, key: &SymmetricKey) -> Result<String> {
        let raw = key.export_raw()?;
        Ok(codec::encode(raw.as_slice()))
    }

    /// Import a base64 raw group key
    ///
    /// `MalformedKey` unless the input decodes to exactly 32 bytes.
    pub fn import_symmetric_key(&self, encoded: &str) -> Result<SymmetricKey> {
        let raw = zeroize::Zeroizing::new(
            codec::decode(encoded)
                .map_err(|_| Error::MalformedKey("Group key is not valid base64".into()))?,
        );

        let bytes: [u8; KEY_SIZE] = raw.as_slice().try_into().map_err(|_| {
            Error::MalformedKey(format!(
                "Group key must be {} bytes, got {}",
                KEY_SIZE,
                raw.len()
            ))
        })?;

        Ok(SymmetricKey::from_raw(bytes, true))
    }
}

impl std::fmt::Debug for GroupCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCipher").finish_non_exhaustive()
    }
}

/// The active key for each group
///
/// Exactly one key per group id. Setting or rotating replaces the previous key.
pub struct GroupKeyRing {
    cipher: GroupCipher,
    keys: RwLock<HashMap<String, Arc<SymmetricKey>>>,
}

impl GroupKeyRing {
    /// Create an empty ring
    pub fn new(cipher: GroupCipher) -> Self {
        Self {
            cipher,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Install `key` as the active key for `group_id`
    pub fn set_key(&self, group_id: &str, key: SymmetricKey) -> Arc<SymmetricKey> {
        let key = Arc::new(key);
        self.keys.write().insert(group_id.to_string(), Arc::clone(&key));
        key
    }

    /// The active key for `group_id`
    pub fn get_key(&self, group_id: &str) -> Option<Arc<SymmetricKey>> {
        self.keys.read().get(group_id).cloned()
    }

    /// Generate a fresh key and make it active
    pub fn rotate(&self, group_id: &str) -> Result<Arc<SymmetricKey>> {
        let key = self.cipher.generate_symmetric_key()?;
        tracing::debug!(group_id, "Rotated group key");
        Ok(self.set_key(group_id, key))
    }

    /// Forget the key for `group_id`
    pub fn remove(&self, group_id: &str) -> bool {
        self.keys.write().remove(group_id).is_some()
    }

    /// Encrypt under the group's active key
    ///
    /// `NoKeysFound` if the group has no key.
    pub fn encrypt(&self, group_id: &str, plaintext: &[u8]) -> Result<EncryptedGroupMessage> {
        let key = self.get_key(group_id).ok_or(Error::NoKeysFound)?;
        self.cipher.encrypt(plaintext, &key)
    }

    /// Decrypt under the group's active key
    pub fn decrypt(&self, group_id: &str, message: &EncryptedGroupMessage) -> Result<Vec<u8>> {
        let key = self.get_key(group_id).ok_or(Error::NoKeysFound)?;
        self.cipher.decrypt(message, &key)
    }

    /// Forget every group key
    pub fn clear(&self) {
        self.keys.write().clear();
    }

    /// The cipher used for this ring's keys
    pub fn cipher(&self) -> &GroupCipher {
        &self.cipher
    }

    /// Number of groups with an active key
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether no group has a key
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl std::fmt::Debug for GroupKeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeyRing")
            .field("groups", &self.len())
            .finish()
    }
}
