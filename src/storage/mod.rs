//! # Storage Module
//!
//! Password-protected persistence of each user's key pair.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  KeyVault                                                       │   │
//! │  │  ────────                                                        │   │
//! │  │                                                                 │   │
//! │  │  initialize / unlock / rotate / change password / expire       │   │
//! │  │  Wraps private keys before they reach a KeyStore               │   │
//! │  └───────────────────────────────┬─────────────────────────────────┘   │
//! │                                  │  StoredKeyData (ciphertext only)    │
//! │                                  ▼                                      │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  dyn KeyStore                                                   │   │
//! │  │  ────────────                                                    │   │
//! │  │                                                                 │   │
//! │  │  get(user_id) · put(record) · delete(user_id)                  │   │
//! │  │                                                                 │   │
//! │  │  MemoryKeyStore  - tests and ephemeral sessions                │   │
//! │  │  SqliteKeyStore  - `user_keys` table, schema-versioned         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      KEY WRAPPING                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  password ──► PBKDF2-SHA256(salt, kdf_iterations) ──► wrapping key     │
//! │                                                         │               │
//! │  PKCS#8 private key ──► AES-256-GCM(wrapping key, nonce,│               │
//! │                                     aad = user_id) ◄────┘               │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │                       encrypted_private_key                             │
//! │                                                                         │
//! │  A store never sees a plaintext private key or a password. Binding     │
//! │  the user id as AAD stops a record from being replayed under another  │
//! │  user's id.                                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod memory;
mod schema;
mod sqlite;
mod vault;

pub use memory::MemoryKeyStore;
pub use sqlite::SqliteKeyStore;
pub use vault::{InitializedKeys, KeyVault};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::base64_bytes;
use crate::error::{Error, Result};

/// Lifecycle status of a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// In use for new messages
    Active,
    /// A replacement key is being generated
    Rotating,
    /// No longer used for new messages; still decrypts history
    Expired,
}

impl KeyStatus {
    /// Convert to storage string
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Rotating => "rotating",
            KeyStatus::Expired => "expired",
        }
    }

    /// Parse from storage string
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "rotating" => Ok(KeyStatus::Rotating),
            "expired" => Ok(KeyStatus::Expired),
            other => Err(Error::StorageCorrupted(format!("Unknown key status: {}", other))),
        }
    }
}

/// The persisted form of a user's key pair
///
/// One record per user. Everything here is safe to write to disk: the private
/// key is only present encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyData {
    /// User id
    pub id: String,
    /// SPKI DER
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    /// AES-GCM(PKCS#8 DER) with the tag appended
    #[serde(with = "base64_bytes")]
    pub encrypted_private_key: Vec<u8>,
    /// Nonce used to wrap the private key
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// PBKDF2 salt
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    /// PBKDF2 iteration count the key was wrapped with
    pub kdf_iterations: u32,
    /// Stored lifecycle status
    pub status: KeyStatus,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl StoredKeyData {
    /// Status as of `now_millis`: an `Active` record past `expires_at` is `Expired`
    pub fn effective_status(&self, now_millis: i64) -> KeyStatus {
        match (self.status, self.expires_at) {
            (KeyStatus::Active, Some(expires_at)) if now_millis >= expires_at => KeyStatus::Expired,
            (status, _) => status,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Durable key-value storage for key records, keyed by user id
///
/// Each call is atomic with respect to a single record.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load the record for `user_id`
    async fn get(&self, user_id: &str) -> Result<Option<StoredKeyData>>;

    /// Insert or replace the record for `record.id`
    async fn put(&self, record: StoredKeyData) -> Result<()>;

    /// Remove the record for `user_id`, returning whether one existed
    async fn delete(&self, user_id: &str) -> Result<bool>;
}
