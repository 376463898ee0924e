//! # Error Handling
//!
//! Typed error taxonomy for Cloak Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Configuration Errors                                              │
//! │  │   └── Config                - Invalid configuration value           │
//! │  │                                                                      │
//! │  ├── Recovery Errors                                                   │
//! │  │   ├── InvalidRecoveryPhrase - Invalid BIP39 phrase                  │
//! │  │   └── KeyDerivationFailed   - Failed to derive keys                 │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── EntropyFailure        - Platform randomness unavailable       │
//! │  │   ├── MalformedKey          - Corrupt / wrong-curve key material    │
//! │  │   ├── AuthenticationFailed  - AES-GCM tag check failed              │
//! │  │   ├── EncryptionFailed      - Encryption operation failed           │
//! │  │   ├── KeyNotExtractable     - Raw export of a derived key           │
//! │  │   └── InvalidMessageContent - Decrypted bytes are not valid text    │
//! │  │                                                                      │
//! │  ├── Vault Errors                                                      │
//! │  │   ├── InvalidPassword       - Wrapping key could not unwrap         │
//! │  │   └── NoKeysFound           - User has no key record                │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── ReadError             - Failed to read from storage           │
//! │  │   ├── WriteError            - Failed to write to storage            │
//! │  │   ├── Corrupted             - Stored record is unusable             │
//! │  │   └── DatabaseError         - SQLite failure                        │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── Internal              - Should not happen                     │
//! │      ├── SerializationError    - Encoding a value failed               │
//! │      └── DeserializationError  - Decoding a value failed               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sensitive Material
//!
//! No variant ever carries key bytes, plaintext, or passwords. `InvalidPassword`
//! deliberately has the same message whether or not the user exists in the
//! store.

use thiserror::Error;

/// Result type alias for Cloak Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cloak Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors (100-199)
    // ========================================================================

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ========================================================================
    // Recovery Errors (200-299)
    // ========================================================================

    /// Invalid recovery phrase
    #[error("Invalid recovery phrase: {0}")]
    InvalidRecoveryPhrase(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// The platform could not supply randomness
    #[error("Secure random number generation failed")]
    EntropyFailure,

    /// Key material could not be decoded, or is for the wrong curve
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// AES-GCM authentication failed
    #[error("Message cannot be decrypted")]
    AuthenticationFailed,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Attempted to export a key that is scoped to in-process use
    #[error("Key is not extractable")]
    KeyNotExtractable,

    /// Decrypted payload is not the expected content type
    #[error("Invalid message content: {0}")]
    InvalidMessageContent(String),

    // ========================================================================
    // Vault Errors (400-499)
    // ========================================================================

    /// The supplied password does not unlock the stored key
    #[error("Invalid password")]
    InvalidPassword,

    /// No key record exists for the user
    #[error("No encryption keys found")]
    NoKeysFound,

    // ========================================================================
    // Storage Errors (500-599)
    // ========================================================================

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Data corruption detected
    #[error("Data corruption detected: {0}")]
    StorageCorrupted(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Configuration
    /// - 200-299: Recovery
    /// - 300-399: Crypto
    /// - 400-499: Vault
    /// - 500-599: Storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Configuration (100-199)
            Error::Config(_) => 100,

            // Recovery (200-299)
            Error::InvalidRecoveryPhrase(_) => 200,
            Error::KeyDerivationFailed(_) => 201,

            // Crypto (300-399)
            Error::EntropyFailure => 300,
            Error::MalformedKey(_) => 301,
            Error::AuthenticationFailed => 302,
            Error::EncryptionFailed(_) => 303,
            Error::KeyNotExtractable => 304,
            Error::InvalidMessageContent(_) => 305,

            // Vault (400-499)
            Error::InvalidPassword => 400,
            Error::NoKeysFound => 401,

            // Storage (500-599)
            Error::StorageReadError(_) => 500,
            Error::StorageWriteError(_) => 501,
            Error::StorageCorrupted(_) => 502,
            Error::DatabaseError(_) => 503,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
        }
    }

    /// Check if retrying the same call could succeed
    ///
    /// Only local storage I/O qualifies. Cryptographic failures are never
    /// retried with the same inputs: an authentication failure means the
    /// ciphertext is corrupt or forged, and an entropy failure is fatal.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::StorageReadError(_) | Error::StorageWriteError(_) | Error::DatabaseError(_)
        )
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::InvalidPassword | Error::InvalidRecoveryPhrase(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::DeserializationError(format!("Invalid base64: {}", err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Background task failed: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================
