//! # Cryptography Module
//!
//! This module provides all cryptographic primitives used by Cloak Core.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    KEY MATERIAL                                 │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Long-term P-256 key pair (one per user)                       │   │
//! │  │     • private half wrapped at rest by a password-derived key   │   │
//! │  │     • public half (SPKI) shared with peers                     │   │
//! │  │                                                                 │   │
//! │  │  Ephemeral P-256 key pair (one per direct message)             │   │
//! │  │     • dropped immediately after encryption                     │   │
//! │  │                                                                 │   │
//! │  │  Group key (AES-256, one active per group)                     │   │
//! │  │     • distributed out of band, replaced on rotation            │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ENCRYPTION SCHEME                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  1. Key Exchange: P-256 ECDH                                   │   │
//! │  │     Ephemeral Private × Recipient Public = Shared Secret       │   │
//! │  │                                                                 │   │
//! │  │  2. Key Derivation: HKDF-SHA256                                │   │
//! │  │     Shared Secret → AES-256-GCM key                            │   │
//! │  │                                                                 │   │
//! │  │  3. Encryption: AES-256-GCM                                    │   │
//! │  │     • 256-bit key                                              │   │
//! │  │     • 96-bit nonce (random per message)                        │   │
//! │  │     • 128-bit authentication tag                               │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | P-256 ECDH | Key agreement, interoperable with WebCrypto |
//! | AES-256-GCM | Authenticated encryption |
//! | HKDF-SHA256 | Shared secret → AES key |
//! | PBKDF2-HMAC-SHA256 | Password → wrapping key |
//! | BIP39 | Recovery phrase |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: All secret keys are zeroized when dropped
//! 2. **Secure Random**: Every random byte comes from [`CryptoProvider::fill_random`]
//! 3. **No Key Reuse**: Unique nonces for every encryption operation
//! 4. **Scoped Keys**: Derived keys cannot be exported

mod cache;
mod encryption;
mod kdf;
mod keys;
mod provider;

pub use cache::{KeyCache, DEFAULT_KEY_CACHE_TTL};
pub use encryption::{decrypt, encrypt, Nonce, SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use kdf::{
    derive_key_from_password, derive_shared_key, generate_salt, validate_iterations, Salt,
    DEFAULT_PBKDF2_ITERATIONS, MIN_PBKDF2_ITERATIONS, SALT_SIZE,
};
pub use keys::{ExportedKeyPair, KeyPair, KeyService, PublicKey};
pub use provider::{CryptoProvider, RustCryptoProvider};

#[cfg(test)]
pub(crate) use provider::testing;
