//! # Encryption Module
//!
//! AES-256-GCM key handles and the seal/open helpers every cipher uses.
//!
//! ## Key Scoping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SYMMETRIC KEY ORIGINS                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Origin                     Extractable   Used for                     │
//! │  ───────────────────────────────────────────────────────────────        │
//! │  ECDH + HKDF                no            one message / one peer        │
//! │  PBKDF2(password, salt)     no            wrapping private keys        │
//! │  GroupCipher::generate      yes           group payloads               │
//! │  GroupCipher::import        yes           group payloads               │
//! │                                                                         │
//! │  Every SymmetricKey can only ever drive AES-256-GCM. There is no API   │
//! │  that hands the raw bytes to another algorithm, and non-extractable    │
//! │  keys cannot be exported at all.                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Confidentiality | AES-256 in counter mode |
//! | Integrity | 128-bit GCM tag, checked before any plaintext is returned |
//! | Nonce uniqueness | 96-bit random nonce per call |

use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::provider::CryptoProvider;
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A nonce (number used once) for AES-GCM encryption
///
/// ## Critical Security Requirement
///
/// **NEVER reuse a nonce with the same key!**
///
/// We use random nonces, which are safe for up to 2^32 messages
/// per key (birthday bound for 96-bit nonces).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random(provider: &dyn CryptoProvider) -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        provider.fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, which must be exactly 12 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM key
///
/// Zeroized when dropped. Keys derived from ECDH or a password are created
/// non-extractable; only group keys can be exported.
#[derive(ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
    #[zeroize(skip)]
    extractable: bool,
}

impl SymmetricKey {
    /// Wrap raw key bytes
    pub(crate) fn from_raw(bytes: [u8; KEY_SIZE], extractable: bool) -> Self {
        Self { bytes, extractable }
    }

    /// Generate a random extractable key
    pub(crate) fn random(provider: &dyn CryptoProvider) -> Result<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        provider.fill_random(&mut bytes)?;
        Ok(Self::from_raw(bytes, true))
    }

    /// Whether `export_raw` is permitted
    pub fn is_extractable(&self) -> bool {
        self.extractable
    }

    /// Export the raw key bytes
    ///
    /// ## Security Warning
    ///
    /// Only for distributing group keys over an already-encrypted channel.
    /// Never log these bytes.
    pub fn export_raw(&self) -> Result<Zeroizing<Vec<u8>>> {
        if !self.extractable {
            return Err(Error::KeyNotExtractable);
        }
        Ok(Zeroizing::new(self.bytes.to_vec()))
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

// Prevent accidental logging
impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .field("extractable", &self.extractable)
            .finish()
    }
}

/// Encrypt with AES-256-GCM under a fresh random nonce
///
/// ## Returns
///
/// Tuple of (nonce, ciphertext_with_tag)
pub fn encrypt(
    provider: &dyn CryptoProvider,
    key: &SymmetricKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random(provider)?;
    let ciphertext = provider.aes_gcm_seal(key.expose(), nonce.as_bytes(), plaintext, aad)?;
    Ok((nonce, ciphertext))
}

/// Decrypt with AES-256-GCM
///
/// ## Errors
///
/// Returns `AuthenticationFailed` if:
/// - The ciphertext was tampered with
/// - The AAD doesn't match
/// - The key is wrong
/// - The nonce is wrong
pub fn decrypt(
    provider: &dyn CryptoProvider,
    key: &SymmetricKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::AuthenticationFailed);
    }
    provider.aes_gcm_open(key.expose(), nonce.as_bytes(), ciphertext, aad)
}

// ============================================================================
// TESTS
// ============================================================================
