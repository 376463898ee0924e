//! # Crypto Provider
//!
//! The capability interface every higher layer goes through for primitive
//! operations. Protocol logic (message cipher, vault, cache) never touches
//! `aes-gcm`, `p256` or `pbkdf2` directly, so a platform crypto library can be
//! slotted in by implementing this trait.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CRYPTO PROVIDER                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   MessageCipher   GroupCipher   KeyVault   RecoveryPhrase              │
//! │         │              │            │            │                      │
//! │         └──────────────┴─────┬──────┴────────────┘                      │
//! │                              ▼                                          │
//! │                ┌──────────────────────────────┐                         │
//! │                │   dyn CryptoProvider         │                         │
//! │                │                              │                         │
//! │                │  • fill_random               │                         │
//! │                │  • generate_secret_key       │                         │
//! │                │  • diffie_hellman (P-256)    │                         │
//! │                │  • aes_gcm_seal / open       │                         │
//! │                │  • pbkdf2_sha256             │                         │
//! │                └──────────────────────────────┘                         │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                 RustCryptoProvider (default)                            │
//! │           OsRng · aes-gcm · p256 · pbkdf2 · sha2                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use p256::{PublicKey as P256PublicKey, SecretKey};
use rand_core::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::encryption::{KEY_SIZE, NONCE_SIZE};

/// Attempts at drawing a valid P-256 scalar before giving up.
///
/// A uniformly random 32-byte string is out of range with probability ~2^-32,
/// so repeated failures mean the entropy source is broken.
const SCALAR_ATTEMPTS: usize = 8;

/// Primitive cryptographic operations
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with cryptographically secure random bytes
    ///
    /// Fails with `EntropyFailure` if the platform cannot supply randomness.
    fn fill_random(&self, dest: &mut [u8]) -> Result<()>;

    /// Raw P-256 ECDH: the x-coordinate of `secret × public`
    fn diffie_hellman(&self, secret: &SecretKey, public: &P256PublicKey) -> Zeroizing<[u8; 32]>;

    /// AES-256-GCM encrypt, returning ciphertext with the 16-byte tag appended
    fn aes_gcm_seal(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>>;

    /// AES-256-GCM decrypt
    ///
    /// Fails with `AuthenticationFailed` on any tag mismatch.
    fn aes_gcm_open(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>>;

    /// PBKDF2-HMAC-SHA256 into a 32-byte output
    fn pbkdf2_sha256(&self, password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8; KEY_SIZE]);

    /// Generate a fresh P-256 secret scalar from `fill_random`
    fn generate_secret_key(&self) -> Result<SecretKey> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        for _ in 0..SCALAR_ATTEMPTS {
            self.fill_random(&mut bytes[..])?;
            if let Ok(secret) = SecretKey::from_slice(&bytes[..]) {
                return Ok(secret);
            }
        }
        Err(Error::EntropyFailure)
    }
}

/// Default provider built on the RustCrypto crates and the OS CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn fill_random(&self, dest: &mut [u8]) -> Result<()> {
        rand::rngs::OsRng
            .try_fill_bytes(dest)
            .map_err(|_| Error::EntropyFailure)
    }

    fn diffie_hellman(&self, secret: &SecretKey, public: &P256PublicKey) -> Zeroizing<[u8; 32]> {
        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(shared.raw_secret_bytes());
        out
    }

    fn aes_gcm_seal(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

        let payload = Payload {
            msg: plaintext,
            aad,
        };

        cipher
            .encrypt(AesNonce::from_slice(nonce), payload)
            .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))
    }

    fn aes_gcm_open(
        &self,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| Error::AuthenticationFailed)?;

        let payload = Payload {
            msg: ciphertext,
            aad,
        };

        cipher
            .decrypt(AesNonce::from_slice(nonce), payload)
            .map_err(|_| Error::AuthenticationFailed)
    }

    fn pbkdf2_sha256(&self, password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8; KEY_SIZE]) {
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, out);
    }
}

// ============================================================================
// TEST PROVIDERS
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
