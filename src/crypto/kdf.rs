//! # Key Derivation Functions
//!
//! Two derivations feed AES-256-GCM keys into the rest of the crate:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION PATHS                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────┐   ┌───────────────────────────────┐ │
//! │  │     P-256 SHARED SECRET       │   │     USER PASSWORD             │ │
//! │  │                               │   │                               │ │
//! │  │  x(a × B) = x(b × A)          │   │  + 16-byte random salt        │ │
//! │  │  → 32 bytes                   │   │  + iteration count            │ │
//! │  └───────────────┬───────────────┘   └───────────────┬───────────────┘ │
//! │                  │                                   │                 │
//! │                  ▼                                   ▼                 │
//! │  ┌───────────────────────────────┐   ┌───────────────────────────────┐ │
//! │  │  HKDF-SHA256(                 │   │  PBKDF2-HMAC-SHA256(          │ │
//! │  │    ikm  = shared_secret,      │   │    password,                  │ │
//! │  │    salt = empty,              │   │    salt,                      │ │
//! │  │    info = "cloak-ecdh-        │   │    iterations ≥ 100,000       │ │
//! │  │            aes256gcm-v1"      │   │  )                            │ │
//! │  │  )                            │   │                               │ │
//! │  └───────────────┬───────────────┘   └───────────────┬───────────────┘ │
//! │                  │                                   │                 │
//! │                  ▼                                   ▼                 │
//! │     message / pairwise key               private-key wrapping key     │
//! │     (non-extractable)                    (non-extractable)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Choice |
//! |--------|--------|
//! | ECDH KDF | HKDF-SHA256 with a versioned `info` label |
//! | Password KDF | PBKDF2-HMAC-SHA256, 600,000 iterations by default |
//! | Salt | 16 random bytes, fresh per stored record |
//! | Minimum cost | 100,000 iterations; lower values are a configuration error |

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::encryption::{SymmetricKey, KEY_SIZE};
use super::provider::CryptoProvider;
use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Binds an ECDH output to use as an AES-256-GCM key
    pub const ECDH_AES_GCM: &[u8] = b"cloak-ecdh-aes256gcm-v1";
}

/// Size of a password salt in bytes
pub const SALT_SIZE: usize = 16;

/// Default PBKDF2 iteration count (OWASP 2023 guidance for PBKDF2-HMAC-SHA256)
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Lowest iteration count accepted anywhere in the crate
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// A random salt for password key derivation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Salt(pub [u8; SALT_SIZE]);

impl Salt {
    /// Parse from a slice, which must be exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Generate a fresh random salt
pub fn generate_salt(provider: &dyn CryptoProvider) -> Result<Salt> {
    let mut bytes = [0u8; SALT_SIZE];
    provider.fill_random(&mut bytes)?;
    Ok(Salt(bytes))
}

/// Turn a raw ECDH output into an AES-256-GCM key
///
/// The returned key is non-extractable.
pub fn derive_shared_key(dh_output: &[u8; 32]) -> Result<SymmetricKey> {
    let hkdf = Hkdf::<Sha256>::new(None, dh_output);

    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(domain::ECDH_AES_GCM, okm.as_mut_slice())
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive shared key".into()))?;

    Ok(SymmetricKey::from_raw(*okm, false))
}

/// Reject iteration counts below the floor
pub fn validate_iterations(iterations: u32) -> Result<()> {
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(Error::Config(format!(
            "kdf_iterations must be at least {}, got {}",
            MIN_PBKDF2_ITERATIONS, iterations
        )));
    }
    Ok(())
}

/// Derive a wrapping key from a password
///
/// Deterministic for a fixed (password, salt, iterations). The result is a
/// non-extractable key used only to wrap private keys at rest.
///
/// ## Errors
///
/// `Config` if `iterations` is below [`MIN_PBKDF2_ITERATIONS`].
pub fn derive_key_from_password(
    provider: &dyn CryptoProvider,
    password: &str,
    salt: &Salt,
    iterations: u32,
) -> Result<SymmetricKey> {
    validate_iterations(iterations)?;

    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    provider.pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations, &mut okm);

    Ok(SymmetricKey::from_raw(*okm, false))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::provider::RustCryptoProvider;

    #[test]
    fn test_shared_key_deterministic() {
        let dh_output = [42u8; 32];

        let key1 = derive_shared_key(&dh_output).unwrap();
        let key2 = derive_shared_key(&dh_output).unwrap();

        assert_eq!(key1.expose(), key2.expose());
        assert!(!key1.is_extractable());
    }

    #[test]
    fn test_shared_key_is_not_raw_dh_output() {
        let dh_output = [42u8; 32];
        let key = derive_shared_key(&dh_output).unwrap();
        assert_ne!(key.expose(), &dh_output);
    }

    #[test]
    fn test_password_derivation_deterministic() {
        let salt = Salt([7u8; SALT_SIZE]);

        let key1 =
            derive_key_from_password(&RustCryptoProvider, "hunter2", &salt, MIN_PBKDF2_ITERATIONS)
                .unwrap();
        let key2 =
            derive_key_from_password(&RustCryptoProvider, "hunter2", &salt, MIN_PBKDF2_ITERATIONS)
                .unwrap();

        assert_eq!(key1.expose(), key2.expose());
        assert!(matches!(key1.export_raw(), Err(Error::KeyNotExtractable)));
    }

    #[test]
    fn test_password_derivation_sensitive_to_inputs() {
        let p = RustCryptoProvider;
        let salt = Salt([7u8; SALT_SIZE]);
        let other_salt = Salt([8u8; SALT_SIZE]);

        let base = derive_key_from_password(&p, "hunter2", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        let other_password =
            derive_key_from_password(&p, "hunter3", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        let other_salted =
            derive_key_from_password(&p, "hunter2", &other_salt, MIN_PBKDF2_ITERATIONS).unwrap();
        let more_iterations =
            derive_key_from_password(&p, "hunter2", &salt, MIN_PBKDF2_ITERATIONS + 1).unwrap();

        assert_ne!(base.expose(), other_password.expose());
        assert_ne!(base.expose(), other_salted.expose());
        assert_ne!(base.expose(), more_iterations.expose());
    }

    #[test]
    fn test_low_iterations_rejected() {
        let salt = Salt([7u8; SALT_SIZE]);
        let result = derive_key_from_password(&RustCryptoProvider, "pw", &salt, 1_000);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_salts_are_random() {
        let s1 = generate_salt(&RustCryptoProvider).unwrap();
        let s2 = generate_salt(&RustCryptoProvider).unwrap();
        assert_ne!(s1, s2);
        assert!(Salt::from_slice(&[0u8; 15]).is_none());
    }
}
