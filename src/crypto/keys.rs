//! # Key Management
//!
//! P-256 key pairs for ECDH key agreement, their portable encodings, and
//! shared-key derivation.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  KeyPair (P-256)                                                │   │
//! │  │  ───────────────                                                 │   │
//! │  │                                                                  │   │
//! │  │  Purpose:                                                       │   │
//! │  │  • Long-term identity key for receiving direct messages         │   │
//! │  │  • Ephemeral sender key (one per message, then dropped)         │   │
//! │  │                                                                  │   │
//! │  │  Format:                                                        │   │
//! │  │  • Private key: PKCS#8 DER (only ever handed to the vault)      │   │
//! │  │  • Public key: SPKI DER (shared freely)                         │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Shared key                                                     │   │
//! │  │  ──────────                                                      │   │
//! │  │                                                                  │   │
//! │  │  ECDH(my_private, their_public) → HKDF-SHA256 → AES-256-GCM key │   │
//! │  │  Non-extractable; can only encrypt and decrypt.                 │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use p256::SecretKey;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, Zeroizing};

use super::cache::KeyCache;
use super::encryption::SymmetricKey;
use super::kdf;
use super::provider::CryptoProvider;
use crate::codec;
use crate::error::{Error, Result};

/// A P-256 key pair
///
/// ## Security
///
/// - The private scalar is zeroized when this struct is dropped
///   (`p256::SecretKey` handles its own zeroization)
/// - `Debug` never prints private material
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub(crate) fn from_secret(secret: SecretKey) -> Result<Self> {
        let public = PublicKey::from_p256(secret.public_key())?;
        Ok(Self { secret, public })
    }

    /// The shareable half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A P-256 public key
///
/// This contains only public information and can be serialized,
/// transmitted, and stored without security concerns. On the serde boundary
/// it is the base64 of its SPKI DER encoding.
#[derive(Clone)]
pub struct PublicKey {
    inner: p256::PublicKey,
    spki: Vec<u8>,
}

impl PublicKey {
    fn from_p256(inner: p256::PublicKey) -> Result<Self> {
        let spki = inner
            .to_public_key_der()
            .map_err(|e| Error::MalformedKey(format!("Cannot encode public key: {}", e)))?
            .as_bytes()
            .to_vec();
        Ok(Self { inner, spki })
    }

    /// Decode from SPKI DER
    ///
    /// Fails with `MalformedKey` for invalid DER, a non-EC algorithm, a curve
    /// other than P-256, or a point that is not on the curve.
    pub fn from_spki_der(bytes: &[u8]) -> Result<Self> {
        let inner = p256::PublicKey::from_public_key_der(bytes)
            .map_err(|e| Error::MalformedKey(format!("Invalid P-256 public key: {}", e)))?;
        Self::from_p256(inner)
    }

    /// Decode from base64 SPKI DER
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = codec::decode(text)
            .map_err(|_| Error::MalformedKey("Public key is not valid base64".into()))?;
        Self::from_spki_der(&bytes)
    }

    /// SPKI DER encoding
    pub fn to_spki_der(&self) -> &[u8] {
        &self.spki
    }

    /// Base64 of the SPKI DER encoding
    pub fn to_base64(&self) -> String {
        codec::encode(&self.spki)
    }

    pub(crate) fn as_p256(&self) -> &p256::PublicKey {
        &self.inner
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for PublicKey {}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_base64()).finish()
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_base64(&text).map_err(D::Error::custom)
    }
}

/// A key pair in portable form: SPKI DER public half, PKCS#8 DER private half
///
/// ## Security Warning
///
/// The private half is plaintext key material. It exists only to be wrapped
/// by the vault; never persist or transmit it as-is.
pub struct ExportedKeyPair {
    /// SPKI DER
    pub public_key: Vec<u8>,
    /// PKCS#8 DER, zeroized on drop
    pub private_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for ExportedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedKeyPair")
            .field("public_key", &codec::encode(&self.public_key))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedKeyPairRef<'a> {
    public_key: String,
    private_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedKeyPairRepr {
    public_key: String,
    private_key: String,
}

impl Serialize for ExportedKeyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let private_b64 = Zeroizing::new(codec::encode(self.private_key.as_slice()));
        ExportedKeyPairRef {
            public_key: codec::encode(&self.public_key),
            private_key: private_b64.as_str(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExportedKeyPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut repr = ExportedKeyPairRepr::deserialize(deserializer)?;
        let private_key = codec::decode(&repr.private_key).map(Zeroizing::new);
        repr.private_key.zeroize();

        Ok(Self {
            public_key: codec::decode(&repr.public_key).map_err(D::Error::custom)?,
            private_key: private_key.map_err(D::Error::custom)?,
        })
    }
}

/// Asymmetric key operations
///
/// Stateless apart from the provider; cheap to clone.
#[derive(Clone)]
pub struct KeyService {
    provider: Arc<dyn CryptoProvider>,
}

impl KeyService {
    /// Create a key service over the given provider
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    /// Generate a fresh P-256 key pair
    ///
    /// ## Errors
    ///
    /// `EntropyFailure` if the provider cannot supply randomness. This is
    /// fatal and must not be retried.
    pub fn generate_key_pair(&self) -> Result<KeyPair> {
        let secret = self.provider.generate_secret_key()?;
        KeyPair::from_secret(secret)
    }

    /// Export to SPKI (public) and PKCS#8 (private)
    pub fn export_key_pair(&self, key_pair: &KeyPair) -> Result<ExportedKeyPair> {
        let private = key_pair
            .secret
            .to_pkcs8_der()
            .map_err(|e| Error::MalformedKey(format!("Cannot encode private key: {}", e)))?;

        Ok(ExportedKeyPair {
            public_key: key_pair.public.to_spki_der().to_vec(),
            private_key: Zeroizing::new(private.as_bytes().to_vec()),
        })
    }

    /// Import a key pair exported by [`KeyService::export_key_pair`]
    ///
    /// ## Errors
    ///
    /// `MalformedKey` if either half fails to decode, is for another curve, or
    /// if the public half does not belong to the private half.
    pub fn import_key_pair(&self, exported: &ExportedKeyPair) -> Result<KeyPair> {
        let secret = SecretKey::from_pkcs8_der(&exported.private_key)
            .map_err(|e| Error::MalformedKey(format!("Invalid P-256 private key: {}", e)))?;
        let claimed = PublicKey::from_spki_der(&exported.public_key)?;

        let key_pair = KeyPair::from_secret(secret)?;
        if key_pair.public != claimed {
            return Err(Error::MalformedKey(
                "Public key does not match private key".into(),
            ));
        }

        Ok(key_pair)
    }

    /// Import a peer's SPKI-encoded public key
    pub fn import_public_key(&self, spki: &[u8]) -> Result<PublicKey> {
        PublicKey::from_spki_der(spki)
    }

    /// ECDH followed by HKDF into a non-extractable AES-256-GCM key
    ///
    /// ```text
    /// my_private × their_public ──► 32-byte x-coordinate
    ///                                      │
    ///                                      ▼
    ///                 HKDF-SHA256(info = "cloak-ecdh-aes256gcm-v1")
    ///                                      │
    ///                                      ▼
    ///                              AES-256-GCM key
    /// ```
    ///
    /// Both parties derive the same key.
    pub fn derive_shared_key(&self, mine: &KeyPair, theirs: &PublicKey) -> Result<SymmetricKey> {
        let shared = self.provider.diffie_hellman(&mine.secret, theirs.as_p256());
        kdf::derive_shared_key(&shared)
    }

    /// Cache-aware [`KeyService::derive_shared_key`] for pairwise contexts
    ///
    /// Entries are keyed by `recipient_id` only, so the cache must be cleared
    /// whenever `mine` changes (logout, key rotation).
    pub fn derive_shared_key_cached(
        &self,
        cache: &KeyCache,
        recipient_id: &str,
        mine: &KeyPair,
        theirs: &PublicKey,
    ) -> Result<Arc<SymmetricKey>> {
        if let Some(key) = cache.get_cached_recipient_key(recipient_id) {
            return Ok(key);
        }

        let key = Arc::new(self.derive_shared_key(mine, theirs)?);
        cache.cache_recipient_key(recipient_id, Arc::clone(&key));
        Ok(key)
    }

    pub(crate) fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }
}

impl std::fmt::Debug for KeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyService").finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
