//! # Messaging Module
//!
//! Message-level encryption for direct and group conversations.
//!
//! ## Direct Message Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (Alice)                                                        │
//! │  ─────────────────────────────────────────────────────────────         │
//! │                                                                         │
//! │  Input: "Hello Bob!", bob_public                                       │
//! │                                                                         │
//! │  1. Fresh ephemeral key pair                                           │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  (eph_private, eph_public) ← P-256 keygen                   │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  2. Derive encryption key                                              │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  HKDF(eph_private × bob_public) = message_key              │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  3. Encrypt message                                                    │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(                                               │       │
//! │  │    key = message_key,                                      │       │
//! │  │    nonce = random_12_bytes,                                │       │
//! │  │    plaintext = "Hello Bob!",                               │       │
//! │  │  )                                                         │       │
//! │  │  → ciphertext + 16-byte auth tag                          │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  4. Drop eph_private                                                   │
//! │                                                                         │
//! │  Output: EncryptedMessage { ciphertext, nonce, ephemeralPublicKey }   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Message Decryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE DECRYPTION                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Recipient (Bob)                                                       │
//! │  ─────────────────────────────────────────────────────────────         │
//! │                                                                         │
//! │  1. Import ephemeralPublicKey (SPKI)                                   │
//! │  2. HKDF(bob_private × eph_public) = message_key                      │
//! │     (Same key Alice computed - ECDH property)                          │
//! │  3. AES-256-GCM_decrypt(message_key, nonce, ciphertext)               │
//! │                                                                         │
//! │  Any envelope problem in steps 1-3 → AuthenticationFailed             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Protocol
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENCRYPTED MESSAGE FORMAT                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  {                                                                      │
//! │    "ciphertext": "base64...",          // AES-GCM output incl. tag      │
//! │    "nonce": "base64...",               // 12-byte nonce                 │
//! │    "ephemeralPublicKey": "base64..."   // SPKI DER, P-256               │
//! │  }                                                                      │
//! │                                                                         │
//! │  Group messages carry only "ciphertext" and "nonce".                   │
//! │                                                                         │
//! │  Sender, recipient and timestamps travel outside the envelope and are │
//! │  not protected by it.                                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Forward Secrecy
//!
//! Compromise of the sender's long-term key reveals nothing: it is never used
//! for encryption. Compromise of the recipient's long-term key does expose
//! every message sent to it.

pub mod group;

use serde::{Deserialize, Serialize};

use crate::codec::base64_bytes;
use crate::crypto::{self, KeyPair, KeyService, Nonce, PublicKey};
use crate::error::{Error, Result};

pub use group::{EncryptedGroupMessage, GroupCipher, GroupKeyRing};

/// An encrypted direct message as it travels over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    /// AES-GCM ciphertext with the 16-byte tag appended
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// 12-byte AES-GCM nonce
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// Sender's single-use public key, SPKI DER
    #[serde(with = "base64_bytes")]
    pub ephemeral_public_key: Vec<u8>,
}

impl EncryptedMessage {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Direct-message cipher with per-message ephemeral keys
#[derive(Debug, Clone)]
pub struct MessageCipher {
    keys: KeyService,
}

impl MessageCipher {
    /// Create a cipher over the given key service
    pub fn new(keys: KeyService) -> Self {
        Self { keys }
    }

    /// Encrypt `plaintext` so only the holder of `recipient`'s private key
    /// can read it
    ///
    /// ## Errors
    ///
    /// `EntropyFailure` if the ephemeral key or nonce cannot be generated.
    pub fn encrypt(&self, plaintext: &[u8], recipient: &PublicKey) -> Result<EncryptedMessage> {
        let ephemeral = self.keys.generate_key_pair()?;
        let message_key = self.keys.derive_shared_key(&ephemeral, recipient)?;

        let (nonce, ciphertext) =
            crypto::encrypt(self.keys.provider().as_ref(), &message_key, plaintext, &[])?;

        let ephemeral_public_key = ephemeral.public_key().to_spki_der().to_vec();
        drop(ephemeral);

        Ok(EncryptedMessage {
            ciphertext,
            nonce: nonce.as_bytes().to_vec(),
            ephemeral_public_key,
        })
    }

    /// Decrypt a message addressed to `recipient`
    ///
    /// ## Errors
    ///
    /// `AuthenticationFailed` for any envelope problem: an ephemeral key that
    /// does not parse, a nonce of the wrong length, or a failed tag check.
    pub fn decrypt(&self, message: &EncryptedMessage, recipient: &KeyPair) -> Result<Vec<u8>> {
        let ephemeral = self
            .keys
            .import_public_key(&message.ephemeral_public_key)
            .map_err(|_| Error::AuthenticationFailed)?;
        let nonce = Nonce::from_slice(&message.nonce).ok_or(Error::AuthenticationFailed)?;

        let message_key = self.keys.derive_shared_key(recipient, &ephemeral)?;

        crypto::decrypt(
            self.keys.provider().as_ref(),
            &message_key,
            &nonce,
            &message.ciphertext,
            &[],
        )
    }

    /// Decrypt and interpret the plaintext as UTF-8
    pub fn decrypt_to_string(&self, message: &EncryptedMessage, recipient: &KeyPair) -> Result<String> {
        let plaintext = self.decrypt(message, recipient)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::InvalidMessageContent("Plaintext is not valid UTF-8".into()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::testing::NoEntropyProvider;
    use crate::crypto::RustCryptoProvider;

    fn setup() -> (KeyService, MessageCipher) {
        let keys = KeyService::new(Arc::new(RustCryptoProvider));
        let cipher = MessageCipher::new(keys.clone());
        (keys, cipher)
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();

        let msg = cipher.encrypt(b"Hello Bob!", bob.public_key()).unwrap();
        assert_eq!(msg.nonce.len(), 12);

        let plaintext = cipher.decrypt(&msg, &bob).unwrap();
        assert_eq!(plaintext, b"Hello Bob!");
    }

    #[test]
    fn test_empty_and_large_payloads() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();

        let empty = cipher.encrypt(b"", bob.public_key()).unwrap();
        assert!(cipher.decrypt(&empty, &bob).unwrap().is_empty());

        let large = vec![0x5a; 256 * 1024];
        let msg = cipher.encrypt(&large, bob.public_key()).unwrap();
        assert_eq!(cipher.decrypt(&msg, &bob).unwrap(), large);
    }

    #[test]
    fn test_forward_secrecy_fresh_ephemeral_per_message() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();

        let m1 = cipher.encrypt(b"same text", bob.public_key()).unwrap();
        let m2 = cipher.encrypt(b"same text", bob.public_key()).unwrap();

        assert_ne!(m1.ephemeral_public_key, m2.ephemeral_public_key);
        assert_ne!(m1.nonce, m2.nonce);
        assert_ne!(m1.ciphertext, m2.ciphertext);
    }

    #[test]
    fn test_wrong_recipient_cannot_decrypt() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();
        let eve = keys.generate_key_pair().unwrap();

        let msg = cipher.encrypt(b"for bob only", bob.public_key()).unwrap();
        assert!(matches!(cipher.decrypt(&msg, &eve), Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();
        let msg = cipher.encrypt(b"integrity", bob.public_key()).unwrap();

        for i in [0, msg.ciphertext.len() - 1] {
            let mut tampered = msg.clone();
            tampered.ciphertext[i] ^= 0x01;
            assert!(matches!(
                cipher.decrypt(&tampered, &bob),
                Err(Error::AuthenticationFailed)
            ));
        }
    }

    #[test]
    fn test_tampered_nonce_detected() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();
        let msg = cipher.encrypt(b"integrity", bob.public_key()).unwrap();

        let mut flipped = msg.clone();
        flipped.nonce[3] ^= 0x80;
        assert!(matches!(cipher.decrypt(&flipped, &bob), Err(Error::AuthenticationFailed)));

        let mut truncated = msg.clone();
        truncated.nonce.pop();
        assert!(matches!(cipher.decrypt(&truncated, &bob), Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ephemeral_key_detected() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();
        let msg = cipher.encrypt(b"integrity", bob.public_key()).unwrap();

        // Every byte position: header flips break parsing, point flips either
        // leave the curve or land on a different point.
        for i in 0..msg.ephemeral_public_key.len() {
            let mut tampered = msg.clone();
            tampered.ephemeral_public_key[i] ^= 0x01;
            assert!(
                matches!(cipher.decrypt(&tampered, &bob), Err(Error::AuthenticationFailed)),
                "flip at byte {} was not detected",
                i
            );
        }
    }

    #[test]
    fn test_decrypt_to_string_rejects_binary() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();

        let msg = cipher.encrypt(&[0xff, 0xfe, 0xfd], bob.public_key()).unwrap();
        assert!(matches!(
            cipher.decrypt_to_string(&msg, &bob),
            Err(Error::InvalidMessageContent(_))
        ));

        let msg = cipher.encrypt("héllo".as_bytes(), bob.public_key()).unwrap();
        assert_eq!(cipher.decrypt_to_string(&msg, &bob).unwrap(), "héllo");
    }

    #[test]
    fn test_wire_format() {
        let (keys, cipher) = setup();
        let bob = keys.generate_key_pair().unwrap();
        let msg = cipher.encrypt(b"wire", bob.public_key()).unwrap();

        let json = msg.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["ciphertext"].is_string());
        assert!(value["nonce"].is_string());
        assert!(value["ephemeralPublicKey"].is_string());

        let parsed = EncryptedMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(cipher.decrypt(&parsed, &bob).unwrap(), b"wire");
    }

    #[test]
    fn test_from_json_rejects_bad_base64() {
        let json = r#"{"ciphertext":"!!","nonce":"AAAA","ephemeralPublicKey":"AAAA"}"#;
        assert!(matches!(
            EncryptedMessage::from_json(json),
            Err(Error::DeserializationError(_))
        ));
    }

    #[test]
    fn test_encrypt_without_entropy_fails() {
        let (keys, _) = setup();
        let bob = keys.generate_key_pair().unwrap();

        let cipher = MessageCipher::new(KeyService::new(Arc::new(NoEntropyProvider)));
        assert!(matches!(
            cipher.encrypt(b"x", bob.public_key()),
            Err(Error::EntropyFailure)
        ));
    }

    #[test]
    fn test_alice_bob_exchange() {
        let (keys, cipher) = setup();
        let alice = keys.generate_key_pair().unwrap();
        let bob = keys.generate_key_pair().unwrap();

        // Public keys travel as base64 SPKI
        let bob_public = PublicKey::from_base64(&bob.public_key().to_base64()).unwrap();
        let alice_public = PublicKey::from_base64(&alice.public_key().to_base64()).unwrap();

        let to_bob = cipher.encrypt(b"Hi Bob, it's Alice", &bob_public).unwrap();
        let wire = to_bob.to_json().unwrap();
        let received = EncryptedMessage::from_json(&wire).unwrap();
        assert_eq!(cipher.decrypt_to_string(&received, &bob).unwrap(), "Hi Bob, it's Alice");

        let to_alice = cipher.encrypt(b"Hey Alice", &alice_public).unwrap();
        assert_eq!(cipher.decrypt_to_string(&to_alice, &alice).unwrap(), "Hey Alice");

        // Alice cannot read her own message to Bob
        assert!(matches!(cipher.decrypt(&to_bob, &alice), Err(Error::AuthenticationFailed)));
    }
}
