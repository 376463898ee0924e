//! # Cloak Core
//!
//! The end-to-end encryption core of Cloak messaging: per-user key pairs,
//! forward-secret direct messages, group encryption, and password-wrapped
//! key storage.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CLOAK CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐  │
//! │  │  Identity   │  │  Messaging   │  │    Group     │  │   Storage   │  │
//! │  │             │  │              │  │              │  │             │  │
//! │  │ - Recovery  │  │ - Ephemeral  │  │ - Shared key │  │ - KeyVault  │  │
//! │  │   phrase    │  │   ECDH       │  │ - Key ring   │  │ - SQLite    │  │
//! │  │             │  │ - Envelopes  │  │              │  │ - Memory    │  │
//! │  └─────────────┘  └──────┬───────┘  └──────┬───────┘  └──────┬──────┘  │
//! │                          │                 │                 │         │
//! │                          └─────────────────┴─────────────────┘         │
//! │                                            │                           │
//! │  ┌─────────────────────────────────────────▼─────────────────────────┐ │
//! │  │                             Crypto                                │ │
//! │  │                                                                   │ │
//! │  │  CryptoProvider ──► P-256 ECDH · AES-256-GCM · HKDF · PBKDF2      │ │
//! │  │  KeyService · KeyCache · SymmetricKey                             │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Runtime configuration
//! - [`codec`] - Base64 helpers for binary fields
//! - [`crypto`] - Cryptographic primitives (keys, encryption, derivation, cache)
//! - [`messaging`] - Direct and group message ciphers
//! - [`storage`] - Password-protected key records and their stores
//! - [`identity`] - Recovery phrases
//! - [`time`] - Injectable clock
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Message Encryption (ephemeral P-256 ECDH + AES-256-GCM)      │
//! │  ─────────────────────────────────────────────────────────────          │
//! │  Every direct message uses a fresh ephemeral key pair. Compromise of   │
//! │  one message key reveals nothing about any other message.              │
//! │                                                                         │
//! │  Layer 2: Group Encryption (pre-shared AES-256-GCM key)                │
//! │  ──────────────────────────────────────────────────────                 │
//! │  Group members share one symmetric key, distributed out of band and    │
//! │  rotated when membership changes.                                      │
//! │                                                                         │
//! │  Layer 3: Key Storage (PBKDF2-SHA256 + AES-256-GCM)                    │
//! │  ─────────────────────────────────────────────────                      │
//! │  Private keys are only ever persisted wrapped under a key derived      │
//! │  from the user's password. The user id is bound in as AAD.             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport, key distribution, and metadata protection are left to the
//! caller. Sender, recipient and timestamps travel outside the envelope.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod storage;
/// Injectable time source for cache TTLs and record timestamps.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::CoreConfig;
pub use crypto::{
    CryptoProvider, ExportedKeyPair, KeyCache, KeyPair, KeyService, PublicKey,
    RustCryptoProvider, SymmetricKey,
};
pub use error::{Error, Result};
pub use identity::{generate_recovery_phrase, RecoveryPhrase};
pub use messaging::{
    EncryptedGroupMessage, EncryptedMessage, GroupCipher, GroupKeyRing, MessageCipher,
};
pub use storage::{
    InitializedKeys, KeyStatus, KeyStore, KeyVault, MemoryKeyStore, SqliteKeyStore, StoredKeyData,
};

// ============================================================================
// CORE INSTANCE
// ============================================================================

use std::sync::Arc;

use time::{Clock, SystemClock};

/// The main Cloak Core instance that wires every service together
///
/// Each instance owns its own key cache and group key ring; nothing is
/// shared between instances.
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        CLOAK CORE LIFECYCLE                             │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Construct                                                           │
/// │     ┌─────────────┐                                                    │
/// │     │ CloakCore:: │──► Validate config                                 │
/// │     │ new()       │──► Open key store (SQLite or memory)               │
/// │     └─────────────┘──► Build vault, ciphers, cache                     │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  2. Sign In                                                            │
/// │     ┌─────────────┐                                                    │
/// │     │ initialize_ │──► Create + wrap a key pair on first use           │
/// │     │ user_keys() │──► Otherwise unlock the stored one                 │
/// │     └─────────────┘                                                    │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  3. Ready for Operations                                               │
/// │     ┌─────────────┐                                                    │
/// │     │  Active     │◄─► Encrypt / decrypt direct messages               │
/// │     │  State      │◄─► Group messages via the key ring                 │
/// │     └─────────────┘◄─► Cached pairwise keys                            │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  4. Sign Out                                                           │
/// │     ┌─────────────┐                                                    │
/// │     │ logout()    │──► Clear derived keys from the cache               │
/// │     │             │──► Drop group keys                                 │
/// │     └─────────────┘                                                    │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub struct CloakCore {
    config: CoreConfig,
    keys: KeyService,
    messages: MessageCipher,
    groups: GroupKeyRing,
    vault: KeyVault,
    cache: KeyCache,
}

impl CloakCore {
    /// Build a core from configuration with the default provider and clock
    ///
    /// Opens a SQLite key store at `database_path`, or an in-memory store
    /// when none is configured.
    ///
    /// ## Example
    ///
    /// ```ignore
    /// use cloak_core::{CloakCore, CoreConfig};
    ///
    /// let core = CloakCore::new(CoreConfig::default())?;
    /// let keys = core.initialize_user_keys("alice", "hunter22").await?;
    /// ```
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn KeyStore> = match config.database_path.as_deref() {
            Some(path) => Arc::new(SqliteKeyStore::open(Some(path))?),
            None => Arc::new(MemoryKeyStore::new()),
        };

        Self::with_components(
            config,
            Arc::new(RustCryptoProvider),
            store,
            Arc::new(SystemClock),
        )
    }

    /// Build a core from explicit components
    ///
    /// `database_path` is ignored; `store` is used as given.
    pub fn with_components(
        config: CoreConfig,
        provider: Arc<dyn CryptoProvider>,
        store: Arc<dyn KeyStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing Cloak Core v{}", env!("CARGO_PKG_VERSION"));

        let keys = KeyService::new(Arc::clone(&provider));
        let vault = KeyVault::new(store, keys.clone(), Arc::clone(&clock))
            .with_kdf_iterations(config.kdf_iterations)?
            .with_key_lifetime(config.key_lifetime());

        let core = Self {
            messages: MessageCipher::new(keys.clone()),
            groups: GroupKeyRing::new(GroupCipher::new(provider)),
            cache: KeyCache::new(config.key_cache_ttl(), clock),
            keys,
            vault,
            config,
        };

        tracing::info!("Cloak Core initialized successfully");
        Ok(core)
    }

    /// The configuration this core was built with
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Key generation, import/export and ECDH
    pub fn keys(&self) -> &KeyService {
        &self.keys
    }

    /// Direct message cipher
    pub fn messages(&self) -> &MessageCipher {
        &self.messages
    }

    /// Group keys held by this core
    pub fn groups(&self) -> &GroupKeyRing {
        &self.groups
    }

    /// Password-protected key storage
    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    /// Derived pairwise key cache
    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    // ========================================================================
    // USER KEYS
    // ========================================================================

    /// Create the user's key pair on first use, otherwise unlock it
    pub async fn initialize_user_keys(&self, user_id: &str, password: &str) -> Result<InitializedKeys> {
        self.vault.initialize_user_keys(user_id, password).await
    }

    /// Unlock the user's key pair
    pub async fn unlock(&self, user_id: &str, password: &str) -> Result<KeyPair> {
        self.vault.get_user_key_pair(user_id, password).await
    }

    /// The user's public key, if they have one
    pub async fn get_user_public_key(&self, user_id: &str) -> Result<Option<PublicKey>> {
        self.vault.get_user_public_key(user_id).await
    }

    /// Whether the user has an active key pair
    pub async fn has_encryption_keys(&self, user_id: &str) -> Result<bool> {
        self.vault.has_encryption_keys(user_id).await
    }

    /// Effective status of the user's key pair
    pub async fn key_status(&self, user_id: &str) -> Result<Option<KeyStatus>> {
        self.vault.key_status(user_id).await
    }

    /// Replace the user's key pair
    ///
    /// Cached pairwise keys were derived from the old private key and are
    /// dropped.
    pub async fn rotate_user_keys(&self, user_id: &str, password: &str) -> Result<PublicKey> {
        let public_key = self.vault.rotate_user_keys(user_id, password).await?;
        self.cache.clear_key_cache();
        Ok(public_key)
    }

    /// Re-wrap the user's private key under a new password
    pub async fn change_password(&self, user_id: &str, old_password: &str, new_password: &str) -> Result<()> {
        self.vault
            .change_password(user_id, old_password, new_password)
            .await
    }

    /// Mark the user's key pair expired
    pub async fn expire_user_keys(&self, user_id: &str) -> Result<()> {
        self.vault.expire_user_keys(user_id).await
    }

    /// Delete the user's key record and every derived key in memory
    pub async fn delete_user_keys(&self, user_id: &str) -> Result<bool> {
        let deleted = self.vault.delete_user_keys(user_id).await?;
        self.cache.clear_key_cache();
        Ok(deleted)
    }

    /// Forget all derived key material held in memory
    pub fn logout(&self) {
        self.cache.clear_key_cache();
        self.groups.clear();
        tracing::info!("Cleared in-memory key material");
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    /// Encrypt a text message for `recipient`
    pub fn encrypt_message(&self, plaintext: &str, recipient: &PublicKey) -> Result<EncryptedMessage> {
        self.messages.encrypt(plaintext.as_bytes(), recipient)
    }

    /// Decrypt a text message with the recipient's key pair
    pub fn decrypt_message(&self, message: &EncryptedMessage, recipient: &KeyPair) -> Result<String> {
        self.messages.decrypt_to_string(message, recipient)
    }

    /// Encrypt a text message with the group's current key
    pub fn encrypt_group_message(&self, group_id: &str, plaintext: &str) -> Result<EncryptedGroupMessage> {
        self.groups.encrypt(group_id, plaintext.as_bytes())
    }

    /// Decrypt a text message with the group's current key
    pub fn decrypt_group_message(&self, group_id: &str, message: &EncryptedGroupMessage) -> Result<String> {
        let plaintext = self.groups.decrypt(group_id, message)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::InvalidMessageContent("Plaintext is not valid UTF-8".into()))
    }

    /// Pairwise key between `mine` and `recipient_id`, cached per recipient
    pub fn shared_key_for(
        &self,
        recipient_id: &str,
        mine: &KeyPair,
        theirs: &PublicKey,
    ) -> Result<Arc<SymmetricKey>> {
        self.keys
            .derive_shared_key_cached(&self.cache, recipient_id, mine, theirs)
    }

    // ========================================================================
    // RECOVERY
    // ========================================================================

    /// Generate a recovery phrase from this core's provider
    pub fn generate_recovery_phrase(&self) -> Result<RecoveryPhrase> {
        RecoveryPhrase::generate(self.keys.provider().as_ref())
    }
}

impl std::fmt::Debug for CloakCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloakCore")
            .field("config", &self.config)
            .field("cached_keys", &self.cache.len())
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Cloak Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testing::CountingProvider;
    use crate::crypto::MIN_PBKDF2_ITERATIONS;
    use crate::time::ManualClock;
    use std::time::Duration;

    fn test_config() -> CoreConfig {
        CoreConfig {
            kdf_iterations: MIN_PBKDF2_ITERATIONS,
            ..CoreConfig::default()
        }
    }

    fn test_core() -> CloakCore {
        CloakCore::new(test_config()).unwrap()
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = CoreConfig {
            kdf_iterations: 1_000,
            ..CoreConfig::default()
        };
        assert!(matches!(CloakCore::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_alice_and_bob() {
        let core = test_core();

        let alice = core.initialize_user_keys("alice", "alice-pw").await.unwrap();
        let bob = core.initialize_user_keys("bob", "bob-pw").await.unwrap();
        assert!(alice.is_new && bob.is_new);

        let bob_public = core.get_user_public_key("bob").await.unwrap().unwrap();
        assert_eq!(bob_public, bob.public_key);

        let message = core.encrypt_message("Hello Bob", &bob_public).unwrap();

        // Over the wire and back
        let wire = message.to_json().unwrap();
        let received = EncryptedMessage::from_json(&wire).unwrap();

        let bob_keys = core.unlock("bob", "bob-pw").await.unwrap();
        assert_eq!(core.decrypt_message(&received, &bob_keys).unwrap(), "Hello Bob");

        // Alice cannot read what was sent to Bob
        let alice_keys = core.unlock("alice", "alice-pw").await.unwrap();
        assert!(matches!(
            core.decrypt_message(&received, &alice_keys),
            Err(Error::AuthenticationFailed)
        ));

        // Signing in again unlocks the same keys
        let again = core.initialize_user_keys("bob", "bob-pw").await.unwrap();
        assert!(!again.is_new);
        assert_eq!(again.public_key, bob.public_key);
    }

    #[tokio::test]
    async fn test_shared_key_cache_cleared_on_logout_and_delete() {
        let provider = Arc::new(CountingProvider::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let core = CloakCore::with_components(
            test_config(),
            provider.clone(),
            Arc::new(MemoryKeyStore::new()),
            clock,
        )
        .unwrap();

        core.initialize_user_keys("alice", "pw").await.unwrap();
        core.initialize_user_keys("bob", "pw").await.unwrap();
        let alice = core.unlock("alice", "pw").await.unwrap();
        let bob = core.unlock("bob", "pw").await.unwrap();

        let before = provider.dh_calls();
        let first = core.shared_key_for("bob", &alice, bob.public_key()).unwrap();
        let second = core.shared_key_for("bob", &alice, bob.public_key()).unwrap();
        assert_eq!(provider.dh_calls(), before + 1);
        assert!(Arc::ptr_eq(&first, &second));

        core.logout();
        assert!(core.cache().is_empty());

        core.shared_key_for("bob", &alice, bob.public_key()).unwrap();
        assert_eq!(core.cache().len(), 1);

        assert!(core.delete_user_keys("alice").await.unwrap());
        assert!(core.cache().is_empty());
        assert!(!core.has_encryption_keys("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_clears_cache() {
        let core = test_core();
        core.initialize_user_keys("alice", "pw").await.unwrap();
        core.initialize_user_keys("bob", "pw").await.unwrap();
        let alice = core.unlock("alice", "pw").await.unwrap();
        let bob = core.unlock("bob", "pw").await.unwrap();

        core.shared_key_for("bob", &alice, bob.public_key()).unwrap();
        let rotated = core.rotate_user_keys("alice", "pw").await.unwrap();

        assert!(core.cache().is_empty());
        assert_ne!(&rotated, alice.public_key());
        assert_eq!(core.key_status("alice").await.unwrap(), Some(KeyStatus::Active));
    }

    #[tokio::test]
    async fn test_group_messages() {
        let core = test_core();
        let key = core.groups().rotate("team").unwrap();

        let message = core.encrypt_group_message("team", "standup in 5").unwrap();
        assert_eq!(core.decrypt_group_message("team", &message).unwrap(), "standup in 5");

        // A second member imports the shared key
        let member = test_core();
        let exported = GroupCipher::new(Arc::new(RustCryptoProvider))
            .export_symmetric_key(&key)
            .unwrap();
        let imported = member.groups().cipher().import_symmetric_key(&exported).unwrap();
        member.groups().set_key("team", imported);
        assert_eq!(member.decrypt_group_message("team", &message).unwrap(), "standup in 5");

        core.logout();
        assert!(matches!(
            core.encrypt_group_message("team", "hi"),
            Err(Error::NoKeysFound)
        ));
    }

    #[tokio::test]
    async fn test_password_change_and_expiry() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = CoreConfig {
            key_lifetime_secs: Some(60),
            ..test_config()
        };
        let core = CloakCore::with_components(
            config,
            Arc::new(RustCryptoProvider),
            Arc::new(MemoryKeyStore::new()),
            clock.clone(),
        )
        .unwrap();

        core.initialize_user_keys("alice", "old").await.unwrap();
        core.change_password("alice", "old", "new").await.unwrap();
        assert!(matches!(
            core.unlock("alice", "old").await,
            Err(Error::InvalidPassword)
        ));
        core.unlock("alice", "new").await.unwrap();

        clock.advance(Duration::from_secs(61));
        assert_eq!(core.key_status("alice").await.unwrap(), Some(KeyStatus::Expired));
        assert!(!core.has_encryption_keys("alice").await.unwrap());

        // Expired keys still unlock so old messages stay readable
        core.unlock("alice", "new").await.unwrap();
    }

    #[test]
    fn test_recovery_phrase() {
        let phrase = test_core().generate_recovery_phrase().unwrap();
        RecoveryPhrase::validate(&phrase.phrase()).unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_backed_core() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        let config = CoreConfig {
            database_path: Some(path.to_string_lossy().into_owned()),
            ..test_config()
        };

        let created = {
            let core = CloakCore::new(config.clone()).unwrap();
            core.initialize_user_keys("alice", "pw").await.unwrap()
        };

        let core = CloakCore::new(config).unwrap();
        let unlocked = core.initialize_user_keys("alice", "pw").await.unwrap();
        assert!(!unlocked.is_new);
        assert_eq!(unlocked.public_key, created.public_key);
    }
}
