//! # Key Vault
//!
//! Per-user key lifecycle on top of a [`KeyStore`].
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      USER KEY STATES                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                 initialize_user_keys                                    │
//! │  Uninitialized ─────────────────────► Active ◄───────────┐              │
//! │        ▲                               │  │              │              │
//! │        │                               │  │ rotate       │ new pair     │
//! │        │ delete_user_keys              │  ▼              │ one write    │
//! │        │                               │ Rotating ───────┘              │
//! │        │                               │                                │
//! │        │               expire / expiresAt passed                        │
//! │        │                               ▼                                │
//! │        └───────────────────────────  Expired                            │
//! │                                                                         │
//! │  Expired keys still unlock (old messages stay readable) but            │
//! │  has_encryption_keys reports false.                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Every operation that reads-then-writes a record holds that user's async
//! lock for its whole duration. Different users proceed in parallel. PBKDF2
//! runs on the blocking pool, and a record is only written once all of its
//! key material has been computed, in a single `put`. A failed or dropped
//! operation therefore leaves the previous record untouched.
//!
//! `Rotating` exists only while a rotation is in flight and is never
//! persisted. A `Rotating` record left behind by an older build is restored
//! to `Active` the next time the user initializes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use zeroize::Zeroizing;

use super::{KeyStatus, KeyStore, StoredKeyData};
use crate::crypto::{
    self, ExportedKeyPair, KeyPair, KeyService, Nonce, PublicKey, Salt,
    DEFAULT_PBKDF2_ITERATIONS, MIN_PBKDF2_ITERATIONS,
};
use crate::error::{Error, Result};
use crate::time::Clock;

/// Result of [`KeyVault::initialize_user_keys`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializedKeys {
    /// The user's public key
    pub public_key: PublicKey,
    /// Whether a new key pair was generated by this call
    pub is_new: bool,
}

/// A private key wrapped under a password-derived key
struct WrappedPrivateKey {
    encrypted: Vec<u8>,
    nonce: Nonce,
    salt: Salt,
    iterations: u32,
}

/// Password-protected key storage with lifecycle management
pub struct KeyVault {
    store: Arc<dyn KeyStore>,
    keys: KeyService,
    clock: Arc<dyn Clock>,
    kdf_iterations: u32,
    key_lifetime: Option<Duration>,
    locks: UserLocks,
}

type UserLocks = parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Held for the duration of a per-user operation
///
/// Drops the user's map entry once nobody else holds or awaits it.
struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock();
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

impl KeyVault {
    /// Create a vault with the default PBKDF2 cost and no key expiry
    pub fn new(store: Arc<dyn KeyStore>, keys: KeyService, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            keys,
            clock,
            kdf_iterations: DEFAULT_PBKDF2_ITERATIONS,
            key_lifetime: None,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Use a different PBKDF2 iteration count for newly wrapped keys
    ///
    /// `Config` error below [`MIN_PBKDF2_ITERATIONS`]. Existing records keep
    /// the count they were wrapped with until re-wrapped.
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Result<Self> {
        crypto::validate_iterations(iterations)?;
        self.kdf_iterations = iterations;
        Ok(self)
    }

    /// Make newly created keys expire after `lifetime`
    pub fn with_key_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.key_lifetime = lifetime;
        self
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create the user's key pair, or unlock the existing one
    ///
    /// ## Returns
    ///
    /// - `is_new: true` when no record existed and one was created
    /// - `is_new: false` when the existing record unlocked with `password`
    ///
    /// ## Errors
    ///
    /// `InvalidPassword` if a record exists and `password` does not unlock it.
    pub async fn initialize_user_keys(&self, user_id: &str, password: &str) -> Result<InitializedKeys> {
        let _guard = self.lock_user(user_id).await;

        if let Some(mut record) = self.store.get(user_id).await? {
            let key_pair = self.unwrap_record(&record, password).await?;
            if record.status == KeyStatus::Rotating {
                record.status = KeyStatus::Active;
                self.store.put(record).await?;
                tracing::warn!("Restored key record left mid-rotation");
            }
            tracing::debug!(user_id, "Unlocked existing encryption keys");
            return Ok(InitializedKeys {
                public_key: key_pair.public_key().clone(),
                is_new: false,
            });
        }

        let key_pair = self.keys.generate_key_pair()?;
        let record = self.new_record(user_id, &key_pair, password).await?;
        self.store.put(record).await?;

        tracing::info!("Generated new encryption keys");
        tracing::debug!(user_id, "Stored new key record");

        Ok(InitializedKeys {
            public_key: key_pair.public_key().clone(),
            is_new: true,
        })
    }

    /// Unlock the user's key pair
    ///
    /// Works in every status, so expired keys can still read old messages.
    ///
    /// ## Errors
    ///
    /// - `NoKeysFound` if the user has no record
    /// - `InvalidPassword` if `password` is wrong
    /// - `StorageCorrupted` if the record is unusable
    pub async fn get_user_key_pair(&self, user_id: &str, password: &str) -> Result<KeyPair> {
        let record = self.load(user_id).await?;
        self.unwrap_record(&record, password).await
    }

    /// The user's public key, if they have one
    pub async fn get_user_public_key(&self, user_id: &str) -> Result<Option<PublicKey>> {
        match self.store.get(user_id).await? {
            Some(record) => Ok(Some(
                PublicKey::from_spki_der(&record.public_key)
                    .map_err(|e| Error::StorageCorrupted(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Permanently remove the user's keys
    ///
    /// Messages encrypted to the deleted key can never be decrypted again.
    pub async fn delete_user_keys(&self, user_id: &str) -> Result<bool> {
        let _guard = self.lock_user(user_id).await;

        let deleted = self.store.delete(user_id).await?;
        if deleted {
            tracing::info!("Deleted encryption keys");
            tracing::debug!(user_id, "Removed key record");
        }
        Ok(deleted)
    }

    /// Whether the user has an active, unexpired key
    pub async fn has_encryption_keys(&self, user_id: &str) -> Result<bool> {
        Ok(self.key_status(user_id).await? == Some(KeyStatus::Active))
    }

    /// Effective status of the user's key, honoring `expires_at`
    pub async fn key_status(&self, user_id: &str) -> Result<Option<KeyStatus>> {
        let now = self.clock.now_millis();
        Ok(self
            .store
            .get(user_id)
            .await?
            .map(|record| record.effective_status(now)))
    }

    /// Replace the user's key pair with a new one
    ///
    /// The old key is discarded; messages encrypted to it become unreadable.
    /// The replacement is fully wrapped before it overwrites the old record,
    /// so any error leaves the old key in place.
    pub async fn rotate_user_keys(&self, user_id: &str, password: &str) -> Result<PublicKey> {
        let _guard = self.lock_user(user_id).await;

        let record = self.load(user_id).await?;
        self.unwrap_record(&record, password).await?;
        tracing::info!("Rotating encryption keys");

        let key_pair = self.keys.generate_key_pair()?;
        let replacement = self.new_record(user_id, &key_pair, password).await?;
        self.store.put(replacement).await?;

        tracing::info!("Encryption keys rotated");
        Ok(key_pair.public_key().clone())
    }

    /// Re-wrap the same private key under a new password
    ///
    /// Also upgrades the record to the vault's current PBKDF2 cost.
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let _guard = self.lock_user(user_id).await;

        let record = self.load(user_id).await?;
        let key_pair = self.unwrap_record(&record, old_password).await?;
        let wrapped = self.wrap(user_id, &key_pair, new_password).await?;

        self.store
            .put(StoredKeyData {
                encrypted_private_key: wrapped.encrypted,
                nonce: wrapped.nonce.as_bytes().to_vec(),
                salt: wrapped.salt.as_bytes().to_vec(),
                kdf_iterations: wrapped.iterations,
                ..record
            })
            .await?;

        tracing::info!("Encryption key password changed");
        Ok(())
    }

    /// Mark the user's key as expired
    pub async fn expire_user_keys(&self, user_id: &str) -> Result<()> {
        let _guard = self.lock_user(user_id).await;

        let mut record = self.load(user_id).await?;
        record.status = KeyStatus::Expired;
        self.store.put(record).await?;

        tracing::info!("Encryption keys expired");
        Ok(())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn lock_user(&self, user_id: &str) -> UserGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };

        UserGuard {
            locks: &self.locks,
            user_id: user_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn load(&self, user_id: &str) -> Result<StoredKeyData> {
        self.store.get(user_id).await?.ok_or(Error::NoKeysFound)
    }

    async fn new_record(&self, user_id: &str, key_pair: &KeyPair, password: &str) -> Result<StoredKeyData> {
        let wrapped = self.wrap(user_id, key_pair, password).await?;
        let now = self.clock.now_millis();
        let expires_at = self
            .key_lifetime
            .map(|lifetime| now.saturating_add(i64::try_from(lifetime.as_millis()).unwrap_or(i64::MAX)));

        Ok(StoredKeyData {
            id: user_id.to_string(),
            public_key: key_pair.public_key().to_spki_der().to_vec(),
            encrypted_private_key: wrapped.encrypted,
            nonce: wrapped.nonce.as_bytes().to_vec(),
            salt: wrapped.salt.as_bytes().to_vec(),
            kdf_iterations: wrapped.iterations,
            status: KeyStatus::Active,
            created_at: now,
            expires_at,
        })
    }

    async fn wrap(&self, user_id: &str, key_pair: &KeyPair, password: &str) -> Result<WrappedPrivateKey> {
        let provider = Arc::clone(self.keys.provider());
        let exported = self.keys.export_key_pair(key_pair)?;
        let salt = crypto::generate_salt(provider.as_ref())?;

        let wrapping_key = self.derive_wrapping_key(password, salt, self.kdf_iterations).await?;
        let (nonce, encrypted) = crypto::encrypt(
            provider.as_ref(),
            &wrapping_key,
            &exported.private_key,
            user_id.as_bytes(),
        )?;

        Ok(WrappedPrivateKey {
            encrypted,
            nonce,
            salt,
            iterations: self.kdf_iterations,
        })
    }

    async fn unwrap_record(&self, record: &StoredKeyData, password: &str) -> Result<KeyPair> {
        let salt = Salt::from_slice(&record.salt)
            .ok_or_else(|| Error::StorageCorrupted("Invalid salt length".into()))?;
        let nonce = Nonce::from_slice(&record.nonce)
            .ok_or_else(|| Error::StorageCorrupted("Invalid nonce length".into()))?;
        if record.kdf_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(Error::StorageCorrupted(format!(
                "Implausible kdf iteration count {}",
                record.kdf_iterations
            )));
        }

        let wrapping_key = self
            .derive_wrapping_key(password, salt, record.kdf_iterations)
            .await?;

        let private_key = crypto::decrypt(
            self.keys.provider().as_ref(),
            &wrapping_key,
            &nonce,
            &record.encrypted_private_key,
            record.id.as_bytes(),
        )
        .map_err(|e| match e {
            Error::AuthenticationFailed => Error::InvalidPassword,
            other => other,
        })?;

        let exported = ExportedKeyPair {
            public_key: record.public_key.clone(),
            private_key: Zeroizing::new(private_key),
        };

        self.keys.import_key_pair(&exported).map_err(|e| {
            tracing::warn!("Stored key record failed to import after unlock");
            Error::StorageCorrupted(e.to_string())
        })
    }

    async fn derive_wrapping_key(
        &self,
        password: &str,
        salt: Salt,
        iterations: u32,
    ) -> Result<crypto::SymmetricKey> {
        let provider = Arc::clone(self.keys.provider());
        let password = Zeroizing::new(password.to_string());

        tokio::task::spawn_blocking(move || {
            crypto::derive_key_from_password(provider.as_ref(), &password, &salt, iterations)
        })
        .await?
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault")
            .field("kdf_iterations", &self.kdf_iterations)
            .field("key_lifetime", &self.key_lifetime)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::crypto::testing::SlowKdfProvider;
    use crate::crypto::RustCryptoProvider;
    use crate::messaging::MessageCipher;
    use crate::storage::{MemoryKeyStore, SqliteKeyStore};
    use crate::time::ManualClock;

    /// Memory store whose writes can be switched off
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryKeyStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl KeyStore for FailingStore {
        async fn get(&self, user_id: &str) -> Result<Option<StoredKeyData>> {
            self.inner.get(user_id).await
        }

        async fn put(&self, record: StoredKeyData) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::StorageWriteError("disk full".into()));
            }
            self.inner.put(record).await
        }

        async fn delete(&self, user_id: &str) -> Result<bool> {
            self.inner.delete(user_id).await
        }
    }

    fn slow_vault(store: Arc<MemoryKeyStore>) -> KeyVault {
        let provider = SlowKdfProvider {
            delay: Duration::from_millis(200),
        };
        KeyVault::new(
            store,
            KeyService::new(Arc::new(provider)),
            Arc::new(ManualClock::new(0)),
        )
        .with_kdf_iterations(MIN_PBKDF2_ITERATIONS)
        .unwrap()
    }

    struct Fixture {
        vault: KeyVault,
        store: Arc<MemoryKeyStore>,
        clock: Arc<ManualClock>,
        keys: KeyService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryKeyStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let keys = KeyService::new(Arc::new(RustCryptoProvider));
        let vault = KeyVault::new(store.clone(), keys.clone(), clock.clone())
            .with_kdf_iterations(MIN_PBKDF2_ITERATIONS)
            .unwrap();
        Fixture {
            vault,
            store,
            clock,
            keys,
        }
    }

    #[tokio::test]
    async fn test_initialize_then_unlock() {
        let f = fixture();

        let first = f.vault.initialize_user_keys("alice", "correct horse").await.unwrap();
        assert!(first.is_new);

        let second = f.vault.initialize_user_keys("alice", "correct horse").await.unwrap();
        assert!(!second.is_new);
        assert_eq!(first.public_key, second.public_key);
    }

    #[tokio::test]
    async fn test_initialize_with_wrong_password() {
        let f = fixture();
        f.vault.initialize_user_keys("alice", "correct horse").await.unwrap();

        let result = f.vault.initialize_user_keys("alice", "battery staple").await;
        assert!(matches!(result, Err(Error::InvalidPassword)));
    }

    #[tokio::test]
    async fn test_get_key_pair() {
        let f = fixture();
        let init = f.vault.initialize_user_keys("alice", "pw-1").await.unwrap();

        let kp = f.vault.get_user_key_pair("alice", "pw-1").await.unwrap();
        assert_eq!(kp.public_key(), &init.public_key);

        assert!(matches!(
            f.vault.get_user_key_pair("alice", "pw-2").await,
            Err(Error::InvalidPassword)
        ));
        assert!(matches!(
            f.vault.get_user_key_pair("bob", "pw-1").await,
            Err(Error::NoKeysFound)
        ));
    }

    #[tokio::test]
    async fn test_stored_record_has_no_plaintext_private_key() {
        let f = fixture();
        f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        let kp = f.vault.get_user_key_pair("alice", "pw").await.unwrap();
        let exported = f.keys.export_key_pair(&kp).unwrap();

        let record = f.store.get("alice").await.unwrap().unwrap();
        assert_eq!(record.nonce.len(), crypto::NONCE_SIZE);
        assert_eq!(record.salt.len(), crypto::SALT_SIZE);
        assert_eq!(record.kdf_iterations, MIN_PBKDF2_ITERATIONS);
        assert_eq!(record.status, KeyStatus::Active);
        assert_ne!(record.encrypted_private_key, exported.private_key.as_slice());

        let json = record.to_json().unwrap();
        assert!(!json.contains(&crate::codec::encode(exported.private_key.as_slice())));
    }

    #[tokio::test]
    async fn test_record_bound_to_user_id() {
        let f = fixture();
        f.vault.initialize_user_keys("alice", "pw").await.unwrap();

        let mut stolen = f.store.get("alice").await.unwrap().unwrap();
        stolen.id = "mallory".into();
        f.store.put(stolen).await.unwrap();

        assert!(matches!(
            f.vault.get_user_key_pair("mallory", "pw").await,
            Err(Error::InvalidPassword)
        ));
    }

    #[tokio::test]
    async fn test_public_key_and_presence() {
        let f = fixture();
        assert!(f.vault.get_user_public_key("alice").await.unwrap().is_none());
        assert!(!f.vault.has_encryption_keys("alice").await.unwrap());

        let init = f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        assert_eq!(
            f.vault.get_user_public_key("alice").await.unwrap(),
            Some(init.public_key)
        );
        assert!(f.vault.has_encryption_keys("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user_keys() {
        let f = fixture();
        f.vault.initialize_user_keys("alice", "pw").await.unwrap();

        assert!(f.vault.delete_user_keys("alice").await.unwrap());
        assert!(!f.vault.delete_user_keys("alice").await.unwrap());
        assert!(matches!(
            f.vault.get_user_key_pair("alice", "pw").await,
            Err(Error::NoKeysFound)
        ));

        // A fresh initialize now creates a different key
        let again = f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        assert!(again.is_new);
    }

    #[tokio::test]
    async fn test_rotation_replaces_key() {
        let f = fixture();
        let cipher = MessageCipher::new(f.keys.clone());
        let init = f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        let old_msg = cipher.encrypt(b"before rotation", &init.public_key).unwrap();

        let rotated = f.vault.rotate_user_keys("alice", "pw").await.unwrap();
        assert_ne!(rotated, init.public_key);
        assert_eq!(f.vault.key_status("alice").await.unwrap(), Some(KeyStatus::Active));

        let kp = f.vault.get_user_key_pair("alice", "pw").await.unwrap();
        assert_eq!(kp.public_key(), &rotated);
        assert!(matches!(cipher.decrypt(&old_msg, &kp), Err(Error::AuthenticationFailed)));

        assert!(matches!(
            f.vault.rotate_user_keys("alice", "wrong").await,
            Err(Error::InvalidPassword)
        ));
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_old_key() {
        let store = Arc::new(FailingStore::default());
        let vault = KeyVault::new(
            store.clone(),
            KeyService::new(Arc::new(RustCryptoProvider)),
            Arc::new(ManualClock::new(0)),
        )
        .with_kdf_iterations(MIN_PBKDF2_ITERATIONS)
        .unwrap();
        let init = vault.initialize_user_keys("alice", "pw").await.unwrap();
        let before = store.get("alice").await.unwrap().unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            vault.rotate_user_keys("alice", "pw").await,
            Err(Error::StorageWriteError(_))
        ));
        store.fail_writes.store(false, Ordering::SeqCst);

        assert_eq!(store.get("alice").await.unwrap().unwrap(), before);
        assert_eq!(vault.key_status("alice").await.unwrap(), Some(KeyStatus::Active));
        assert!(vault.has_encryption_keys("alice").await.unwrap());
        let kp = vault.get_user_key_pair("alice", "pw").await.unwrap();
        assert_eq!(kp.public_key(), &init.public_key);

        // Rotation succeeds once the store recovers
        let rotated = vault.rotate_user_keys("alice", "pw").await.unwrap();
        assert_ne!(rotated, init.public_key);
    }

    #[tokio::test]
    async fn test_leftover_rotating_record_restored() {
        let f = fixture();
        let init = f.vault.initialize_user_keys("alice", "pw").await.unwrap();

        let mut stuck = f.store.get("alice").await.unwrap().unwrap();
        stuck.status = KeyStatus::Rotating;
        f.store.put(stuck).await.unwrap();
        assert!(!f.vault.has_encryption_keys("alice").await.unwrap());

        let again = f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        assert!(!again.is_new);
        assert_eq!(again.public_key, init.public_key);
        assert_eq!(f.vault.key_status("alice").await.unwrap(), Some(KeyStatus::Active));
        assert!(f.vault.has_encryption_keys("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_initialize_persists_nothing() {
        let store = Arc::new(MemoryKeyStore::new());
        let vault = slow_vault(store.clone());

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            vault.initialize_user_keys("alice", "pw"),
        )
        .await;
        assert!(result.is_err());

        // Let the abandoned derivation finish on the blocking pool
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(store.get("alice").await.unwrap().is_none());
        assert!(vault.locks.lock().is_empty());

        let init = vault.initialize_user_keys("alice", "pw").await.unwrap();
        assert!(init.is_new);
    }

    #[tokio::test]
    async fn test_dropped_rotation_keeps_old_record() {
        let store = Arc::new(MemoryKeyStore::new());
        let vault = slow_vault(store.clone());
        vault.initialize_user_keys("alice", "pw").await.unwrap();
        let before = store.get("alice").await.unwrap().unwrap();

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            vault.rotate_user_keys("alice", "pw"),
        )
        .await;
        assert!(result.is_err());
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(store.get("alice").await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_user_locks_released() {
        let f = fixture();
        f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        f.vault.rotate_user_keys("alice", "pw").await.unwrap();
        assert!(f.vault.locks.lock().is_empty());

        f.vault.delete_user_keys("alice").await.unwrap();
        f.vault.delete_user_keys("nobody").await.unwrap();
        assert!(f.vault.locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_change_password_keeps_key() {
        let f = fixture();
        let init = f.vault.initialize_user_keys("alice", "old").await.unwrap();
        let before = f.store.get("alice").await.unwrap().unwrap();

        f.vault.change_password("alice", "old", "new").await.unwrap();

        let after = f.store.get("alice").await.unwrap().unwrap();
        assert_ne!(before.salt, after.salt);
        assert_ne!(before.nonce, after.nonce);
        assert_eq!(before.created_at, after.created_at);

        assert!(matches!(
            f.vault.get_user_key_pair("alice", "old").await,
            Err(Error::InvalidPassword)
        ));
        let kp = f.vault.get_user_key_pair("alice", "new").await.unwrap();
        assert_eq!(kp.public_key(), &init.public_key);
    }

    #[tokio::test]
    async fn test_expiry() {
        let f = fixture();
        let vault = KeyVault::new(f.store.clone(), f.keys.clone(), f.clock.clone())
            .with_kdf_iterations(MIN_PBKDF2_ITERATIONS)
            .unwrap()
            .with_key_lifetime(Some(Duration::from_secs(3600)));

        vault.initialize_user_keys("alice", "pw").await.unwrap();
        assert!(vault.has_encryption_keys("alice").await.unwrap());

        f.clock.advance(Duration::from_secs(3601));
        assert!(!vault.has_encryption_keys("alice").await.unwrap());
        assert_eq!(vault.key_status("alice").await.unwrap(), Some(KeyStatus::Expired));

        // Expired keys still unlock
        vault.get_user_key_pair("alice", "pw").await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_expire() {
        let f = fixture();
        f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        f.vault.expire_user_keys("alice").await.unwrap();

        assert!(!f.vault.has_encryption_keys("alice").await.unwrap());
        assert!(matches!(
            f.vault.expire_user_keys("bob").await,
            Err(Error::NoKeysFound)
        ));
    }

    #[tokio::test]
    async fn test_corrupt_records() {
        let f = fixture();
        f.vault.initialize_user_keys("alice", "pw").await.unwrap();
        let good = f.store.get("alice").await.unwrap().unwrap();

        let mut short_salt = good.clone();
        short_salt.salt.truncate(4);
        f.store.put(short_salt).await.unwrap();
        assert!(matches!(
            f.vault.get_user_key_pair("alice", "pw").await,
            Err(Error::StorageCorrupted(_))
        ));

        // Unwraps fine but the public half belongs to someone else
        let mut mismatched = good.clone();
        let other = f.keys.generate_key_pair().unwrap();
        mismatched.public_key = other.public_key().to_spki_der().to_vec();
        f.store.put(mismatched).await.unwrap();
        assert!(matches!(
            f.vault.get_user_key_pair("alice", "pw").await,
            Err(Error::StorageCorrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_low_iterations_rejected() {
        let f = fixture();
        let result = KeyVault::new(f.store.clone(), f.keys.clone(), f.clock.clone())
            .with_kdf_iterations(10_000);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_initialize_creates_one_key() {
        let f = fixture();
        let vault = Arc::new(f.vault);

        let a = tokio::spawn({
            let vault = Arc::clone(&vault);
            async move { vault.initialize_user_keys("alice", "pw").await }
        });
        let b = tokio::spawn({
            let vault = Arc::clone(&vault);
            async move { vault.initialize_user_keys("alice", "pw").await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.public_key, b.public_key);
        assert!(a.is_new ^ b.is_new);
    }

    #[tokio::test]
    async fn test_sqlite_backed_vault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let path = path.to_str().unwrap();
        let keys = KeyService::new(Arc::new(RustCryptoProvider));
        let clock = Arc::new(ManualClock::new(0));

        let public = {
            let store = Arc::new(SqliteKeyStore::open(Some(path)).unwrap());
            let vault = KeyVault::new(store, keys.clone(), clock.clone())
                .with_kdf_iterations(MIN_PBKDF2_ITERATIONS)
                .unwrap();
            vault.initialize_user_keys("alice", "pw").await.unwrap().public_key
        };

        let store = Arc::new(SqliteKeyStore::open(Some(path)).unwrap());
        let vault = KeyVault::new(store, keys, clock)
            .with_kdf_iterations(MIN_PBKDF2_ITERATIONS)
            .unwrap();
        let kp = vault.get_user_key_pair("alice", "pw").await.unwrap();
        assert_eq!(kp.public_key(), &public);
    }
}
