//! # Key Cache
//!
//! In-memory TTL cache of derived per-recipient AES keys.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY CACHE                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  recipient_id ──► CachedKeyEntry { key: Arc<SymmetricKey>, cached_at } │
//! │                                                                         │
//! │  get(id) at time t:                                                    │
//! │    t - cached_at ≤ ttl   →  Some(key)                                  │
//! │    t - cached_at > ttl   →  None, entry evicted                        │
//! │                                                                         │
//! │  Never persisted. Cleared on logout and on key deletion.               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only static-static (pairwise) keys belong here. Direct messages use a new
//! ephemeral key each time, so there is nothing reusable to cache for them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::encryption::SymmetricKey;
use crate::time::Clock;

/// Default time-to-live for cached keys
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

struct CachedKeyEntry {
    key: Arc<SymmetricKey>,
    cached_at: i64,
}

/// TTL cache of derived keys, keyed by recipient id
pub struct KeyCache {
    entries: RwLock<HashMap<String, CachedKeyEntry>>,
    ttl_millis: i64,
    clock: Arc<dyn Clock>,
}

impl KeyCache {
    /// Create an empty cache
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_millis: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            clock,
        }
    }

    /// Store a key for `recipient_id`, replacing any previous entry
    pub fn cache_recipient_key(&self, recipient_id: &str, key: Arc<SymmetricKey>) {
        let entry = CachedKeyEntry {
            key,
            cached_at: self.clock.now_millis(),
        };
        self.entries.write().insert(recipient_id.to_string(), entry);
    }

    /// Look up a key, evicting it if it has outlived the TTL
    pub fn get_cached_recipient_key(&self, recipient_id: &str) -> Option<Arc<SymmetricKey>> {
        let now = self.clock.now_millis();

        {
            let entries = self.entries.read();
            match entries.get(recipient_id) {
                None => return None,
                Some(entry) if !self.is_expired(entry, now) => {
                    return Some(Arc::clone(&entry.key));
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock; another writer may have refreshed it
        let mut entries = self.entries.write();
        match entries.get(recipient_id) {
            Some(entry) if !self.is_expired(entry, now) => Some(Arc::clone(&entry.key)),
            Some(_) => {
                entries.remove(recipient_id);
                tracing::trace!("Evicted expired cached key");
                None
            }
            None => None,
        }
    }

    /// Drop every entry
    pub fn clear_key_cache(&self) {
        self.entries.write().clear();
    }

    /// Drop entries past their TTL, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    /// Number of entries, including any not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn is_expired(&self, entry: &CachedKeyEntry, now: i64) -> bool {
        now.saturating_sub(entry.cached_at) > self.ttl_millis
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("entries", &self.len())
            .field("ttl_millis", &self.ttl_millis)
            .finish()
    }
}
