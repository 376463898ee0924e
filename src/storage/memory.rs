//! In-memory key store.
//!
//! Records live only as long as the process. Useful for tests and for
//! sessions that must not touch disk.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{KeyStore, StoredKeyData};
use crate::error::Result;

/// `KeyStore` backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<String, StoredKeyData>>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, user_id: &str) -> Result<Option<StoredKeyData>> {
        Ok(self.records.read().get(user_id).cloned())
    }

    async fn put(&self, record: StoredKeyData) -> Result<()> {
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.records.write().remove(user_id).is_some())
    }
}
