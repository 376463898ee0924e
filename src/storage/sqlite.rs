//! # SQLite Key Store
//!
//! Durable `KeyStore` on a single SQLite file.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      KEY STORE OPERATIONS                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    KeyVault     │                                                   │
//! │  └────────┬────────┘                                                   │
//! │           │  get / put / delete                                        │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │ SqliteKeyStore  │  One row per user in `user_keys`                  │
//! │  │  (this file)    │  INSERT OR REPLACE for atomic updates             │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  - In-memory for tests                            │
//! │  │                 │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::schema;
use super::{KeyStatus, KeyStore, StoredKeyData};
use crate::error::{Error, Result};

/// `KeyStore` backed by SQLite
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyStore {
    /// Open or create a key store
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.init_schema()?;

        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // The version table itself may not exist yet
        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )?;

                tracing::info!("Key store schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Key store schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Key store schema is version {}", v);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn get(&self, user_id: &str) -> Result<Option<StoredKeyData>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT user_id, public_key, encrypted_private_key, nonce, salt,
                    kdf_iterations, status, created_at, expires_at
             FROM user_keys WHERE user_id = ?",
            params![user_id],
            |row| {
                Ok((
                    StoredKeyData {
                        id: row.get(0)?,
                        public_key: row.get(1)?,
                        encrypted_private_key: row.get(2)?,
                        nonce: row.get(3)?,
                        salt: row.get(4)?,
                        kdf_iterations: row.get(5)?,
                        status: KeyStatus::Active,
                        created_at: row.get(7)?,
                        expires_at: row.get(8)?,
                    },
                    row.get::<_, String>(6)?,
                ))
            },
        );

        match result {
            Ok((mut record, status)) => {
                record.status = KeyStatus::parse(&status)?;
                Ok(Some(record))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::StorageReadError(format!(
                "Failed to load key record: {}",
                e
            ))),
        }
    }

    async fn put(&self, record: StoredKeyData) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO user_keys
                (user_id, public_key, encrypted_private_key, nonce, salt,
                 kdf_iterations, status, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.public_key,
                record.encrypted_private_key,
                record.nonce,
                record.salt,
                record.kdf_iterations,
                record.status.as_str(),
                record.created_at,
                record.expires_at,
            ],
        )
        .map_err(|e| Error::StorageWriteError(format!("Failed to store key record: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let rows = conn
            .execute("DELETE FROM user_keys WHERE user_id = ?", params![user_id])
            .map_err(|e| Error::StorageWriteError(format!("Failed to delete key record: {}", e)))?;

        Ok(rows > 0)
    }
}

impl std::fmt::Debug for SqliteKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKeyStore").finish_non_exhaustive()
    }
}
