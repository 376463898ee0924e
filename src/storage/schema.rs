//! # Database Schema
//!
//! SQL schema definitions for the key store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────┐     ┌─────────────────┐                 │
//! │  │        user_keys          │     │ schema_version  │                 │
//! │  ├───────────────────────────┤     ├─────────────────┤                 │
//! │  │ user_id          TEXT PK  │     │ version         │                 │
//! │  │ public_key       BLOB     │     └─────────────────┘                 │
//! │  │ encrypted_private_key BLOB│                                         │
//! │  │ nonce            BLOB     │                                         │
//! │  │ salt             BLOB     │                                         │
//! │  │ kdf_iterations   INTEGER  │                                         │
//! │  │ status           TEXT     │                                         │
//! │  │ created_at       INTEGER  │                                         │
//! │  │ expires_at       INTEGER? │                                         │
//! │  └───────────────────────────┘                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- One wrapped key pair per user
CREATE TABLE IF NOT EXISTS user_keys (
    user_id TEXT PRIMARY KEY,
    public_key BLOB NOT NULL,
    encrypted_private_key BLOB NOT NULL,
    nonce BLOB NOT NULL,
    salt BLOB NOT NULL,
    kdf_iterations INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER
);
"#;
