//! Runtime configuration.
//!
//! ```json
//! {
//!   "kdf_iterations": 600000,
//!   "key_cache_ttl_secs": 1800,
//!   "key_lifetime_secs": null,
//!   "database_path": "/var/lib/app/keys.db"
//! }
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{self, DEFAULT_KEY_CACHE_TTL, DEFAULT_PBKDF2_ITERATIONS};
use crate::error::{Error, Result};

/// Configuration for [`crate::CloakCore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// PBKDF2 iterations for newly wrapped private keys (minimum 100,000)
    pub kdf_iterations: u32,
    /// How long derived pairwise keys stay cached
    pub key_cache_ttl_secs: u64,
    /// Lifetime of newly created key pairs; `None` never expires
    pub key_lifetime_secs: Option<u64>,
    /// SQLite key store location; `None` keeps keys in memory only
    pub database_path: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_PBKDF2_ITERATIONS,
            key_cache_ttl_secs: DEFAULT_KEY_CACHE_TTL.as_secs(),
            key_lifetime_secs: None,
            database_path: None,
        }
    }
}

impl CoreConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        crypto::validate_iterations(self.kdf_iterations)?;

        if self.key_cache_ttl_secs == 0 {
            return Err(Error::Config("key_cache_ttl_secs must be positive".into()));
        }

        if self.key_lifetime_secs == Some(0) {
            return Err(Error::Config("key_lifetime_secs must be positive".into()));
        }

        if matches!(self.database_path.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(Error::Config("database_path must not be empty".into()));
        }

        Ok(())
    }

    /// Cache TTL as a `Duration`
    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_secs)
    }

    /// Key lifetime as a `Duration`
    pub fn key_lifetime(&self) -> Option<Duration> {
        self.key_lifetime_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.kdf_iterations, 600_000);
        assert_eq!(config.key_cache_ttl(), Duration::from_secs(30 * 60));
        assert!(config.key_lifetime().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json_partial() {
        let config = CoreConfig::from_json(r#"{"key_lifetime_secs": 86400}"#).unwrap();
        assert_eq!(config.key_lifetime(), Some(Duration::from_secs(86_400)));
        assert_eq!(config.kdf_iterations, DEFAULT_PBKDF2_ITERATIONS);

        assert_eq!(CoreConfig::from_json("{}").unwrap(), CoreConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range() {
        for json in [
            r#"{"kdf_iterations": 99999}"#,
            r#"{"key_cache_ttl_secs": 0}"#,
            r#"{"key_lifetime_secs": 0}"#,
            r#"{"database_path": "  "}"#,
            r#"{"kdf_iterations": "lots"}"#,
        ] {
            assert!(
                matches!(CoreConfig::from_json(json), Err(Error::Config(_))),
                "accepted {}",
                json
            );
        }
    }
}
