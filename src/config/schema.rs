//! Configuration schema for keyward
//!
//! Every section is optional; an empty document yields the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Cache key settings
    pub cache: CacheConfig,

    /// Distributed lock settings
    pub lock: LockConfig,

    /// In-process store settings
    pub memory: MemoryConfig,
}

impl CoordinatorConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Cache key settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix for every store key, joined with `:` (empty = no prefix)
    pub namespace: String,
}

impl CacheConfig {
    /// Map a caller key to the key written in the store
    pub fn store_key(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }
}

/// Distributed lock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Value stored under a held lock key
    pub sentinel: String,

    /// Suggested lock time-to-live in seconds for callers without their own
    pub default_ttl_secs: u64,
}

impl LockConfig {
    /// Default lock time-to-live as a `Duration`
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            sentinel: "ok".to_string(),
            default_ttl_secs: 30,
        }
    }
}

/// In-process store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Drop expired entries on every write
    pub sweep_on_write: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sweep_on_write: true,
        }
    }
}
