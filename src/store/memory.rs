//! In-process key-value store with TTL support

use crate::config::schema::MemoryConfig;
use crate::error::StoreError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Stored value with optional expiry
#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn new(bytes: Vec<u8>, ttl: Duration) -> Result<Self, StoreError> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            let out_of_range = || StoreError::Backend(format!("ttl {:?} out of range", ttl));
            let delta = chrono::Duration::from_std(ttl).map_err(|_| out_of_range())?;
            Some(
                Utc::now()
                    .checked_add_signed(delta)
                    .ok_or_else(out_of_range)?,
            )
        };
        Ok(Self { bytes, expires_at })
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Key-value store held in process memory
///
/// All operations take one mutex, so `set_if_absent` is atomic. Expired
/// entries are treated as absent on read and dropped lazily.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    offline: AtomicBool,
    sweep_on_write: bool,
}

impl MemoryStore {
    /// Create an empty store with default settings
    pub fn new() -> Self {
        Self::from_config(&MemoryConfig::default())
    }

    /// Create an empty store from configuration
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            sweep_on_write: config.sweep_on_write,
        }
    }

    /// Make every operation fail with `StoreError::Unavailable`
    ///
    /// Simulates a lost connection to a remote store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries()
            .values()
            .filter(|v| !v.is_expired(now))
            .count()
    }

    /// Whether the store holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry of a live entry; `Some(None)` for a non-expiring entry
    pub fn expires_at(&self, key: &str) -> Option<Option<DateTime<Utc>>> {
        let now = Utc::now();
        self.entries()
            .get(key)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.expires_at)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, StoredValue>> {
        // Every critical section leaves the map consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn sweep(&self, entries: &mut HashMap<String, StoredValue>) {
        if !self.sweep_on_write {
            return;
        }
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired(now));
        let swept = before - entries.len();
        if swept > 0 {
            debug!("Swept {} expired entries", swept);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_online()?;

        let mut entries = self.entries();
        let expired = match entries.get(key) {
            Some(value) => value.is_expired(Utc::now()),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|v| v.bytes.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.check_online()?;

        let stored = StoredValue::new(value, ttl)?;
        let mut entries = self.entries();
        self.sweep(&mut entries);
        entries.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_online()?;

        self.entries().remove(key);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_online()?;

        let stored = StoredValue::new(value, ttl)?;
        let now = Utc::now();
        let mut entries = self.entries();
        self.sweep(&mut entries);

        if entries.get(key).is_some_and(|v| !v.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), stored);
        Ok(true)
    }
}
