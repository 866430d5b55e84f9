//! Per-key in-process mutexes
//!
//! Collapses concurrent work on the same cache key onto one lock. The table
//! only grows: a key's mutex lives as long as the registry, so a process that
//! touches an unbounded key space holds one small allocation per key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

/// Read/write lock bound to one cache key
pub type KeyMutex = Arc<RwLock<()>>;

/// Table mapping cache keys to their mutex
#[derive(Debug, Default)]
pub struct KeyedMutexRegistry {
    mutexes: Mutex<HashMap<String, KeyMutex>>,
}

impl KeyedMutexRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mutex for `key`, creating it on first use
    ///
    /// The registry lock is held only for the lookup-or-insert. Callers lock
    /// the returned mutex themselves.
    pub fn acquire_for(&self, key: &str) -> KeyMutex {
        // Insert-if-absent cannot leave the map half-updated, so a poisoned
        // lock is still safe to use
        let mut mutexes = self.mutexes.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(mutex) = mutexes.get(key) {
            return Arc::clone(mutex);
        }

        debug!("Creating mutex for key {}", key);
        let mutex = KeyMutex::default();
        mutexes.insert(key.to_string(), Arc::clone(&mutex));
        mutex
    }

    /// Whether a mutex has been created for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.mutexes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Number of keys with a mutex
    pub fn len(&self) -> usize {
        self.mutexes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no mutex has been created yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
