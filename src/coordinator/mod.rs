//! Cache-aside coordination over a shared key-value store
//!
//! Concurrent population of one key inside a process is serialized by a
//! per-key write lock, so a factory runs at most once at a time per key.
//! Processes sharing the store are not coordinated by that lock; use
//! `run_exclusive` for cross-process critical sections.
//!
//! # Operations
//!
//! | Operation | Per-key lock | Store calls |
//! |-----------|--------------|-------------|
//! | `fetch` | no | get |
//! | `populate` | write | set |
//! | `fetch_or_populate` | write | get, then set on miss |
//! | `invalidate` | no | delete |
//! | `run_exclusive` | no | set-if-absent, delete |
//! | `run_exclusive_default` | no | set-if-absent, delete |

pub mod entry;
mod exclusive;

pub use entry::CacheEntry;

use crate::codec::{Codec, JsonCodec};
use crate::config::CoordinatorConfig;
use crate::error::{BoxError, CacheError, CacheResult};
use crate::registry::KeyedMutexRegistry;
use crate::store::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Key read by `connect` to verify the store is reachable
const PROBE_KEY: &str = "__keyward_probe__";

/// Coordinates cache reads, population and advisory locks for one store
///
/// Each coordinator owns its lock table. Two coordinators over the same
/// store share cached values but never share in-process locks.
#[derive(Debug)]
pub struct CacheCoordinator<S, C = JsonCodec> {
    store: S,
    codec: C,
    registry: KeyedMutexRegistry,
    config: CoordinatorConfig,
}

impl<S: KeyValueStore> CacheCoordinator<S, JsonCodec> {
    /// Create a coordinator using JSON encoding
    pub fn new(store: S, config: CoordinatorConfig) -> Self {
        Self::with_codec(store, JsonCodec, config)
    }

    /// Create a coordinator after checking the store answers a read
    pub async fn connect(store: S, config: CoordinatorConfig) -> CacheResult<Self> {
        let coordinator = Self::new(store, config);
        coordinator.probe().await?;
        Ok(coordinator)
    }
}

impl<S: KeyValueStore, C: Codec> CacheCoordinator<S, C> {
    /// Create a coordinator with a custom codec
    pub fn with_codec(store: S, codec: C, config: CoordinatorConfig) -> Self {
        Self {
            store,
            codec,
            registry: KeyedMutexRegistry::new(),
            config,
        }
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The per-key lock table
    pub fn registry(&self) -> &KeyedMutexRegistry {
        &self.registry
    }

    /// Read and decode the value cached under `key`
    ///
    /// Takes no lock. Fails with `NotFound` on a miss.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        validate_key(key)?;

        match self.read(key).await? {
            Some(bytes) => {
                debug!("Cache hit for {}", key);
                self.decode(key, &bytes)
            }
            None => {
                debug!("Cache miss for {}", key);
                Err(CacheError::NotFound {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Produce a fresh value with `factory` and store it, replacing any existing value
    ///
    /// If the factory fails the store is not touched.
    pub async fn populate<T, F, Fut, E>(&self, key: &str, factory: F) -> CacheResult<()>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry<T>, E>>,
        E: Into<BoxError>,
    {
        validate_key(key)?;

        let mutex = self.registry.acquire_for(key);
        let _guard = mutex.write().await;

        let entry = factory().await.map_err(|e| CacheError::factory(key, e))?;
        let bytes = self.encode(key, &entry.value)?;
        self.write(key, bytes, entry.ttl).await?;
        Ok(())
    }

    /// Return the cached value for `key`, populating it with `factory` on a miss
    ///
    /// The per-key write lock is held across the read, the factory and the
    /// write, so concurrent callers for the same key wait and then observe
    /// the value written by whichever caller got the lock first. The returned
    /// value is decoded from the bytes that were stored.
    pub async fn fetch_or_populate<T, F, Fut, E>(&self, key: &str, factory: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry<T>, E>>,
        E: Into<BoxError>,
    {
        validate_key(key)?;

        let mutex = self.registry.acquire_for(key);
        let _guard = mutex.write().await;

        if let Some(bytes) = self.read(key).await? {
            debug!("Cache hit for {}", key);
            return self.decode(key, &bytes);
        }

        debug!("Cache miss for {}, populating", key);
        let entry = factory().await.map_err(|e| CacheError::factory(key, e))?;
        let bytes = self.encode(key, &entry.value)?;
        self.write(key, bytes.clone(), entry.ttl).await?;
        self.decode(key, &bytes)
    }

    /// Remove `key` from the store
    ///
    /// Succeeds if the key is already absent. A populate in flight for the
    /// same key is not interrupted and may write the key again afterwards.
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        validate_key(key)?;

        let store_key = self.config.cache.store_key(key);
        self.store
            .delete(&store_key)
            .await
            .map_err(|source| CacheError::Store {
                key: key.to_string(),
                source,
            })?;

        debug!("Invalidated {}", key);
        Ok(())
    }

    async fn probe(&self) -> CacheResult<()> {
        let store_key = self.config.cache.store_key(PROBE_KEY);
        self.store
            .get(&store_key)
            .await
            .map_err(|source| CacheError::Store {
                key: PROBE_KEY.to_string(),
                source,
            })?;

        info!("Connected to key-value store");
        Ok(())
    }

    async fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let store_key = self.config.cache.store_key(key);
        self.store
            .get(&store_key)
            .await
            .map_err(|source| CacheError::StoreRead {
                key: key.to_string(),
                source,
            })
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let store_key = self.config.cache.store_key(key);
        self.store
            .set(&store_key, bytes, ttl)
            .await
            .map_err(|source| CacheError::StoreWrite {
                key: key.to_string(),
                source,
            })?;

        if ttl.is_zero() {
            info!("Populated {} without expiry", key);
        } else {
            info!("Populated {} for {:?}", key, ttl);
        }
        Ok(())
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<Vec<u8>> {
        self.codec.encode(value).map_err(|e| CacheError::Encode {
            key: key.to_string(),
            source: Box::new(e),
        })
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> CacheResult<T> {
        self.codec.decode(bytes).map_err(|e| CacheError::Decode {
            key: key.to_string(),
            source: Box::new(e),
        })
    }
}

fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(())
}
