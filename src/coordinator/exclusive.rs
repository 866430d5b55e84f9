//! Advisory cross-process locking over the store
//!
//! A lock is a store key holding the configured sentinel, written with an
//! atomic set-if-absent and a time-to-live. Any process can delete it. There
//! is no owner identity and no fencing token: once the TTL lapses another
//! process may enter the critical section while the first is still inside
//! it. Pick a TTL comfortably longer than the critical section.

use super::{validate_key, CacheCoordinator};
use crate::codec::Codec;
use crate::error::CacheError;
use crate::store::KeyValueStore;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, info, warn};

impl<S: KeyValueStore, C: Codec> CacheCoordinator<S, C> {
    /// Run `critical_section` while holding the advisory lock `lock_key`
    ///
    /// Fails immediately with `CacheError::Busy` if the lock is held; callers
    /// that want to wait retry with their own backoff. The lock is released
    /// after the critical section returns an error or panics, as well as on
    /// success, and the critical section's outcome is passed through. If this
    /// future is dropped mid-section the lock stays until `ttl` lapses.
    pub async fn run_exclusive<F, Fut, R, E>(
        &self,
        lock_key: &str,
        ttl: Duration,
        critical_section: F,
    ) -> Result<R, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<CacheError>,
    {
        validate_key(lock_key)?;
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl {
                key: lock_key.to_string(),
            }
            .into());
        }

        let store_key = self.config.cache.store_key(lock_key);
        let sentinel = self.config.lock.sentinel.clone().into_bytes();

        let acquired = self
            .store
            .set_if_absent(&store_key, sentinel, ttl)
            .await
            .map_err(|source| CacheError::Store {
                key: lock_key.to_string(),
                source,
            })?;

        if !acquired {
            debug!("Lock {} is busy", lock_key);
            return Err(CacheError::Busy {
                key: lock_key.to_string(),
            }
            .into());
        }
        info!("Acquired lock {} for {:?}", lock_key, ttl);

        let outcome = AssertUnwindSafe(async { critical_section().await })
            .catch_unwind()
            .await;

        self.release(lock_key, &store_key).await;

        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// `run_exclusive` with the configured `[lock] default_ttl_secs`
    pub async fn run_exclusive_default<F, Fut, R, E>(
        &self,
        lock_key: &str,
        critical_section: F,
    ) -> Result<R, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<CacheError>,
    {
        let ttl = self.config.lock.default_ttl();
        self.run_exclusive(lock_key, ttl, critical_section).await
    }

    async fn release(&self, lock_key: &str, store_key: &str) {
        match self.store.delete(store_key).await {
            Ok(()) => debug!("Released lock {}", lock_key),
            Err(e) => warn!(
                "Failed to release lock {}: {}; it frees itself when its ttl lapses",
                lock_key, e
            ),
        }
    }
}
