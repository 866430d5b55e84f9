//! Keyward - cache-aside coordination for shared key-value stores
//!
//! Collapses concurrent population of a key into a single factory call per
//! process and offers an advisory, TTL-bounded lock for critical sections
//! shared between processes.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod store;

pub use codec::{Codec, JsonCodec};
pub use config::{ConfigManager, CoordinatorConfig};
pub use coordinator::{CacheCoordinator, CacheEntry};
pub use error::{CacheError, CacheResult, StoreError};
pub use registry::{KeyMutex, KeyedMutexRegistry};
pub use store::{KeyValueStore, MemoryStore};
