//! Error types for keyward
//!
//! All coordinator operations return `CacheResult<T>`. Store backends report
//! failures through `StoreError`, which the coordinator wraps with the key and
//! the phase (read, write, lock) that failed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for keyward operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Boxed error produced by caller-supplied factories and codecs
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a `KeyValueStore` backend.
///
/// A missing key is not a `StoreError`; `get` reports it as `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store rejected operation: {0}")]
    Backend(String),
}

/// All errors that can occur in keyward
#[derive(Error, Debug)]
pub enum CacheError {
    // Argument errors
    #[error("Cache key must not be empty")]
    InvalidKey,

    #[error("Lock {key} requires a non-zero time-to-live")]
    InvalidTtl { key: String },

    // Lookup errors
    #[error("Cache key not found: {key}")]
    NotFound { key: String },

    // Store errors
    #[error("Failed to read {key} from store")]
    StoreRead {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to write {key} to store")]
    StoreWrite {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Store operation on {key} failed")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },

    // Serialization errors
    #[error("Failed to encode value for {key}")]
    Encode {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to decode value for {key}")]
    Decode {
        key: String,
        #[source]
        source: BoxError,
    },

    // Caller errors
    #[error("Factory failed to produce value for {key}")]
    Factory {
        key: String,
        #[source]
        source: BoxError,
    },

    // Lock errors
    #[error("Lock {key} is held by another worker, try again later")]
    Busy { key: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a factory error for `key`
    pub fn factory(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Factory {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Whether the caller observed a clean miss
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether a distributed lock was already held
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Check if error is retryable
    ///
    /// Transport failures and lock contention may succeed on a later attempt.
    /// Factory, codec and argument errors will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreRead { .. }
                | Self::StoreWrite { .. }
                | Self::Store { .. }
                | Self::Busy { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Busy { .. } => Some("Another process holds this lock; retry with backoff"),
            Self::InvalidTtl { .. } => Some("Pass a positive time-to-live so the lock expires"),
            Self::Decode { .. } => {
                Some("The stored value has a different shape; invalidate the key to rebuild it")
            }
            Self::StoreRead { .. } | Self::StoreWrite { .. } | Self::Store { .. } => {
                Some("Check connectivity to the backing store")
            }
            _ => None,
        }
    }
}
