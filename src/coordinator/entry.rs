//! Values produced by population factories

use std::time::Duration;

/// A value to cache and how long the store should keep it
///
/// A `ttl` of `Duration::ZERO` means the entry never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    /// The value to encode and store
    pub value: T,

    /// Time-to-live in the store
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Create an entry that expires after `ttl`
    pub fn new(value: T, ttl: Duration) -> Self {
        Self { value, ttl }
    }

    /// Create an entry that never expires
    pub fn persistent(value: T) -> Self {
        Self::new(value, Duration::ZERO)
    }

    /// Whether the store will expire this entry
    pub fn expires(&self) -> bool {
        !self.ttl.is_zero()
    }
}
