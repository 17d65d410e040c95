// # Cache Trait
//
// Key-value store with TTL writes, used by the cache-aside layer.
//
// Values are opaque strings; `CachedWeather` stores JSON-encoded readings.
// A cache is best-effort: callers treat every error as a miss on read and
// ignore errors on write.

use async_trait::async_trait;
use std::time::Duration;

/// Trait for cache implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a value
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: hit
    /// - `Ok(None)`: miss (absent or expired)
    /// - `Err(Error)`: the cache could not be reached
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Write a value that expires after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), crate::Error>;

    /// Backend name (for logging)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing caches from configuration
#[async_trait]
pub trait CacheFactory: Send + Sync {
    /// Create a Cache instance from configuration
    async fn create(
        &self,
        config: &crate::config::CacheConfig,
    ) -> Result<Box<dyn Cache>, crate::Error>;
}
