// # Memory Cache
//
// In-process implementation of Cache.
//
// Entries carry their own expiry and are evicted lazily on read. Nothing
// is shared between processes, so each daemon instance warms its own
// cache.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::Error;
use crate::config::{CacheBackend, CacheConfig};
use crate::traits::{Cache, CacheFactory};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory TTL cache
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until next read
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Error> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for the `memory` cache backend
pub struct MemoryCacheFactory;

#[async_trait]
impl CacheFactory for MemoryCacheFactory {
    async fn create(&self, config: &CacheConfig) -> Result<Box<dyn Cache>, Error> {
        match config.backend {
            CacheBackend::Memory => Ok(Box::new(MemoryCache::new())),
            ref other => Err(Error::config(format!(
                "Memory cache factory cannot build a {} cache",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("weather:kyiv", "v".to_string(), Duration::from_secs(600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get("weather:kyiv").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("weather:kyiv").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn factory_rejects_other_backends() {
        let config = CacheConfig {
            backend: CacheBackend::Redis {
                url: "redis://localhost".to_string(),
            },
            ttl_secs: 60,
        };
        assert!(MemoryCacheFactory.create(&config).await.is_err());
        assert!(MemoryCacheFactory.create(&CacheConfig::default()).await.is_ok());
    }
}
