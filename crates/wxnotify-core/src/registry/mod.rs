//! Plugin registry
//!
//! Maps provider and cache type names to factories so the daemon can build
//! the pipeline from configuration without hardcoded if-else chains.
//!
//! ## Registration
//!
//! Plugin crates register themselves during initialization:
//!
//! ```rust,ignore
//! // In wxnotify-provider-http
//! pub fn register(registry: &PluginRegistry) {
//!     registry.register_provider("weather_api", Box::new(WeatherApiFactory));
//! }
//! ```

use crate::config::{CacheConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::store::MemoryCacheFactory;
use crate::traits::{Cache, CacheFactory, WeatherProvider, WeatherProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry of provider and cache factories
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent reads, exclusive writes.
#[derive(Default)]
pub struct PluginRegistry {
    providers: RwLock<HashMap<String, Box<dyn WeatherProviderFactory>>>,
    caches: RwLock<HashMap<String, Arc<dyn CacheFactory>>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` cache registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_cache("memory", Box::new(MemoryCacheFactory));
        registry
    }

    /// Register a weather provider factory under `name` (e.g. "weather_api")
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn WeatherProviderFactory>) {
        write(&self.providers).insert(name.into(), factory);
    }

    /// Register a cache factory under `name` (e.g. "redis")
    pub fn register_cache(&self, name: impl Into<String>, factory: Box<dyn CacheFactory>) {
        write(&self.caches).insert(name.into(), Arc::from(factory));
    }

    /// Create one provider from configuration
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn WeatherProvider>> {
        let provider_type = config.type_name();
        let providers = read(&self.providers);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create the failover chain, preserving configuration order
    pub fn create_provider_chain(&self, configs: &[ProviderConfig]) -> Result<Vec<Arc<dyn WeatherProvider>>> {
        configs
            .iter()
            .map(|config| self.create_provider(config).map(Arc::from))
            .collect()
    }

    /// Create a cache from configuration
    pub async fn create_cache(&self, config: &CacheConfig) -> Result<Box<dyn Cache>> {
        let cache_type = config.backend.type_name();

        // Release the lock before calling async create
        let factory = read(&self.caches)
            .get(cache_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown cache type: {}", cache_type)))?;

        factory.create(config).await
    }

    /// Registered provider type names
    pub fn list_providers(&self) -> Vec<String> {
        read(&self.providers).keys().cloned().collect()
    }

    /// Registered cache type names
    pub fn list_caches(&self) -> Vec<String> {
        read(&self.caches).keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        read(&self.providers).contains_key(name)
    }

    /// Check if a cache type is registered
    pub fn has_cache(&self, name: &str) -> bool {
        read(&self.caches).contains_key(name)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeatherReading;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl WeatherProvider for Named {
        async fn fetch(&self, city: &str) -> Result<WeatherReading> {
            Ok(WeatherReading::new(city, 0.0, "Clear", self.0))
        }

        fn provider_name(&self) -> &'static str {
            self.0
        }
    }

    struct NamedFactory(&'static str);

    impl WeatherProviderFactory for NamedFactory {
        fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn WeatherProvider>> {
            Ok(Box::new(Named(self.0)))
        }
    }

    fn key(api_key: &str) -> String {
        api_key.to_string()
    }

    #[test]
    fn chain_preserves_configuration_order() {
        let registry = PluginRegistry::new();
        registry.register_provider("weather_api", Box::new(NamedFactory("weather_api")));
        registry.register_provider("visual_crossing", Box::new(NamedFactory("visual_crossing")));

        let chain = registry
            .create_provider_chain(&[
                ProviderConfig::VisualCrossing { api_key: key("a"), base_url: None },
                ProviderConfig::WeatherApi { api_key: key("b"), base_url: None },
            ])
            .unwrap();

        let names: Vec<&str> = chain.iter().map(|p| p.provider_name()).collect();
        assert_eq!(names, vec!["visual_crossing", "weather_api"]);
    }

    #[test]
    fn unknown_provider_type_is_config_error() {
        let registry = PluginRegistry::new();
        let err = registry
            .create_provider(&ProviderConfig::OpenWeatherMap { api_key: key("a"), base_url: None })
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn builtin_memory_cache() {
        let registry = PluginRegistry::with_builtins();
        assert!(registry.has_cache("memory"));
        assert!(!registry.has_cache("redis"));

        let cache = registry.create_cache(&CacheConfig::default()).await.unwrap();
        assert_eq!(cache.backend_name(), "memory");
    }
}
