//! Read-through cache in front of a [`WeatherSource`]
//!
//! A hit is served without touching the source, even when every breaker
//! below is open. Cache trouble of any kind degrades to a miss; failures
//! from the source are never cached.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::WeatherReading;
use crate::telemetry;
use crate::traits::{Cache, WeatherSource};

/// Cache key for a city
pub fn cache_key(city: &str) -> String {
    format!("weather:{}", city.trim().to_lowercase())
}

/// TTL read-through cache wrapping a weather source
pub struct CachedWeather {
    source: Arc<dyn WeatherSource>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl CachedWeather {
    pub fn new(source: Arc<dyn WeatherSource>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { source, cache, ttl }
    }

    async fn lookup(&self, key: &str) -> Option<WeatherReading> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<WeatherReading>(&raw) {
                Ok(reading) => {
                    telemetry::cache_lookup("hit");
                    Some(reading)
                }
                Err(e) => {
                    telemetry::cache_lookup("error");
                    warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => {
                telemetry::cache_lookup("miss");
                None
            }
            Err(e) => {
                telemetry::cache_lookup("error");
                warn!(
                    backend = self.cache.backend_name(),
                    key = %key,
                    error = %e,
                    "Cache read failed, bypassing"
                );
                None
            }
        }
    }

    async fn store(&self, key: &str, reading: &WeatherReading) {
        let raw = match serde_json::to_string(reading) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode reading for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, raw, self.ttl).await {
            warn!(
                backend = self.cache.backend_name(),
                key = %key,
                error = %e,
                "Cache write failed"
            );
        }
    }
}

#[async_trait]
impl WeatherSource for CachedWeather {
    async fn get_by_city(&self, city: &str) -> Result<WeatherReading> {
        let key = cache_key(city);

        if let Some(reading) = self.lookup(&key).await {
            debug!(city = %city, "Weather served from cache");
            return Ok(reading);
        }

        let reading = self.source.get_by_city(city).await?;
        self.store(&key, &reading).await;
        Ok(reading)
    }
}
