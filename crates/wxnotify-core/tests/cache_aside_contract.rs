//! Contract Test: Cache-Aside Consistency
//!
//! Constraints verified:
//! - A hit never reaches the wrapped source
//! - A miss reaches it exactly once and writes the result back
//! - Entries expire after the TTL
//! - A cache hit is served even while every provider breaker is open

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use wxnotify_core::config::BreakerConfig;
use wxnotify_core::traits::{Cache, WeatherSource};
use wxnotify_core::{CachedWeather, CircuitState, MemoryCache, WeatherAggregator};

const TTL: Duration = Duration::from_secs(600);

#[tokio::test]
async fn miss_fetches_once_and_writes_back() {
    let source = CountingSource::ok();
    let cache = Arc::new(MemoryCache::new());
    let cached = CachedWeather::new(
        Arc::new(CountingSource::sharing_counters_with(&source)),
        cache.clone(),
        TTL,
    );

    let first = cached.get_by_city("Kyiv").await.unwrap();
    assert_eq!(source.call_count(), 1);
    assert!(cache.get("weather:kyiv").await.unwrap().is_some(), "miss must write back");

    let second = cached.get_by_city("Kyiv").await.unwrap();
    assert_eq!(source.call_count(), 1, "hit must not reach the source");
    assert_eq!(first, second);
}

#[tokio::test]
async fn hit_never_calls_source() {
    let source = CountingSource::ok();
    let cache = Arc::new(MemoryCache::new());
    let seeded = wxnotify_core::WeatherReading::new("Odesa", 25.0, "Clear", "seed");
    cache
        .set("weather:odesa", serde_json::to_string(&seeded).unwrap(), TTL)
        .await
        .unwrap();

    let cached = CachedWeather::new(
        Arc::new(CountingSource::sharing_counters_with(&source)),
        cache,
        TTL,
    );

    let reading = cached.get_by_city("Odesa").await.unwrap();
    assert_eq!(reading, seeded);
    assert_eq!(source.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_refetched() {
    let source = CountingSource::ok();
    let cached = CachedWeather::new(
        Arc::new(CountingSource::sharing_counters_with(&source)),
        Arc::new(MemoryCache::new()),
        TTL,
    );

    cached.get_by_city("Kyiv").await.unwrap();
    tokio::time::advance(TTL).await;
    cached.get_by_city("Kyiv").await.unwrap();

    assert_eq!(source.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn cache_masks_open_breakers() {
    let provider = CountingProvider::ok("weather_api", 11.0);
    let aggregator = Arc::new(WeatherAggregator::new(
        vec![chain_entry(&provider)],
        &BreakerConfig {
            failure_threshold: 1,
            cooldown_secs: 300,
        },
    ));
    let cached = CachedWeather::new(aggregator.clone(), Arc::new(MemoryCache::new()), TTL);

    // Warm Kyiv, then trip the breaker through an uncached city
    cached.get_by_city("Kyiv").await.unwrap();
    provider.set_failing(true);
    assert!(cached.get_by_city("Lviv").await.is_err());
    assert_eq!(aggregator.breaker_states()[0].1, CircuitState::Open);

    let reading = cached.get_by_city("Kyiv").await.unwrap();
    assert_eq!(reading.temperature, 11.0);
    assert_eq!(provider.call_count(), 2);
}
