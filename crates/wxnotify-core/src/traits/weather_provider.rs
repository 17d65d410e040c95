// # Weather Provider Trait
//
// Defines the interface for fetching current weather from one upstream API.
//
// ## Implementations
//
// - WeatherAPI.com, OpenWeatherMap, Visual Crossing: `wxnotify-provider-http` crate
//
// ## Usage
//
// ```rust,ignore
// use wxnotify_core::WeatherProvider;
//
// let provider = /* WeatherProvider implementation */;
// let reading = provider.fetch("Kyiv").await?;
// println!("{}: {}°C", reading.city, reading.temperature);
// ```

use async_trait::async_trait;

use crate::model::WeatherReading;

/// Trait for upstream weather API clients
///
/// # Thread Safety
///
/// Implementations must be thread-safe; one instance is shared by every
/// concurrent unit of work in a scheduler run.
///
/// ## Responsibilities
///
/// - One request (or one short fixed sequence) per `fetch()` call
/// - Map transport and HTTP failures to errors
///
/// Providers do not retry, back off, cache, or track their own health.
/// Failover is owned by `WeatherAggregator`, health by `CircuitBreaker`,
/// caching by `CachedWeather`.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Fetch the current weather for a city
    ///
    /// # Returns
    ///
    /// - `Ok(WeatherReading)`: a complete reading produced by this provider
    /// - `Err(Error)`: the provider could not answer this time
    async fn fetch(&self, city: &str) -> Result<WeatherReading, crate::Error>;

    /// Provider name (for logging, metrics and breaker identity)
    fn provider_name(&self) -> &'static str;
}

/// Anything that answers "current weather for this city"
///
/// Implemented by `WeatherAggregator` and by `CachedWeather`, which wraps
/// another `WeatherSource`. The scheduler only sees this trait.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Get the current weather for a city
    async fn get_by_city(&self, city: &str) -> Result<WeatherReading, crate::Error>;
}

/// Helper trait for constructing providers from configuration
pub trait WeatherProviderFactory: Send + Sync {
    /// Create a WeatherProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration for this provider entry
    ///
    /// # Returns
    ///
    /// A boxed WeatherProvider trait object
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn WeatherProvider>, crate::Error>;
}
