//! Configuration types for the notification pipeline
//!
//! This module defines all configuration structures used throughout the crate.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Weather providers, in failover priority order
    pub providers: Vec<ProviderConfig>,

    /// Circuit breaker settings (one breaker per provider)
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Cache-aside settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Broker routing settings
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Capacity of the pipeline event channel
    ///
    /// When full, events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl PipelineConfig {
    /// Create a new configuration with defaults and the given providers
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers,
            breaker: BreakerConfig::default(),
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            broker: BrokerConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.providers.is_empty() {
            return Err(crate::Error::config("No weather providers configured"));
        }

        for provider in &self.providers {
            provider.validate()?;
        }

        self.validate_settings()
    }

    /// Validate everything except the provider list
    ///
    /// Used when providers are constructed by the caller rather than from
    /// `providers` entries.
    pub fn validate_settings(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        self.breaker.validate()?;
        self.cache.validate()?;
        self.scheduler.validate()?;
        self.broker.validate()?;

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Weather provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// WeatherAPI.com
    WeatherApi {
        /// API key
        api_key: String,
        /// Override for the API base URL
        #[serde(default)]
        base_url: Option<String>,
    },

    /// OpenWeatherMap
    OpenWeatherMap {
        /// API key
        api_key: String,
        /// Override for the API base URL
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Visual Crossing
    VisualCrossing {
        /// API key
        api_key: String,
        /// Override for the API base URL
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::WeatherApi { api_key, .. }
            | ProviderConfig::OpenWeatherMap { api_key, .. }
            | ProviderConfig::VisualCrossing { api_key, .. } => {
                if api_key.is_empty() {
                    return Err(crate::Error::config(format!(
                        "{} API key cannot be empty",
                        self.type_name()
                    )));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::WeatherApi { .. } => "weather_api",
            ProviderConfig::OpenWeatherMap { .. } => "open_weather_map",
            ProviderConfig::VisualCrossing { .. } => "visual_crossing",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker open
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open breaker rejects calls before allowing a probe
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl BreakerConfig {
    /// Cool-down as a Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.failure_threshold == 0 {
            return Err(crate::Error::config("Breaker failure threshold must be > 0"));
        }
        if self.cooldown_secs == 0 {
            return Err(crate::Error::config("Breaker cool-down must be > 0"));
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Which backend to use
    #[serde(default)]
    pub backend: CacheBackend,

    /// How long a cached reading stays valid
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    /// TTL as a Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.ttl_secs == 0 {
            return Err(crate::Error::config("Cache TTL must be > 0"));
        }
        match &self.backend {
            CacheBackend::Redis { url } if url.is_empty() => {
                Err(crate::Error::config("Redis cache URL cannot be empty"))
            }
            CacheBackend::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom cache factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Cache backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheBackend {
    /// In-process cache (not shared between processes)
    #[default]
    Memory,

    /// Redis
    Redis {
        /// Connection URL (redis://host:port/db)
        url: String,
    },

    /// Custom cache
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl CacheBackend {
    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Redis { .. } => "redis",
            CacheBackend::Custom { factory, .. } => factory,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Time of day (UTC) the daily run fires
    #[serde(default = "default_daily_at")]
    pub daily_at: NaiveTime,

    /// Maximum subscribers processed concurrently within one run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for a whole run, measured from its firing
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// How long shutdown waits for in-flight runs to drain
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl SchedulerConfig {
    /// Run deadline as a Duration
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Shutdown window as a Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.max_concurrency == 0 {
            return Err(crate::Error::config("Scheduler max concurrency must be > 0"));
        }
        if self.run_timeout_secs == 0 {
            return Err(crate::Error::config("Scheduler run timeout must be > 0"));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(crate::Error::config("Scheduler shutdown timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
            max_concurrency: default_max_concurrency(),
            run_timeout_secs: default_run_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Broker routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Exchange intents are published to
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Routing key for weather update intents
    #[serde(default = "default_weather_routing_key")]
    pub weather_routing_key: String,

    /// Routing key for confirmation intents
    #[serde(default = "default_confirmation_routing_key")]
    pub confirmation_routing_key: String,

    /// Queue bound to the weather routing key
    #[serde(default = "default_weather_queue")]
    pub weather_queue: String,

    /// Queue bound to the confirmation routing key
    #[serde(default = "default_confirmation_queue")]
    pub confirmation_queue: String,

    /// Delay before a negatively acknowledged message is redelivered
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Unacknowledged messages a consumer may hold
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,
}

impl BrokerConfig {
    /// (routing key, queue) pairs to bind
    pub fn bindings(&self) -> [(&str, &str); 2] {
        [
            (self.weather_routing_key.as_str(), self.weather_queue.as_str()),
            (
                self.confirmation_routing_key.as_str(),
                self.confirmation_queue.as_str(),
            ),
        ]
    }

    fn validate(&self) -> Result<(), crate::Error> {
        let names = [
            ("exchange", &self.exchange),
            ("weather routing key", &self.weather_routing_key),
            ("confirmation routing key", &self.confirmation_routing_key),
            ("weather queue", &self.weather_queue),
            ("confirmation queue", &self.confirmation_queue),
        ];
        for (what, value) in names {
            if value.is_empty() {
                return Err(crate::Error::config(format!("Broker {} cannot be empty", what)));
            }
        }
        if self.weather_queue == self.confirmation_queue {
            return Err(crate::Error::config(
                "Weather and confirmation queues must differ",
            ));
        }
        if self.prefetch == 0 {
            return Err(crate::Error::config("Broker prefetch must be > 0"));
        }
        Ok(())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            weather_routing_key: default_weather_routing_key(),
            confirmation_routing_key: default_confirmation_routing_key(),
            weather_queue: default_weather_queue(),
            confirmation_queue: default_confirmation_queue(),
            retry_delay_secs: default_retry_delay_secs(),
            prefetch: default_prefetch(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_daily_at() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_max_concurrency() -> usize {
    16
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_exchange() -> String {
    "wxnotify.events".to_string()
}

fn default_weather_routing_key() -> String {
    "notification.weather".to_string()
}

fn default_confirmation_routing_key() -> String {
    "notification.confirmation".to_string()
}

fn default_weather_queue() -> String {
    "wxnotify.weather".to_string()
}

fn default_confirmation_queue() -> String {
    "wxnotify.confirmation".to_string()
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_prefetch() -> u16 {
    16
}
