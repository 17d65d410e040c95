// # wxnotify-core
//
// Core library for the resilient weather notification pipeline.
//
// ## Architecture Overview
//
// Subscribers are periodically matched to fresh weather data and notified:
//
// - **CircuitBreaker**: per-provider failure tracker guarding an unreliable upstream
// - **WeatherAggregator**: ordered provider failover chain, one breaker per provider
// - **CachedWeather**: TTL read-through cache in front of the aggregator
// - **DueSelector**: which subscriptions are owed an update at a given instant
// - **NotificationScheduler**: hourly/daily timers fanning out due subscriptions
// - **EventPublisher**: single-attempt durable publish of delivery intents
// - **DeliveryWorker**: decodes intents, sends email, acknowledges only on success
// - **Pipeline**: wires the above and owns the shutdown sequence
//
// ## Control Flow
//
// ```text
// timer ──► RunDue(freq) ──► DueSelector ──► per subscriber (concurrently):
//     CachedWeather ──► WeatherAggregator ──► [breaker ──► provider]*
//     EventPublisher ──► broker ──► DeliveryWorker ──► EmailSender
//     SubscriptionRepository::update_last_sent (only after publish succeeded)
// ```
//
// Failures are isolated at the smallest unit (one provider, one subscriber,
// one message). Nothing in the pipeline is fatal to the process.

pub mod aggregator;
pub mod breaker;
pub mod cache_aside;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod publisher;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use aggregator::WeatherAggregator;
pub use breaker::{CircuitBreaker, CircuitState};
pub use cache_aside::CachedWeather;
pub use config::{
    BreakerConfig, BrokerConfig, CacheBackend, CacheConfig, PipelineConfig, ProviderConfig,
    SchedulerConfig,
};
pub use error::{Error, Result};
pub use model::{DeliveryIntent, Frequency, IntentKind, Subscription, WeatherReading, WeatherSnapshot};
pub use pipeline::{Collaborators, Pipeline, PipelineEvent};
pub use publisher::EventPublisher;
pub use registry::PluginRegistry;
pub use scheduler::{Cadence, NotificationScheduler, RunReport};
pub use selector::{DueSelector, is_due};
pub use store::{
    FileSubscriptionRepository, MemoryBroker, MemoryCache, MemoryCacheFactory,
    MemorySubscriptionRepository,
};
pub use traits::{
    Acknowledgement, BrokerConsumer, BrokerPublisher, Cache, CacheFactory, DeliveryHandler,
    EmailSender, SubscriptionRepository, WeatherProvider, WeatherProviderFactory, WeatherSource,
};
pub use worker::DeliveryWorker;
