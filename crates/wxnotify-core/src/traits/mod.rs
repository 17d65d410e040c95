//! Collaborator traits for the notification pipeline
//!
//! This module defines the abstract interfaces the core consumes. Concrete
//! implementations live in `crate::store` (in-memory/file) and in the
//! plugin crates (HTTP providers, AMQP, Redis, SMTP).
//!
//! - [`WeatherProvider`]: one upstream weather API
//! - [`WeatherSource`]: anything that answers "weather for this city"
//! - [`Cache`]: key-value store with TTL writes
//! - [`SubscriptionRepository`]: subscriber records
//! - [`EmailSender`]: outbound email transport
//! - [`BrokerPublisher`] / [`BrokerConsumer`]: durable message broker

pub mod broker;
pub mod cache;
pub mod email_sender;
pub mod subscription_repository;
pub mod weather_provider;

pub use broker::{Acknowledgement, BrokerConsumer, BrokerPublisher, DeliveryHandler};
pub use cache::{Cache, CacheFactory};
pub use email_sender::EmailSender;
pub use subscription_repository::SubscriptionRepository;
pub use weather_provider::{WeatherProvider, WeatherProviderFactory, WeatherSource};
