//! Delivery intent publishing
//!
//! One attempt per call. A returned error means nothing was promised to the
//! subscriber; the scheduler leaves `last_sent_at` untouched and the
//! subscriber stays due for the next run.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::model::{DeliveryIntent, WeatherReading};
use crate::telemetry;
use crate::traits::BrokerPublisher;

/// Publishes delivery intents to the broker
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn BrokerPublisher>,
    weather_routing_key: String,
    confirmation_routing_key: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn BrokerPublisher>, config: &BrokerConfig) -> Self {
        Self {
            broker,
            weather_routing_key: config.weather_routing_key.clone(),
            confirmation_routing_key: config.confirmation_routing_key.clone(),
        }
    }

    /// Publish a raw payload
    ///
    /// Any broker failure is reported as [`Error::Publish`].
    pub async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        match self.broker.publish(routing_key, payload).await {
            Ok(()) => {
                telemetry::publish("success");
                debug!(routing_key = %routing_key, bytes = payload.len(), "Intent published");
                Ok(())
            }
            Err(err) => {
                telemetry::publish("failure");
                warn!(routing_key = %routing_key, error = %err, "Publish failed");
                Err(match err {
                    Error::Publish(_) => err,
                    other => Error::publish(other.to_string()),
                })
            }
        }
    }

    /// Publish a weather update intent for `email`
    pub async fn publish_weather(&self, email: &str, reading: &WeatherReading) -> Result<()> {
        let payload = DeliveryIntent::weather_update(email, reading).to_bytes()?;
        self.publish(&self.weather_routing_key, &payload).await
    }

    /// Publish a subscription confirmation intent for `email`
    pub async fn publish_confirmation(&self, email: &str, token: &str) -> Result<()> {
        let payload = DeliveryIntent::confirmation(email, token).to_bytes()?;
        self.publish(&self.confirmation_routing_key, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IntentKind;
    use crate::store::MemoryBroker;

    #[tokio::test]
    async fn routes_by_intent_kind() {
        let config = BrokerConfig::default();
        let broker = Arc::new(MemoryBroker::from_config(&config));
        let publisher = EventPublisher::new(broker.clone(), &config);

        let reading = WeatherReading::new("Kyiv", 12.0, "Rain", "test");
        publisher.publish_weather("a@example.com", &reading).await.unwrap();
        publisher.publish_confirmation("b@example.com", "tok").await.unwrap();

        assert_eq!(broker.published(&config.weather_queue), 1);
        assert_eq!(broker.published(&config.confirmation_queue), 1);
    }

    #[tokio::test]
    async fn unbound_routing_key_fails() {
        let config = BrokerConfig::default();
        let broker = Arc::new(MemoryBroker::new());
        let publisher = EventPublisher::new(broker, &config);

        let err = publisher.publish_confirmation("b@example.com", "tok").await.unwrap_err();
        assert!(matches!(err, Error::Publish(_)));
    }

    #[test]
    fn confirmation_payload_shape() {
        let bytes = DeliveryIntent::confirmation("b@example.com", "tok").to_bytes().unwrap();
        assert_eq!(DeliveryIntent::from_bytes(&bytes).unwrap().kind(), IntentKind::Confirmation);
    }
}
