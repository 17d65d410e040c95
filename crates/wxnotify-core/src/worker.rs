//! Delivery worker: broker message → email
//!
//! Acknowledges only after the email was handed off. Delivery is
//! at-least-once, so a redelivered intent sends a second email; duplicates
//! are accepted rather than deduplicated.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::model::DeliveryIntent;
use crate::pipeline::{PipelineEvent, emit};
use crate::telemetry;
use crate::traits::{Acknowledgement, DeliveryHandler, EmailSender};

/// Decodes delivery intents and sends them through an [`EmailSender`]
pub struct DeliveryWorker {
    sender: Arc<dyn EmailSender>,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl DeliveryWorker {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender, events: None }
    }

    /// Report every settled message on `events`
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    async fn deliver(&self, intent: &DeliveryIntent) -> crate::Result<()> {
        match intent {
            DeliveryIntent::WeatherUpdate { email, weather } => {
                self.sender.send_weather(email, weather).await
            }
            DeliveryIntent::Confirmation { email, token } => {
                self.sender.send_confirmation(email, token).await
            }
        }
    }

    fn report(&self, ack: Acknowledgement, email: Option<&str>) {
        let label = match ack {
            Acknowledgement::Ack => "ack",
            Acknowledgement::Nack => "nack",
            Acknowledgement::NackDiscard => "discard",
        };
        telemetry::delivery(label);

        if let Some(events) = &self.events {
            let email = email.map(str::to_string);
            let event = match ack {
                Acknowledgement::Ack => PipelineEvent::DeliveryAcked {
                    email: email.unwrap_or_default(),
                },
                Acknowledgement::Nack => PipelineEvent::DeliveryNacked {
                    email: email.unwrap_or_default(),
                },
                Acknowledgement::NackDiscard => PipelineEvent::DeliveryDiscarded,
            };
            emit(events, event);
        }
    }
}

#[async_trait]
impl DeliveryHandler for DeliveryWorker {
    async fn handle(&self, payload: &[u8]) -> Acknowledgement {
        let intent = match DeliveryIntent::from_bytes(payload) {
            Ok(intent) => intent,
            Err(e) => {
                error!(error = %e, bytes = payload.len(), "Undecodable delivery intent, discarding");
                self.report(Acknowledgement::NackDiscard, None);
                return Acknowledgement::NackDiscard;
            }
        };

        let ack = match self.deliver(&intent).await {
            Ok(()) => {
                debug!(email = %intent.email(), kind = ?intent.kind(), "Email sent");
                Acknowledgement::Ack
            }
            Err(e) => {
                warn!(email = %intent.email(), kind = ?intent.kind(), error = %e, "Email send failed, returning to broker");
                Acknowledgement::Nack
            }
        };

        self.report(ack, Some(intent.email()));
        ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{WeatherReading, WeatherSnapshot};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl EmailSender for Outbox {
        async fn send_weather(&self, to: &str, weather: &WeatherSnapshot) -> crate::Result<()> {
            if self.fail {
                return Err(Error::delivery("smtp 451"));
            }
            self.sent.lock().unwrap().push(format!("weather:{}:{}", to, weather.city));
            Ok(())
        }

        async fn send_confirmation(&self, to: &str, token: &str) -> crate::Result<()> {
            if self.fail {
                return Err(Error::delivery("smtp 451"));
            }
            self.sent.lock().unwrap().push(format!("confirm:{}:{}", to, token));
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_by_kind_and_acks() {
        let outbox = Arc::new(Outbox::default());
        let worker = DeliveryWorker::new(outbox.clone());

        let reading = WeatherReading::new("Kyiv", 3.0, "Snow", "test");
        let weather = DeliveryIntent::weather_update("a@example.com", &reading).to_bytes().unwrap();
        let confirm = DeliveryIntent::confirmation("b@example.com", "t1").to_bytes().unwrap();

        assert_eq!(worker.handle(&weather).await, Acknowledgement::Ack);
        assert_eq!(worker.handle(&confirm).await, Acknowledgement::Ack);
        assert_eq!(
            *outbox.sent.lock().unwrap(),
            vec!["weather:a@example.com:Kyiv", "confirm:b@example.com:t1"]
        );
    }

    #[tokio::test]
    async fn send_failure_nacks_and_garbage_discards() {
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::channel(8);
        let worker = DeliveryWorker::new(outbox).with_events(tx);

        let confirm = DeliveryIntent::confirmation("b@example.com", "t1").to_bytes().unwrap();
        assert_eq!(worker.handle(&confirm).await, Acknowledgement::Nack);
        assert_eq!(worker.handle(b"\x00\x01").await, Acknowledgement::NackDiscard);

        assert!(matches!(rx.recv().await, Some(PipelineEvent::DeliveryNacked { .. })));
        assert!(matches!(rx.recv().await, Some(PipelineEvent::DeliveryDiscarded)));
    }
}
