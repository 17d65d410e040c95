// # Email Sender Trait
//
// Outbound email transport used by the delivery worker.

use async_trait::async_trait;

use crate::model::WeatherSnapshot;

/// Trait for email transports
///
/// A returned error means the email was not handed off; the worker
/// negatively acknowledges the message and lets the broker decide when to
/// redeliver. Implementations do not retry.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send a weather update
    async fn send_weather(&self, to: &str, weather: &WeatherSnapshot) -> Result<(), crate::Error>;

    /// Send a subscription confirmation carrying `token`
    async fn send_confirmation(&self, to: &str, token: &str) -> Result<(), crate::Error>;
}
