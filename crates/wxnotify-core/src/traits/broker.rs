// # Broker Traits
//
// Durable message broker between the scheduler (publisher side) and the
// delivery worker (consumer side).
//
// ## Delivery Semantics
//
// At-least-once. A message is removed from the broker only after the
// handler returns `Acknowledgement::Ack` (or `NackDiscard`). Redelivery
// timing after `Nack` belongs to the broker (dead-lettering / retry queue),
// never to the worker.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Handler verdict for one received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Side effect done; remove the message
    Ack,
    /// Side effect failed; hand back to the broker for delayed redelivery
    Nack,
    /// Message can never succeed; drop it without redelivery
    NackDiscard,
}

/// Publishing half of the broker
///
/// # Contract
///
/// - Messages are persistent: once `publish` returns `Ok`, the broker has
///   taken durable ownership
/// - A message no queue is bound for is reported as an error, not dropped
/// - Exactly one attempt per call; retries belong to the caller
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publish `payload` under `routing_key`
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), crate::Error>;
}

/// Receives one message body at a time from a consumer loop
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Process one message and tell the broker what to do with it
    async fn handle(&self, payload: &[u8]) -> Acknowledgement;
}

/// Consuming half of the broker
#[async_trait]
pub trait BrokerConsumer: Send + Sync {
    /// Run a receive loop on `queue` until `shutdown` flips to `true`
    ///
    /// The loop hands every message to `handler` and settles it according
    /// to the returned [`Acknowledgement`]. A message being handled when
    /// shutdown arrives is settled before the loop returns.
    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), crate::Error>;
}
