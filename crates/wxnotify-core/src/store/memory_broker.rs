// # Memory Broker
//
// In-process implementation of BrokerPublisher and BrokerConsumer.
//
// ## Semantics
//
// - Routing: exact routing key → queue bindings; an unbound key is a
//   publish error (mirrors a mandatory publish being returned)
// - One consumer per queue at a time; the receiver is handed back when the
//   consume loop stops, so a queue can be consumed again
// - Ack removes the message, Nack moves it to the queue's dead-letter list,
//   NackDiscard drops it
//
// Nothing survives a restart. The AMQP plugin provides the durable broker.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::config::BrokerConfig;
use crate::traits::{Acknowledgement, BrokerConsumer, BrokerPublisher, DeliveryHandler};

#[derive(Debug)]
struct Queue {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    published: usize,
    acked: usize,
    discarded: usize,
    dead_letters: Vec<Vec<u8>>,
}

impl Queue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
            published: 0,
            acked: 0,
            discarded: 0,
            dead_letters: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    bindings: HashMap<String, String>,
    queues: HashMap<String, Queue>,
}

/// In-memory message broker
///
/// Cloning shares the same queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create a broker with no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker with the weather and confirmation bindings from `config`
    pub fn from_config(config: &BrokerConfig) -> Self {
        let broker = Self::new();
        for (routing_key, queue) in config.bindings() {
            broker.bind(routing_key, queue);
        }
        broker
    }

    /// Bind `routing_key` to `queue`, declaring the queue if needed
    pub fn bind(&self, routing_key: impl Into<String>, queue: impl Into<String>) {
        let queue = queue.into();
        let mut state = self.lock();
        state.queues.entry(queue.clone()).or_insert_with(Queue::new);
        state.bindings.insert(routing_key.into(), queue);
    }

    /// Messages ever routed to `queue`
    pub fn published(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map(|q| q.published).unwrap_or(0)
    }

    /// Messages acknowledged on `queue`
    pub fn acked(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map(|q| q.acked).unwrap_or(0)
    }

    /// Messages permanently rejected on `queue`
    pub fn discarded(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map(|q| q.discarded).unwrap_or(0)
    }

    /// Negatively acknowledged payloads awaiting redelivery
    pub fn dead_letters(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Put every dead-lettered message on `queue` back for delivery
    ///
    /// Stands in for the broker-side retry delay of a real deployment.
    /// Returns how many messages were requeued.
    pub fn redeliver_dead_letters(&self, queue: &str) -> usize {
        let mut state = self.lock();
        let Some(q) = state.queues.get_mut(queue) else {
            return 0;
        };
        let letters = std::mem::take(&mut q.dead_letters);
        let count = letters.len();
        for payload in letters {
            // The queue owns its sender and receiver slot, so the channel
            // is only closed if a consumer task was aborted mid-loop.
            if q.sender.send(payload).is_err() {
                warn!(queue = %queue, "Dropped dead letter, queue receiver is gone");
            }
        }
        count
    }

    fn settle(&self, queue: &str, payload: Vec<u8>, ack: Acknowledgement) {
        let mut state = self.lock();
        let Some(q) = state.queues.get_mut(queue) else {
            return;
        };
        match ack {
            Acknowledgement::Ack => q.acked += 1,
            Acknowledgement::Nack => {
                debug!(queue = %queue, "Message dead-lettered");
                q.dead_letters.push(payload);
            }
            Acknowledgement::NackDiscard => {
                error!(queue = %queue, "Message discarded");
                q.discarded += 1;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BrokerPublisher for MemoryBroker {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), Error> {
        let mut state = self.lock();
        let queue_name = state
            .bindings
            .get(routing_key)
            .cloned()
            .ok_or_else(|| Error::publish(format!("Unroutable message: no queue bound for {}", routing_key)))?;

        let queue = state
            .queues
            .get_mut(&queue_name)
            .ok_or_else(|| Error::publish(format!("Queue {} is not declared", queue_name)))?;

        queue
            .sender
            .send(payload.to_vec())
            .map_err(|_| Error::publish(format!("Queue {} is closed", queue_name)))?;
        queue.published += 1;
        Ok(())
    }
}

#[async_trait]
impl BrokerConsumer for MemoryBroker {
    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Error> {
        let receiver = {
            let mut state = self.lock();
            let q = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| Error::config(format!("Queue {} is not declared", queue)))?;
            q.receiver
                .take()
                .ok_or_else(|| Error::config(format!("Queue {} already has a consumer", queue)))?
        };

        info!(queue = %queue, "Consumer started");
        let mut stream = UnboundedReceiverStream::new(receiver);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                next = stream.next() => {
                    let Some(payload) = next else {
                        break;
                    };
                    let ack = handler.handle(&payload).await;
                    self.settle(queue, payload, ack);
                }
            }
        }

        if let Some(q) = self.lock().queues.get_mut(queue) {
            q.receiver = Some(stream.into_inner());
        }
        info!(queue = %queue, "Consumer stopped");
        Ok(())
    }
}
