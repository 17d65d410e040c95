//! Pipeline runner
//!
//! Wires the components together and owns the process-level lifecycle:
//!
//! ```text
//! ┌───────────────┐     ┌───────────────┐
//! │ hourly timer  │     │  daily timer  │──► NotificationScheduler::run_due
//! └───────────────┘     └───────────────┘         │
//!                                                 ▼
//!                                          EventPublisher ──► broker
//!                                                                 │
//! ┌──────────────────────┐  ┌───────────────────────────┐         │
//! │ weather queue loop   │  │ confirmation queue loop   │◄────────┘
//! └──────────────────────┘  └───────────────────────────┘
//!            └──────────► DeliveryWorker ──► EmailSender
//! ```
//!
//! ## Shutdown
//!
//! 1. Stop signal received (or a consumer loop died)
//! 2. Timers stop firing; in-flight runs get `shutdown_timeout` to drain
//! 3. Consumer loops settle the message in hand and return
//! 4. `Stopped` event emitted

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::aggregator::WeatherAggregator;
use crate::cache_aside::CachedWeather;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::model::Frequency;
use crate::publisher::EventPublisher;
use crate::scheduler::{Cadence, NotificationScheduler, RunReport};
use crate::traits::{
    BrokerConsumer, BrokerPublisher, Cache, EmailSender, SubscriptionRepository, WeatherProvider,
};
use crate::worker::DeliveryWorker;

/// Events emitted by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Timers and consumer loops are running
    Started { consumers: usize },

    /// A scheduler run began
    RunStarted { frequency: Frequency },

    /// A scheduler run finished its batch
    RunCompleted { report: RunReport },

    /// A firing was skipped because the previous run is still draining
    RunSkipped { frequency: Frequency },

    /// Due subscribers could not be selected
    RunFailed { frequency: Frequency, error: String },

    /// Email sent, message acknowledged
    DeliveryAcked { email: String },

    /// Email failed, message handed back to the broker
    DeliveryNacked { email: String },

    /// Undecodable message dropped
    DeliveryDiscarded,

    /// Pipeline stopped
    Stopped { reason: String },
}

/// Send an event without ever blocking the pipeline
pub(crate) fn emit(events: &mpsc::Sender<PipelineEvent>, event: PipelineEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::trace!("Event receiver dropped, discarding event");
        }
    }
}

/// Concrete collaborators the pipeline is built from
pub struct Collaborators {
    /// Weather providers in failover order
    pub providers: Vec<Arc<dyn WeatherProvider>>,
    pub cache: Arc<dyn Cache>,
    pub repository: Arc<dyn SubscriptionRepository>,
    pub publisher: Arc<dyn BrokerPublisher>,
    pub consumer: Arc<dyn BrokerConsumer>,
    pub email: Arc<dyn EmailSender>,
}

/// The assembled notification pipeline
///
/// ## Lifecycle
///
/// 1. Create with [`Pipeline::new()`]
/// 2. Run with [`Pipeline::run_with_shutdown()`]
/// 3. Flip the shutdown watch to `true` to stop
pub struct Pipeline {
    scheduler: Arc<NotificationScheduler>,
    publisher: EventPublisher,
    worker: Arc<DeliveryWorker>,
    consumer: Arc<dyn BrokerConsumer>,
    config: PipelineConfig,
    event_tx: mpsc::Sender<PipelineEvent>,
}

impl Pipeline {
    /// Build the pipeline
    ///
    /// # Returns
    ///
    /// A tuple of (pipeline, event_receiver) where event_receiver yields pipeline events
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>)> {
        config.validate_settings()?;
        if collaborators.providers.is_empty() {
            return Err(Error::config("No weather providers configured"));
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let aggregator = WeatherAggregator::new(collaborators.providers, &config.breaker);
        let weather = CachedWeather::new(Arc::new(aggregator), collaborators.cache, config.cache.ttl());
        let publisher = EventPublisher::new(collaborators.publisher, &config.broker);

        let scheduler = NotificationScheduler::new(
            collaborators.repository,
            Arc::new(weather),
            publisher.clone(),
            config.scheduler.clone(),
        )
        .with_events(tx.clone());

        let worker = DeliveryWorker::new(collaborators.email).with_events(tx.clone());

        let pipeline = Self {
            scheduler: Arc::new(scheduler),
            publisher,
            worker: Arc::new(worker),
            consumer: collaborators.consumer,
            config,
            event_tx: tx,
        };

        Ok((pipeline, rx))
    }

    /// The scheduler, for triggering runs outside the timers
    pub fn scheduler(&self) -> &Arc<NotificationScheduler> {
        &self.scheduler
    }

    /// The publisher, for confirmation intents raised by the surrounding service
    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Run timers and consumer loops until `shutdown` flips to `true`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: clean shutdown
    /// - `Err(Error)`: a consumer loop stopped on its own (broker gone)
    pub async fn run_with_shutdown(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut timers = JoinSet::new();
        for frequency in [Frequency::Hourly, Frequency::Daily] {
            if let Some(cadence) = Cadence::for_frequency(frequency, &self.config.scheduler) {
                let scheduler = Arc::clone(&self.scheduler);
                timers.spawn(scheduler.run_timer(frequency, cadence, stop_rx.clone()));
            }
        }

        let mut consumers = JoinSet::new();
        for queue in [&self.config.broker.weather_queue, &self.config.broker.confirmation_queue] {
            let consumer = Arc::clone(&self.consumer);
            let handler = Arc::clone(&self.worker) as Arc<dyn crate::traits::DeliveryHandler>;
            let queue = queue.clone();
            let stop = stop_rx.clone();
            consumers.spawn(async move {
                let result = consumer.consume(&queue, handler, stop).await;
                (queue, result)
            });
        }

        info!(consumers = consumers.len(), "Pipeline started");
        emit(&self.event_tx, PipelineEvent::Started { consumers: consumers.len() });

        let mut failure: Option<Error> = None;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }

                Some(joined) = consumers.join_next() => {
                    failure = Some(match joined {
                        Ok((queue, Ok(()))) => {
                            Error::Other(format!("Consumer on {} stopped unexpectedly", queue))
                        }
                        Ok((queue, Err(e))) => {
                            error!(queue = %queue, error = %e, "Consumer failed");
                            e
                        }
                        Err(e) => Error::Other(format!("Consumer task failed: {}", e)),
                    });
                    break;
                }
            }
        }

        // Receivers live in stop_rx clones held by every task.
        let _ = stop_tx.send(true);

        let window = self.config.scheduler.shutdown_timeout();
        let settled = tokio::time::timeout(window, async {
            while let Some(joined) = consumers.join_next().await {
                if let Ok((queue, Err(e))) = joined {
                    warn!(queue = %queue, error = %e, "Consumer returned error during shutdown");
                }
            }
        })
        .await;
        if settled.is_err() {
            warn!("Consumers did not stop within the shutdown window, aborting");
            consumers.abort_all();
        }

        while timers.join_next().await.is_some() {}

        let reason = match &failure {
            Some(e) => e.to_string(),
            None => "Shutdown signal".to_string(),
        };
        info!(reason = %reason, "Pipeline stopped");
        emit(&self.event_tx, PipelineEvent::Stopped { reason });

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        emit(&tx, PipelineEvent::DeliveryDiscarded);
        emit(&tx, PipelineEvent::Stopped { reason: "x".to_string() });

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::DeliveryDiscarded);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        emit(&tx, PipelineEvent::DeliveryDiscarded);
    }
}
