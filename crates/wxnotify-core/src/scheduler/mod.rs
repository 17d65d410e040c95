//! Notification scheduler
//!
//! Two independent timers (hourly, daily) each fire [`NotificationScheduler::run_due`]
//! on their own task. A run selects the due subscribers and processes them
//! concurrently:
//!
//! ```text
//! run_due(freq, deadline)
//!   └─ DueSelector::get_due
//!   └─ per subscriber (≤ max_concurrency at once, each bounded by deadline):
//!        weather.get_by_city ──► publisher.publish_weather ──► repository.update_last_sent
//! ```
//!
//! `last_sent_at` only advances after the publish succeeded. A subscriber
//! whose fetch or publish fails is skipped for this run and stays due.
//! Runs of the same frequency never overlap; a firing that finds the
//! previous run still draining is skipped.

mod cadence;

pub use cadence::Cadence;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::model::{Frequency, Subscription};
use crate::pipeline::{PipelineEvent, emit};
use crate::publisher::EventPublisher;
use crate::selector::DueSelector;
use crate::telemetry;
use crate::traits::{SubscriptionRepository, WeatherSource};

/// Outcome of one `run_due` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub frequency: Frequency,
    /// Subscribers selected as due
    pub due: usize,
    /// Subscribers whose intent was published
    pub published: usize,
    /// Subscribers skipped after a fetch, publish or deadline failure
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Fans out due subscriptions to fetch + publish units of work
pub struct NotificationScheduler {
    selector: DueSelector,
    weather: Arc<dyn WeatherSource>,
    publisher: EventPublisher,
    repository: Arc<dyn SubscriptionRepository>,
    config: SchedulerConfig,
    hourly_gate: Mutex<()>,
    daily_gate: Mutex<()>,
    unknown_gate: Mutex<()>,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl NotificationScheduler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        weather: Arc<dyn WeatherSource>,
        publisher: EventPublisher,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            selector: DueSelector::new(repository.clone()),
            weather,
            publisher,
            repository,
            config,
            hourly_gate: Mutex::new(()),
            daily_gate: Mutex::new(()),
            unknown_gate: Mutex::new(()),
            events: None,
        }
    }

    /// Report run lifecycle on `events`
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Scheduler settings
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn gate(&self, frequency: Frequency) -> &Mutex<()> {
        match frequency {
            Frequency::Hourly => &self.hourly_gate,
            Frequency::Daily => &self.daily_gate,
            Frequency::Unknown => &self.unknown_gate,
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            emit(events, event);
        }
    }

    /// Notify every due subscriber of `frequency` as of now
    ///
    /// Waits for all dispatched units before returning. Each unit must
    /// finish by `deadline`; one that does not counts as failed for that
    /// subscriber only.
    ///
    /// # Returns
    ///
    /// - `Ok(report)`: the batch finished (individual subscribers may have failed)
    /// - `Err(Error::RunInProgress)`: a run of this frequency is still draining
    /// - `Err(_)`: due subscribers could not be selected
    pub async fn run_due(self: &Arc<Self>, frequency: Frequency, deadline: Instant) -> Result<RunReport> {
        self.run_due_at(frequency, Utc::now(), deadline).await
    }

    /// Like [`run_due`](Self::run_due), evaluated at `as_of`
    ///
    /// Subscribers are selected against `as_of` and notified ones get
    /// `last_sent_at = as_of`. Timers pass their scheduled firing time so
    /// consecutive firings are exactly one period apart regardless of
    /// wake-up lateness or fetch latency.
    pub async fn run_due_at(
        self: &Arc<Self>,
        frequency: Frequency,
        as_of: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<RunReport> {
        let Ok(_running) = self.gate(frequency).try_lock() else {
            telemetry::scheduler_run(frequency.as_str(), "skipped");
            warn!(frequency = %frequency, "Previous run still in progress, skipping");
            self.emit(PipelineEvent::RunSkipped { frequency });
            return Err(Error::RunInProgress(frequency.to_string()));
        };

        let started_at = Utc::now();
        let clock = Instant::now();
        self.emit(PipelineEvent::RunStarted { frequency });

        let due = match timeout_at(deadline, self.selector.get_due(frequency, as_of)).await {
            Ok(Ok(due)) => due,
            Ok(Err(e)) => return Err(self.fail_run(frequency, e)),
            Err(_) => {
                let e = Error::timeout(format!("selecting {} subscribers", frequency));
                return Err(self.fail_run(frequency, e));
            }
        };

        info!(frequency = %frequency, due = due.len(), "Run started");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut units = JoinSet::new();
        let total = due.len();

        for subscription in due {
            let this = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            units.spawn(async move {
                let id = subscription.id;
                let unit = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| Error::Other("concurrency limiter closed".to_string()))?;
                    this.notify(&subscription, as_of).await
                };
                match timeout_at(deadline, unit).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(subscription = id, error = %e, "Subscriber skipped this run");
                        false
                    }
                    Err(_) => {
                        warn!(subscription = id, "Subscriber skipped, run deadline exceeded");
                        false
                    }
                }
            });
        }

        let mut published = 0;
        let mut failed = 0;
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(true) => published += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!(frequency = %frequency, error = %e, "Subscriber task panicked");
                    failed += 1;
                }
            }
        }

        let report = RunReport {
            frequency,
            due: total,
            published,
            failed,
            started_at,
            finished_at: Utc::now(),
        };

        telemetry::scheduler_run(frequency.as_str(), "completed");
        telemetry::run_duration(frequency.as_str(), clock.elapsed());
        info!(
            frequency = %frequency,
            due = report.due,
            published = report.published,
            failed = report.failed,
            "Run completed"
        );
        self.emit(PipelineEvent::RunCompleted { report: report.clone() });

        Ok(report)
    }

    /// One unit of work: fetch, publish, then record `as_of`
    async fn notify(&self, subscription: &Subscription, as_of: DateTime<Utc>) -> Result<()> {
        let frequency = subscription.frequency.as_str();

        let reading = match self.weather.get_by_city(&subscription.city).await {
            Ok(reading) => reading,
            Err(e) => {
                telemetry::subscriber_outcome(frequency, "fetch_failed");
                return Err(e);
            }
        };

        if let Err(e) = self.publisher.publish_weather(&subscription.email, &reading).await {
            telemetry::subscriber_outcome(frequency, "publish_failed");
            return Err(e);
        }
        telemetry::subscriber_outcome(frequency, "published");

        // The intent is already on the broker. A failed write here only
        // means the subscriber may be picked again next run.
        if let Err(e) = self.repository.update_last_sent(subscription.id, as_of).await {
            error!(
                subscription = subscription.id,
                error = %e,
                "Published but failed to record last_sent_at"
            );
        }

        debug!(subscription = subscription.id, city = %subscription.city, "Subscriber notified");
        Ok(())
    }

    fn fail_run(&self, frequency: Frequency, e: Error) -> Error {
        telemetry::scheduler_run(frequency.as_str(), "failed");
        error!(frequency = %frequency, error = %e, "Run failed");
        self.emit(PipelineEvent::RunFailed {
            frequency,
            error: e.to_string(),
        });
        e
    }

    /// Fire `run_due(frequency)` on `cadence` until `shutdown` flips
    ///
    /// Every firing runs on its own task so a slow batch never delays the
    /// timer. On shutdown no new run starts; in-flight runs get
    /// `shutdown_timeout` to drain and are detached (not aborted) after that.
    pub async fn run_timer(
        self: Arc<Self>,
        frequency: Frequency,
        cadence: Cadence,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut runs: JoinSet<()> = JoinSet::new();
        let mut last_firing: Option<DateTime<Utc>> = None;
        info!(frequency = %frequency, ?cadence, "Timer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Never fire the same instant twice, even if the wall clock
            // reads slightly behind the firing that just happened.
            let now = Utc::now();
            let next = cadence.next_after(last_firing.map_or(now, |fired| fired.max(now)));
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(frequency = %frequency, next = %next, "Next firing scheduled");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = tokio::time::sleep(wait) => {
                    last_firing = Some(next);
                    let this = Arc::clone(&self);
                    let deadline = Instant::now() + this.config.run_timeout();
                    runs.spawn(async move {
                        // Outcomes are already logged and reported inside run_due.
                        let _ = this.run_due_at(frequency, next, deadline).await;
                    });
                }

                Some(_) = runs.join_next(), if !runs.is_empty() => {}
            }
        }

        let in_flight = runs.len();
        if in_flight > 0 {
            info!(frequency = %frequency, in_flight, "Draining in-flight runs");
            let drained = timeout(self.config.shutdown_timeout(), async {
                while runs.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(
                    frequency = %frequency,
                    remaining = runs.len(),
                    "Shutdown window elapsed, detaching unfinished runs"
                );
                runs.detach_all();
            }
        }

        info!(frequency = %frequency, "Timer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::model::WeatherReading;
    use crate::store::{MemoryBroker, MemorySubscriptionRepository};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Slow {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Slow {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WeatherSource for Slow {
        async fn get_by_city(&self, city: &str) -> Result<WeatherReading> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(WeatherReading::new(city, 1.0, "Clear", "slow"))
        }
    }

    fn scheduler(
        subscriptions: Vec<Subscription>,
        weather: Arc<dyn WeatherSource>,
        config: SchedulerConfig,
    ) -> (Arc<NotificationScheduler>, MemorySubscriptionRepository, MemoryBroker) {
        let broker_config = BrokerConfig::default();
        let repository = MemorySubscriptionRepository::new(subscriptions);
        let broker = MemoryBroker::from_config(&broker_config);
        let publisher = EventPublisher::new(Arc::new(broker.clone()), &broker_config);
        let scheduler = NotificationScheduler::new(
            Arc::new(repository.clone()),
            weather,
            publisher,
            config,
        );
        (Arc::new(scheduler), repository, broker)
    }

    fn hourly(n: u64) -> Vec<Subscription> {
        (1..=n)
            .map(|id| Subscription::new(id, format!("s{}@example.com", id), "Kyiv", Frequency::Hourly))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let weather = Slow::new(Duration::from_secs(1));
        let config = SchedulerConfig {
            max_concurrency: 3,
            ..Default::default()
        };
        let (scheduler, _, _) = scheduler(hourly(10), weather.clone(), config);

        let report = scheduler
            .run_due(Frequency::Hourly, Instant::now() + Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(report.published, 10);
        assert_eq!(weather.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn units_past_deadline_fail_without_advancing_state() {
        let weather = Slow::new(Duration::from_secs(10));
        let (scheduler, repository, broker) =
            scheduler(hourly(2), weather, SchedulerConfig::default());

        let report = scheduler
            .run_due(Frequency::Hourly, Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.due, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(broker.published(&BrokerConfig::default().weather_queue), 0);
        assert_eq!(repository.get(1).await.unwrap().last_sent_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_run_of_same_frequency_is_skipped() {
        let weather = Slow::new(Duration::from_secs(5));
        let (scheduler, _, _) = scheduler(hourly(1), weather.clone(), SchedulerConfig::default());
        let deadline = Instant::now() + Duration::from_secs(60);

        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_due(Frequency::Hourly, deadline).await })
        };
        tokio::task::yield_now().await;

        let second = scheduler.run_due(Frequency::Hourly, deadline).await;
        assert!(matches!(second, Err(Error::RunInProgress(_))));

        let daily = scheduler.run_due(Frequency::Daily, deadline).await.unwrap();
        assert_eq!(daily.due, 0);

        assert_eq!(first.await.unwrap().unwrap().published, 1);
        assert_eq!(weather.calls.load(Ordering::SeqCst), 1);
    }

    /// Signals once a fetch has started, then takes `delay` to answer
    struct Signalling {
        started: Arc<Notify>,
        delay: Duration,
    }

    #[async_trait]
    impl WeatherSource for Signalling {
        async fn get_by_city(&self, city: &str) -> Result<WeatherReading> {
            self.started.notify_one();
            tokio::time::sleep(self.delay).await;
            Ok(WeatherReading::new(city, 4.0, "Fog", "signalling"))
        }
    }

    fn fire_then_stop(
        delay: Duration,
        config: SchedulerConfig,
    ) -> (
        Arc<NotificationScheduler>,
        MemorySubscriptionRepository,
        Arc<Notify>,
    ) {
        let started = Arc::new(Notify::new());
        let weather = Arc::new(Signalling {
            started: Arc::clone(&started),
            delay,
        });
        let (scheduler, repository, _) = scheduler(hourly(1), weather, config);
        (scheduler, repository, started)
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_in_flight_run() {
        let (scheduler, repository, started) =
            fire_then_stop(Duration::from_secs(5), SchedulerConfig::default());
        let (tx, rx) = watch::channel(false);

        let timer = tokio::spawn(Arc::clone(&scheduler).run_timer(
            Frequency::Hourly,
            Cadence::Hourly,
            rx,
        ));

        // The paused clock jumps to the top of the hour; the run is now mid-fetch
        started.notified().await;
        assert_eq!(repository.get(1).await.unwrap().last_sent_at, None);
        tx.send(true).unwrap();

        timer.await.unwrap();
        assert!(
            repository.get(1).await.unwrap().last_sent_at.is_some(),
            "in-flight run finished before the timer returned"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_detaches_run_slower_than_window() {
        let config = SchedulerConfig {
            shutdown_timeout_secs: 2,
            ..Default::default()
        };
        let (scheduler, repository, started) = fire_then_stop(Duration::from_secs(120), config);
        let (tx, rx) = watch::channel(false);

        let timer = tokio::spawn(Arc::clone(&scheduler).run_timer(
            Frequency::Hourly,
            Cadence::Hourly,
            rx,
        ));

        started.notified().await;
        let stopping = Instant::now();
        tx.send(true).unwrap();
        timer.await.unwrap();

        let waited = stopping.elapsed();
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_secs(120), "returned after {:?}", waited);
        assert_eq!(repository.get(1).await.unwrap().last_sent_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_stops_on_shutdown() {
        let weather = Slow::new(Duration::from_millis(1));
        let (scheduler, _, _) = scheduler(Vec::new(), weather, SchedulerConfig::default());
        let (tx, rx) = watch::channel(false);

        let timer = tokio::spawn(Arc::clone(&scheduler).run_timer(
            Frequency::Hourly,
            Cadence::Hourly,
            rx,
        ));
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), timer)
            .await
            .unwrap()
            .unwrap();
    }
}
