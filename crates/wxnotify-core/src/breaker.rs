//! # Circuit Breaker
//!
//! Per-provider failure tracker guarding one unreliable upstream.
//!
//! ```text
//!            N consecutive failures
//!  Closed ───────────────────────────► Open
//!    ▲                                  │ cool-down elapsed
//!    │ probe succeeds                   ▼
//!    └──────────────────────────── HalfOpen ── probe fails ──► Open
//! ```
//!
//! Each breaker owns its state behind its own lock; there is no shared or
//! global breaker registry. The lock is never held across an `.await`.
//! Time is read from `tokio::time::Instant` so tests can pause the clock.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;
use crate::error::{Error, Result};
use crate::telemetry;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// One probe call is in flight; everything else is rejected
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// How a call was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Circuit breaker for a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Create a breaker from configuration
    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(name, config.failure_threshold, config.cooldown())
    }

    /// Provider name this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    ///
    /// An open breaker whose cool-down has elapsed still reports `Open`
    /// until the next call turns it half-open.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures recorded while closed
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Run `operation` under breaker protection
    ///
    /// # Returns
    ///
    /// - `Ok(value)`: the operation succeeded
    /// - `Err(Error::BreakerOpen)`: the call was rejected and `operation`
    ///   was never invoked
    /// - `Err(Error::Provider)`: the operation failed; its error is tagged
    ///   with this breaker's provider name
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;

        // Disarmed once the outcome is recorded. If the future is dropped
        // mid-probe the guard reopens the circuit instead of leaving it
        // stuck half-open.
        let mut guard = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let result = operation().await;
        guard.armed = false;

        match result {
            Ok(value) => {
                self.on_success(admission);
                Ok(value)
            }
            Err(err) => {
                self.on_failure(admission);
                Err(self.wrap(err))
            }
        }
    }

    fn admit(&self) -> Result<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    Ok(Admission::Probe)
                } else {
                    Err(Error::breaker_open(&self.name))
                }
            }
            CircuitState::HalfOpen => Err(Error::breaker_open(&self.name)),
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Probe, _) => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            (Admission::Normal, CircuitState::Closed) => {
                inner.consecutive_failures = 0;
            }
            // A call admitted before the trip finished late; the probe decides.
            (Admission::Normal, _) => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Probe, _) => {
                self.trip(&mut inner);
            }
            (Admission::Normal, CircuitState::Closed) => {
                inner.consecutive_failures += 1;
                debug!(
                    provider = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    threshold = self.failure_threshold,
                    "Provider call failed"
                );
                if inner.consecutive_failures >= self.failure_threshold {
                    self.trip(&mut inner);
                }
            }
            (Admission::Normal, _) => {}
        }
    }

    fn trip(&self, inner: &mut BreakerState) {
        inner.opened_at = Some(Instant::now());
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        if from == to {
            return;
        }
        telemetry::breaker_transition(&self.name, to.as_str());
        match to {
            CircuitState::Open => warn!(
                provider = %self.name,
                from = from.as_str(),
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => debug!(provider = %self.name, "Circuit breaker half-open, probing"),
            CircuitState::Closed => info!(provider = %self.name, "Circuit breaker closed"),
        }
    }

    fn wrap(&self, err: Error) -> Error {
        match err {
            Error::Provider { .. } | Error::BreakerOpen { .. } => err,
            other => Error::provider(&self.name, other.to_string()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // State stays consistent across a panic in another holder; every
        // mutation is a plain field write.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.lock();
            debug!(provider = %self.breaker.name, "Probe cancelled, reopening circuit");
            self.breaker.trip(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COOLDOWN: Duration = Duration::from_secs(30);

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicUsize) -> Error {
        breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::http("connection refused"))
            })
            .await
            .unwrap_err()
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicUsize) -> Result<u32> {
        breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_skips_operation() {
        let breaker = CircuitBreaker::new("weather_api", 3, COOLDOWN);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let err = fail(&breaker, &calls).await;
            assert!(matches!(err, Error::Provider { ref provider, .. } if provider == "weather_api"));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = fail(&breaker, &calls).await;
        assert!(err.is_breaker_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("weather_api", 3, COOLDOWN);
        let calls = AtomicUsize::new(0);

        fail(&breaker, &calls).await;
        fail(&breaker, &calls).await;
        assert_eq!(breaker.consecutive_failures(), 2);

        succeed(&breaker, &calls).await.unwrap();
        assert_eq!(breaker.consecutive_failures(), 0);

        fail(&breaker, &calls).await;
        fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_success_closes() {
        let breaker = CircuitBreaker::new("weather_api", 1, COOLDOWN);
        let calls = AtomicUsize::new(0);

        fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(COOLDOWN - Duration::from_millis(1)).await;
        assert!(fail(&breaker, &calls).await.is_breaker_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(succeed(&breaker, &calls).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens_and_restarts_cooldown() {
        let breaker = CircuitBreaker::new("weather_api", 1, COOLDOWN);
        let calls = AtomicUsize::new(0);

        fail(&breaker, &calls).await;
        tokio::time::advance(COOLDOWN).await;

        let err = fail(&breaker, &calls).await;
        assert!(!err.is_breaker_open());
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(COOLDOWN / 2).await;
        assert!(fail(&breaker, &calls).await.is_breaker_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_probe_in_half_open() {
        let breaker = Arc::new(CircuitBreaker::new("weather_api", 1, COOLDOWN));
        let calls = AtomicUsize::new(0);
        fail(&breaker, &calls).await;
        tokio::time::advance(COOLDOWN).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(|| async move {
                        let _ = release_rx.await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let rejected = succeed(&breaker, &calls).await.unwrap_err();
        assert!(rejected.is_breaker_open());

        release_tx.send(()).unwrap();
        assert_eq!(probe.await.unwrap().unwrap(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_probe_reopens() {
        let breaker = CircuitBreaker::new("weather_api", 1, COOLDOWN);
        let calls = AtomicUsize::new(0);
        fail(&breaker, &calls).await;
        tokio::time::advance(COOLDOWN).await;

        let probe = breaker.execute(|| std::future::pending::<Result<()>>());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), probe).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(fail(&breaker, &calls).await.is_breaker_open());
    }
}
