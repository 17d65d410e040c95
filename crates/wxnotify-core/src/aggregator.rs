//! Ordered provider failover chain

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::config::BreakerConfig;
use crate::error::{Error, Result};
use crate::model::WeatherReading;
use crate::telemetry;
use crate::traits::{WeatherProvider, WeatherSource};

/// Queries providers in fixed priority order and returns the first success
///
/// Each provider is wrapped in its own [`CircuitBreaker`]. A tripped
/// provider is skipped exactly like a failing one. The chain holds no
/// mutable state of its own beyond those breakers.
pub struct WeatherAggregator {
    chain: Vec<(Arc<dyn WeatherProvider>, CircuitBreaker)>,
}

impl WeatherAggregator {
    /// Build a chain; the order of `providers` is the failover order
    pub fn new(providers: Vec<Arc<dyn WeatherProvider>>, breaker: &BreakerConfig) -> Self {
        let chain = providers
            .into_iter()
            .map(|provider| {
                let breaker = CircuitBreaker::from_config(provider.provider_name(), breaker);
                (provider, breaker)
            })
            .collect();
        Self { chain }
    }

    /// Number of providers in the chain
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// True when no providers are configured
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Breaker state per provider, in chain order
    pub fn breaker_states(&self) -> Vec<(&str, CircuitState)> {
        self.chain
            .iter()
            .map(|(_, breaker)| (breaker.name(), breaker.state()))
            .collect()
    }

    /// Fetch a reading for `city` from the first provider that answers
    ///
    /// # Returns
    ///
    /// - `Ok(reading)`: produced whole by exactly one provider
    /// - `Err(Error::AllProvidersFailed)`: every provider failed or was
    ///   circuit-tripped
    pub async fn get_by_city(&self, city: &str) -> Result<WeatherReading> {
        for (provider, breaker) in &self.chain {
            let name = provider.provider_name();
            match breaker.execute(|| provider.fetch(city)).await {
                Ok(mut reading) => {
                    telemetry::provider_attempt(name, "success");
                    debug!(provider = name, city = %city, "Weather fetched");
                    if reading.source.is_empty() {
                        reading.source = name.to_string();
                    }
                    return Ok(reading);
                }
                Err(err) => {
                    let outcome = if err.is_breaker_open() {
                        "breaker_open"
                    } else {
                        "failure"
                    };
                    telemetry::provider_attempt(name, outcome);
                    warn!(provider = name, city = %city, error = %err, "Provider failed, trying next");
                }
            }
        }

        Err(Error::all_providers_failed(city, self.chain.len()))
    }
}

#[async_trait]
impl WeatherSource for WeatherAggregator {
    async fn get_by_city(&self, city: &str) -> Result<WeatherReading> {
        WeatherAggregator::get_by_city(self, city).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        ok: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, ok: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                ok,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WeatherProvider for Fixed {
        async fn fetch(&self, city: &str) -> Result<WeatherReading> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(WeatherReading::new(city, 10.0, "Clear", ""))
            } else {
                Err(Error::http("503"))
            }
        }

        fn provider_name(&self) -> &'static str {
            self.name
        }
    }

    #[tokio::test]
    async fn falls_through_to_second_provider_and_stamps_source() {
        let first = Fixed::new("first", false);
        let second = Fixed::new("second", true);
        let third = Fixed::new("third", true);
        let providers: Vec<Arc<dyn WeatherProvider>> =
            vec![first.clone(), second.clone(), third.clone()];
        let aggregator = WeatherAggregator::new(providers, &BreakerConfig::default());

        let reading = aggregator.get_by_city("Kyiv").await.unwrap();
        assert_eq!(reading.source, "second");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_fails() {
        let aggregator = WeatherAggregator::new(Vec::new(), &BreakerConfig::default());
        let err = aggregator.get_by_city("Kyiv").await.unwrap_err();
        assert!(matches!(err, Error::AllProvidersFailed { attempts: 0, .. }));
    }

    #[tokio::test]
    async fn breakers_are_independent_per_provider() {
        let flaky = Fixed::new("flaky", false);
        let healthy = Fixed::new("healthy", true);
        let config = BreakerConfig {
            failure_threshold: 2,
            cooldown_secs: 60,
        };
        let providers: Vec<Arc<dyn WeatherProvider>> = vec![flaky.clone(), healthy.clone()];
        let aggregator = WeatherAggregator::new(providers, &config);

        for _ in 0..3 {
            aggregator.get_by_city("Kyiv").await.unwrap();
        }

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            aggregator.breaker_states(),
            vec![("flaky", CircuitState::Open), ("healthy", CircuitState::Closed)]
        );
    }
}
