//! Test doubles and common utilities for pipeline contract tests
//!
//! Each double counts its calls so tests can assert not only on results
//! but on which collaborators were (or were not) touched.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wxnotify_core::error::{Error, Result};
use wxnotify_core::model::{WeatherReading, WeatherSnapshot};
use wxnotify_core::traits::{BrokerPublisher, EmailSender, WeatherProvider, WeatherSource};

/// A provider that answers with a fixed temperature or fails on demand
pub struct CountingProvider {
    pub name: &'static str,
    temperature: f64,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl CountingProvider {
    /// A provider that succeeds
    pub fn ok(name: &'static str, temperature: f64) -> Self {
        Self {
            name,
            temperature,
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A provider that always fails
    pub fn failing(name: &'static str) -> Self {
        let provider = Self::ok(name, 0.0);
        provider.set_failing(true);
        provider
    }

    /// Switch between failing and succeeding
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get the number of times fetch() was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Create a provider that shares counters and failure switch with `other`
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            name: other.name,
            temperature: other.temperature,
            failing: Arc::clone(&other.failing),
            calls: Arc::clone(&other.calls),
        }
    }
}

#[async_trait]
impl WeatherProvider for CountingProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherReading> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::http(format!("{} returned 503", self.name)));
        }
        Ok(WeatherReading::new(city, self.temperature, "Partly cloudy", self.name))
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

/// Wrap a provider for a chain, keeping a handle that shares its counters
pub fn chain_entry(provider: &CountingProvider) -> Arc<dyn WeatherProvider> {
    Arc::new(CountingProvider::sharing_counters_with(provider))
}

/// A weather source double that counts calls
pub struct CountingSource {
    calls: Arc<AtomicUsize>,
    failing: bool,
}

impl CountingSource {
    pub fn ok() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failing: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            calls: Arc::clone(&other.calls),
            failing: other.failing,
        }
    }
}

#[async_trait]
impl WeatherSource for CountingSource {
    async fn get_by_city(&self, city: &str) -> Result<WeatherReading> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::all_providers_failed(city, 3));
        }
        Ok(WeatherReading::new(city, 18.0, "Sunny", "double"))
    }
}

/// A broker publisher that records payloads, or fails every publish
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    /// (routing key, payload) pairs in publish order
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            published: Arc::clone(&other.published),
            failing: other.failing,
        }
    }
}

#[async_trait]
impl BrokerPublisher for RecordingPublisher {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        if self.failing {
            return Err(Error::publish("broker unavailable"));
        }
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// An email sender that records what it sent
pub struct RecordingEmailSender {
    sent: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// One line per email: `weather:<to>:<city>` or `confirm:<to>:<token>`
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            sent: Arc::clone(&other.sent),
            failing: Arc::clone(&other.failing),
        }
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_weather(&self, to: &str, weather: &WeatherSnapshot) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::delivery("421 service not available"));
        }
        self.sent
            .lock()
            .unwrap()
            .push(format!("weather:{}:{}", to, weather.city));
        Ok(())
    }

    async fn send_confirmation(&self, to: &str, token: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::delivery("421 service not available"));
        }
        self.sent
            .lock()
            .unwrap()
            .push(format!("confirm:{}:{}", to, token));
        Ok(())
    }
}

/// Deadline far enough away not to matter
pub fn generous_deadline() -> tokio::time::Instant {
    tokio::time::Instant::now() + Duration::from_secs(60)
}

/// Poll `condition` until it holds or one second passes
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
