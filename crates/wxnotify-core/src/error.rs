//! Error types for the notification pipeline
//!
//! Every failure is scoped to the smallest unit it concerns: one provider,
//! one subscriber, or one broker message. None of these variants is fatal
//! to the process.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the notification pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// A single provider failed; the aggregator moves on to the next one
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// The provider's circuit is open and the call was not attempted
    #[error("Provider unavailable ({provider}): circuit breaker is open")]
    BreakerOpen {
        /// Provider name
        provider: String,
    },

    /// Every provider in the chain failed for this city
    #[error("All weather providers failed for {city} ({attempts} attempted)")]
    AllProvidersFailed {
        /// City that was requested
        city: String,
        /// Number of providers in the chain
        attempts: usize,
    },

    /// Cache read or write failure (non-fatal, bypassed)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Broker publish failure
    #[error("Publish error: {0}")]
    Publish(String),

    /// Email send failure
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Subscription repository failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream returned something we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A run of the same frequency is still draining
    #[error("A {0} run is already in progress")]
    RunInProgress(String),

    /// A unit of work exceeded its deadline
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a breaker-open error
    pub fn breaker_open(provider: impl Into<String>) -> Self {
        Self::BreakerOpen {
            provider: provider.into(),
        }
    }

    /// Create the terminal aggregate error
    pub fn all_providers_failed(city: impl Into<String>, attempts: usize) -> Self {
        Self::AllProvidersFailed {
            city: city.into(),
            attempts,
        }
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a repository error
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a deadline error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// True when the call was rejected by an open circuit rather than
    /// attempted and failed
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, Self::BreakerOpen { .. })
    }

    /// True for the terminal "every provider failed" outcome
    pub fn is_all_providers_failed(&self) -> bool {
        matches!(self, Self::AllProvidersFailed { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_open_is_distinguishable_from_provider_error() {
        let open = Error::breaker_open("weather_api");
        let failed = Error::provider("weather_api", "HTTP 503");

        assert!(open.is_breaker_open());
        assert!(!failed.is_breaker_open());
        assert_eq!(
            failed.to_string(),
            "Provider error (weather_api): HTTP 503"
        );
    }

    #[test]
    fn aggregate_error_message() {
        let err = Error::all_providers_failed("Lviv", 3);
        assert!(err.is_all_providers_failed());
        assert_eq!(
            err.to_string(),
            "All weather providers failed for Lviv (3 attempted)"
        );
    }
}
