//! Domain types shared by every pipeline stage
//!
//! ## Wire format
//!
//! Delivery intents travel over the broker as flat JSON objects:
//!
//! ```json
//! {"email": "a@example.com", "token": "abc123"}
//! {"email": "a@example.com", "weather": {"city": "Kyiv", "temperature": 21.5, "description": "Sunny"}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often a subscriber wants weather updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Once per hour
    Hourly,
    /// Once per day
    Daily,
    /// Anything the repository holds that we do not recognize
    #[serde(other)]
    Unknown,
}

impl Frequency {
    /// Minimum time between two updates, `None` for unrecognized values
    pub fn period(&self) -> Option<chrono::Duration> {
        match self {
            Frequency::Hourly => Some(chrono::Duration::hours(1)),
            Frequency::Daily => Some(chrono::Duration::hours(24)),
            Frequency::Unknown => None,
        }
    }

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Frequency::Hourly,
            "daily" => Frequency::Daily,
            _ => Frequency::Unknown,
        })
    }
}

/// A subscriber record, owned by the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Repository identifier
    pub id: u64,
    /// Where notifications go
    pub email: String,
    /// City to report on
    pub city: String,
    /// Update cadence
    pub frequency: Frequency,
    /// Whether the subscriber confirmed their address
    #[serde(default)]
    pub confirmed: bool,
    /// When the last update was published; never moves backwards
    #[serde(default)]
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Create a confirmed subscription that has never been notified
    pub fn new(id: u64, email: impl Into<String>, city: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            id,
            email: email.into(),
            city: city.into(),
            frequency,
            confirmed: true,
            last_sent_at: None,
        }
    }

    /// Set the last-sent timestamp
    pub fn with_last_sent_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_sent_at = Some(at);
        self
    }

    /// Mark the subscription unconfirmed
    pub fn unconfirmed(mut self) -> Self {
        self.confirmed = false;
        self
    }
}

/// One canonical weather observation, produced whole by exactly one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// City the reading is for
    pub city: String,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Human-readable condition ("Partly cloudy")
    pub condition: String,
    /// When the provider answered
    pub fetched_at: DateTime<Utc>,
    /// Provider that produced the reading
    #[serde(default)]
    pub source: String,
}

impl WeatherReading {
    /// Create a reading stamped with the current time
    pub fn new(
        city: impl Into<String>,
        temperature: f64,
        condition: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            temperature,
            condition: condition.into(),
            fetched_at: Utc::now(),
            source: source.into(),
        }
    }
}

/// Weather portion of a delivery intent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city: String,
    pub temperature: f64,
    pub description: String,
}

impl From<&WeatherReading> for WeatherSnapshot {
    fn from(reading: &WeatherReading) -> Self {
        Self {
            city: reading.city.clone(),
            temperature: reading.temperature,
            description: reading.condition.clone(),
        }
    }
}

/// What a delivery intent asks the worker to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Confirmation,
    WeatherUpdate,
}

/// A notification promise travelling from the scheduler to the delivery worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveryIntent {
    /// Subscription confirmation email
    Confirmation {
        email: String,
        token: String,
    },
    /// Periodic weather update email
    WeatherUpdate {
        email: String,
        weather: WeatherSnapshot,
    },
}

impl DeliveryIntent {
    /// Build a weather update intent from a reading
    pub fn weather_update(email: impl Into<String>, reading: &WeatherReading) -> Self {
        Self::WeatherUpdate {
            email: email.into(),
            weather: WeatherSnapshot::from(reading),
        }
    }

    /// Build a confirmation intent
    pub fn confirmation(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Confirmation {
            email: email.into(),
            token: token.into(),
        }
    }

    /// Recipient address
    pub fn email(&self) -> &str {
        match self {
            Self::Confirmation { email, .. } | Self::WeatherUpdate { email, .. } => email,
        }
    }

    /// Intent kind
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::Confirmation { .. } => IntentKind::Confirmation,
            Self::WeatherUpdate { .. } => IntentKind::WeatherUpdate,
        }
    }

    /// Serialize to the flat JSON wire payload
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::Error> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a wire payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::Error> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::decode(e.to_string()))
    }
}
