//! Visual Crossing provider
//!
//! ```http
//! GET /VisualCrossingWebServices/rest/services/timeline/<city>?unitGroup=metric&include=current&key=<api_key>&contentType=json
//! ```
//!
//! Visual Crossing answers an unknown location with `400 Bad API Request:
//! Invalid location parameter value`, which is surfaced like any other
//! non-success status.

use async_trait::async_trait;
use serde::Deserialize;
use wxnotify_core::config::ProviderConfig;
use wxnotify_core::model::WeatherReading;
use wxnotify_core::traits::{WeatherProvider, WeatherProviderFactory};
use wxnotify_core::{Error, Result};

/// Registry name
pub const NAME: &str = "visual_crossing";

/// Production endpoint
pub const DEFAULT_BASE_URL: &str = "https://weather.visualcrossing.com";

const TIMELINE_PATH: [&str; 4] = ["VisualCrossingWebServices", "rest", "services", "timeline"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineResponse {
    current_conditions: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temp: f64,
    conditions: String,
}

/// Parse a timeline response body requested with `include=current`
pub fn parse_response(city: &str, body: &str) -> Result<WeatherReading> {
    let parsed: TimelineResponse =
        serde_json::from_str(body).map_err(|e| crate::invalid_body(NAME, e))?;

    Ok(WeatherReading::new(
        city,
        parsed.current_conditions.temp,
        parsed.current_conditions.conditions,
        NAME,
    ))
}

pub struct VisualCrossingProvider {
    /// Never logged
    api_key: String,
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for VisualCrossingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualCrossingProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl VisualCrossingProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: crate::parse_base_url(NAME, base_url.unwrap_or(DEFAULT_BASE_URL))?,
            client: crate::build_client(NAME)?,
        })
    }

    /// The city is a path segment here, so it goes through segment encoding
    fn request_url(&self, city: &str) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("{} base URL cannot carry a path", NAME)))?
            .pop_if_empty()
            .extend(TIMELINE_PATH)
            .push(city);

        url.query_pairs_mut()
            .clear()
            .append_pair("unitGroup", "metric")
            .append_pair("include", "current")
            .append_pair("key", &self.api_key)
            .append_pair("contentType", "json");

        Ok(url)
    }
}

#[async_trait]
impl WeatherProvider for VisualCrossingProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherReading> {
        let url = self.request_url(city)?;
        tracing::debug!(provider = NAME, city = %city, "Fetching current weather");

        let body = crate::fetch_body(NAME, city, self.client.get(url)).await?;
        parse_response(city, &body)
    }

    fn provider_name(&self) -> &'static str {
        NAME
    }
}

/// Factory for Visual Crossing providers
pub struct VisualCrossingFactory;

impl WeatherProviderFactory for VisualCrossingFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn WeatherProvider>> {
        match config {
            ProviderConfig::VisualCrossing { api_key, base_url } => {
                if api_key.is_empty() {
                    return Err(Error::config("Visual Crossing API key is required"));
                }
                Ok(Box::new(VisualCrossingProvider::new(
                    api_key.clone(),
                    base_url.as_deref(),
                )?))
            }
            _ => Err(Error::config("Invalid config for Visual Crossing provider")),
        }
    }
}
