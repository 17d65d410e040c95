//! OpenWeatherMap provider
//!
//! ```http
//! GET /data/2.5/weather?q=<city>&appid=<api_key>&units=metric
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use wxnotify_core::config::ProviderConfig;
use wxnotify_core::model::WeatherReading;
use wxnotify_core::traits::{WeatherProvider, WeatherProviderFactory};
use wxnotify_core::{Error, Result};

/// Registry name
pub const NAME: &str = "open_weather_map";

/// Production endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: Main,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct Main {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

/// Parse a `/data/2.5/weather` response body (metric units)
///
/// OpenWeatherMap returns a list of conditions; the first one is primary.
pub fn parse_response(city: &str, body: &str) -> Result<WeatherReading> {
    let parsed: WeatherResponse =
        serde_json::from_str(body).map_err(|e| crate::invalid_body(NAME, e))?;

    let condition = parsed
        .weather
        .into_iter()
        .next()
        .map(|c| c.description)
        .ok_or_else(|| Error::invalid_response(format!("{}: no weather conditions in response", NAME)))?;

    Ok(WeatherReading::new(city, parsed.main.temp, condition, NAME))
}

pub struct OpenWeatherMapProvider {
    /// Never logged
    api_key: String,
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenWeatherMapProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherMapProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl OpenWeatherMapProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: crate::parse_base_url(NAME, base_url.unwrap_or(DEFAULT_BASE_URL))?,
            client: crate::build_client(NAME)?,
        })
    }

    fn request_url(&self, city: &str) -> Result<reqwest::Url> {
        let endpoint = self
            .base_url
            .join("data/2.5/weather")
            .map_err(|e| Error::config(format!("Invalid {} endpoint: {}", NAME, e)))?;

        reqwest::Url::parse_with_params(
            endpoint.as_str(),
            &[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")],
        )
        .map_err(|e| Error::config(format!("Invalid {} request URL: {}", NAME, e)))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
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

/// Factory for OpenWeatherMap providers
pub struct OpenWeatherMapFactory;

impl WeatherProviderFactory for OpenWeatherMapFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn WeatherProvider>> {
        match config {
            ProviderConfig::OpenWeatherMap { api_key, base_url } => {
                if api_key.is_empty() {
                    return Err(Error::config("OpenWeatherMap API key is required"));
                }
                Ok(Box::new(OpenWeatherMapProvider::new(
                    api_key.clone(),
                    base_url.as_deref(),
                )?))
            }
            _ => Err(Error::config("Invalid config for OpenWeatherMap provider")),
        }
    }
}
