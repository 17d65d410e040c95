//! WeatherAPI.com provider
//!
//! ```http
//! GET /v1/current.json?key=<api_key>&q=<city>
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use wxnotify_core::config::ProviderConfig;
use wxnotify_core::model::WeatherReading;
use wxnotify_core::traits::{WeatherProvider, WeatherProviderFactory};
use wxnotify_core::{Error, Result};

/// Registry name
pub const NAME: &str = "weather_api";

/// Production endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Current {
    temp_c: f64,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct Condition {
    text: String,
}

/// Parse a `current.json` response body
pub fn parse_response(city: &str, body: &str) -> Result<WeatherReading> {
    let parsed: CurrentResponse =
        serde_json::from_str(body).map_err(|e| crate::invalid_body(NAME, e))?;

    Ok(WeatherReading::new(
        city,
        parsed.current.temp_c,
        parsed.current.condition.text,
        NAME,
    ))
}

pub struct WeatherApiProvider {
    /// Never logged
    api_key: String,
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for WeatherApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherApiProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl WeatherApiProvider {
    /// Create a provider against `base_url` (or the production endpoint)
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
            .join("v1/current.json")
            .map_err(|e| Error::config(format!("Invalid {} endpoint: {}", NAME, e)))?;

        reqwest::Url::parse_with_params(
            endpoint.as_str(),
            &[("key", self.api_key.as_str()), ("q", city)],
        )
        .map_err(|e| Error::config(format!("Invalid {} request URL: {}", NAME, e)))
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
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

/// Factory for WeatherAPI.com providers
pub struct WeatherApiFactory;

impl WeatherProviderFactory for WeatherApiFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn WeatherProvider>> {
        match config {
            ProviderConfig::WeatherApi { api_key, base_url } => {
                if api_key.is_empty() {
                    return Err(Error::config("WeatherAPI.com API key is required"));
                }
                Ok(Box::new(WeatherApiProvider::new(
                    api_key.clone(),
                    base_url.as_deref(),
                )?))
            }
            _ => Err(Error::config("Invalid config for WeatherAPI.com provider")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "location": {"name": "Kyiv", "country": "Ukraine"},
        "current": {
            "temp_c": 21.5,
            "condition": {"text": "Sunny", "code": 1000}
        }
    }"#;

    #[test]
    fn test_parse_response() {
        let reading = parse_response("Kyiv", SAMPLE).unwrap();
        assert_eq!(reading.city, "Kyiv");
        assert_eq!(reading.temperature, 21.5);
        assert_eq!(reading.condition, "Sunny");
        assert_eq!(reading.source, "weather_api");
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let err = parse_response("Kyiv", r#"{"current": {"temp_c": 1.0}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[test]
    fn test_request_url_encodes_city() {
        let provider = WeatherApiProvider::new("key123", Some("http://localhost:8080/")).unwrap();
        let url = provider.request_url("San José").unwrap();

        assert_eq!(url.path(), "/v1/current.json");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("q".to_string(), "San José".to_string())));
        assert!(query.contains(&("key".to_string(), "key123".to_string())));
    }

    #[test]
    fn test_api_key_not_exposed_in_debug() {
        let provider = WeatherApiProvider::new("secret_key_12345", None).unwrap();
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_key_12345"));
        assert!(debug_str.contains("WeatherApiProvider"));
    }

    #[test]
    fn test_factory() {
        let factory = WeatherApiFactory;
        let provider = factory
            .create(&ProviderConfig::WeatherApi {
                api_key: "key".to_string(),
                base_url: None,
            })
            .unwrap();
        assert_eq!(provider.provider_name(), "weather_api");

        assert!(factory
            .create(&ProviderConfig::WeatherApi {
                api_key: String::new(),
                base_url: None,
            })
            .is_err());

        assert!(factory
            .create(&ProviderConfig::OpenWeatherMap {
                api_key: "key".to_string(),
                base_url: None,
            })
            .is_err());
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = WeatherApiProvider::new("key", Some("not a url")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
