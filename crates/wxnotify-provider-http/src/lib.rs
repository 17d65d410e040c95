// # HTTP Weather Providers
//
// `WeatherProvider` implementations for three upstream weather APIs:
//
// - **WeatherAPI.com** (`weather_api`)
// - **OpenWeatherMap** (`open_weather_map`)
// - **Visual Crossing** (`visual_crossing`)
//
// Each provider makes exactly one HTTP request per `fetch`. Error statuses
// become `Error::Provider`, transport failures `Error::Http` and unparseable
// bodies `Error::InvalidResponse`; the breaker tags the latter two with the
// provider name. Retries, failover and circuit breaking are
// owned by the `WeatherAggregator` in wxnotify-core; nothing here retries,
// caches or spawns background tasks.
//
// Response parsing is split into pure `parse_response` functions so the
// wire formats can be tested without a network.

use std::time::Duration;

use reqwest::StatusCode;
use wxnotify_core::{Error, PluginRegistry, Result};

pub mod open_weather_map;
pub mod visual_crossing;
pub mod weather_api;

pub use open_weather_map::{OpenWeatherMapFactory, OpenWeatherMapProvider};
pub use visual_crossing::{VisualCrossingFactory, VisualCrossingProvider};
pub use weather_api::{WeatherApiFactory, WeatherApiProvider};

/// Per-request timeout for upstream calls
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client(provider: &'static str) -> Result<reqwest::Client> {
    finish_client(provider, reqwest::Client::builder().timeout(DEFAULT_HTTP_TIMEOUT))
}

fn finish_client(provider: &'static str, builder: reqwest::ClientBuilder) -> Result<reqwest::Client> {
    builder
        .build()
        .map_err(|e| Error::config(format!("{}: failed to build HTTP client: {}", provider, e)))
}

/// Send a request and return the body of a successful response
pub(crate) async fn fetch_body(
    provider: &'static str,
    city: &str,
    request: reqwest::RequestBuilder,
) -> Result<String> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            Error::http(format!("{}: request timed out after {:?}", provider, DEFAULT_HTTP_TIMEOUT))
        } else {
            Error::http(format!("{}: request failed: {}", provider, e.without_url()))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::http(format!("{}: failed to read response body: {}", provider, e.without_url())))?;

    if !status.is_success() {
        tracing::debug!(provider, city = %city, status = %status, "Upstream returned an error status");
        return Err(status_error(provider, city, status, &body));
    }

    Ok(body)
}

/// Map a non-success HTTP status to a provider error
pub fn status_error(provider: &'static str, city: &str, status: StatusCode, body: &str) -> Error {
    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: invalid API key or plan does not allow this request. Status: {}",
            status
        ),
        404 => format!("Unknown city '{}'. Status: {}", city, status),
        429 => format!("Rate limit exceeded. Status: {}", status),
        500..=599 => format!("Server error (transient): {} - {}", status, truncate(body)),
        _ => format!("Request failed: {} - {}", status, truncate(body)),
    };

    Error::provider(provider, message)
}

fn truncate(body: &str) -> &str {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

pub(crate) fn invalid_body(provider: &'static str, e: serde_json::Error) -> Error {
    Error::invalid_response(format!("{}: {}", provider, e))
}

pub(crate) fn parse_base_url(provider: &'static str, base_url: &str) -> Result<reqwest::Url> {
    reqwest::Url::parse(base_url)
        .map_err(|e| Error::config(format!("Invalid {} base URL '{}': {}", provider, base_url, e)))
}

/// Register all three HTTP providers with a registry
///
/// ```rust
/// use wxnotify_core::PluginRegistry;
///
/// let registry = PluginRegistry::with_builtins();
/// wxnotify_provider_http::register(&registry);
/// assert!(registry.has_provider("visual_crossing"));
/// ```
pub fn register(registry: &PluginRegistry) {
    registry.register_provider(weather_api::NAME, Box::new(WeatherApiFactory));
    registry.register_provider(open_weather_map::NAME, Box::new(OpenWeatherMapFactory));
    registry.register_provider(visual_crossing::NAME, Box::new(VisualCrossingFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxnotify_core::config::ProviderConfig;

    #[test]
    fn test_status_mapping() {
        let err = status_error("weather_api", "Kyiv", StatusCode::UNAUTHORIZED, "");
        assert!(err.to_string().contains("Authentication failed"));

        let err = status_error("weather_api", "Kyiv", StatusCode::FORBIDDEN, "");
        assert!(err.to_string().contains("Authentication failed"));

        let err = status_error("open_weather_map", "Atlantis", StatusCode::NOT_FOUND, "");
        assert!(err.to_string().contains("Unknown city 'Atlantis'"));

        let err = status_error("visual_crossing", "Kyiv", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.to_string().contains("Rate limit"));

        let err = status_error("visual_crossing", "Kyiv", StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.to_string().contains("transient"));
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_client_build_failure_is_config_error() {
        let builder = reqwest::Client::builder().user_agent("bad\nagent");
        let err = finish_client("weather_api", builder).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("weather_api"));

        assert!(build_client("weather_api").is_ok());
    }

    #[test]
    fn test_status_error_names_provider() {
        let err = status_error("open_weather_map", "Kyiv", StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(matches!(err, Error::Provider { ref provider, .. } if provider == "open_weather_map"));
    }

    #[test]
    fn test_long_error_bodies_are_truncated() {
        let body = "é".repeat(500);
        let err = status_error("weather_api", "Kyiv", StatusCode::BAD_REQUEST, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn test_register_all_providers() {
        let registry = PluginRegistry::new();
        register(&registry);

        assert!(registry.has_provider("weather_api"));
        assert!(registry.has_provider("open_weather_map"));
        assert!(registry.has_provider("visual_crossing"));
    }

    #[test]
    fn test_chain_preserves_order() {
        let registry = PluginRegistry::new();
        register(&registry);

        let chain = registry
            .create_provider_chain(&[
                ProviderConfig::VisualCrossing {
                    api_key: "vc".to_string(),
                    base_url: None,
                },
                ProviderConfig::WeatherApi {
                    api_key: "wa".to_string(),
                    base_url: None,
                },
                ProviderConfig::OpenWeatherMap {
                    api_key: "owm".to_string(),
                    base_url: None,
                },
            ])
            .unwrap();

        let names: Vec<_> = chain.iter().map(|p| p.provider_name()).collect();
        assert_eq!(names, vec!["visual_crossing", "weather_api", "open_weather_map"]);
    }
}
