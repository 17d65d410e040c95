//! Daemon configuration from `WXNOTIFY_*` environment variables
//!
//! Values are read through a lookup function so parsing can be tested
//! without touching the process environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use tracing::Level;
use wxnotify_core::config::{
    BreakerConfig, BrokerConfig, CacheBackend, CacheConfig, PipelineConfig, ProviderConfig,
    SchedulerConfig,
};
use wxnotify_email_smtp::{SmtpConfig, SmtpSecurity};

/// Provider names in their default failover order
pub const KNOWN_PROVIDERS: [&str; 3] = ["weather_api", "open_weather_map", "visual_crossing"];

/// Which broker carries delivery intents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerKind {
    /// RabbitMQ at `url`
    Amqp { url: String },
    /// In-process broker (single process, messages lost on exit)
    Memory,
}

/// Application configuration
#[derive(Debug)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub broker: BrokerKind,
    pub subscriptions_path: PathBuf,
    pub smtp: SmtpConfig,
    pub log_level: String,
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("{} is required. Set it via: export {}=...", key, key))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
            None => Ok(default),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let env = Env(lookup);

        let providers = parse_providers(&env)?;

        let breaker_defaults = BreakerConfig::default();
        let breaker = BreakerConfig {
            failure_threshold: env.parse_or(
                "WXNOTIFY_BREAKER_THRESHOLD",
                breaker_defaults.failure_threshold,
            )?,
            cooldown_secs: env.parse_or(
                "WXNOTIFY_BREAKER_COOLDOWN_SECS",
                breaker_defaults.cooldown_secs,
            )?,
        };

        let cache_defaults = CacheConfig::default();
        let backend = match env.get("WXNOTIFY_CACHE_TYPE").as_deref().unwrap_or("memory") {
            "memory" => CacheBackend::Memory,
            "redis" => CacheBackend::Redis {
                url: env.require("WXNOTIFY_REDIS_URL")?,
            },
            other => bail!(
                "WXNOTIFY_CACHE_TYPE '{}' is not supported. Supported types: memory, redis",
                other
            ),
        };
        let cache = CacheConfig {
            backend,
            ttl_secs: env.parse_or("WXNOTIFY_CACHE_TTL_SECS", cache_defaults.ttl_secs)?,
        };

        let scheduler_defaults = SchedulerConfig::default();
        let daily_at = match env.get("WXNOTIFY_DAILY_AT") {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M").with_context(|| {
                format!("WXNOTIFY_DAILY_AT must be HH:MM (UTC). Got: {}", raw)
            })?,
            None => scheduler_defaults.daily_at,
        };
        let scheduler = SchedulerConfig {
            daily_at,
            max_concurrency: env.parse_or(
                "WXNOTIFY_MAX_CONCURRENCY",
                scheduler_defaults.max_concurrency,
            )?,
            run_timeout_secs: env.parse_or(
                "WXNOTIFY_RUN_TIMEOUT_SECS",
                scheduler_defaults.run_timeout_secs,
            )?,
            shutdown_timeout_secs: env.parse_or(
                "WXNOTIFY_SHUTDOWN_TIMEOUT_SECS",
                scheduler_defaults.shutdown_timeout_secs,
            )?,
        };

        let broker_defaults = BrokerConfig::default();
        let broker_config = BrokerConfig {
            exchange: env.get("WXNOTIFY_EXCHANGE").unwrap_or(broker_defaults.exchange),
            weather_queue: env
                .get("WXNOTIFY_WEATHER_QUEUE")
                .unwrap_or(broker_defaults.weather_queue),
            confirmation_queue: env
                .get("WXNOTIFY_CONFIRMATION_QUEUE")
                .unwrap_or(broker_defaults.confirmation_queue),
            retry_delay_secs: env.parse_or(
                "WXNOTIFY_RETRY_DELAY_SECS",
                broker_defaults.retry_delay_secs,
            )?,
            prefetch: env.parse_or("WXNOTIFY_PREFETCH", broker_defaults.prefetch)?,
            ..broker_defaults
        };

        let broker = match env.get("WXNOTIFY_BROKER_TYPE").as_deref().unwrap_or("amqp") {
            "amqp" => BrokerKind::Amqp {
                url: env.require("WXNOTIFY_AMQP_URL")?,
            },
            "memory" => BrokerKind::Memory,
            other => bail!(
                "WXNOTIFY_BROKER_TYPE '{}' is not supported. Supported types: amqp, memory",
                other
            ),
        };

        let security = match env.get("WXNOTIFY_SMTP_SECURITY") {
            Some(raw) => raw.parse::<SmtpSecurity>()?,
            None => SmtpSecurity::default(),
        };
        let smtp = SmtpConfig {
            host: env.require("WXNOTIFY_SMTP_HOST")?,
            port: match env.get("WXNOTIFY_SMTP_PORT") {
                Some(raw) => Some(
                    raw.parse()
                        .with_context(|| format!("WXNOTIFY_SMTP_PORT must be a port number. Got: {}", raw))?,
                ),
                None => None,
            },
            username: env.get("WXNOTIFY_SMTP_USERNAME"),
            password: env.get("WXNOTIFY_SMTP_PASSWORD"),
            from: env.require("WXNOTIFY_SMTP_FROM")?,
            confirm_base_url: env.require("WXNOTIFY_CONFIRM_BASE_URL")?,
            security,
        };

        Ok(Self {
            pipeline: PipelineConfig {
                providers,
                breaker,
                cache,
                scheduler,
                broker: broker_config,
                event_channel_capacity: env.parse_or("WXNOTIFY_EVENT_CHANNEL_CAPACITY", 1000)?,
            },
            broker,
            subscriptions_path: PathBuf::from(env.require("WXNOTIFY_SUBSCRIPTIONS_PATH")?),
            smtp,
            log_level: env
                .get("WXNOTIFY_LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Covers the pipeline settings, URL schemes, and that every selected
    /// backend was compiled into this binary.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        for provider in &self.pipeline.providers {
            if !cfg!(feature = "http") && !matches!(provider, ProviderConfig::Custom { .. }) {
                bail!(
                    "Provider '{}' requires the 'http' feature, which this build does not include",
                    provider.type_name()
                );
            }
        }

        if let CacheBackend::Redis { url } = &self.pipeline.cache.backend {
            if !cfg!(feature = "redis") {
                bail!("WXNOTIFY_CACHE_TYPE=redis requires the 'redis' feature");
            }
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                bail!("WXNOTIFY_REDIS_URL must use the redis:// or rediss:// scheme. Got: {}", url);
            }
        }

        if let BrokerKind::Amqp { url } = &self.broker {
            if !cfg!(feature = "amqp") {
                bail!("WXNOTIFY_BROKER_TYPE=amqp requires the 'amqp' feature");
            }
            if !url.starts_with("amqp://") && !url.starts_with("amqps://") {
                bail!("WXNOTIFY_AMQP_URL must use the amqp:// or amqps:// scheme");
            }
        }

        let base = &self.smtp.confirm_base_url;
        if !base.starts_with("https://") && !base.starts_with("http://") {
            bail!("WXNOTIFY_CONFIRM_BASE_URL must use HTTP or HTTPS scheme. Got: {}", base);
        }

        self.level()?;
        Ok(())
    }

    /// Parsed log level
    pub fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => bail!(
                "WXNOTIFY_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

/// `WXNOTIFY_PROVIDERS` gives the failover order explicitly; otherwise every
/// provider with an API key is used in the default order.
fn parse_providers<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Vec<ProviderConfig>> {
    let names: Vec<String> = match env.get("WXNOTIFY_PROVIDERS") {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        None => KNOWN_PROVIDERS
            .iter()
            .filter(|name| env.get(&key_var(name)).is_some())
            .map(|name| name.to_string())
            .collect(),
    };

    let mut providers = Vec::with_capacity(names.len());
    for name in names {
        if providers.iter().any(|p: &ProviderConfig| p.type_name() == name) {
            bail!("Provider '{}' is listed more than once in WXNOTIFY_PROVIDERS", name);
        }

        let api_key = env.require(&key_var(&name))?;
        let base_url = env.get(&base_url_var(&name));

        providers.push(match name.as_str() {
            "weather_api" => ProviderConfig::WeatherApi { api_key, base_url },
            "open_weather_map" => ProviderConfig::OpenWeatherMap { api_key, base_url },
            "visual_crossing" => ProviderConfig::VisualCrossing { api_key, base_url },
            other => bail!(
                "Unknown provider '{}'. Supported providers: {}",
                other,
                KNOWN_PROVIDERS.join(", ")
            ),
        });
    }

    Ok(providers)
}

fn key_var(provider: &str) -> String {
    format!("WXNOTIFY_{}_KEY", provider.to_uppercase())
}

fn base_url_var(provider: &str) -> String {
    format!("WXNOTIFY_{}_BASE_URL", provider.to_uppercase())
}
