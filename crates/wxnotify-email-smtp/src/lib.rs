// # SMTP Email Sender
//
// `EmailSender` over SMTP using `lettre`'s tokio transport.
//
// Two plain-text emails exist: the periodic weather update and the
// subscription confirmation, whose body links to `<confirm_base_url>/<token>`.
// A send is a single attempt; any failure is `Error::Delivery` and the
// delivery worker hands the message back to the broker for a later retry.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header};
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wxnotify_core::model::WeatherSnapshot;
use wxnotify_core::traits::EmailSender;
use wxnotify_core::{Error, Result};

/// Per-send SMTP timeout
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// How the connection to the relay is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    /// Implicit TLS (usually port 465)
    Tls,
    /// Plain connection upgraded with STARTTLS (usually port 587)
    #[default]
    StartTls,
    /// Unencrypted; local relays and test servers only
    None,
}

impl std::str::FromStr for SmtpSecurity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tls" => Ok(SmtpSecurity::Tls),
            "starttls" | "start_tls" => Ok(SmtpSecurity::StartTls),
            "none" | "plain" => Ok(SmtpSecurity::None),
            other => Err(Error::config(format!(
                "Unknown SMTP security '{}' (expected tls, starttls or none)",
                other
            ))),
        }
    }
}

/// SMTP relay settings
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    /// Defaults to the port implied by `security`
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address, e.g. `Weather <weather@example.com>`
    pub from: String,
    /// Confirmation links are `<confirm_base_url>/<token>`
    pub confirm_base_url: String,
    #[serde(default)]
    pub security: SmtpSecurity,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("from", &self.from)
            .field("confirm_base_url", &self.confirm_base_url)
            .field("security", &self.security)
            .finish()
    }
}

pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    confirm_base_url: String,
}

impl SmtpEmailSender {
    /// Build the transport; no connection is made until the first send
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        if config.host.is_empty() {
            return Err(Error::config("SMTP host cannot be empty"));
        }
        if config.confirm_base_url.is_empty() {
            return Err(Error::config("Confirmation base URL cannot be empty"));
        }

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::config(format!("Invalid sender address '{}': {}", config.from, e)))?;

        let mut builder = match config.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::config(format!("Invalid SMTP relay {}: {}", config.host, e)))?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                    Error::config(format!("Invalid SMTP relay {}: {}", config.host, e))
                })?
            }
            SmtpSecurity::None => {
                warn!(host = %config.host, "SMTP connection is not encrypted");
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        };

        if let Some(port) = config.port {
            builder = builder.port(port);
        }

        match (&config.username, &config.password) {
            (Some(user), Some(pass)) => {
                builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::config("SMTP username and password must be set together"));
            }
            (None, None) => {}
        }

        Ok(Self {
            mailer: builder.timeout(Some(DEFAULT_SMTP_TIMEOUT)).build(),
            from,
            confirm_base_url: config.confirm_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn deliver(&self, message: Message, kind: &str) -> Result<()> {
        self.mailer.send(message).await.map_err(|e| {
            let class = if e.is_permanent() { "permanent" } else { "transient" };
            Error::delivery(format!("SMTP {} send failed ({}): {}", kind, class, e))
        })?;
        Ok(())
    }
}

fn parse_recipient(to: &str) -> Result<Mailbox> {
    to.parse()
        .map_err(|e| Error::delivery(format!("Invalid recipient address '{}': {}", to, e)))
}

pub fn weather_subject(weather: &WeatherSnapshot) -> String {
    format!("Weather update for {}", weather.city)
}

pub fn weather_body(weather: &WeatherSnapshot) -> String {
    format!(
        "Current weather in {}:\n\nTemperature: {:.1} °C\nConditions: {}\n\n\
         You receive this email because you subscribed to weather updates.\n",
        weather.city, weather.temperature, weather.description
    )
}

pub fn confirmation_link(base_url: &str, token: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), token)
}

pub fn confirmation_body(base_url: &str, token: &str) -> String {
    format!(
        "Please confirm your weather subscription by opening this link:\n\n{}\n\n\
         If you did not subscribe, ignore this email.\n",
        confirmation_link(base_url, token)
    )
}

fn plain_text(from: &Mailbox, to: Mailbox, subject: String, body: String) -> Result<Message> {
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(subject)
        .header(header::ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|e| Error::delivery(format!("Failed to build email: {}", e)))
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_weather(&self, to: &str, weather: &WeatherSnapshot) -> Result<()> {
        let message = plain_text(
            &self.from,
            parse_recipient(to)?,
            weather_subject(weather),
            weather_body(weather),
        )?;

        self.deliver(message, "weather").await?;
        debug!(to = %to, city = %weather.city, "Weather email sent");
        Ok(())
    }

    async fn send_confirmation(&self, to: &str, token: &str) -> Result<()> {
        let message = plain_text(
            &self.from,
            parse_recipient(to)?,
            "Confirm your weather subscription".to_string(),
            confirmation_body(&self.confirm_base_url, token),
        )?;

        self.deliver(message, "confirmation").await?;
        debug!(to = %to, "Confirmation email sent");
        Ok(())
    }
}
