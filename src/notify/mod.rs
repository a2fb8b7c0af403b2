//! Alert notifications
//!
//! One [`NotificationSink`] per delivery channel. Delivery is best-effort:
//! [`Notifier::notify`] reports what happened and never returns an error.

pub mod cooldown;
pub mod email;
pub mod telegram;

pub use cooldown::AlertCooldown;
pub use email::EmailSink;
pub use telegram::TelegramSink;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A delivery channel for alerts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, subject: &str, html_body: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    None,
    Telegram,
    Email,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

impl TelegramSettings {
    pub fn is_complete(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"***")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Sender and recipient
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            address: String::new(),
            password: String::new(),
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
        }
    }
}

impl EmailSettings {
    pub fn is_complete(&self) -> bool {
        !self.address.is_empty() && !self.password.is_empty() && !self.smtp_server.is_empty()
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("address", &self.address)
            .field("password", &"***")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

/// Notification part of the scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub method: SinkKind,
    /// Minimum minutes between two alerts for one symbol; 0 disables
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,
    #[serde(default)]
    pub email: Option<EmailSettings>,
}

fn default_cooldown_minutes() -> u64 {
    60
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            method: SinkKind::None,
            cooldown_minutes: default_cooldown_minutes(),
            telegram: None,
            email: None,
        }
    }
}

/// Longest accepted alert cooldown, one year
pub const MAX_COOLDOWN_MINUTES: u64 = 365 * 24 * 60;

impl NotificationSettings {
    /// Cooldown window, saturating at the largest representable duration
    pub fn cooldown(&self) -> chrono::Duration {
        i64::try_from(self.cooldown_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Outcome of one notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { sink: &'static str },
    Disabled,
    MissingCredentials { sink: &'static str },
    Failed { sink: &'static str, error: String },
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Sent { sink } => write!(f, "{} notification sent", sink),
            Delivery::Disabled => f.write_str("notifications disabled"),
            Delivery::MissingCredentials { sink } => {
                write!(f, "{} credentials are not configured, notification skipped", sink)
            }
            Delivery::Failed { sink, error } => write!(f, "{} notification failed: {}", sink, error),
        }
    }
}

#[derive(Clone)]
enum Target {
    Disabled,
    Unconfigured(&'static str),
    Sink(Arc<dyn NotificationSink>),
}

/// Dispatches alerts to the configured sink
#[derive(Clone)]
pub struct Notifier {
    target: Target,
}

impl Notifier {
    pub fn disabled() -> Self {
        Self {
            target: Target::Disabled,
        }
    }

    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            target: Target::Sink(sink),
        }
    }

    pub fn from_settings(settings: &NotificationSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }

        match settings.method {
            SinkKind::None => Self::disabled(),
            SinkKind::Telegram => match settings.telegram.as_ref().filter(|t| t.is_complete()) {
                Some(tg) => match TelegramSink::new(tg) {
                    Ok(sink) => Self::new(Arc::new(sink)),
                    Err(e) => {
                        tracing::warn!("Failed to build Telegram client: {}", e);
                        Self::unconfigured("Telegram")
                    }
                },
                None => Self::unconfigured("Telegram"),
            },
            SinkKind::Email => match settings.email.as_ref().filter(|e| e.is_complete()) {
                Some(email) => Self::new(Arc::new(EmailSink::new(email))),
                None => Self::unconfigured("E-mail"),
            },
        }
    }

    fn unconfigured(sink: &'static str) -> Self {
        tracing::warn!("{} notifications selected but credentials are missing", sink);
        Self {
            target: Target::Unconfigured(sink),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.target, Target::Disabled)
    }

    /// Best-effort send; failures are logged and returned, never raised
    pub async fn notify(&self, subject: &str, html_body: &str) -> Delivery {
        match &self.target {
            Target::Disabled => Delivery::Disabled,
            Target::Unconfigured(sink) => {
                tracing::warn!("{} credentials missing, skipping notification", sink);
                Delivery::MissingCredentials { sink }
            }
            Target::Sink(sink) => match sink.send(subject, html_body).await {
                Ok(()) => {
                    tracing::info!(sink = sink.name(), "notification sent");
                    Delivery::Sent { sink: sink.name() }
                }
                Err(e) => {
                    tracing::error!(sink = sink.name(), error = %e, "notification failed");
                    Delivery::Failed {
                        sink: sink.name(),
                        error: e.to_string(),
                    }
                }
            },
        }
    }
}

/// Scan alert text
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAlert<'a> {
    pub symbol: &'a str,
    pub exchange: &'a str,
    pub oscillator_period: usize,
    pub oscillator_value: f64,
    pub ema_period: usize,
    pub ema_value: f64,
    pub volume_display: &'a str,
}

impl ScanAlert<'_> {
    pub fn subject(&self) -> String {
        format!("Krypto Scanner Alert: {}", self.symbol)
    }

    pub fn body(&self) -> String {
        format!(
            "🔔 Alert: <b>{}</b>\n\
            Exchange: {}\n\
            W%R({}): {:.2}, EMA({}): {:.2}\n\
            24h volume: {}",
            self.symbol,
            self.exchange,
            self.oscillator_period,
            self.oscillator_value,
            self.ema_period,
            self.ema_value,
            self.volume_display,
        )
    }
}
