//! Configuration management
//!
//! Settings come from a TOML file with `KRYPTO__`-prefixed environment
//! overrides, e.g. `KRYPTO__NOTIFICATIONS__TELEGRAM__BOT_TOKEN`.

use crate::error::{Result, ScannerError};
use crate::exchange::{find_profile, ExchangeProfile};
use crate::notify::NotificationSettings;
use crate::scanner::{IndicatorParams, ScanConditions, ScanConfiguration, Watchlist};
use crate::spike::SpikeParams;
use crate::types::{ApiCredentials, CompareOp, MarketType, Threshold, Timeframe};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub spike: SpikeConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Preset name such as "Bybit (Perpetual USDT)"; wins over `id`
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub market_type: Option<MarketType>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("preset", &self.preset)
            .field("id", &self.id)
            .field("market_type", &self.market_type)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ExchangeConfig {
    pub fn profile(&self) -> Result<Option<&'static ExchangeProfile>> {
        match &self.preset {
            Some(name) => find_profile(name)
                .map(Some)
                .ok_or_else(|| ScannerError::InvalidConfig(format!("unknown exchange preset '{}'", name))),
            None => Ok(None),
        }
    }

    /// Exchange id and market type, from the preset or the explicit fields
    pub fn resolve(&self) -> Result<(String, MarketType)> {
        if let Some(profile) = self.profile()? {
            return Ok((profile.exchange_id.to_string(), profile.market_type));
        }
        let id = self.id.clone().unwrap_or_else(|| "binance".to_string());
        Ok((id, self.market_type.unwrap_or(MarketType::Spot)))
    }

    pub fn credentials(&self) -> Option<ApiCredentials> {
        ApiCredentials::from_parts(self.api_key.clone(), self.api_secret.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Empty means the preset's default pairs
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "default_wpr_period")]
    pub wpr_period: usize,
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_operator")]
    pub wpr_operator: CompareOp,
    #[serde(default = "default_wpr_threshold")]
    pub wpr_threshold: f64,
    #[serde(default = "default_operator")]
    pub ema_operator: CompareOp,
    #[serde(default = "default_ema_threshold")]
    pub ema_threshold: f64,
    #[serde(default = "default_delay_minutes")]
    pub delay_minutes: u64,
}

fn default_timeframes() -> Vec<Timeframe> {
    Timeframe::ALL.to_vec()
}
fn default_wpr_period() -> usize {
    14
}
fn default_ema_period() -> usize {
    9
}
fn default_operator() -> CompareOp {
    CompareOp::GreaterOrEqual
}
fn default_wpr_threshold() -> f64 {
    -20.0
}
fn default_ema_threshold() -> f64 {
    -30.0
}
fn default_delay_minutes() -> u64 {
    5
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            watchlist: Vec::new(),
            timeframes: default_timeframes(),
            wpr_period: default_wpr_period(),
            ema_period: default_ema_period(),
            wpr_operator: default_operator(),
            wpr_threshold: default_wpr_threshold(),
            ema_operator: default_operator(),
            ema_threshold: default_ema_threshold(),
            delay_minutes: default_delay_minutes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpikeConfig {
    /// Empty means the scanner watchlist
    #[serde(default)]
    pub pairs: Vec<String>,
    #[serde(flatten)]
    pub params: SpikeParams,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(path: &str) -> Result<Self> {
        let path = shellexpand::tilde(path).into_owned();

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(Path::new(&path)).required(false))
            .add_source(
                ::config::Environment::with_prefix("KRYPTO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        tracing::debug!(path = %path, "configuration loaded");
        Ok(config)
    }

    /// Watchlist to scan, falling back to the preset's default pairs
    pub fn watchlist(&self) -> Result<Vec<String>> {
        if !self.scanner.watchlist.is_empty() {
            return Ok(self.scanner.watchlist.clone());
        }
        Ok(self
            .exchange
            .profile()?
            .map(|p| p.default_pairs.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default())
    }

    pub fn spike_pairs(&self) -> Result<Vec<String>> {
        if !self.spike.pairs.is_empty() {
            return Ok(self.spike.pairs.clone());
        }
        self.watchlist()
    }

    /// Build the engine configuration; the delay is converted to seconds
    pub fn to_scan_configuration(&self) -> Result<ScanConfiguration> {
        let (exchange_id, market_type) = self.exchange.resolve()?;
        let scanner = &self.scanner;
        let delay_secs = scanner.delay_minutes.checked_mul(60).ok_or_else(|| {
            ScannerError::InvalidConfig(format!(
                "scan delay of {} minutes is out of range",
                scanner.delay_minutes
            ))
        })?;

        Ok(ScanConfiguration {
            exchange_id,
            market_type,
            credentials: self.exchange.credentials(),
            instruments: Watchlist::new(self.watchlist()?),
            timeframes: scanner.timeframes.clone(),
            indicator_params: IndicatorParams {
                oscillator_period: scanner.wpr_period,
                ema_period: scanner.ema_period,
            },
            conditions: ScanConditions {
                oscillator: Threshold::new(scanner.wpr_operator, scanner.wpr_threshold),
                ema: Threshold::new(scanner.ema_operator, scanner.ema_threshold),
            },
            cycle_delay: Duration::from_secs(delay_secs),
            notifications: self.notifications.clone(),
        })
    }
}
