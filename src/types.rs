//! Core market types shared by the exchange clients, the scanner and the spike detector

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScannerError;

/// Candle aggregation interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Duration in minutes, used for ordering
    pub fn minutes(self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::H12 => 720,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    /// Sort longest first, dropping duplicates
    pub fn sorted_descending(timeframes: &[Timeframe]) -> Vec<Timeframe> {
        let mut sorted = timeframes.to_vec();
        sorted.sort_by(|a, b| b.minutes().cmp(&a.minutes()));
        sorted.dedup();
        sorted
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.label() == s)
            .ok_or_else(|| ScannerError::InvalidConfig(format!("unknown timeframe '{}'", s)))
    }
}

/// Market type as exposed by the exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    /// Dated (delivery) contracts
    Future,
    /// Perpetual contracts
    Swap,
}

impl MarketType {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Future => "future",
            MarketType::Swap => "swap",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spot" => Ok(MarketType::Spot),
            "future" | "futures" => Ok(MarketType::Future),
            "swap" | "perp" | "perpetual" => Ok(MarketType::Swap),
            other => Err(ScannerError::InvalidConfig(format!(
                "unknown market type '{}'",
                other
            ))),
        }
    }
}

/// Threshold comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl CompareOp {
    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            CompareOp::GreaterOrEqual => value >= threshold,
            CompareOp::LessOrEqual => value <= threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::LessOrEqual => "<=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CompareOp {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">=" | "≥" => Ok(CompareOp::GreaterOrEqual),
            "<=" | "≤" => Ok(CompareOp::LessOrEqual),
            other => Err(ScannerError::InvalidConfig(format!(
                "unknown operator '{}'",
                other
            ))),
        }
    }
}

/// One clause of the scan condition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub op: CompareOp,
    pub value: f64,
}

impl Threshold {
    pub fn new(op: CompareOp, value: f64) -> Self {
        Self { op, value }
    }

    /// NaN never satisfies a threshold
    pub fn holds(&self, value: f64) -> bool {
        !value.is_nan() && self.op.apply(value, self.value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.value)
    }
}

/// OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, unix millis
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 24h ticker snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: Option<f64>,
    /// 24h volume in quote currency, not every exchange reports it
    pub quote_volume: Option<f64>,
}

/// Public trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    /// Unix millis
    pub timestamp: i64,
    pub price: f64,
    pub amount: f64,
}

/// Market description returned by `load_markets`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// Unified symbol, e.g. `BTC/USDT` or `BTC/USDT:USDT`
    pub symbol: String,
    /// Exchange-native id, e.g. `BTCUSDT`
    pub id: String,
    pub base: String,
    pub quote: String,
    pub market_type: MarketType,
    pub active: bool,
    pub linear: bool,
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub id: String,
    pub market_type: MarketType,
}

/// Optional API key pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    /// Only a complete pair counts
    pub fn from_parts(api_key: Option<String>, api_secret: Option<String>) -> Option<Self> {
        match (api_key, api_secret) {
            (Some(k), Some(s)) if !k.is_empty() && !s.is_empty() => Some(Self {
                api_key: k,
                api_secret: s,
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

/// Quote currency of a unified symbol: `BTC/USDT:USDT` -> `USDT`
pub fn quote_currency(symbol: &str) -> &str {
    let quote = symbol.rsplit('/').next().unwrap_or(symbol);
    quote.split(':').next().unwrap_or(quote)
}
