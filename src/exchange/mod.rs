//! Exchange connectivity
//!
//! The scanner only talks to exchanges through [`ExchangeClient`]. Concrete
//! clients are resolved by exchange id through an [`ExchangeFactory`].

pub mod binance;
pub mod bybit;
pub mod catalog;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use catalog::{fetch_catalog, filter_catalog, type_matches};

use crate::error::{Result, ScannerError};
use crate::types::{ApiCredentials, Candle, MarketInfo, MarketType, Ticker, Timeframe, Trade};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for exchange HTTP calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability interface consumed by the scanner
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Exchange identifier, e.g. `binanceusdm`
    fn id(&self) -> &str;

    /// Load every market the exchange lists, keyed by unified symbol
    async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>>;

    /// Candles oldest first; empty when the exchange has no data
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: usize)
        -> Result<Vec<Candle>>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker>;

    /// Most recent public trades, oldest first
    async fn fetch_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>>;
}

/// Builds exchange clients by id
pub trait ExchangeFactory: Send + Sync {
    fn create(
        &self,
        exchange_id: &str,
        market_type: MarketType,
        credentials: Option<&ApiCredentials>,
    ) -> Result<Arc<dyn ExchangeClient>>;
}

/// Default factory over the built-in REST clients
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeRegistry;

impl ExchangeRegistry {
    pub const SUPPORTED: &'static [&'static str] = &["binance", "binanceusdm", "bybit"];
}

impl ExchangeFactory for ExchangeRegistry {
    fn create(
        &self,
        exchange_id: &str,
        market_type: MarketType,
        credentials: Option<&ApiCredentials>,
    ) -> Result<Arc<dyn ExchangeClient>> {
        let client: Arc<dyn ExchangeClient> = match exchange_id {
            "binance" => Arc::new(BinanceClient::spot(credentials)?),
            "binanceusdm" => Arc::new(BinanceClient::usdm(credentials)?),
            "bybit" => Arc::new(BybitClient::new(market_type, credentials)?),
            other => return Err(ScannerError::UnknownExchange(other.to_string())),
        };
        Ok(client)
    }
}

/// Named exchange + market type combination offered to users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeProfile {
    pub name: &'static str,
    pub exchange_id: &'static str,
    pub market_type: MarketType,
    pub default_pairs: &'static [&'static str],
}

pub const EXCHANGE_PROFILES: &[ExchangeProfile] = &[
    ExchangeProfile {
        name: "Binance (Spot)",
        exchange_id: "binance",
        market_type: MarketType::Spot,
        default_pairs: &["BTC/USDT", "ETH/USDT"],
    },
    ExchangeProfile {
        name: "Binance (Futures USDT-M)",
        exchange_id: "binanceusdm",
        market_type: MarketType::Future,
        default_pairs: &["BTC/USDT", "ETH/USDT"],
    },
    ExchangeProfile {
        name: "Bybit (Spot)",
        exchange_id: "bybit",
        market_type: MarketType::Spot,
        default_pairs: &["BTC/USDT", "ETH/USDT"],
    },
    ExchangeProfile {
        name: "Bybit (Perpetual USDT)",
        exchange_id: "bybit",
        market_type: MarketType::Swap,
        default_pairs: &["BTC/USDT:USDT", "ETH/USDT:USDT"],
    },
];

/// Look up a profile by its display name, case-insensitive
pub fn find_profile(name: &str) -> Option<&'static ExchangeProfile> {
    EXCHANGE_PROFILES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// `BTC/USDT:USDT` -> `BTCUSDT`, used when markets are not loaded yet
pub(crate) fn native_id(symbol: &str) -> String {
    symbol
        .split(':')
        .next()
        .unwrap_or(symbol)
        .replace('/', "")
        .to_uppercase()
}

/// Unified symbol for a contract or spot pair
pub(crate) fn unified_symbol(
    base: &str,
    quote: &str,
    settle: Option<&str>,
    expiry_ms: Option<i64>,
) -> String {
    let mut symbol = format!("{}/{}", base, quote);
    if let Some(settle) = settle {
        symbol.push(':');
        symbol.push_str(settle);
        if let Some(date) = expiry_ms
            .filter(|ms| *ms > 0)
            .and_then(|ms| chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms))
        {
            symbol.push('-');
            symbol.push_str(&date.format("%y%m%d").to_string());
        }
    }
    symbol
}

/// Number that may be sent as a JSON string or a JSON number
pub(crate) fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

pub(crate) fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Candle from an exchange kline row `[ts, open, high, low, close, volume, ...]`
pub(crate) fn parse_kline_row(row: &[Value]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    Some(Candle {
        timestamp: value_i64(&row[0])?,
        open: value_f64(&row[1])?,
        high: value_f64(&row[2])?,
        low: value_f64(&row[3])?,
        close: value_f64(&row[4])?,
        volume: value_f64(&row[5])?,
    })
}

pub(crate) fn http_client(
    api_key_header: &'static str,
    credentials: Option<&ApiCredentials>,
) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(creds) = credentials {
        let value = HeaderValue::from_str(&creds.api_key)
            .map_err(|e| ScannerError::InvalidConfig(format!("API key: {}", e)))?;
        headers.insert(api_key_header, value);
    }

    let http = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .default_headers(headers)
        .build()?;
    Ok(http)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profiles() {
        assert_eq!(EXCHANGE_PROFILES.len(), 4);
        let perp = find_profile("bybit (perpetual usdt)").unwrap();
        assert_eq!(perp.exchange_id, "bybit");
        assert_eq!(perp.market_type, MarketType::Swap);
        assert!(find_profile("Kraken").is_none());
    }

    #[test]
    fn test_registry_rejects_unknown_exchange() {
        let result = ExchangeRegistry.create("kraken", MarketType::Spot, None);
        assert!(matches!(result, Err(ScannerError::UnknownExchange(id)) if id == "kraken"));
    }

    #[test]
    fn test_registry_builds_known_exchanges() {
        for id in ExchangeRegistry::SUPPORTED {
            let client = ExchangeRegistry.create(id, MarketType::Spot, None).unwrap();
            assert_eq!(client.id(), *id);
        }
    }

    #[test]
    fn test_native_id() {
        assert_eq!(native_id("BTC/USDT"), "BTCUSDT");
        assert_eq!(native_id("eth/usdt:USDT"), "ETHUSDT");
    }

    #[test]
    fn test_unified_symbol() {
        assert_eq!(unified_symbol("BTC", "USDT", None, None), "BTC/USDT");
        assert_eq!(unified_symbol("BTC", "USDT", Some("USDT"), Some(0)), "BTC/USDT:USDT");
        // 2025-03-28 08:00 UTC
        assert_eq!(
            unified_symbol("BTC", "USDT", Some("USDT"), Some(1_743_148_800_000)),
            "BTC/USDT:USDT-250328"
        );
    }

    #[test]
    fn test_parse_kline_row() {
        let row = vec![
            json!(1_700_000_000_000i64),
            json!("1.0"),
            json!("2.5"),
            json!("0.5"),
            json!("2.0"),
            json!(123.4),
        ];
        let candle = parse_kline_row(&row).unwrap();
        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.high, 2.5);
        assert_eq!(candle.volume, 123.4);

        assert!(parse_kline_row(&row[..4]).is_none());
        let bad = vec![json!(1), json!("x"), json!("1"), json!("1"), json!("1"), json!("1")];
        assert!(parse_kline_row(&bad).is_none());
    }
}
