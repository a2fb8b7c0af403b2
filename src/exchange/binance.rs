//! Binance REST client (spot and USDT-M futures)

use super::{http_client, native_id, parse_kline_row, unified_symbol, ExchangeClient};
use crate::error::{Result, ScannerError};
use crate::types::{ApiCredentials, Candle, MarketInfo, MarketType, Ticker, Timeframe, Trade};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const SPOT_URL: &str = "https://api.binance.com/api/v3";
const USDM_URL: &str = "https://fapi.binance.com/fapi/v1";

/// Kline request cap on both venues
const MAX_KLINES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Venue {
    Spot,
    UsdM,
}

/// Binance client
pub struct BinanceClient {
    http: Client,
    base_url: String,
    venue: Venue,
    /// Unified symbol -> native id, filled by `load_markets`
    ids: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    margin_asset: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default)]
    delivery_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: Option<String>,
    quote_volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    id: i64,
    price: String,
    qty: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    msg: String,
}

impl BinanceClient {
    pub fn spot(credentials: Option<&ApiCredentials>) -> Result<Self> {
        Self::with_base_url(SPOT_URL, Venue::Spot, credentials)
    }

    /// USDT-margined futures (`binanceusdm`)
    pub fn usdm(credentials: Option<&ApiCredentials>) -> Result<Self> {
        Self::with_base_url(USDM_URL, Venue::UsdM, credentials)
    }

    fn with_base_url(base_url: &str, venue: Venue, credentials: Option<&ApiCredentials>) -> Result<Self> {
        Ok(Self {
            http: http_client("X-MBX-APIKEY", credentials)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            venue,
            ids: RwLock::new(HashMap::new()),
        })
    }

    fn market_id(&self, symbol: &str) -> String {
        self.ids
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| native_id(symbol))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "binance request");

        let resp = self.http.get(&url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => ScannerError::Api {
                    code: err.code,
                    message: err.msg,
                },
                Err(_) => ScannerError::Api {
                    code: i64::from(status.as_u16()),
                    message: body,
                },
            });
        }
        Ok(resp.json().await?)
    }

    fn parse_market(&self, info: SymbolInfo) -> Option<MarketInfo> {
        let active = info.status == "TRADING";
        match self.venue {
            Venue::Spot => Some(MarketInfo {
                symbol: unified_symbol(&info.base_asset, &info.quote_asset, None, None),
                id: info.symbol,
                base: info.base_asset,
                quote: info.quote_asset,
                market_type: MarketType::Spot,
                active,
                linear: false,
            }),
            Venue::UsdM => {
                let settle = info.margin_asset.clone().unwrap_or_else(|| info.quote_asset.clone());
                let (market_type, expiry) = match info.contract_type.as_deref() {
                    Some("PERPETUAL") => (MarketType::Swap, None),
                    Some("CURRENT_QUARTER") | Some("NEXT_QUARTER") => {
                        (MarketType::Future, info.delivery_date)
                    }
                    _ => return None,
                };
                Some(MarketInfo {
                    symbol: unified_symbol(&info.base_asset, &info.quote_asset, Some(&settle), expiry),
                    id: info.symbol,
                    base: info.base_asset,
                    quote: info.quote_asset,
                    market_type,
                    active,
                    linear: true,
                })
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn id(&self) -> &str {
        match self.venue {
            Venue::Spot => "binance",
            Venue::UsdM => "binanceusdm",
        }
    }

    async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>> {
        let info: ExchangeInfo = self.get("exchangeInfo", &[]).await?;

        let markets: HashMap<String, MarketInfo> = info
            .symbols
            .into_iter()
            .filter_map(|s| self.parse_market(s))
            .map(|m| (m.symbol.clone(), m))
            .collect();

        *self.ids.write() = markets
            .values()
            .map(|m| (m.symbol.clone(), m.id.clone()))
            .collect();

        debug!(exchange = self.id(), count = markets.len(), "markets loaded");
        Ok(markets)
    }

    async fn fetch_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<Value>> = self
            .get(
                "klines",
                &[
                    ("symbol", self.market_id(symbol)),
                    ("interval", timeframe.label().to_string()),
                    ("limit", limit.min(MAX_KLINES).to_string()),
                ],
            )
            .await?;

        Ok(rows.iter().filter_map(|r| parse_kline_row(r)).collect())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let t: Ticker24h = self
            .get("ticker/24hr", &[("symbol", self.market_id(symbol))])
            .await?;

        Ok(Ticker {
            symbol: symbol.to_string(),
            last: t.last_price.as_deref().and_then(|s| s.parse().ok()),
            quote_volume: t.quote_volume.as_deref().and_then(|s| s.parse().ok()),
        })
    }

    async fn fetch_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>> {
        let raw: Vec<RawTrade> = self
            .get(
                "trades",
                &[
                    ("symbol", self.market_id(symbol)),
                    ("limit", limit.min(MAX_KLINES).to_string()),
                ],
            )
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|t| {
                Some(Trade {
                    id: t.id.to_string(),
                    timestamp: t.time,
                    price: t.price.parse().ok()?,
                    amount: t.qty.parse().ok()?,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol_info(json: &str) -> SymbolInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_spot_market() {
        let client = BinanceClient::spot(None).unwrap();
        let market = client
            .parse_market(symbol_info(
                r#"{"symbol":"BTCUSDT","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT"}"#,
            ))
            .unwrap();
        assert_eq!(market.symbol, "BTC/USDT");
        assert_eq!(market.id, "BTCUSDT");
        assert_eq!(market.market_type, MarketType::Spot);
        assert!(market.active);
        assert!(!market.linear);
    }

    #[test]
    fn test_parse_usdm_contracts() {
        let client = BinanceClient::usdm(None).unwrap();
        let perp = client
            .parse_market(symbol_info(
                r#"{"symbol":"ETHUSDT","status":"TRADING","baseAsset":"ETH","quoteAsset":"USDT",
                    "marginAsset":"USDT","contractType":"PERPETUAL","deliveryDate":4133404800000}"#,
            ))
            .unwrap();
        assert_eq!(perp.symbol, "ETH/USDT:USDT");
        assert_eq!(perp.market_type, MarketType::Swap);
        assert!(perp.linear);

        let quarterly = client
            .parse_market(symbol_info(
                r#"{"symbol":"BTCUSDT_250328","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT",
                    "marginAsset":"USDT","contractType":"CURRENT_QUARTER","deliveryDate":1743148800000}"#,
            ))
            .unwrap();
        assert_eq!(quarterly.symbol, "BTC/USDT:USDT-250328");
        assert_eq!(quarterly.market_type, MarketType::Future);

        let settling = client.parse_market(symbol_info(
            r#"{"symbol":"XUSDT","status":"SETTLING","baseAsset":"X","quoteAsset":"USDT","contractType":""}"#,
        ));
        assert!(settling.is_none());
    }

    #[test]
    fn test_market_id_fallback() {
        let client = BinanceClient::spot(None).unwrap();
        assert_eq!(client.market_id("SOL/USDT"), "SOLUSDT");
        client
            .ids
            .write()
            .insert("BTC/USDT:USDT-250328".to_string(), "BTCUSDT_250328".to_string());
        assert_eq!(client.market_id("BTC/USDT:USDT-250328"), "BTCUSDT_250328");
    }
}
