//! Bybit v5 REST client (spot and linear contracts)

use super::{http_client, native_id, parse_kline_row, unified_symbol, value_i64, ExchangeClient};
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

const BASE_URL: &str = "https://api.bybit.com/v5/market";

const MAX_KLINES: usize = 1000;
const MAX_SPOT_TRADES: usize = 60;

/// Bybit client bound to one product category
pub struct BybitClient {
    http: Client,
    base_url: String,
    category: &'static str,
    ids: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResult<T> {
    list: Vec<T>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentInfo {
    symbol: String,
    status: String,
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    settle_coin: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default)]
    delivery_time: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerInfo {
    last_price: Option<String>,
    turnover24h: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentTrade {
    exec_id: String,
    price: String,
    size: String,
    time: String,
}

impl BybitClient {
    /// Spot markets for `Spot`, linear USDT contracts otherwise
    pub fn new(market_type: MarketType, credentials: Option<&ApiCredentials>) -> Result<Self> {
        let category = match market_type {
            MarketType::Spot => "spot",
            MarketType::Future | MarketType::Swap => "linear",
        };
        Ok(Self {
            http: http_client("X-BAPI-API-KEY", credentials)?,
            base_url: BASE_URL.to_string(),
            category,
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

    fn interval(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M1 => "1",
            Timeframe::M5 => "5",
            Timeframe::M15 => "15",
            Timeframe::H1 => "60",
            Timeframe::H4 => "240",
            Timeframe::H12 => "720",
            Timeframe::D1 => "D",
            Timeframe::W1 => "W",
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, category = self.category, "bybit request");

        let envelope: Envelope<T> = self
            .http
            .get(&url)
            .query(&[("category", self.category)])
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if envelope.ret_code != 0 {
            return Err(ScannerError::Api {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }
        envelope.result.ok_or_else(|| ScannerError::Api {
            code: envelope.ret_code,
            message: "empty result".to_string(),
        })
    }

    fn parse_market(&self, info: InstrumentInfo) -> Option<MarketInfo> {
        let active = info.status == "Trading";
        if self.category == "spot" {
            return Some(MarketInfo {
                symbol: unified_symbol(&info.base_coin, &info.quote_coin, None, None),
                id: info.symbol,
                base: info.base_coin,
                quote: info.quote_coin,
                market_type: MarketType::Spot,
                active,
                linear: false,
            });
        }

        let settle = info.settle_coin.clone().unwrap_or_else(|| info.quote_coin.clone());
        let (market_type, expiry) = match info.contract_type.as_deref() {
            Some("LinearPerpetual") => (MarketType::Swap, None),
            Some("LinearFutures") => (
                MarketType::Future,
                info.delivery_time.as_ref().and_then(value_i64),
            ),
            _ => return None,
        };
        Some(MarketInfo {
            symbol: unified_symbol(&info.base_coin, &info.quote_coin, Some(&settle), expiry),
            id: info.symbol,
            base: info.base_coin,
            quote: info.quote_coin,
            market_type,
            active,
            linear: true,
        })
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn id(&self) -> &str {
        "bybit"
    }

    async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>> {
        let mut markets = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("limit", "1000".to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }
            let page: ListResult<InstrumentInfo> = self.get("instruments-info", &query).await?;

            for m in page.list.into_iter().filter_map(|i| self.parse_market(i)) {
                markets.insert(m.symbol.clone(), m);
            }

            match page.next_page_cursor.filter(|c| !c.is_empty()) {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }

        *self.ids.write() = markets
            .values()
            .map(|m| (m.symbol.clone(), m.id.clone()))
            .collect();

        debug!(category = self.category, count = markets.len(), "markets loaded");
        Ok(markets)
    }

    async fn fetch_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let page: ListResult<Vec<Value>> = self
            .get(
                "kline",
                &[
                    ("symbol", self.market_id(symbol)),
                    ("interval", Self::interval(timeframe).to_string()),
                    ("limit", limit.min(MAX_KLINES).to_string()),
                ],
            )
            .await?;

        // Bybit returns newest first
        let mut candles: Vec<Candle> = page.list.iter().filter_map(|r| parse_kline_row(r)).collect();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let page: ListResult<TickerInfo> = self
            .get("tickers", &[("symbol", self.market_id(symbol))])
            .await?;

        let info = page.list.into_iter().next();
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: info
                .as_ref()
                .and_then(|t| t.last_price.as_deref())
                .and_then(|s| s.parse().ok()),
            quote_volume: info
                .as_ref()
                .and_then(|t| t.turnover24h.as_deref())
                .and_then(|s| s.parse().ok()),
        })
    }

    async fn fetch_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>> {
        let cap = if self.category == "spot" { MAX_SPOT_TRADES } else { MAX_KLINES };
        let page: ListResult<RecentTrade> = self
            .get(
                "recent-trade",
                &[
                    ("symbol", self.market_id(symbol)),
                    ("limit", limit.min(cap).to_string()),
                ],
            )
            .await?;

        let mut trades: Vec<Trade> = page
            .list
            .into_iter()
            .filter_map(|t| {
                Some(Trade {
                    id: t.exec_id,
                    timestamp: t.time.parse().ok()?,
                    price: t.price.parse().ok()?,
                    amount: t.size.parse().ok()?,
                })
            })
            .collect();
        trades.sort_by_key(|t| t.timestamp);
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(json: &str) -> InstrumentInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_category_by_market_type() {
        assert_eq!(BybitClient::new(MarketType::Spot, None).unwrap().category, "spot");
        assert_eq!(BybitClient::new(MarketType::Swap, None).unwrap().category, "linear");
        assert_eq!(BybitClient::new(MarketType::Future, None).unwrap().category, "linear");
    }

    #[test]
    fn test_intervals() {
        assert_eq!(BybitClient::interval(Timeframe::H4), "240");
        assert_eq!(BybitClient::interval(Timeframe::D1), "D");
        assert_eq!(BybitClient::interval(Timeframe::W1), "W");
    }

    #[test]
    fn test_parse_linear_instruments() {
        let client = BybitClient::new(MarketType::Swap, None).unwrap();
        let perp = client
            .parse_market(instrument(
                r#"{"symbol":"BTCUSDT","status":"Trading","baseCoin":"BTC","quoteCoin":"USDT",
                    "settleCoin":"USDT","contractType":"LinearPerpetual","deliveryTime":"0"}"#,
            ))
            .unwrap();
        assert_eq!(perp.symbol, "BTC/USDT:USDT");
        assert_eq!(perp.market_type, MarketType::Swap);
        assert!(perp.active);

        let inverse = client.parse_market(instrument(
            r#"{"symbol":"BTCUSD","status":"Trading","baseCoin":"BTC","quoteCoin":"USD",
                "contractType":"InversePerpetual"}"#,
        ));
        assert!(inverse.is_none());
    }

    #[test]
    fn test_parse_spot_instrument() {
        let client = BybitClient::new(MarketType::Spot, None).unwrap();
        let spot = client
            .parse_market(instrument(
                r#"{"symbol":"ETHUSDT","status":"Closed","baseCoin":"ETH","quoteCoin":"USDT"}"#,
            ))
            .unwrap();
        assert_eq!(spot.symbol, "ETH/USDT");
        assert!(!spot.active);
    }

    #[test]
    fn test_envelope_error_payload() {
        let env: Envelope<ListResult<TickerInfo>> =
            serde_json::from_str(r#"{"retCode":10001,"retMsg":"params error","result":null}"#).unwrap();
        assert_eq!(env.ret_code, 10001);
        assert_eq!(env.ret_msg, "params error");
        assert!(env.result.is_none());
    }

    #[test]
    fn test_ticker_page() {
        let env: Envelope<ListResult<TickerInfo>> = serde_json::from_str(
            r#"{"retCode":0,"retMsg":"OK","result":{"category":"linear",
                "list":[{"symbol":"BTCUSDT","lastPrice":"65000.5","turnover24h":"1234567.8"}]}}"#,
        )
        .unwrap();
        let page = env.result.unwrap();
        assert_eq!(page.list[0].turnover24h.as_deref(), Some("1234567.8"));
        assert!(page.next_page_cursor.is_none());
    }
}
