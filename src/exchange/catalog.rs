//! Market catalog: the USDT pairs an exchange offers for one market type

use super::ExchangeFactory;
use crate::error::{Result, ScannerError};
use crate::types::{Instrument, MarketInfo, MarketType};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Whether a market belongs in the catalog for `exchange_id` + `filter`
pub fn type_matches(exchange_id: &str, filter: MarketType, market: &MarketInfo) -> bool {
    if !(market.active && market.quote.eq_ignore_ascii_case("USDT")) {
        return false;
    }

    if market.market_type == filter {
        return true;
    }

    // USDT-M "futures" covers perpetuals as well as dated contracts
    exchange_id == "binanceusdm"
        && filter == MarketType::Future
        && market.linear
        && matches!(market.market_type, MarketType::Future | MarketType::Swap)
}

/// Filter, deduplicate by symbol and sort ascending
pub fn filter_catalog<'a, I>(exchange_id: &str, filter: MarketType, markets: I) -> Vec<Instrument>
where
    I: IntoIterator<Item = &'a MarketInfo>,
{
    let unique: BTreeMap<&str, Instrument> = markets
        .into_iter()
        .filter(|m| type_matches(exchange_id, filter, m))
        .map(|m| {
            (
                m.symbol.as_str(),
                Instrument {
                    symbol: m.symbol.clone(),
                    id: m.id.clone(),
                    market_type: m.market_type,
                },
            )
        })
        .collect();

    unique.into_values().collect()
}

/// Fetch the catalog once; retries are up to the caller
pub async fn fetch_catalog(
    factory: &dyn ExchangeFactory,
    exchange_id: &str,
    market_type: MarketType,
) -> Result<Vec<Instrument>> {
    let network = |reason: String| ScannerError::Network {
        exchange: exchange_id.to_string(),
        reason,
    };

    let client = factory
        .create(exchange_id, market_type, None)
        .map_err(|e| network(e.to_string()))?;

    let markets = client.load_markets().await.map_err(|e| {
        warn!(exchange = exchange_id, error = %e, "failed to load markets");
        network(e.to_string())
    })?;

    let catalog = filter_catalog(exchange_id, market_type, markets.values());
    info!(
        exchange = exchange_id,
        market_type = %market_type,
        pairs = catalog.len(),
        "market catalog fetched"
    );
    Ok(catalog)
}
