//! Per-instrument evaluation across timeframes

use super::{IndicatorParams, ScanConditions};
use crate::error::{Result, ScannerError};
use crate::exchange::ExchangeClient;
use crate::indicators::{drop_nan, ema, last_value, williams_r};
use crate::types::{Candle, Timeframe};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Indicator values at the latest bar of one timeframe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeframeReading {
    pub timeframe: Timeframe,
    pub oscillator: f64,
    pub ema: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentOutcome {
    /// Every timeframe passed; carries the longest timeframe's values
    Passed(TimeframeReading),
    Failed { timeframe: Timeframe, reason: String },
    /// Stop was requested before all timeframes were evaluated
    Cancelled,
}

enum Step {
    Reading(TimeframeReading),
    Rejected(String),
}

/// Evaluate `symbol` on `timeframes`, which must already be sorted longest
/// first. The first failing timeframe ends the evaluation.
///
/// Fetch errors are returned as [`ScannerError::Fetch`]; indicator
/// failures and unmet conditions are a normal [`InstrumentOutcome::Failed`].
pub async fn evaluate_instrument(
    client: &dyn ExchangeClient,
    symbol: &str,
    timeframes: &[Timeframe],
    params: IndicatorParams,
    conditions: ScanConditions,
    token: &CancellationToken,
) -> Result<InstrumentOutcome> {
    let mut reported: Option<TimeframeReading> = None;

    for &timeframe in timeframes {
        if token.is_cancelled() {
            return Ok(InstrumentOutcome::Cancelled);
        }

        let candles = client
            .fetch_ohlcv(symbol, timeframe, params.fetch_limit())
            .await
            .map_err(|e| ScannerError::Fetch {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                reason: e.to_string(),
            })?;

        let reading = match evaluate_timeframe(&candles, timeframe, params) {
            Step::Reading(reading) => reading,
            Step::Rejected(reason) => {
                debug!(symbol, %timeframe, %reason, "timeframe rejected");
                return Ok(InstrumentOutcome::Failed { timeframe, reason });
            }
        };

        if !conditions.holds(reading.oscillator, reading.ema) {
            return Ok(InstrumentOutcome::Failed {
                timeframe,
                reason: format!(
                    "W%R {:.2}, EMA {:.2} do not meet {}",
                    reading.oscillator, reading.ema, conditions
                ),
            });
        }

        reported.get_or_insert(reading);
    }

    match reported {
        Some(reading) => Ok(InstrumentOutcome::Passed(reading)),
        None => Err(ScannerError::NoTimeframesSelected),
    }
}

fn evaluate_timeframe(
    candles: &[Candle],
    timeframe: Timeframe,
    params: IndicatorParams,
) -> Step {
    if candles.len() < params.min_bars() {
        return Step::Rejected(format!(
            "insufficient data: {} bars, need {}",
            candles.len(),
            params.min_bars()
        ));
    }

    let wpr = williams_r(candles, params.oscillator_period);
    let oscillator = match last_value(&wpr) {
        Some(v) => v,
        None => return Step::Rejected("W%R undefined at latest bar".into()),
    };

    let smoothed = ema(&drop_nan(&wpr), params.ema_period);
    match last_value(&smoothed) {
        Some(ema) => Step::Reading(TimeframeReading {
            timeframe,
            oscillator,
            ema,
        }),
        None => Step::Rejected("EMA(W%R) undefined at latest bar".into()),
    }
}
