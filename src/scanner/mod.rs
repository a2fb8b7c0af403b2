//! Periodic multi-timeframe scanner
//!
//! A [`ScanEngine`] runs one background task that repeatedly walks the
//! watchlist, evaluates Williams %R and its EMA on every selected timeframe
//! and reports each instrument as passed or failed over an event channel.

mod engine;
mod evaluate;


pub use engine::{cancellable_delay, EngineState, ScanEngine};
pub use evaluate::{evaluate_instrument, InstrumentOutcome, TimeframeReading};

use crate::error::{Result, ScannerError};
use crate::notify::{NotificationSettings, MAX_COOLDOWN_MINUTES};
use crate::types::{ApiCredentials, MarketType, Threshold, Timeframe};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Extra bars fetched beyond the indicator warm-up
pub const CANDLE_MARGIN: usize = 50;

/// Symbols to scan, shared between the front-end and the worker
///
/// The worker takes a snapshot at the start of every cycle, so edits
/// made while a cycle runs apply from the next one.
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    symbols: Arc<RwLock<Vec<String>>>,
}

impl Watchlist {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: Arc::new(RwLock::new(symbols.into_iter().map(Into::into).collect())),
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.symbols.read().clone()
    }

    pub fn set(&self, symbols: Vec<String>) {
        *self.symbols.write() = symbols;
    }

    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    /// Williams %R lookback
    pub oscillator_period: usize,
    /// EMA length applied to the %R series
    pub ema_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            oscillator_period: 14,
            ema_period: 9,
        }
    }
}

impl IndicatorParams {
    /// Bars requested per timeframe
    pub fn fetch_limit(&self) -> usize {
        self.oscillator_period + self.ema_period + CANDLE_MARGIN
    }

    /// Fewest bars that still yield one EMA value
    pub fn min_bars(&self) -> usize {
        (self.oscillator_period + self.ema_period).saturating_sub(1)
    }
}

/// Both clauses must hold on the same timeframe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConditions {
    pub oscillator: Threshold,
    pub ema: Threshold,
}

impl ScanConditions {
    pub fn holds(&self, oscillator: f64, ema: f64) -> bool {
        self.oscillator.holds(oscillator) && self.ema.holds(ema)
    }
}

impl fmt::Display for ScanConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W%R {}, EMA(W%R) {}", self.oscillator, self.ema)
    }
}

/// Everything one run of the engine needs; fixed once the run starts
#[derive(Debug, Clone)]
pub struct ScanConfiguration {
    pub exchange_id: String,
    pub market_type: MarketType,
    pub credentials: Option<ApiCredentials>,
    pub instruments: Watchlist,
    pub timeframes: Vec<Timeframe>,
    pub indicator_params: IndicatorParams,
    pub conditions: ScanConditions,
    pub cycle_delay: Duration,
    pub notifications: NotificationSettings,
}

impl ScanConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(ScannerError::EmptyWatchlist);
        }
        if self.timeframes.is_empty() {
            return Err(ScannerError::NoTimeframesSelected);
        }
        if self.exchange_id.trim().is_empty() {
            return Err(ScannerError::InvalidConfig("exchange id is empty".into()));
        }
        if self.indicator_params.oscillator_period == 0 || self.indicator_params.ema_period == 0 {
            return Err(ScannerError::InvalidConfig(
                "indicator periods must be at least 1".into(),
            ));
        }
        if self.cycle_delay < Duration::from_secs(1) {
            return Err(ScannerError::InvalidConfig(
                "cycle delay must be at least one second".into(),
            ));
        }
        if self.notifications.cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return Err(ScannerError::InvalidConfig(format!(
                "alert cooldown must be at most {} minutes",
                MAX_COOLDOWN_MINUTES
            )));
        }
        Ok(())
    }
}

/// Category of a reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyWatchlist,
    ExchangeInit,
    Fetch,
    Other,
}

impl ErrorKind {
    pub fn of(error: &ScannerError) -> Self {
        match error {
            ScannerError::EmptyWatchlist => ErrorKind::EmptyWatchlist,
            ScannerError::ExchangeInit { .. } => ErrorKind::ExchangeInit,
            ScannerError::Fetch { .. } => ErrorKind::Fetch,
            _ => ErrorKind::Other,
        }
    }
}

/// Progress reported by the engine to whoever presents it
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    CycleStarted {
        cycle: u64,
    },
    /// Results of earlier cycles are stale from here on
    ResultsCleared {
        cycle: u64,
    },
    InstrumentPassed {
        cycle: u64,
        symbol: String,
        timeframe: Timeframe,
        oscillator_value: f64,
        ema_value: f64,
        volume_display: String,
    },
    InstrumentFailed {
        cycle: u64,
        symbol: String,
        reason: String,
    },
    CycleCompleted {
        cycle: u64,
        next_delay: Duration,
    },
    LogLine(String),
    ErrorOccurred {
        kind: ErrorKind,
        message: String,
    },
    EngineStopped,
}

impl ScanEvent {
    pub(crate) fn error(error: &ScannerError) -> Self {
        ScanEvent::ErrorOccurred {
            kind: ErrorKind::of(error),
            message: error.to_string(),
        }
    }
}
