//! Trade spike detection
//!
//! Keeps a rolling window of recent trades per pair and flags bursts where
//! the volume traded in the last few seconds, or the price range covered in
//! them, is out of line with the baseline period before.

mod monitor;

pub use monitor::SpikeMonitor;

use crate::error::{Result, ScannerError};
use crate::notify::AlertCooldown;
use crate::types::Trade;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Detector tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeParams {
    /// Baseline period used for average price and trade size
    #[serde(default = "default_baseline_minutes")]
    pub baseline_minutes: u64,
    /// Spike window, in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: f64,
    #[serde(default = "default_price_threshold_percent")]
    pub price_threshold_percent: f64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Trades requested per poll
    #[serde(default = "default_trade_limit")]
    pub trade_limit: usize,
}

fn default_baseline_minutes() -> u64 {
    15
}
fn default_window_seconds() -> u64 {
    5
}
fn default_volume_multiplier() -> f64 {
    2.0
}
fn default_price_threshold_percent() -> f64 {
    0.5
}
fn default_cooldown_minutes() -> u64 {
    5
}
fn default_poll_interval_secs() -> u64 {
    2
}
fn default_trade_limit() -> usize {
    100
}

impl Default for SpikeParams {
    fn default() -> Self {
        Self {
            baseline_minutes: default_baseline_minutes(),
            window_seconds: default_window_seconds(),
            volume_multiplier: default_volume_multiplier(),
            price_threshold_percent: default_price_threshold_percent(),
            cooldown_minutes: default_cooldown_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
            trade_limit: default_trade_limit(),
        }
    }
}

impl SpikeParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ScannerError::InvalidConfig(msg.to_string()));
        if !(1..=60).contains(&self.baseline_minutes) {
            return invalid("spike baseline must be 1-60 minutes");
        }
        if !(1..=60).contains(&self.window_seconds) {
            return invalid("spike window must be 1-60 seconds");
        }
        if !(1.1..=50.0).contains(&self.volume_multiplier) {
            return invalid("volume multiplier must be between 1.1 and 50");
        }
        if !(0.01..=10.0).contains(&self.price_threshold_percent) {
            return invalid("price threshold must be between 0.01% and 10%");
        }
        if !(1..=60).contains(&self.cooldown_minutes) {
            return invalid("spike cooldown must be 1-60 minutes");
        }
        if self.poll_interval_secs == 0 || self.trade_limit == 0 {
            return invalid("poll interval and trade limit must be positive");
        }
        Ok(())
    }

    fn baseline_ms(&self) -> i64 {
        self.baseline_minutes as i64 * 60_000
    }

    fn window_ms(&self) -> i64 {
        self.window_seconds as i64 * 1_000
    }

    /// Trades kept per pair
    fn capacity(&self) -> usize {
        ((self.baseline_minutes * 60 + self.window_seconds) * 5) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpikeKind {
    Volume,
    Price,
}

impl fmt::Display for SpikeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpikeKind::Volume => f.write_str("Volume"),
            SpikeKind::Price => f.write_str("Price"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeEvent {
    pub pair: String,
    pub kinds: Vec<SpikeKind>,
    pub window_seconds: u64,
    pub window_volume: f64,
    pub volume_threshold: f64,
    pub price_change_percent: f64,
    pub price_threshold_percent: f64,
    pub detected_at: DateTime<Utc>,
}

impl SpikeEvent {
    pub fn subject(&self) -> String {
        format!("Krypto Scanner Spike: {}", self.pair)
    }
}

impl fmt::Display for SpikeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self.kinds.iter().map(|k| k.to_string()).collect();
        write!(
            f,
            "SPIKE! {} ({}) | Volume in {}s: {:.2} (threshold: {:.2}) | Price change: {:.2}% (threshold: {:.2}%)",
            self.pair,
            kinds.join(", "),
            self.window_seconds,
            self.window_volume,
            self.volume_threshold,
            self.price_change_percent,
            self.price_threshold_percent,
        )
    }
}

#[derive(Debug, Default)]
struct PairWindow {
    trades: VecDeque<Trade>,
    ids: HashSet<String>,
}

impl PairWindow {
    fn ingest(&mut self, trades: &[Trade], capacity: usize) -> usize {
        let mut added = 0;
        for trade in trades {
            if !self.ids.insert(trade.id.clone()) {
                continue;
            }
            self.trades.push_back(trade.clone());
            added += 1;
        }
        while self.trades.len() > capacity {
            if let Some(old) = self.trades.pop_front() {
                self.ids.remove(&old.id);
            }
        }
        added
    }

    fn evict_before(&mut self, cutoff_ms: i64) {
        while self.trades.front().is_some_and(|t| t.timestamp < cutoff_ms) {
            if let Some(old) = self.trades.pop_front() {
                self.ids.remove(&old.id);
            }
        }
    }
}

/// Stateful detector for any number of pairs
#[derive(Debug)]
pub struct SpikeDetector {
    params: SpikeParams,
    windows: HashMap<String, PairWindow>,
    cooldown: AlertCooldown,
}

impl SpikeDetector {
    pub fn new(params: SpikeParams) -> Self {
        Self {
            params,
            windows: HashMap::new(),
            cooldown: AlertCooldown::new(),
        }
    }

    pub fn params(&self) -> &SpikeParams {
        &self.params
    }

    /// Number of trades currently held for `pair`
    pub fn tracked(&self, pair: &str) -> usize {
        self.windows.get(pair).map_or(0, |w| w.trades.len())
    }

    /// Feed the latest trades for `pair` and check for a spike at `now_ms`
    ///
    /// Trades already seen (by id) are ignored. At most one spike is
    /// reported per pair per cooldown period.
    pub fn process(&mut self, pair: &str, trades: &[Trade], now_ms: i64) -> Option<SpikeEvent> {
        let now = DateTime::<Utc>::from_timestamp_millis(now_ms)?;
        let capacity = self.params.capacity();
        let baseline_start = now_ms - self.params.baseline_ms();
        let window_start = now_ms - self.params.window_ms();

        let window = self.windows.entry(pair.to_string()).or_default();
        window.ingest(trades, capacity);
        window.evict_before(baseline_start);

        let cooldown = chrono::Duration::minutes(self.params.cooldown_minutes as i64);
        if self.cooldown.is_cooling_down(pair, now, cooldown) {
            return None;
        }

        let baseline: Vec<&Trade> = window
            .trades
            .iter()
            .filter(|t| t.timestamp >= baseline_start)
            .collect();
        if baseline.is_empty() {
            return None;
        }

        let n = baseline.len() as f64;
        let avg_price = baseline.iter().map(|t| t.price).sum::<f64>() / n;
        let avg_amount = baseline.iter().map(|t| t.amount).sum::<f64>() / n;

        let recent: Vec<&Trade> = baseline
            .iter()
            .copied()
            .filter(|t| t.timestamp >= window_start)
            .collect();
        if recent.is_empty() {
            return None;
        }

        let window_volume: f64 = recent.iter().map(|t| t.amount).sum();
        let high = recent.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
        let low = recent.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
        let price_change_percent = if avg_price > 0.0 {
            (high - low) / avg_price * 100.0
        } else {
            0.0
        };

        let volume_threshold = avg_amount * self.params.volume_multiplier;
        let mut kinds = Vec::new();
        if window_volume > volume_threshold {
            kinds.push(SpikeKind::Volume);
        }
        if price_change_percent > self.params.price_threshold_percent {
            kinds.push(SpikeKind::Price);
        }
        if kinds.is_empty() {
            return None;
        }

        self.cooldown.record(pair, now);
        Some(SpikeEvent {
            pair: pair.to_string(),
            kinds,
            window_seconds: self.params.window_seconds,
            window_volume,
            volume_threshold,
            price_change_percent,
            price_threshold_percent: self.params.price_threshold_percent,
            detected_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn trade(id: u32, seconds_ago: i64, price: f64, amount: f64) -> Trade {
        Trade {
            id: id.to_string(),
            timestamp: NOW - seconds_ago * 1_000,
            price,
            amount,
        }
    }

    /// One trade every 30 s over the last 10 minutes, flat price
    fn quiet_history() -> Vec<Trade> {
        (0..20).map(|i| trade(i, 600 - i as i64 * 30, 100.0, 1.0)).collect()
    }

    #[test]
    fn test_defaults_validate() {
        assert!(SpikeParams::default().validate().is_ok());
        let bad = SpikeParams {
            volume_multiplier: 1.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(ScannerError::InvalidConfig(_))));
    }

    #[test]
    fn test_quiet_market_no_spike() {
        let mut detector = SpikeDetector::new(SpikeParams::default());
        let mut trades = quiet_history();
        trades.push(trade(100, 1, 100.0, 1.0));
        assert!(detector.process("BTC/USDT", &trades, NOW).is_none());
    }

    #[test]
    fn test_volume_spike() {
        let mut detector = SpikeDetector::new(SpikeParams::default());
        let mut trades = quiet_history();
        trades.push(trade(100, 2, 100.0, 30.0));

        let event = detector.process("BTC/USDT", &trades, NOW).unwrap();
        assert_eq!(event.kinds, vec![SpikeKind::Volume]);
        assert!((event.window_volume - 30.0).abs() < 1e-9);
        assert!(event.to_string().starts_with("SPIKE! BTC/USDT (Volume)"));
    }

    #[test]
    fn test_price_spike() {
        let mut detector = SpikeDetector::new(SpikeParams::default());
        let mut trades = quiet_history();
        trades.push(trade(100, 3, 100.0, 0.1));
        trades.push(trade(101, 1, 101.5, 0.1));

        let event = detector.process("ETH/USDT", &trades, NOW).unwrap();
        assert_eq!(event.kinds, vec![SpikeKind::Price]);
        assert!(event.price_change_percent > 1.0);
    }

    #[test]
    fn test_cooldown_allows_one_alert() {
        let mut detector = SpikeDetector::new(SpikeParams::default());
        let mut trades = quiet_history();
        trades.push(trade(100, 2, 100.0, 30.0));
        assert!(detector.process("BTC/USDT", &trades, NOW).is_some());

        let more = vec![trade(101, 0, 100.0, 40.0)];
        assert!(detector.process("BTC/USDT", &more, NOW + 1_000).is_none());
        // another pair is not affected
        assert!(detector.process("SOL/USDT", &trades, NOW).is_some());
    }

    #[test]
    fn test_duplicate_trades_ignored() {
        let mut detector = SpikeDetector::new(SpikeParams::default());
        let trades = quiet_history();
        detector.process("BTC/USDT", &trades, NOW);
        detector.process("BTC/USDT", &trades, NOW);
        assert_eq!(detector.tracked("BTC/USDT"), 20);
    }

    #[test]
    fn test_old_trades_leave_the_baseline() {
        let params = SpikeParams {
            baseline_minutes: 1,
            ..Default::default()
        };
        let mut detector = SpikeDetector::new(params);
        detector.process("BTC/USDT", &quiet_history(), NOW);
        // only trades from the last minute remain
        assert_eq!(detector.tracked("BTC/USDT"), 2);
    }
}
