//! Alert de-duplication

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Remembers when each symbol was last alerted
#[derive(Debug, Default)]
pub struct AlertCooldown {
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl AlertCooldown {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while `symbol` was alerted less than `window` ago
    pub fn is_cooling_down(&self, symbol: &str, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_alert.get(symbol) {
            Some(last) => now - *last < window,
            None => false,
        }
    }

    pub fn record(&mut self, symbol: &str, now: DateTime<Utc>) {
        self.last_alert.insert(symbol.to_string(), now);
    }

    /// Record and return true if `symbol` may alert now
    pub fn try_acquire(&mut self, symbol: &str, now: DateTime<Utc>, window: Duration) -> bool {
        if self.is_cooling_down(symbol, now, window) {
            return false;
        }
        self.record(symbol, now);
        true
    }

    /// Drop entries that can no longer suppress anything
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        self.last_alert.retain(|_, last| now - *last < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_alert_allowed() {
        let mut cd = AlertCooldown::new();
        let now = Utc::now();
        assert!(!cd.is_cooling_down("BTC/USDT", now, Duration::minutes(60)));
        assert!(cd.try_acquire("BTC/USDT", now, Duration::minutes(60)));
        assert!(cd.is_cooling_down("BTC/USDT", now, Duration::minutes(60)));
    }

    #[test]
    fn test_repeat_alert_suppressed_within_window() {
        let mut cd = AlertCooldown::new();
        let t0 = Utc::now();
        cd.record("BTC/USDT", t0);
        let window = Duration::minutes(30);

        assert!(!cd.try_acquire("BTC/USDT", t0 + Duration::minutes(29), window));
        // suppression does not move the timestamp
        assert!(cd.try_acquire("BTC/USDT", t0 + Duration::minutes(30), window));
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut cd = AlertCooldown::new();
        let now = Utc::now();
        cd.record("BTC/USDT", now);
        assert!(cd.try_acquire("ETH/USDT", now, Duration::minutes(60)));
    }

    #[test]
    fn test_zero_window_never_suppresses() {
        let mut cd = AlertCooldown::new();
        let now = Utc::now();
        cd.record("BTC/USDT", now);
        assert!(cd.try_acquire("BTC/USDT", now, Duration::zero()));
    }

    #[test]
    fn test_prune() {
        let mut cd = AlertCooldown::new();
        let t0 = Utc::now();
        cd.record("OLD/USDT", t0 - Duration::hours(3));
        cd.record("NEW/USDT", t0);
        cd.prune(t0, Duration::hours(1));

        let day = Duration::hours(24);
        assert!(!cd.is_cooling_down("OLD/USDT", t0, day));
        assert!(cd.is_cooling_down("NEW/USDT", t0, day));
    }

    #[test]
    fn test_unbounded_window_keeps_entries() {
        let mut cd = AlertCooldown::new();
        let t0 = Utc::now();
        cd.record("BTC/USDT", t0 - Duration::days(3650));
        cd.prune(t0, Duration::MAX);
        assert!(!cd.try_acquire("BTC/USDT", t0, Duration::MAX));
    }
}
