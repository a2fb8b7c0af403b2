//! Error types for the scanner

use thiserror::Error;

/// Scanner error type
#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Watchlist is empty at start or at the beginning of a cycle
    #[error("Watchlist is empty")]
    EmptyWatchlist,

    #[error("No timeframes selected")]
    NoTimeframesSelected,

    #[error("Scan is already running")]
    AlreadyRunning,

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    /// Exchange could not be initialised (markets not loaded)
    #[error("Exchange {exchange} initialisation failed: {reason}")]
    ExchangeInit { exchange: String, reason: String },

    /// Market list could not be fetched
    #[error("Failed to fetch pairs for {exchange}: {reason}")]
    Network { exchange: String, reason: String },

    /// Candle fetch failed for one instrument/timeframe
    #[error("{symbol} @ {timeframe}: {reason}")]
    Fetch {
        symbol: String,
        timeframe: String,
        reason: String,
    },

    /// Exchange replied with an API-level error
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Notification failed: {0}")]
    NotificationSend(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScannerError>;

impl ScannerError {
    /// Fatal errors end the run; everything else is recovered locally
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScannerError::EmptyWatchlist
                | ScannerError::NoTimeframesSelected
                | ScannerError::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ScannerError::EmptyWatchlist.is_fatal());
        assert!(ScannerError::NoTimeframesSelected.is_fatal());
        assert!(!ScannerError::ExchangeInit {
            exchange: "binance".into(),
            reason: "timeout".into(),
        }
        .is_fatal());
        assert!(!ScannerError::NotificationSend("smtp".into()).is_fatal());
    }

    #[test]
    fn test_fetch_error_carries_context() {
        let err = ScannerError::Fetch {
            symbol: "BTC/USDT".into(),
            timeframe: "4h".into(),
            reason: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "BTC/USDT @ 4h: connection reset");
    }
}
