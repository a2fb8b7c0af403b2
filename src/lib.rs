//! Krypto Scanner
//!
//! Periodic multi-timeframe Williams %R scanner for crypto exchanges, with
//! Telegram / e-mail alerts and a trade spike detector.
//!
//! ## Architecture
//!
//! ```text
//! Config → ScanConfiguration → ScanEngine ──(ScanEvent)──→ presenter (CLI)
//!                                  │
//!                ExchangeFactory → ExchangeClient (Binance / Bybit REST)
//!                                  │
//!                      Indicators (W%R, EMA) → Notifier (Telegram / SMTP)
//!
//! SpikeMonitor: ExchangeClient::fetch_trades → SpikeDetector → Notifier
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod notify;
pub mod scanner;
pub mod spike;
pub mod types;
pub mod utils;

#[cfg(test)]
mod config_tests;
