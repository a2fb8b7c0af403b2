//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use crate::error::ScannerError;
    use crate::notify::SinkKind;
    use crate::types::{CompareOp, MarketType, Timeframe};
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_scanner_config_defaults() {
        let config: ScannerConfig = toml::from_str("").unwrap();
        assert!(config.watchlist.is_empty());
        assert_eq!(config.timeframes.len(), 8);
        assert_eq!(config.wpr_period, 14);
        assert_eq!(config.ema_period, 9);
        assert_eq!(config.wpr_operator, CompareOp::GreaterOrEqual);
        assert_eq!(config.wpr_threshold, -20.0);
        assert_eq!(config.ema_threshold, -30.0);
        assert_eq!(config.delay_minutes, 5);
    }

    #[test]
    fn test_scanner_config_custom() {
        let toml_str = r#"
watchlist = ["BTC/USDT", "SOL/USDT"]
timeframes = ["1h", "4h"]
wpr_period = 21
wpr_operator = "<="
wpr_threshold = -80.0
ema_operator = "<="
ema_threshold = -70.0
delay_minutes = 15
"#;
        let config: ScannerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watchlist, vec!["BTC/USDT", "SOL/USDT"]);
        assert_eq!(config.timeframes, vec![Timeframe::H1, Timeframe::H4]);
        assert_eq!(config.wpr_period, 21);
        assert_eq!(config.ema_period, 9);
        assert_eq!(config.wpr_operator, CompareOp::LessOrEqual);
        assert_eq!(config.ema_threshold, -70.0);
    }

    #[test]
    fn test_unknown_timeframe_rejected() {
        let result: Result<ScannerConfig, _> = toml::from_str(r#"timeframes = ["2h"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_preset_resolves_exchange() {
        let toml_str = r#"
[exchange]
preset = "Bybit (Perpetual USDT)"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let (id, market_type) = config.exchange.resolve().unwrap();
        assert_eq!(id, "bybit");
        assert_eq!(market_type, MarketType::Swap);
        // empty watchlist falls back to the preset's pairs
        assert_eq!(
            config.watchlist().unwrap(),
            vec!["BTC/USDT:USDT", "ETH/USDT:USDT"]
        );
    }

    #[test]
    fn test_unknown_preset_is_invalid() {
        let config: Config = toml::from_str("[exchange]\npreset = \"Kraken (Spot)\"").unwrap();
        assert!(matches!(
            config.exchange.resolve(),
            Err(ScannerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_explicit_exchange_and_credentials() {
        let toml_str = r#"
[exchange]
id = "binanceusdm"
market_type = "future"
api_key = "key"
api_secret = ""
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.exchange.resolve().unwrap(),
            ("binanceusdm".to_string(), MarketType::Future)
        );
        // half a key pair is no key pair
        assert!(config.exchange.credentials().is_none());
        assert!(!format!("{:?}", config.exchange).contains("key\""));
    }

    #[test]
    fn test_scan_configuration_conversion() {
        let toml_str = r#"
[exchange]
preset = "Binance (Spot)"

[scanner]
watchlist = ["ETH/USDT"]
timeframes = ["1d"]
delay_minutes = 2

[notifications]
enabled = true
method = "telegram"
cooldown_minutes = 30

[notifications.telegram]
bot_token = "123:abc"
chat_id = "42"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let scan = config.to_scan_configuration().unwrap();
        assert_eq!(scan.exchange_id, "binance");
        assert_eq!(scan.instruments.snapshot(), vec!["ETH/USDT"]);
        assert_eq!(scan.timeframes, vec![Timeframe::D1]);
        assert_eq!(scan.cycle_delay, Duration::from_secs(120));
        assert_eq!(scan.indicator_params.oscillator_period, 14);
        assert_eq!(scan.notifications.method, SinkKind::Telegram);
        assert_eq!(scan.notifications.cooldown_minutes, 30);
        assert!(scan.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_delay_is_invalid() {
        let mut config: Config = toml::from_str(
            r#"
[exchange]
preset = "Binance (Spot)"

[scanner]
watchlist = ["BTC/USDT"]
"#,
        )
        .unwrap();
        config.scanner.delay_minutes = u64::MAX / 2;
        assert!(matches!(
            config.to_scan_configuration(),
            Err(ScannerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_huge_cooldown_fails_validation() {
        let toml_str = r#"
[exchange]
preset = "Binance (Spot)"

[scanner]
watchlist = ["BTC/USDT"]

[notifications]
cooldown_minutes = 9223372036854775807
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let scan = config.to_scan_configuration().unwrap();
        assert!(matches!(scan.validate(), Err(ScannerError::InvalidConfig(_))));
    }

    #[test]
    fn test_spike_config_defaults_and_pairs() {
        let toml_str = r#"
[scanner]
watchlist = ["BTC/USDT"]

[spike]
window_seconds = 10
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.spike.params.window_seconds, 10);
        assert_eq!(config.spike.params.baseline_minutes, 15);
        assert_eq!(config.spike.params.cooldown_minutes, 5);
        assert_eq!(config.spike_pairs().unwrap(), vec!["BTC/USDT"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[exchange]
preset = "Bybit (Spot)"

[scanner]
watchlist = ["XRP/USDT"]
timeframes = ["15m", "1h"]
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.scanner.watchlist, vec!["XRP/USDT"]);
        assert_eq!(config.scanner.timeframes, vec![Timeframe::M15, Timeframe::H1]);
        assert_eq!(config.exchange.resolve().unwrap().0, "bybit");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load("/nonexistent/krypto-scanner.toml").unwrap();
        assert_eq!(config.scanner.wpr_period, 14);
        assert!(!config.notifications.enabled);
    }
}
