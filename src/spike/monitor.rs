//! Polling loop feeding the spike detector

use super::{SpikeDetector, SpikeEvent, SpikeParams};
use crate::error::{Result, ScannerError};
use crate::exchange::ExchangeFactory;
use crate::notify::Notifier;
use crate::scanner::cancellable_delay;
use crate::types::{ApiCredentials, MarketType};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct SpikeMonitor {
    factory: Arc<dyn ExchangeFactory>,
    exchange_id: String,
    market_type: MarketType,
    credentials: Option<ApiCredentials>,
    pairs: Vec<String>,
    detector: SpikeDetector,
    notifier: Notifier,
}

impl SpikeMonitor {
    pub fn new(
        factory: Arc<dyn ExchangeFactory>,
        exchange_id: &str,
        market_type: MarketType,
        pairs: Vec<String>,
        params: SpikeParams,
    ) -> Result<Self> {
        params.validate()?;
        if pairs.is_empty() {
            return Err(ScannerError::EmptyWatchlist);
        }
        Ok(Self {
            factory,
            exchange_id: exchange_id.to_string(),
            market_type,
            credentials: None,
            pairs,
            detector: SpikeDetector::new(params),
            notifier: Notifier::disabled(),
        })
    }

    pub fn with_credentials(mut self, credentials: Option<ApiCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Poll every pair until `token` is cancelled, sending each spike to `events`
    pub async fn run(
        mut self,
        token: CancellationToken,
        events: mpsc::UnboundedSender<SpikeEvent>,
    ) -> Result<()> {
        let client = self
            .factory
            .create(&self.exchange_id, self.market_type, self.credentials.as_ref())
            .map_err(|e| ScannerError::ExchangeInit {
                exchange: self.exchange_id.clone(),
                reason: e.to_string(),
            })?;

        let params = self.detector.params().clone();
        let poll = Duration::from_secs(params.poll_interval_secs);
        info!(
            exchange = %self.exchange_id,
            pairs = self.pairs.len(),
            baseline_minutes = params.baseline_minutes,
            window_seconds = params.window_seconds,
            "Spike monitor started"
        );

        loop {
            for pair in &self.pairs {
                if token.is_cancelled() {
                    break;
                }

                let trades = match client.fetch_trades(pair, params.trade_limit).await {
                    Ok(trades) => trades,
                    Err(e) => {
                        warn!(pair = %pair, error = %e, "trade fetch failed");
                        continue;
                    }
                };

                let now_ms = Utc::now().timestamp_millis();
                if let Some(spike) = self.detector.process(pair, &trades, now_ms) {
                    info!("{}", spike);
                    let delivery = self.notifier.notify(&spike.subject(), &spike.to_string()).await;
                    info!(pair = %pair, "{}", delivery);
                    let _ = events.send(spike);
                }
            }

            if !cancellable_delay(&token, poll).await {
                break;
            }
        }

        info!("Spike monitor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeClient;
    use crate::types::{Candle, MarketInfo, Ticker, Timeframe, Trade};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Quiet tape followed by a burst on the second poll
    struct BurstingTape {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeClient for BurstingTape {
        fn id(&self) -> &str {
            "tape"
        }

        async fn load_markets(&self) -> Result<HashMap<String, MarketInfo>> {
            Ok(HashMap::new())
        }

        async fn fetch_ohlcv(&self, _: &str, _: Timeframe, _: usize) -> Result<Vec<Candle>> {
            Ok(vec![])
        }

        async fn fetch_ticker(&self, _: &str) -> Result<Ticker> {
            Ok(Ticker::default())
        }

        async fn fetch_trades(&self, _symbol: &str, _limit: usize) -> Result<Vec<Trade>> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now().timestamp_millis();
            let mut trades: Vec<Trade> = (0..10)
                .map(|i| Trade {
                    id: format!("q{}", i),
                    timestamp: now - 300_000 + i * 20_000,
                    price: 50.0,
                    amount: 1.0,
                })
                .collect();
            if poll >= 1 {
                trades.push(Trade {
                    id: "burst".into(),
                    timestamp: now,
                    price: 50.0,
                    amount: 100.0,
                });
            }
            Ok(trades)
        }
    }

    struct TapeFactory(Arc<BurstingTape>);

    impl ExchangeFactory for TapeFactory {
        fn create(
            &self,
            _exchange_id: &str,
            _market_type: MarketType,
            _credentials: Option<&ApiCredentials>,
        ) -> Result<Arc<dyn ExchangeClient>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_requires_pairs() {
        let factory = Arc::new(TapeFactory(Arc::new(BurstingTape {
            polls: AtomicUsize::new(0),
        })));
        let result = SpikeMonitor::new(factory, "tape", MarketType::Spot, vec![], SpikeParams::default());
        assert!(matches!(result, Err(ScannerError::EmptyWatchlist)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reports_burst_and_stops() {
        let tape = Arc::new(BurstingTape {
            polls: AtomicUsize::new(0),
        });
        let monitor = SpikeMonitor::new(
            Arc::new(TapeFactory(tape.clone())),
            "tape",
            MarketType::Spot,
            vec!["DOGE/USDT".to_string()],
            SpikeParams::default(),
        )
        .unwrap();

        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(monitor.run(token.clone(), tx));

        let spike = rx.recv().await.unwrap();
        assert_eq!(spike.pair, "DOGE/USDT");
        assert_eq!(spike.kinds, vec![crate::spike::SpikeKind::Volume]);

        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(tape.polls.load(Ordering::SeqCst) >= 2);
    }
}
