//! Scan engine lifecycle and cycle loop

use super::evaluate::{evaluate_instrument, InstrumentOutcome, TimeframeReading};
use super::{ErrorKind, ScanConfiguration, ScanEvent};
use crate::error::{Result, ScannerError};
use crate::exchange::{ExchangeClient, ExchangeFactory};
use crate::notify::{AlertCooldown, Notifier, ScanAlert};
use crate::types::{quote_currency, Timeframe};
use crate::utils::format_large_number;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest single wait inside the inter-cycle delay
const DELAY_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
}

/// Wait `total` in steps of at most one second.
/// Returns false as soon as `token` is cancelled.
pub async fn cancellable_delay(token: &CancellationToken, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        let step = remaining.min(DELAY_STEP);
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(step) => {}
        }
        remaining -= step;
    }
    !token.is_cancelled()
}

struct ActiveRun {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs at most one scan at a time on a background task
pub struct ScanEngine {
    factory: Arc<dyn ExchangeFactory>,
    notifier: Option<Notifier>,
    events: mpsc::UnboundedSender<ScanEvent>,
    state: Arc<Mutex<EngineState>>,
    /// Outlives individual runs so a restart does not re-alert
    cooldown: Arc<Mutex<AlertCooldown>>,
    run: Mutex<Option<ActiveRun>>,
}

impl ScanEngine {
    pub fn new(factory: Arc<dyn ExchangeFactory>) -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            factory,
            notifier: None,
            events,
            state: Arc::new(Mutex::new(EngineState::Idle)),
            cooldown: Arc::new(Mutex::new(AlertCooldown::new())),
            run: Mutex::new(None),
        };
        (engine, rx)
    }

    /// Use `notifier` instead of building one from the run's settings
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn start(&self, config: ScanConfiguration) -> Result<()> {
        let mut state = self.state.lock();
        if *state != EngineState::Idle {
            return Err(ScannerError::AlreadyRunning);
        }
        config.validate()?;

        let notifier = self
            .notifier
            .clone()
            .unwrap_or_else(|| Notifier::from_settings(&config.notifications));
        let token = CancellationToken::new();

        let worker = ScanWorker {
            factory: self.factory.clone(),
            notifier,
            timeframes: Timeframe::sorted_descending(&config.timeframes),
            config,
            events: self.events.clone(),
            cooldown: self.cooldown.clone(),
            token: token.clone(),
        };

        let engine_state = self.state.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = tokio::spawn(worker.run()).await {
                error!("Scan worker panicked: {}", e);
                let _ = events.send(ScanEvent::ErrorOccurred {
                    kind: ErrorKind::Other,
                    message: format!("Scan worker panicked: {}", e),
                });
            }
            *engine_state.lock() = EngineState::Idle;
            info!("Scan engine stopped");
            let _ = events.send(ScanEvent::EngineStopped);
        });

        *state = EngineState::Running;
        *self.run.lock() = Some(ActiveRun { token, handle });
        Ok(())
    }

    /// Request a stop; the worker exits at its next checkpoint
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state != EngineState::Running {
            return;
        }
        *state = EngineState::Stopping;
        if let Some(run) = self.run.lock().as_ref() {
            run.token.cancel();
        }
        info!("Scan stop requested");
        let _ = self
            .events
            .send(ScanEvent::LogLine("Stop requested...".to_string()));
    }

    /// Wait for the current worker, if any, to finish
    pub async fn join(&self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            if let Err(e) = run.handle.await {
                error!("Scan worker panicked: {}", e);
                *self.state.lock() = EngineState::Idle;
            }
        }
    }

    /// Stop the current run and start again with `config`
    pub async fn restart(&self, config: ScanConfiguration) -> Result<()> {
        self.stop();
        self.join().await;
        self.start(config)
    }
}

struct ScanWorker {
    factory: Arc<dyn ExchangeFactory>,
    notifier: Notifier,
    config: ScanConfiguration,
    timeframes: Vec<Timeframe>,
    events: mpsc::UnboundedSender<ScanEvent>,
    cooldown: Arc<Mutex<AlertCooldown>>,
    token: CancellationToken,
}

impl ScanWorker {
    fn emit(&self, event: ScanEvent) {
        let _ = self.events.send(event);
    }

    fn log(&self, line: String) {
        info!("{}", line);
        self.emit(ScanEvent::LogLine(line));
    }

    fn report_error(&self, error: &ScannerError) {
        if error.is_fatal() {
            error!("{}", error);
        } else {
            warn!("{}", error);
        }
        self.emit(ScanEvent::error(error));
    }

    async fn run(self) {
        let labels: Vec<&str> = self.timeframes.iter().map(|tf| tf.label()).collect();
        self.log(format!("Starting scan on {}", self.config.exchange_id));
        self.log(format!("Timeframes: {}", labels.join(", ")));
        self.log(format!(
            "Parameters: W%R({}), EMA({}) | Conditions: {}",
            self.config.indicator_params.oscillator_period,
            self.config.indicator_params.ema_period,
            self.config.conditions
        ));

        let mut cycle: u64 = 0;
        loop {
            if self.token.is_cancelled() {
                break;
            }

            cycle += 1;
            info!(cycle, "Scan cycle started");
            self.emit(ScanEvent::CycleStarted { cycle });
            self.emit(ScanEvent::ResultsCleared { cycle });

            if let Err(e) = self.run_cycle(cycle).await {
                self.report_error(&e);
                if e.is_fatal() {
                    break;
                }
            }

            // reported even when a stop cut the cycle short
            let next_delay = self.config.cycle_delay;
            info!(cycle, next_delay_secs = next_delay.as_secs(), "Scan cycle completed");
            self.emit(ScanEvent::CycleCompleted { cycle, next_delay });

            if self.token.is_cancelled() || !cancellable_delay(&self.token, next_delay).await {
                break;
            }
        }
    }

    async fn run_cycle(&self, cycle: u64) -> Result<()> {
        let symbols = self.config.instruments.snapshot();
        if symbols.is_empty() {
            return Err(ScannerError::EmptyWatchlist);
        }

        let exchange_id = self.config.exchange_id.as_str();
        let init_error = |reason: String| ScannerError::ExchangeInit {
            exchange: exchange_id.to_string(),
            reason,
        };
        let client = self
            .factory
            .create(
                exchange_id,
                self.config.market_type,
                self.config.credentials.as_ref(),
            )
            .map_err(|e| init_error(e.to_string()))?;
        client
            .load_markets()
            .await
            .map_err(|e| init_error(e.to_string()))?;
        self.log(format!("Connected to {} and loaded markets", exchange_id));

        let total = symbols.len();
        for (i, symbol) in symbols.iter().enumerate() {
            if self.token.is_cancelled() {
                self.log("Scan interrupted".to_string());
                return Ok(());
            }
            self.log(format!("Analysing {} ({}/{})", symbol, i + 1, total));
            self.scan_instrument(cycle, client.as_ref(), symbol).await;
        }
        Ok(())
    }

    async fn scan_instrument(&self, cycle: u64, client: &dyn ExchangeClient, symbol: &str) {
        let outcome = evaluate_instrument(
            client,
            symbol,
            &self.timeframes,
            self.config.indicator_params,
            self.config.conditions,
            &self.token,
        )
        .await;

        match outcome {
            Ok(InstrumentOutcome::Passed(reading)) => {
                self.report_pass(cycle, client, symbol, reading).await;
            }
            Ok(InstrumentOutcome::Failed { timeframe, reason }) => {
                debug!(symbol, %timeframe, %reason, "instrument failed");
                self.emit(ScanEvent::InstrumentFailed {
                    cycle,
                    symbol: symbol.to_string(),
                    reason: format!("{}: {}", timeframe, reason),
                });
            }
            Ok(InstrumentOutcome::Cancelled) => {}
            Err(e) => {
                self.report_error(&e);
                self.emit(ScanEvent::InstrumentFailed {
                    cycle,
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn report_pass(
        &self,
        cycle: u64,
        client: &dyn ExchangeClient,
        symbol: &str,
        reading: TimeframeReading,
    ) {
        let quote_volume = match client.fetch_ticker(symbol).await {
            Ok(ticker) => ticker.quote_volume,
            Err(e) => {
                self.log(format!("Ticker fetch failed for {}: {}", symbol, e));
                None
            }
        };
        let volume_display = format_large_number(quote_volume, quote_currency(symbol));

        info!(
            symbol,
            timeframe = %reading.timeframe,
            wpr = reading.oscillator,
            ema = reading.ema,
            "Instrument passed"
        );
        self.emit(ScanEvent::InstrumentPassed {
            cycle,
            symbol: symbol.to_string(),
            timeframe: reading.timeframe,
            oscillator_value: reading.oscillator,
            ema_value: reading.ema,
            volume_display: volume_display.clone(),
        });

        if !self.notifier.is_enabled() {
            return;
        }

        let window = self.config.notifications.cooldown();
        let acquired = {
            let now = Utc::now();
            let mut cooldown = self.cooldown.lock();
            cooldown.prune(now, window);
            cooldown.try_acquire(symbol, now, window)
        };
        if !acquired {
            debug!(symbol, "alert suppressed by cooldown");
            return;
        }

        let alert = ScanAlert {
            symbol,
            exchange: &self.config.exchange_id,
            oscillator_period: self.config.indicator_params.oscillator_period,
            oscillator_value: reading.oscillator,
            ema_period: self.config.indicator_params.ema_period,
            ema_value: reading.ema,
            volume_display: &volume_display,
        };
        let delivery = self.notifier.notify(&alert.subject(), &alert.body()).await;
        self.emit(ScanEvent::LogLine(delivery.to_string()));
    }
}
