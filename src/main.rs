//! Krypto Scanner
//!
//! Command-line front-end for the scan engine and the spike monitor.

use clap::{Parser, Subcommand};
use krypto_scanner::{
    config::Config,
    exchange::{fetch_catalog, ExchangeRegistry, EXCHANGE_PROFILES},
    notify::Notifier,
    scanner::{ScanEngine, ScanEvent},
    spike::SpikeMonitor,
    types::MarketType,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "krypto-scanner")]
#[command(about = "Multi-timeframe Williams %R scanner with alerts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the periodic scanner until Ctrl-C
    Scan {
        /// Stop after the first completed cycle
        #[arg(long)]
        once: bool,
    },
    /// List the USDT pairs available on an exchange
    Markets {
        /// Exchange id, defaults to the configured one
        #[arg(short, long)]
        exchange: Option<String>,
        /// Market type: spot, future or swap
        #[arg(short, long)]
        market_type: Option<MarketType>,
    },
    /// Show the built-in exchange presets
    Presets,
    /// Watch recent trades for volume and price spikes
    Spike,
    /// Send a test notification through the configured sink
    TestNotify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Scan { once } => run_scan(config, once).await,
        Commands::Markets {
            exchange,
            market_type,
        } => show_markets(config, exchange, market_type).await,
        Commands::Presets => {
            show_presets();
            Ok(())
        }
        Commands::Spike => run_spike(config).await,
        Commands::TestNotify => test_notify(config).await,
    }
}

async fn run_scan(config: Config, once: bool) -> anyhow::Result<()> {
    let scan_config = config.to_scan_configuration()?;
    tracing::info!(
        exchange = %scan_config.exchange_id,
        market_type = %scan_config.market_type,
        pairs = scan_config.instruments.len(),
        "Starting scanner"
    );

    let (engine, mut events) = ScanEngine::new(Arc::new(ExchangeRegistry));
    engine.start(scan_config)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n⏹  Stopping scan...");
                engine.stop();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let finished = matches!(event, ScanEvent::EngineStopped);
                let completed = matches!(event, ScanEvent::CycleCompleted { .. });
                present(&event);
                if finished {
                    break;
                }
                if once && completed {
                    engine.stop();
                }
            }
        }
    }

    engine.join().await;
    Ok(())
}

fn present(event: &ScanEvent) {
    match event {
        ScanEvent::CycleStarted { cycle } => {
            println!("\n--- Scan cycle #{} ---", cycle);
        }
        ScanEvent::ResultsCleared { .. } => {
            println!("{:<20} {:>4} {:>10} {:>10} {:>16}", "Symbol", "TF", "W%R", "EMA", "24h volume");
            println!("{}", "-".repeat(64));
        }
        ScanEvent::InstrumentPassed {
            symbol,
            timeframe,
            oscillator_value,
            ema_value,
            volume_display,
            ..
        } => {
            println!(
                "{:<20} {:>4} {:>10.2} {:>10.2} {:>16}",
                symbol, timeframe, oscillator_value, ema_value, volume_display
            );
        }
        ScanEvent::InstrumentFailed { .. } | ScanEvent::LogLine(_) => {}
        ScanEvent::CycleCompleted { cycle, next_delay } => {
            println!(
                "Cycle {} completed. Next in {} min.",
                cycle,
                next_delay.as_secs() / 60
            );
        }
        ScanEvent::ErrorOccurred { message, .. } => {
            eprintln!("❌ {}", message);
        }
        ScanEvent::EngineStopped => {
            println!("Scan stopped.");
        }
    }
}

async fn show_markets(
    config: Config,
    exchange: Option<String>,
    market_type: Option<MarketType>,
) -> anyhow::Result<()> {
    let (default_id, default_type) = config.exchange.resolve()?;
    let exchange_id = exchange.unwrap_or(default_id);
    let market_type = market_type.unwrap_or(default_type);

    let catalog = fetch_catalog(&ExchangeRegistry, &exchange_id, market_type).await?;

    println!("\n📊 {} USDT pairs on {} ({}):\n", catalog.len(), exchange_id, market_type);
    for instrument in catalog {
        println!("{:<24} {}", instrument.symbol, instrument.id);
    }
    Ok(())
}

fn show_presets() {
    println!("{:<28} {:<12} {:<8} {}", "Preset", "Exchange", "Type", "Default pairs");
    println!("{}", "-".repeat(80));
    for profile in EXCHANGE_PROFILES {
        println!(
            "{:<28} {:<12} {:<8} {}",
            profile.name,
            profile.exchange_id,
            profile.market_type,
            profile.default_pairs.join(", ")
        );
    }
}

async fn run_spike(config: Config) -> anyhow::Result<()> {
    let (exchange_id, market_type) = config.exchange.resolve()?;
    let monitor = SpikeMonitor::new(
        Arc::new(ExchangeRegistry),
        &exchange_id,
        market_type,
        config.spike_pairs()?,
        config.spike.params.clone(),
    )?
    .with_credentials(config.exchange.credentials())
    .with_notifier(Notifier::from_settings(&config.notifications));

    let token = CancellationToken::new();
    let (tx, mut spikes) = mpsc::unbounded_channel();
    let mut worker = tokio::spawn(monitor.run(token.clone(), tx));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n⏹  Stopping spike monitor...");
                token.cancel();
            }
            Some(spike) = spikes.recv() => {
                println!("[{}] {}", spike.detected_at.format("%H:%M:%S"), spike);
            }
            result = &mut worker => {
                result??;
                break;
            }
        }
    }
    Ok(())
}

async fn test_notify(config: Config) -> anyhow::Result<()> {
    let notifier = Notifier::from_settings(&config.notifications);
    if !notifier.is_enabled() {
        anyhow::bail!("Notifications are disabled in the configuration");
    }

    let delivery = notifier
        .notify(
            "Krypto Scanner: test",
            "🧪 <b>Test Notification</b>\n\nIf you see this, notifications are working!",
        )
        .await;

    println!("{}", delivery);
    Ok(())
}
