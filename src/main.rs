//! Funding Carry - Main Entry Point
//!
//! Runs the live paper loop by default, or one of the backtest/collection
//! subcommands.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use funding_carry::backtest::{
    collect_history, snapshots_to_csv, BacktestSimulator, CsvDataLoader, DataLoader,
    ParameterSpace, SweepRunner,
};
use funding_carry::config::Config;
use funding_carry::exchange::{feed_for, PaperExecutionAdapter, Venue};
use funding_carry::strategy::{LiveLoop, PositionStateMachine, TickOutcome};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Funding Carry CLI
#[derive(Parser)]
#[command(name = "funding-carry")]
#[command(version, about = "Funding-rate carry on perpetual futures")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest simulation on historical data
    Backtest {
        /// Path to CSV data file (timestamp,venue,market,hourly_pct)
        #[arg(short, long)]
        data: String,

        /// Start date (YYYY-MM-DD), defaults to the first observation
        #[arg(short, long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), defaults to the last observation
        #[arg(short, long)]
        end: Option<String>,

        /// Output directory for trades.csv and pnl.csv
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a parameter sweep over thresholds and cooldown
    Sweep {
        /// Path to CSV data file
        #[arg(short, long)]
        data: String,

        /// Number of parallel backtests
        #[arg(short, long, default_value = "4")]
        parallelism: usize,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,

        /// Use minimal parameter space (faster, for testing)
        #[arg(long)]
        minimal: bool,
    },

    /// Download funding history from a venue into backtest CSV format
    Collect {
        /// Venue to read from (hyperliquid, binance)
        #[arg(short, long)]
        venue: String,

        /// Market base asset (e.g. SOL)
        #[arg(short, long)]
        market: String,

        /// Days of history ending now
        #[arg(short, long, default_value = "30")]
        days: i64,

        /// Output CSV path
        #[arg(short, long)]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::Backtest {
            data,
            start,
            end,
            output,
        }) => run_backtest(&config, &data, start.as_deref(), end.as_deref(), output.as_deref()),
        Some(Commands::Sweep {
            data,
            parallelism,
            output,
            minimal,
        }) => run_sweep(&config, &data, parallelism, output.as_deref(), minimal).await,
        Some(Commands::Collect {
            venue,
            market,
            days,
            output,
        }) => run_collect(&config, &venue, &market, days, &output).await,
        None => run_live(config).await,
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "funding-carry.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funding_carry=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let strategy = &config.strategy;
    info!("📋 Configuration:");
    info!("   Markets: {}", strategy.markets.join(", "));
    info!("   Enter Threshold: {}% APR", strategy.enter_threshold_pct);
    info!("   Exit Threshold: {}% APR", strategy.exit_threshold());
    info!("   Cooldown: {}s", strategy.cooldown_seconds);
    info!("   Notional: ${}", strategy.notional_usd);
    info!("   Primary Venue: {}", config.venues.primary);
    info!(
        "   Cross Venue: {} (secondary: {})",
        strategy.cross_venue_enabled, config.venues.secondary
    );
    info!("   Poll Interval: {}s", config.execution.poll_interval_secs);
}

/// Cross-venue secondary, only when cross mode is on.
fn active_secondary(config: &Config) -> Result<Option<Venue>> {
    if !config.strategy.cross_venue_enabled {
        return Ok(None);
    }
    Ok(config.venues.secondary_venue()?)
}

/// Run the live loop until Ctrl-C.
async fn run_live(config: Config) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║        Funding Carry v{} - Paper Trading                ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    if !config.execution.paper_mode {
        anyhow::bail!(
            "execution.paper_mode=false is not supported: no signing execution adapter is available"
        );
    }
    log_config(&config);

    let testnet = config.venues.binance_testnet;
    let primary = feed_for(config.venues.primary, testnet)?;
    let secondary = match active_secondary(&config)? {
        Some(venue) => Some(feed_for(venue, testnet)?),
        None => None,
    };

    let live = Arc::new(LiveLoop::new(
        PositionStateMachine::new(config.strategy.clone()),
        primary,
        secondary,
        Box::new(PaperExecutionAdapter::new()),
    ));

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.execution.poll_interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("🚀 Starting live loop...");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let live = live.clone();
                tokio::spawn(async move {
                    if let TickOutcome::Completed(report) = live.tick().await {
                        for event in &report.events {
                            info!(
                                market = %event.market,
                                kind = %event.kind,
                                action = %event.action,
                                "📝 {}",
                                event.to_csv_row()
                            );
                        }
                        if report.feed_errors + report.execution_errors > 0 {
                            warn!(
                                feed_errors = report.feed_errors,
                                execution_errors = report.execution_errors,
                                "Tick finished with errors"
                            );
                        }
                    }
                });
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("🛑 Shutdown signal received");
                break;
            }
        }
    }

    info!("👋 Funding Carry shutdown complete");
    Ok(())
}

/// Parse a YYYY-MM-DD date as the start or end of that UTC day.
fn parse_date(s: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'", s))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .with_context(|| format!("Invalid date '{}'", s))
}

fn load_data(data_path: &str) -> Result<CsvDataLoader> {
    info!("📊 Loading data from: {}", data_path);
    let data_loader = CsvDataLoader::new(data_path)?;

    if let Some((data_start, data_end)) = data_loader.available_range() {
        info!(
            "   Data range: {} to {}",
            data_start.format("%Y-%m-%d %H:%M"),
            data_end.format("%Y-%m-%d %H:%M")
        );
    }
    info!("   Markets: {}", data_loader.available_markets().join(", "));
    info!("   Observations: {}", data_loader.len());

    Ok(data_loader)
}

/// Run a single backtest with the configured strategy.
fn run_backtest(
    config: &Config,
    data_path: &str,
    start: Option<&str>,
    end: Option<&str>,
    output_dir: Option<&str>,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              BACKTEST MODE                                 ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let start = start.map(|s| parse_date(s, false)).transpose()?;
    let end = end.map(|s| parse_date(s, true)).transpose()?;

    let data_loader = load_data(data_path)?;
    log_config(config);

    let simulator = BacktestSimulator::new(
        data_loader,
        config.strategy.clone(),
        config.venues.primary,
        active_secondary(config)?,
    );
    let result = simulator.run(start, end)?;

    println!("\n{}", result.summary());

    if let Some(dir) = output_dir {
        result.write_reports(Path::new(dir))?;
        info!("📁 Trade log and P&L series saved to: {}", dir);
    }

    Ok(())
}

/// Run a parameter sweep optimization.
async fn run_sweep(
    config: &Config,
    data_path: &str,
    parallelism: usize,
    output_dir: Option<&str>,
    minimal: bool,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║           PARAMETER SWEEP MODE                             ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let data_loader = load_data(data_path)?;

    let param_space = if minimal {
        info!("🔧 Using minimal parameter space (quick test)");
        ParameterSpace::minimal()
    } else {
        info!("🔧 Using full parameter space");
        ParameterSpace::default()
    };

    info!("   Combinations to test: {}", param_space.combination_count());
    info!("⚡ Parallelism: {}", parallelism);

    let runner = SweepRunner::new(
        param_space,
        config.strategy.clone(),
        config.venues.primary,
        active_secondary(config)?,
        parallelism,
    );
    let results = runner.run(data_loader, None, None).await?;

    println!("\n{}", results.summary());

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;

        let results_path = format!("{}/sweep_results.csv", dir);
        results.to_csv(&results_path)?;
        info!("📁 Sweep results saved to: {}", results_path);
    }

    Ok(())
}

/// Download funding history into the backtest CSV format.
async fn run_collect(
    config: &Config,
    venue: &str,
    market: &str,
    days: i64,
    output: &str,
) -> Result<()> {
    let venue: Venue = venue.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    if days <= 0 {
        anyhow::bail!("--days must be positive, got {}", days);
    }

    let end = Utc::now();
    let start = end - chrono::Duration::days(days);
    let feed = feed_for(venue, config.venues.binance_testnet)?;

    let history = collect_history(feed.as_ref(), market, start, end).await?;
    if history.is_empty() {
        warn!(%venue, %market, "No funding history returned");
    }

    if let Some(parent) = Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, snapshots_to_csv(&history))
        .with_context(|| format!("Failed to write {}", output))?;

    info!("📁 {} observations saved to: {}", history.len(), output);
    Ok(())
}
