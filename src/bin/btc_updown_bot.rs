//! Standalone entry point for the BTC up/down prediction-market bot.
//!
//! Wires CLI flags onto [`UpDownBotConfig`] overrides, builds the
//! [`Orchestrator`], and runs it to completion or shutdown.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use polymarket::application::strategies::up_or_down::Orchestrator;
use polymarket::infrastructure::client::TradingClient;
use polymarket::infrastructure::{init_tracing_with_level, UpDownBotConfig};
use tracing::{info, warn};

/// BTC up/down prediction-market trading bot.
#[derive(Parser, Debug)]
#[command(name = "btc-updown-bot")]
#[command(about = "Autonomous multi-engine BTC up/down trading bot", version)]
struct Cli {
    /// Path to the YAML strategy config.
    #[arg(long, default_value = "config/updown_config.yaml")]
    config: String,

    /// Directory for trades.jsonl / strategy.jsonl / oracle.jsonl / performance.json.
    #[arg(long, default_value = "data")]
    data_dir: String,

    /// Starting capital in USD. Required unless `--sync-live-bankroll` is set.
    #[arg(long)]
    bankroll: Option<f64>,

    /// Bounded cycle count; 0 (default) runs until shutdown.
    #[arg(long, default_value_t = 0)]
    cycles: u64,

    /// Enable the arb scanner alongside the directional engines.
    #[arg(long)]
    arb: bool,

    /// Run the arb scanner only; directional/late-window/5m loops are disabled
    /// and size/budget are derived from the live balance.
    #[arg(long)]
    arb_only: bool,

    /// Enable the hedge pass on open trades that a fresh decision contradicts.
    #[arg(long)]
    hedge: bool,

    /// Enable the late-window sweep.
    #[arg(long)]
    late_window: bool,

    /// Enable the market maker.
    #[arg(long)]
    mm: bool,

    /// Enable the parallel 5-minute loop.
    #[arg(long = "5m")]
    five_minute: bool,

    /// Start the dashboard broadcast (HTTP/WS rendering is out of scope;
    /// this only keeps a subscriber alive on the state channel).
    #[arg(long)]
    dashboard: bool,

    /// Periodically refresh capital from the live exchange balance.
    #[arg(long)]
    sync_live_bankroll: bool,

    /// Live bankroll refresh interval in seconds.
    #[arg(long, default_value_t = 60)]
    live_bankroll_poll_secs: u64,

    /// Override the anchor-to-decision strategy delay, in seconds.
    #[arg(long)]
    strategy_delay: Option<u64>,

    /// Override the configured log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.bankroll.is_none() && !cli.sync_live_bankroll {
        anyhow::bail!("--bankroll is required unless --sync-live-bankroll is set");
    }

    let mut config = UpDownBotConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    init_tracing_with_level(&config.log_level);

    config.arb_scanner.enabled = config.arb_scanner.enabled || cli.arb || cli.arb_only;
    config.hedge.enabled = config.hedge.enabled || cli.hedge;
    config.late_window.enabled = config.late_window.enabled || cli.late_window;
    config.market_maker.enabled = config.market_maker.enabled || cli.mm;
    config.active_5m.enabled = config.active_5m.enabled || cli.five_minute;
    if let Some(delay) = cli.strategy_delay {
        config.active_5m.strategy_delay_secs = delay;
    }

    if cli.arb_only {
        // Arb-only mode sizes itself off the live balance rather than a
        // fixed `--bankroll` figure.
        match TradingClient::from_env().await {
            Ok(client) => match client.get_usd_balance().await {
                Ok(balance) if balance > 0.0 => {
                    info!(balance, "arb-only: deriving daily budget from live balance");
                    config.arb_scanner.max_daily_budget_usd = balance;
                }
                Ok(_) => warn!("arb-only: live balance reported as zero, keeping configured budget"),
                Err(e) => warn!(error = %e, "arb-only: failed to read live balance, keeping configured budget"),
            },
            Err(e) => warn!(error = %e, "arb-only: failed to build a client to read live balance"),
        }
    }

    print_banner(&cli);
    config.log();

    let starting_capital = cli.bankroll.unwrap_or(0.0);
    let data_dir = PathBuf::from(&cli.data_dir);

    let mut orchestrator = Orchestrator::new(config, starting_capital, data_dir)
        .await
        .context("assembling orchestrator")?
        .with_max_cycles(cli.cycles)
        .with_arb_only(cli.arb_only)
        .with_live_bankroll_sync(cli.sync_live_bankroll, cli.live_bankroll_poll_secs);

    if cli.dashboard {
        let mut rx = orchestrator.subscribe_dashboard();
        tokio::spawn(async move {
            while rx.recv().await.is_ok() {
                // A real HTTP/WS front end would fan this out to clients;
                // rendering the dashboard is out of scope here.
            }
        });
    }

    orchestrator.run().await;

    Ok(())
}

fn print_banner(cli: &Cli) {
    info!("");
    info!("========================================");
    info!("BTC Up/Down Bot starting");
    info!(
        "arb={} arb_only={} hedge={} late_window={} mm={} 5m={} dashboard={}",
        cli.arb, cli.arb_only, cli.hedge, cli.late_window, cli.mm, cli.five_minute, cli.dashboard
    );
    info!("cycles={} (0 = unlimited)", cli.cycles);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}
