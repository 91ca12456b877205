//! SMCBot backtest runner
//!
//! Replays graded SMC signals over CSV price bars for every configured
//! symbol and writes one result bundle and trade log per symbol.

use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smcbot::backtesting::sweep::run_sweep;
use smcbot::config::{AppConfig, LoggingConfig};
use smcbot::persistence;

fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cfg = AppConfig::load()?;
    init_logging(&cfg.logging);

    info!("Starting SMCBot v{}", env!("CARGO_PKG_VERSION"));
    info!(config = %cfg, "Configuration loaded");

    cfg.validate().context("Invalid configuration")?;

    let (data, load_failures) = persistence::load_symbols(&cfg.run.bars_dir, &cfg.run.signals_dir, &cfg.run.symbols);
    if !load_failures.is_empty() {
        warn!(failed = load_failures.len(), loaded = data.len(), "Some symbols could not be loaded");
    }

    let cancel = AtomicBool::new(false);
    let mut report = run_sweep(&cfg.simulator_settings(), &data, &cancel, cfg.run.parallel)
        .context("Failed to build simulator")?;
    report.load_failures = load_failures;

    for result in &report.results {
        let (json_path, csv_path) = persistence::result_paths(&cfg.run.output_dir, &result.symbol);
        if let Err(e) = persistence::save_result(&json_path, result)
            .and_then(|_| persistence::save_trades_csv(&csv_path, &result.trades))
        {
            warn!(symbol = %result.symbol, error = %format!("{:#}", e), "Failed to write results");
            continue;
        }

        let m = &result.performance_metrics;
        info!(
            symbol = %result.symbol,
            trades = m.total_trades,
            win_rate = %format!("{:.1}%", m.win_rate * 100.0),
            profit_factor = %format!("{:.2}", m.profit_factor),
            max_drawdown_pct = %format!("{:.2}%", m.max_drawdown_pct),
            total_return = %format!("{:.2}%", result.total_return),
            "Backtest summary"
        );
    }

    persistence::save_sweep_report(&cfg.run.output_dir.join("sweep_report.json"), &report)?;

    if let Some(best) = report.best() {
        info!(symbol = %best.symbol, pnl = best.performance_metrics.total_pnl, "Best symbol");
    }
    info!(
        symbols = report.totals.symbols,
        trades = report.totals.total_trades,
        pnl = %format!("{:.2}", report.totals.total_pnl),
        "Done"
    );
    Ok(())
}
