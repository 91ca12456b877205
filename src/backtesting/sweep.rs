//! Multi-symbol backtest sweep
//!
//! Each symbol gets its own simulator built from the same settings, so runs
//! share nothing and can be fanned out on the rayon pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use super::{BacktestResult, SignalEvent, SimulatorSettings};
use crate::error::ConfigError;
use crate::types::PriceBar;

/// Inputs for one symbol
#[derive(Debug, Clone)]
pub struct SymbolData {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
    pub signals: Vec<SignalEvent>,
}

/// A symbol whose input files could not be loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub symbol: String,
    pub error: String,
}

/// Aggregate over every completed symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepTotals {
    pub symbols: usize,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Results in input order
    pub results: Vec<BacktestResult>,
    /// Symbols not run because the sweep was cancelled
    pub cancelled: Vec<String>,
    /// Symbols dropped before the sweep because their inputs failed to load
    #[serde(default)]
    pub load_failures: Vec<LoadFailure>,
    pub totals: SweepTotals,
}

impl SweepReport {
    fn new(results: Vec<BacktestResult>, cancelled: Vec<String>) -> Self {
        let total_trades: usize = results.iter().map(|r| r.performance_metrics.total_trades).sum();
        let winning_trades: usize = results.iter().map(|r| r.performance_metrics.winning_trades).sum();
        let totals = SweepTotals {
            symbols: results.len(),
            total_trades,
            winning_trades,
            total_pnl: results.iter().map(|r| r.performance_metrics.total_pnl).sum(),
            win_rate: if total_trades > 0 {
                winning_trades as f64 / total_trades as f64
            } else {
                0.0
            },
        };
        Self {
            results,
            cancelled,
            load_failures: Vec::new(),
            totals,
        }
    }

    /// Best symbol by total P&L
    pub fn best(&self) -> Option<&BacktestResult> {
        self.results
            .iter()
            .max_by(|a, b| a.performance_metrics.total_pnl.total_cmp(&b.performance_metrics.total_pnl))
    }
}

/// Run every symbol, in parallel when `parallel` is set.
///
/// `cancel` is checked before each symbol starts; symbols skipped that way
/// are listed in the report. Results do not depend on `parallel`.
pub fn run_sweep(
    settings: &SimulatorSettings,
    data: &[SymbolData],
    cancel: &AtomicBool,
    parallel: bool,
) -> Result<SweepReport, ConfigError> {
    // fail fast on bad settings before any work is scheduled
    settings.build()?;

    let run_one = |d: &SymbolData| -> Result<Option<BacktestResult>, ConfigError> {
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let mut simulator = settings.build()?;
        Ok(Some(simulator.run_backtest(&d.symbol, &d.bars, &d.signals)))
    };

    let outcomes: Vec<Option<BacktestResult>> = if parallel {
        data.par_iter().map(run_one).collect::<Result<Vec<_>, _>>()?
    } else {
        data.iter().map(run_one).collect::<Result<Vec<_>, _>>()?
    };

    let mut results = Vec::with_capacity(outcomes.len());
    let mut cancelled = Vec::new();
    for (d, outcome) in data.iter().zip(outcomes) {
        match outcome {
            Some(r) => results.push(r),
            None => cancelled.push(d.symbol.clone()),
        }
    }

    if !cancelled.is_empty() {
        warn!(count = cancelled.len(), "Sweep cancelled before all symbols ran");
    }

    let report = SweepReport::new(results, cancelled);
    info!(
        symbols = report.totals.symbols,
        trades = report.totals.total_trades,
        pnl = report.totals.total_pnl,
        "Sweep complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtesting::BacktestConfig;
    use chrono::{Duration, TimeZone, Utc};

    fn flat_bars(n: i64) -> Vec<PriceBar> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| PriceBar {
                timestamp: t0 + Duration::hours(i),
                open: 1.1,
                high: 1.101,
                low: 1.099,
                close: 1.1,
                spread_pips: Some(0.8),
            })
            .collect()
    }

    fn data() -> Vec<SymbolData> {
        ["EURUSD", "GBPUSD", "USDJPY"]
            .iter()
            .map(|s| SymbolData {
                symbol: s.to_string(),
                bars: flat_bars(5),
                signals: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_sweep_keeps_input_order() {
        let cancel = AtomicBool::new(false);
        let report = run_sweep(&SimulatorSettings::default(), &data(), &cancel, true).unwrap();
        let symbols: Vec<&str> = report.results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["EURUSD", "GBPUSD", "USDJPY"]);
        assert_eq!(report.totals.symbols, 3);
        assert!(report.cancelled.is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let cancel = AtomicBool::new(false);
        let settings = SimulatorSettings::default();
        let par = run_sweep(&settings, &data(), &cancel, true).unwrap();
        let seq = run_sweep(&settings, &data(), &cancel, false).unwrap();
        assert_eq!(par, seq);
    }

    #[test]
    fn test_cancelled_sweep_runs_nothing() {
        let cancel = AtomicBool::new(true);
        let report = run_sweep(&SimulatorSettings::default(), &data(), &cancel, false).unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.cancelled.len(), 3);
        assert!(report.best().is_none());
    }

    #[test]
    fn test_bad_settings_fail_fast() {
        let settings = SimulatorSettings {
            backtest: BacktestConfig {
                initial_balance: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        assert!(run_sweep(&settings, &data(), &cancel, false).is_err());
    }
}
