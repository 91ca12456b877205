//! Performance metrics over closed trades

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Trade;

/// One point of the realized equity curve, appended per closed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    pub trade_pnl: f64,
    pub cumulative_pnl: f64,
}

/// Backtest performance metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Total number of closed trades
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_pnl_pips: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// Gross profit / gross loss, 0 with no losses
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Average P&L per trade
    pub expectancy: f64,
    pub total_commission: f64,
    /// Largest peak-to-trough drop of the equity curve (account currency)
    pub max_drawdown: f64,
    /// Same drop as a percentage of the running peak
    pub max_drawdown_pct: f64,
    /// Mean / stdev of bar-over-bar realized balance returns, not annualized
    pub sharpe_ratio: f64,
    /// total_pnl / max_drawdown
    pub recovery_factor: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    /// Mean holding time in seconds
    pub avg_trade_duration_secs: f64,
}

/// Max drawdown and its percentage of the running peak.
///
/// The peak starts at `initial`, so a curve that only falls from the
/// starting balance still registers its drawdown.
pub fn max_drawdown(initial: f64, balances: &[f64]) -> (f64, f64) {
    let mut peak = initial;
    let mut max_dd: f64 = 0.0;
    let mut max_dd_pct: f64 = 0.0;

    for &b in balances {
        peak = peak.max(b);
        let dd = peak - b;
        if dd > max_dd {
            max_dd = dd;
        }
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max(dd / peak * 100.0);
        }
    }
    (max_dd, max_dd_pct)
}

/// Realized balance at the close of every replayed bar.
///
/// A trade counts from the bar it exits on; bars between closes repeat the
/// last balance.
pub fn realized_balances(initial: f64, closed: &[&Trade], bar_times: &[DateTime<Utc>]) -> Vec<f64> {
    let mut exits: Vec<(DateTime<Utc>, f64)> = closed
        .iter()
        .filter_map(|t| Some((t.exit_time?, t.pnl?)))
        .collect();
    exits.sort_by_key(|(at, _)| *at);

    let mut balance = initial;
    let mut next = exits.iter().peekable();
    bar_times
        .iter()
        .map(|ts| {
            while let Some((_, pnl)) = next.next_if(|(at, _)| at <= ts) {
                balance += pnl;
            }
            balance
        })
        .collect()
}

/// Simplified Sharpe over successive balance returns (population stdev)
pub fn sharpe_ratio(initial: f64, balances: &[f64]) -> f64 {
    let mut prev = initial;
    let mut returns = Vec::with_capacity(balances.len());
    for &b in balances {
        if prev != 0.0 {
            returns.push((b - prev) / prev);
        }
        prev = b;
    }
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        mean / std_dev
    } else {
        0.0
    }
}

/// Metrics over the closed trades in `trades`, in close order.
///
/// The equity curve is rebuilt from `initial_balance` so subsets (per grade)
/// get their own drawdown and Sharpe. `bar_times` are the replayed bars the
/// Sharpe ratio is sampled on.
pub fn calculate<'a, I>(trades: I, initial_balance: f64, bar_times: &[DateTime<Utc>]) -> PerformanceMetrics
where
    I: IntoIterator<Item = &'a Trade>,
{
    let closed: Vec<&Trade> = trades.into_iter().filter(|t| t.status.is_closed()).collect();
    if closed.is_empty() {
        return PerformanceMetrics::default();
    }

    let pnls: Vec<f64> = closed.iter().map(|t| t.pnl.unwrap_or(0.0)).collect();
    let total_trades = closed.len();

    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().map(|p| p.abs()).sum();
    let total_pnl: f64 = pnls.iter().sum();

    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        0.0
    };
    let avg_win = if wins.is_empty() {
        0.0
    } else {
        gross_profit / wins.len() as f64
    };
    let avg_loss = if losses.is_empty() {
        0.0
    } else {
        gross_loss / losses.len() as f64
    };

    let mut balances = Vec::with_capacity(total_trades);
    let mut balance = initial_balance;
    for p in &pnls {
        balance += p;
        balances.push(balance);
    }
    let (max_dd, max_dd_pct) = max_drawdown(initial_balance, &balances);

    // streaks
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut cur_wins = 0;
    let mut cur_losses = 0;
    for p in &pnls {
        if *p > 0.0 {
            cur_wins += 1;
            cur_losses = 0;
        } else if *p < 0.0 {
            cur_losses += 1;
            cur_wins = 0;
        } else {
            continue;
        }
        max_wins = max_wins.max(cur_wins);
        max_losses = max_losses.max(cur_losses);
    }

    let durations: Vec<f64> = closed
        .iter()
        .filter_map(|t| t.exit_time.map(|exit| (exit - t.entry_time).num_seconds() as f64))
        .collect();
    let avg_trade_duration_secs = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    PerformanceMetrics {
        total_trades,
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        win_rate: wins.len() as f64 / total_trades as f64,
        total_pnl,
        total_pnl_pips: closed.iter().filter_map(|t| t.pnl_pips).sum(),
        gross_profit,
        gross_loss,
        profit_factor,
        avg_win,
        avg_loss,
        largest_win: wins.iter().copied().fold(0.0, f64::max),
        largest_loss: losses.iter().map(|p| p.abs()).fold(0.0, f64::max),
        expectancy: total_pnl / total_trades as f64,
        total_commission: closed.iter().map(|t| t.commission).sum(),
        max_drawdown: max_dd,
        max_drawdown_pct: max_dd_pct,
        sharpe_ratio: sharpe_ratio(initial_balance, &realized_balances(initial_balance, &closed, bar_times)),
        recovery_factor: if max_dd > 0.0 { total_pnl / max_dd } else { 0.0 },
        max_consecutive_wins: max_wins,
        max_consecutive_losses: max_losses,
        avg_trade_duration_secs,
    }
}
