//! Backtesting Module
//!
//! Deterministic bar-by-bar replay of graded signals:
//! - Signal gating (spread, confluence, R:R, grader, risk manager)
//! - Trade lifecycle OPEN → STOPPED_OUT | TARGET_HIT with pinned exits
//! - Realized equity curve and performance metrics
//!
//! Each run owns its grader and risk manager; nothing is shared across runs.

pub mod metrics;
pub mod sweep;

pub use metrics::{EquityPoint, PerformanceMetrics};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::error::{ConfigError, SkipReason};
use crate::risk::{RiskConfig, RiskManager};
use crate::strategy::{CascadeConfig, ConfluenceConfig, ConfluenceScorer, QualityConfig, SignalQualityGrader};
use crate::types::{
    pip_size, PriceBar, QualityGrade, Signal, SignalDirection, Timeframe, TimeframeAnalysis, TradeStatus, LOT_UNITS,
};

/// Simulated trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: usize,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub direction: SignalDirection,
    pub entry_price: f64,
    /// Pinned to stop_loss or take_profit
    pub exit_price: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Lots
    pub size: f64,
    pub pnl: Option<f64>,
    pub pnl_pips: Option<f64>,
    pub status: TradeStatus,
    /// Price units per lot (rate × size)
    pub commission: f64,
    pub quality_score: f64,
    pub grade: QualityGrade,
    pub confluence_score: usize,
}

/// A signal together with the multi-timeframe context it was produced in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub signal: Signal,
    #[serde(default)]
    pub context: Vec<TimeframeAnalysis>,
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting balance (account currency)
    pub initial_balance: f64,
    /// Commission per lot as a price fraction
    pub commission_rate: f64,
    /// Widest tradable spread in pips
    pub max_spread_pips: f64,
    /// Spread assumed when a bar carries none
    pub default_spread_pips: f64,
    /// Minimum grader score to enter (0-100)
    pub min_signal_quality: f64,
    pub min_confluence: usize,
    pub min_rr_ratio: f64,
    pub min_supporting_factors: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            commission_rate: 0.00007,
            max_spread_pips: 2.0,
            default_spread_pips: 0.0,
            min_signal_quality: 70.0,
            min_confluence: 3,
            min_rr_ratio: 2.5,
            min_supporting_factors: 1,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_positive("backtest.initial_balance", self.initial_balance)?;
        ConfigError::check_range("backtest.commission_rate", self.commission_rate, 0.0, 1.0)?;
        ConfigError::check_range("backtest.min_signal_quality", self.min_signal_quality, 0.0, 100.0)?;
        ConfigError::check_range("backtest.max_spread_pips", self.max_spread_pips, 0.0, f64::MAX)?;
        ConfigError::check_range("backtest.default_spread_pips", self.default_spread_pips, 0.0, f64::MAX)?;
        Ok(())
    }
}

/// Everything needed to build an isolated simulator
#[derive(Debug, Clone, Default)]
pub struct SimulatorSettings {
    pub backtest: BacktestConfig,
    pub confluence: ConfluenceConfig,
    pub quality: QualityConfig,
    pub cascade: CascadeConfig,
    pub risk: RiskConfig,
}

impl SimulatorSettings {
    pub fn build(&self) -> Result<TradeSimulator, ConfigError> {
        TradeSimulator::new(self.clone())
    }
}

/// Counts of what happened to the signals of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub bars_processed: usize,
    pub signals_seen: usize,
    pub trades_opened: usize,
    pub trades_closed: usize,
    pub trades_open_at_end: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Risk manager refusals by reason code
    pub risk_rejections: BTreeMap<String, usize>,
    pub dominant_skip_reason: Option<SkipReason>,
}

impl RunSummary {
    fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }

    fn finish(&mut self) {
        // ties resolve to the first reason in declaration order
        self.dominant_skip_reason = self
            .skipped
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(reason, _)| *reason);
    }
}

/// Backtest result bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub performance_metrics: PerformanceMetrics,
    pub metrics_by_grade: BTreeMap<QualityGrade, PerformanceMetrics>,
    /// Closed trades in close order, then any still open at end of data
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_balance: f64,
    pub final_balance: f64,
    /// Percent return over initial balance
    pub total_return: f64,
    pub summary: RunSummary,
}

/// Per-run mutable state
struct PortfolioState {
    balance: f64,
    cumulative_pnl: f64,
    open_trade: Option<Trade>,
    closed: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    /// Every replayed bar, the sampling grid for Sharpe
    bar_times: Vec<DateTime<Utc>>,
    next_id: usize,
}

impl PortfolioState {
    fn new(balance: f64) -> Self {
        Self {
            balance,
            cumulative_pnl: 0.0,
            open_trade: None,
            closed: Vec::new(),
            equity_curve: Vec::new(),
            bar_times: Vec::new(),
            next_id: 1,
        }
    }
}

/// Bar-by-bar trade simulator
pub struct TradeSimulator {
    settings: SimulatorSettings,
    scorer: ConfluenceScorer,
    grader: SignalQualityGrader,
    risk: RiskManager,
}

impl TradeSimulator {
    pub fn new(settings: SimulatorSettings) -> Result<Self, ConfigError> {
        settings.backtest.validate()?;
        let scorer = ConfluenceScorer::new(settings.confluence.clone())?;
        let grader = SignalQualityGrader::new(settings.quality.clone(), settings.cascade.clone())?;
        let risk = RiskManager::new(settings.risk.clone(), settings.backtest.initial_balance)?;
        Ok(Self {
            settings,
            scorer,
            grader,
            risk,
        })
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    pub fn risk_manager(&self) -> &RiskManager {
        &self.risk
    }

    /// Replay `bars` of one symbol against `events`.
    ///
    /// Only the current bar is visible at each step. Events for other
    /// symbols and later events sharing a timestamp are skipped and counted.
    pub fn run_backtest(&mut self, symbol: &str, bars: &[PriceBar], events: &[SignalEvent]) -> BacktestResult {
        let initial_balance = self.settings.backtest.initial_balance;
        self.grader.reset();
        self.risk.reset(initial_balance);

        let mut state = PortfolioState::new(initial_balance);
        let mut summary = RunSummary::default();

        let mut lookup: HashMap<DateTime<Utc>, &SignalEvent> = HashMap::new();
        for ev in events {
            if ev.signal.symbol != symbol {
                summary.skip(SkipReason::SymbolMismatch);
                continue;
            }
            if lookup.contains_key(&ev.signal.timestamp) {
                summary.skip(SkipReason::DuplicateTimestamp);
                continue;
            }
            lookup.insert(ev.signal.timestamp, ev);
        }

        let mut ordered: Vec<&PriceBar> = bars.iter().collect();
        ordered.sort_by_key(|b| b.timestamp);

        info!(symbol, bars = ordered.len(), signals = lookup.len(), "Backtest started");

        for bar in ordered {
            summary.bars_processed += 1;
            self.risk.roll_day(bar.timestamp.date_naive());

            if let Some(ev) = lookup.remove(&bar.timestamp) {
                summary.signals_seen += 1;
                self.consider_entry(ev, bar, &mut state, &mut summary);
            }

            self.update_open_trade(bar, &mut state, &mut summary);
            state.bar_times.push(bar.timestamp);
        }

        if !lookup.is_empty() {
            debug!(symbol, unmatched = lookup.len(), "Signals without a matching bar");
            for _ in 0..lookup.len() {
                summary.skip(SkipReason::NoMatchingBar);
            }
        }

        let mut trades = std::mem::take(&mut state.closed);
        if let Some(open) = state.open_trade.take() {
            summary.trades_open_at_end = 1;
            trades.push(open);
        }
        summary.finish();

        let performance_metrics = metrics::calculate(&trades, initial_balance, &state.bar_times);
        let mut by_grade: BTreeMap<QualityGrade, Vec<&Trade>> = BTreeMap::new();
        for t in trades.iter().filter(|t| t.status.is_closed()) {
            by_grade.entry(t.grade).or_default().push(t);
        }
        let metrics_by_grade = by_grade
            .into_iter()
            .map(|(grade, group)| (grade, metrics::calculate(group, initial_balance, &state.bar_times)))
            .collect();

        let final_balance = state.balance;
        let total_return = (final_balance - initial_balance) / initial_balance * 100.0;

        info!(
            symbol,
            trades = performance_metrics.total_trades,
            win_rate = performance_metrics.win_rate,
            final_balance,
            dominant_skip = ?summary.dominant_skip_reason,
            "Backtest finished"
        );

        BacktestResult {
            symbol: symbol.to_string(),
            performance_metrics,
            metrics_by_grade,
            trades,
            equity_curve: state.equity_curve,
            initial_balance,
            final_balance,
            total_return,
            summary,
        }
    }

    fn consider_entry(&mut self, ev: &SignalEvent, bar: &PriceBar, state: &mut PortfolioState, summary: &mut RunSummary) {
        let cfg = &self.settings.backtest;
        let signal = &ev.signal;

        if !signal.is_well_formed() {
            debug!(symbol = %signal.symbol, ts = %signal.timestamp, "Skipping malformed signal");
            summary.skip(SkipReason::MalformedSignal);
            return;
        }

        let spread = bar.spread_pips.unwrap_or(cfg.default_spread_pips);
        if spread > cfg.max_spread_pips {
            debug!(symbol = %signal.symbol, spread, "Spread too wide");
            summary.skip(SkipReason::SpreadTooWide);
            return;
        }
        if signal.confluence_score < cfg.min_confluence {
            summary.skip(SkipReason::LowConfluence);
            return;
        }
        if signal.risk_reward_ratio < cfg.min_rr_ratio {
            summary.skip(SkipReason::LowRiskReward);
            return;
        }
        if signal.supporting_factors().count() < cfg.min_supporting_factors {
            summary.skip(SkipReason::NoSupportingFactor);
            return;
        }

        let context = self.scored_context(signal, &ev.context);
        let report = self.grader.grade(signal, &context, self.risk.open_positions());
        if !report.should_execute {
            debug!(
                symbol = %signal.symbol,
                score = report.total_score,
                reasoning = ?report.decision_reasoning,
                "Grader rejected signal"
            );
            summary.skip(SkipReason::QualityRejected);
            return;
        }
        if report.total_score < cfg.min_signal_quality {
            debug!(symbol = %signal.symbol, score = report.total_score, "Below minimum signal quality");
            summary.skip(SkipReason::BelowMinQuality);
            return;
        }

        let confidence = report.total_score / 100.0;
        let sized = self.risk.can_trade(&signal.symbol, confidence).and_then(|_| {
            self.risk
                .calculate_position_size(&signal.symbol, signal.entry, signal.stop_loss, confidence)
        });
        let position = match sized {
            Ok(p) => p,
            Err(reason) => {
                debug!(symbol = %signal.symbol, reason = %reason, "Risk manager rejected trade");
                summary.skip(SkipReason::RiskRejected);
                *summary.risk_rejections.entry(reason.code().to_string()).or_insert(0) += 1;
                return;
            }
        };

        let trade = Trade {
            id: state.next_id,
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe,
            entry_time: bar.timestamp,
            exit_time: None,
            direction: signal.direction,
            entry_price: signal.entry,
            exit_price: None,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            size: position.size,
            pnl: None,
            pnl_pips: None,
            status: TradeStatus::Open,
            commission: cfg.commission_rate * position.size,
            quality_score: report.total_score,
            grade: report.grade,
            confluence_score: signal.confluence_score,
        };
        state.next_id += 1;
        summary.trades_opened += 1;

        info!(
            id = trade.id,
            symbol = %trade.symbol,
            direction = %trade.direction,
            entry = trade.entry_price,
            size = trade.size,
            grade = %trade.grade,
            "Trade opened"
        );
        self.risk.open_position(position);
        state.open_trade = Some(trade);
    }

    /// Fill in the per-timeframe signal of every analysis that arrived with facts only
    fn scored_context<'a>(&self, signal: &Signal, context: &'a [TimeframeAnalysis]) -> Cow<'a, [TimeframeAnalysis]> {
        if context.iter().all(|a| a.signal.is_some()) {
            return Cow::Borrowed(context);
        }
        let scored = context
            .iter()
            .map(|a| {
                let mut a = a.clone();
                if a.signal.is_none() {
                    a.signal = Some(self.scorer.score_analysis(&signal.symbol, signal.timestamp, &a));
                }
                a
            })
            .collect::<Vec<_>>();
        Cow::Owned(scored)
    }

    /// Check the open trade against this bar's bid/ask range, stop first
    fn update_open_trade(&mut self, bar: &PriceBar, state: &mut PortfolioState, summary: &mut RunSummary) {
        let Some(trade) = state.open_trade.as_ref() else {
            return;
        };

        let spread_pips = bar.spread_pips.unwrap_or(self.settings.backtest.default_spread_pips);
        let spread = spread_pips * pip_size(&trade.symbol);

        let exit = match trade.direction {
            SignalDirection::Buy => {
                // long positions close on the bid
                if bar.low <= trade.stop_loss {
                    Some((TradeStatus::StoppedOut, trade.stop_loss))
                } else if bar.high >= trade.take_profit {
                    Some((TradeStatus::TargetHit, trade.take_profit))
                } else {
                    None
                }
            }
            SignalDirection::Sell => {
                // short positions close on the ask
                let ask_high = bar.high + spread;
                let ask_low = bar.low + spread;
                if ask_high >= trade.stop_loss {
                    Some((TradeStatus::StoppedOut, trade.stop_loss))
                } else if ask_low <= trade.take_profit {
                    Some((TradeStatus::TargetHit, trade.take_profit))
                } else {
                    None
                }
            }
            SignalDirection::Wait => None,
        };

        if let Some((status, exit_price)) = exit {
            if let Some(trade) = state.open_trade.take() {
                self.close_trade(trade, status, exit_price, bar.timestamp, state, summary);
            }
        }
    }

    fn close_trade(
        &mut self,
        mut trade: Trade,
        status: TradeStatus,
        exit_price: f64,
        at: DateTime<Utc>,
        state: &mut PortfolioState,
        summary: &mut RunSummary,
    ) {
        let delta = (exit_price - trade.entry_price) * trade.direction.sign();
        let pnl = delta * trade.size * LOT_UNITS - trade.commission * LOT_UNITS;

        trade.exit_time = Some(at);
        trade.exit_price = Some(exit_price);
        trade.status = status;
        trade.pnl = Some(pnl);
        trade.pnl_pips = Some(delta / pip_size(&trade.symbol));

        self.risk.close_position(&trade.symbol, pnl);
        state.balance += pnl;
        state.cumulative_pnl += pnl;
        state.equity_curve.push(EquityPoint {
            timestamp: at,
            balance: state.balance,
            trade_pnl: pnl,
            cumulative_pnl: state.cumulative_pnl,
        });
        summary.trades_closed += 1;

        info!(
            id = trade.id,
            symbol = %trade.symbol,
            status = %trade.status,
            exit = exit_price,
            pnl,
            balance = state.balance,
            "Trade closed"
        );
        state.closed.push(trade);
    }
}
