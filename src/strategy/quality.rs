//! Signal Quality Grader
//!
//! Blends four sub-scores into a 0-100 quality score:
//! - Multi-timeframe cascade alignment
//! - Liquidity positioning around the entry
//! - Weighted confluence per factor kind
//! - Binary risk/reward validity
//!
//! Execution readiness (duplicates, session, concurrency, validity) is an
//! independent gate. Accepted signals feed the grader's own dedup history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cascade::{CascadeConfig, CascadeResult, MultiTimeframeCascade};
use super::history::SignalHistory;
use super::session::{in_allowed_session, TradingSession};
use crate::error::ConfigError;
use crate::types::{FactorKind, LiquiditySide, QualityGrade, Signal, SmcAnalysis, TimeframeAnalysis};

/// Per-kind confluence weights (0-100 scale, must sum to 100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub trend_alignment: f64,
    pub structure_break: f64,
    pub order_block: f64,
    pub liquidity_zone: f64,
    pub fair_value_gap: f64,
    pub supply_demand: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            trend_alignment: 25.0,
            structure_break: 20.0,
            order_block: 15.0,
            liquidity_zone: 20.0,
            fair_value_gap: 10.0,
            supply_demand: 10.0,
        }
    }
}

impl FactorWeights {
    pub fn weight(&self, kind: FactorKind) -> f64 {
        match kind {
            FactorKind::TrendAlignment => self.trend_alignment,
            FactorKind::StructureBreak => self.structure_break,
            FactorKind::OrderBlock => self.order_block,
            FactorKind::LiquidityZone => self.liquidity_zone,
            FactorKind::FairValueGap => self.fair_value_gap,
            FactorKind::SupplyDemand => self.supply_demand,
        }
    }

    fn total(&self) -> f64 {
        FactorKind::ALL.iter().map(|k| self.weight(*k)).sum()
    }
}

/// Grader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Component weights (must sum to 1.0)
    pub cascade_weight: f64,
    pub liquidity_weight: f64,
    pub confluence_weight: f64,
    pub risk_reward_weight: f64,
    pub factor_weights: FactorWeights,
    /// Minimum R:R for the risk/reward component
    pub min_rr_ratio: f64,
    /// Maximum stop distance as a fraction of entry
    pub max_risk_percentage: f64,
    /// Score required for execution (0-100)
    pub min_execution_score: f64,
    /// Grade floors: institutional, professional, intermediate, basic
    pub grade_thresholds: [f64; 4],
    /// Near-duplicate lookback in hours
    pub duplicate_window_hours: i64,
    /// How long accepted signals are remembered, in hours
    pub history_retention_hours: i64,
    pub allowed_sessions: Vec<TradingSession>,
    pub max_concurrent_trades: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            cascade_weight: 0.35,
            liquidity_weight: 0.25,
            confluence_weight: 0.25,
            risk_reward_weight: 0.15,
            factor_weights: FactorWeights::default(),
            min_rr_ratio: 2.0,
            max_risk_percentage: 0.02, // 2%
            min_execution_score: 55.0,
            grade_thresholds: [85.0, 70.0, 55.0, 40.0],
            duplicate_window_hours: 4,
            history_retention_hours: 24,
            allowed_sessions: vec![
                TradingSession::London,
                TradingSession::NewYork,
                TradingSession::Overlap,
            ],
            max_concurrent_trades: 5,
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_sum(
            "quality component",
            &[
                self.cascade_weight,
                self.liquidity_weight,
                self.confluence_weight,
                self.risk_reward_weight,
            ],
            1.0,
        )?;
        let kinds: Vec<f64> = FactorKind::ALL.iter().map(|k| self.factor_weights.weight(*k)).collect();
        ConfigError::check_sum("confluence factor", &kinds, 100.0)?;
        ConfigError::check_range("quality.min_execution_score", self.min_execution_score, 0.0, 100.0)?;
        for t in self.grade_thresholds {
            ConfigError::check_range("quality.grade_thresholds", t, 0.0, 100.0)?;
        }
        if self.grade_thresholds.windows(2).any(|w| w[0] <= w[1]) {
            return Err(ConfigError::GradeOrder(self.grade_thresholds));
        }
        ConfigError::check_positive("quality.max_risk_percentage", self.max_risk_percentage)?;
        ConfigError::check_positive("quality.duplicate_window_hours", self.duplicate_window_hours as f64)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub cascade: f64,
    pub liquidity: f64,
    pub confluence: f64,
    pub risk_reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPositioning {
    pub score: f64,
    pub nearest_high: Option<f64>,
    pub nearest_low: Option<f64>,
    pub recent_sweeps: usize,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedConfluence {
    pub score: f64,
    pub factors_present: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRewardCheck {
    pub valid: bool,
    pub rr_ratio: f64,
    pub risk_percentage: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReadiness {
    pub ready: bool,
    pub blocking_reasons: Vec<String>,
}

/// Full grading outcome for one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub total_score: f64,
    pub grade: QualityGrade,
    pub should_execute: bool,
    pub component_scores: ComponentScores,
    pub cascade: CascadeResult,
    pub liquidity: LiquidityPositioning,
    pub confluence: WeightedConfluence,
    pub risk_reward: RiskRewardCheck,
    pub readiness: ExecutionReadiness,
    /// Ordered audit trail
    pub decision_reasoning: Vec<String>,
}

pub struct SignalQualityGrader {
    config: QualityConfig,
    cascade: MultiTimeframeCascade,
    history: SignalHistory,
}

impl SignalQualityGrader {
    pub fn new(config: QualityConfig, cascade_config: CascadeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cascade = MultiTimeframeCascade::new(cascade_config)?;
        let history = SignalHistory::new(config.duplicate_window_hours, config.history_retention_hours);
        Ok(Self {
            config,
            cascade,
            history,
        })
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn history(&self) -> &SignalHistory {
        &self.history
    }

    /// Forget all accepted signals (start of a new run)
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Grade a signal against its multi-timeframe context.
    ///
    /// `open_trades` is the number of trades currently open across the
    /// portfolio. Accepted signals are recorded for duplicate detection.
    pub fn grade(&mut self, signal: &Signal, analyses: &[TimeframeAnalysis], open_trades: usize) -> QualityReport {
        let cascade = self.cascade.analyze(analyses);

        let primary = analyses
            .iter()
            .find(|a| a.timeframe == signal.timeframe)
            .or_else(|| analyses.first());
        let empty = SmcAnalysis::default();
        let smc = primary.map_or(&empty, |a| &a.smc);

        let liquidity = self.liquidity_positioning(smc, signal.entry);
        let confluence = self.weighted_confluence(signal);
        let risk_reward = self.validate_risk_reward(signal);
        let readiness = self.execution_readiness(signal, open_trades);

        let component_scores = ComponentScores {
            cascade: cascade.cascade_score,
            liquidity: liquidity.score,
            confluence: confluence.score,
            risk_reward: if risk_reward.valid { 100.0 } else { 0.0 },
        };
        let total_score = self.total_score(&component_scores);
        let grade = self.grade_for(total_score);
        let should_execute = self.should_execute(total_score, risk_reward.valid, readiness.ready);

        let decision_reasoning =
            self.reasoning(&cascade, &liquidity, &confluence, &risk_reward, &readiness, should_execute);

        if should_execute {
            self.history.record(signal);
        }

        debug!(
            symbol = %signal.symbol,
            score = total_score,
            grade = %grade,
            should_execute,
            "Signal graded"
        );

        QualityReport {
            symbol: signal.symbol.clone(),
            timestamp: signal.timestamp,
            total_score: round2(total_score),
            grade,
            should_execute,
            component_scores,
            cascade,
            liquidity,
            confluence,
            risk_reward,
            readiness,
            decision_reasoning,
        }
    }

    /// Score how the entry sits relative to resting liquidity
    pub fn liquidity_positioning(&self, smc: &SmcAnalysis, price: f64) -> LiquidityPositioning {
        let mut out = LiquidityPositioning {
            score: 0.0,
            nearest_high: None,
            nearest_low: None,
            recent_sweeps: 0,
            reasons: Vec::new(),
        };
        if !price.is_finite() || price <= 0.0 {
            out.reasons.push("No price".to_string());
            return out;
        }

        let nearest = |side: LiquiditySide| -> Option<f64> {
            smc.liquidity_unswept
                .iter()
                .filter(|lz| lz.side == side)
                .map(|lz| lz.level)
                .min_by(|a, b| (a - price).abs().total_cmp(&(b - price).abs()))
        };
        out.nearest_high = nearest(LiquiditySide::High);
        out.nearest_low = nearest(LiquiditySide::Low);

        let mut score: f64 = 0.0;
        let min_distance = [out.nearest_high, out.nearest_low]
            .iter()
            .flatten()
            .map(|level| (price - level).abs() / price)
            .min_by(f64::total_cmp);

        if let Some(d) = min_distance {
            if d <= 0.002 {
                score += 30.0;
                out.reasons.push("Near key liquidity level".to_string());
            } else if d <= 0.005 {
                score += 20.0;
                out.reasons.push("Approaching liquidity level".to_string());
            }
        }

        if let (Some(high), Some(low)) = (out.nearest_high, out.nearest_low) {
            if low < price && price < high {
                let position = (price - low) / (high - low);
                if (0.2..=0.8).contains(&position) {
                    score += 15.0;
                    out.reasons.push("In optimal range position".to_string());
                }
            }
        }

        out.recent_sweeps = smc.liquidity_swept.iter().filter(|lz| lz.swept_recently).count();
        if out.recent_sweeps > 0 {
            score += 25.0;
            out.reasons.push(format!("{} recent liquidity sweeps", out.recent_sweeps));
        }

        if min_distance.is_some_and(|d| d > 0.01) {
            score -= 20.0;
            out.reasons.push("Far from key liquidity levels".to_string());
        }

        out.score = score.clamp(0.0, 100.0);
        out
    }

    /// Per kind: mean raw score of supporting factors capped at 1.0, times the kind weight
    pub fn weighted_confluence(&self, signal: &Signal) -> WeightedConfluence {
        let weights = &self.config.factor_weights;
        let total_weight = weights.total();
        let mut sum = 0.0;
        let mut present = 0;

        for kind in FactorKind::ALL {
            let (raw, count) = signal
                .supporting_factors()
                .filter(|f| f.kind == kind)
                .fold((0.0, 0usize), |(s, c), f| (s + f.raw_score, c + 1));
            if count == 0 {
                continue;
            }
            present += count;
            sum += (raw / count as f64).min(1.0) * weights.weight(kind);
        }

        let score = if total_weight > 0.0 {
            sum / total_weight * 100.0
        } else {
            0.0
        };
        WeightedConfluence {
            score: round2(score),
            factors_present: present,
        }
    }

    pub fn validate_risk_reward(&self, signal: &Signal) -> RiskRewardCheck {
        let levels = [signal.entry, signal.stop_loss, signal.take_profit];
        if levels.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return RiskRewardCheck {
                valid: false,
                rr_ratio: 0.0,
                risk_percentage: 0.0,
                reasons: vec!["Missing entry, SL, or TP levels".to_string()],
            };
        }

        let risk = (signal.entry - signal.stop_loss).abs();
        let reward = (signal.take_profit - signal.entry).abs();
        let rr = if risk > 0.0 { reward / risk } else { 0.0 };
        let risk_percentage = risk / signal.entry;

        let mut reasons = Vec::new();
        if rr < self.config.min_rr_ratio {
            reasons.push(format!(
                "R:R ratio {:.2} below minimum {}",
                rr, self.config.min_rr_ratio
            ));
        }
        if risk_percentage > self.config.max_risk_percentage {
            reasons.push(format!(
                "Risk percentage {:.4} above maximum {}",
                risk_percentage, self.config.max_risk_percentage
            ));
        }

        RiskRewardCheck {
            valid: reasons.is_empty(),
            rr_ratio: round2(rr),
            risk_percentage,
            reasons,
        }
    }

    pub fn execution_readiness(&self, signal: &Signal, open_trades: usize) -> ExecutionReadiness {
        let mut blocking_reasons = Vec::new();

        if self.history.is_duplicate(signal) {
            blocking_reasons.push("Duplicate signal detected".to_string());
        }
        if !in_allowed_session(&self.config.allowed_sessions, signal.timestamp) {
            blocking_reasons.push("Outside allowed trading sessions".to_string());
        }
        if open_trades >= self.config.max_concurrent_trades {
            blocking_reasons.push("Maximum concurrent trades reached".to_string());
        }
        if !signal.valid {
            blocking_reasons.push("Signal marked as invalid".to_string());
        }

        ExecutionReadiness {
            ready: blocking_reasons.is_empty(),
            blocking_reasons,
        }
    }

    pub fn total_score(&self, c: &ComponentScores) -> f64 {
        let total = c.cascade * self.config.cascade_weight
            + c.liquidity * self.config.liquidity_weight
            + c.confluence * self.config.confluence_weight
            + c.risk_reward * self.config.risk_reward_weight;
        total.clamp(0.0, 100.0)
    }

    pub fn grade_for(&self, score: f64) -> QualityGrade {
        let [institutional, professional, intermediate, basic] = self.config.grade_thresholds;
        if score >= institutional {
            QualityGrade::Institutional
        } else if score >= professional {
            QualityGrade::Professional
        } else if score >= intermediate {
            QualityGrade::Intermediate
        } else if score >= basic {
            QualityGrade::Basic
        } else {
            QualityGrade::Poor
        }
    }

    pub fn should_execute(&self, score: f64, risk_reward_valid: bool, ready: bool) -> bool {
        score >= self.config.min_execution_score && risk_reward_valid && ready
    }

    fn reasoning(
        &self,
        cascade: &CascadeResult,
        liquidity: &LiquidityPositioning,
        confluence: &WeightedConfluence,
        risk_reward: &RiskRewardCheck,
        readiness: &ExecutionReadiness,
        should_execute: bool,
    ) -> Vec<String> {
        let mut out = Vec::with_capacity(6);

        if cascade.is_aligned {
            out.push(format!(
                "✓ Multi-timeframe alignment confirmed ({:.1}/100)",
                cascade.cascade_score
            ));
        } else {
            out.push(format!(
                "✗ Multi-timeframe alignment weak ({:.1}/100)",
                cascade.cascade_score
            ));
        }

        if liquidity.score >= 70.0 {
            out.push(format!("✓ Excellent liquidity positioning ({:.0}/100)", liquidity.score));
        } else if liquidity.score >= 40.0 {
            out.push(format!("⚠ Moderate liquidity positioning ({:.0}/100)", liquidity.score));
        } else {
            out.push(format!("✗ Poor liquidity positioning ({:.0}/100)", liquidity.score));
        }

        out.push(format!(
            "Confluence: {:.1}/100 ({} factors)",
            confluence.score, confluence.factors_present
        ));

        if risk_reward.valid {
            out.push(format!("✓ Risk-reward valid (R:R {}:1)", risk_reward.rr_ratio));
        } else {
            out.push(format!("✗ Risk-reward invalid: {}", risk_reward.reasons.join(", ")));
        }

        if readiness.ready {
            out.push("✓ Ready for execution".to_string());
        } else {
            out.push(format!("✗ Execution blocked: {}", readiness.blocking_reasons.join(", ")));
        }

        out.push(if should_execute {
            "SIGNAL APPROVED FOR EXECUTION".to_string()
        } else {
            "SIGNAL REJECTED".to_string()
        });
        out
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
