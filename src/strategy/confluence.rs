//! Confluence Scorer
//!
//! Turns the structure and SMC facts of a single timeframe into one
//! directional signal. Every active factor votes with its base score for
//! its side; the winning side needs at least 3 points and strictly more
//! than the other side. Stops sit beyond the nearest opposing structure,
//! targets at the nearest favorable level but never inside the minimum
//! reward multiple.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::types::{
    Bias, ConfluenceFactor, FactorKind, LiquiditySide, MarketStructure, PriceBand, Signal,
    SignalDirection, SmcAnalysis, Timeframe, TimeframeAnalysis, ZoneKind,
};

/// Confluence scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    /// Minimum number of active factors before a direction is called
    pub min_confluence_factors: usize,
    /// Minimum side score before a direction is called
    pub min_direction_score: f64,
    /// Minimum reward multiple of risk
    pub min_rr_ratio: f64,
    /// Order block proximity as a fraction of price
    pub order_block_tolerance: f64,
    /// Liquidity proximity as a fraction of price
    pub liquidity_tolerance: f64,
    /// Supply/demand edge proximity as a fraction of price
    pub supply_demand_tolerance: f64,
    /// Buffer beyond the protecting level, fraction of entry
    pub stop_buffer_pct: f64,
    /// Stop distance used when no protecting level exists
    pub fallback_stop_pct: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            min_confluence_factors: 2,
            min_direction_score: 3.0,
            min_rr_ratio: 2.0,
            order_block_tolerance: 0.001,   // 0.1%
            liquidity_tolerance: 0.002,     // 0.2%
            supply_demand_tolerance: 0.001, // 0.1%
            stop_buffer_pct: 0.001,         // 0.1%
            fallback_stop_pct: 0.005,       // 0.5%
        }
    }
}

impl ConfluenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range("confluence.order_block_tolerance", self.order_block_tolerance, 0.0, 1.0)?;
        ConfigError::check_range("confluence.liquidity_tolerance", self.liquidity_tolerance, 0.0, 1.0)?;
        ConfigError::check_range(
            "confluence.supply_demand_tolerance",
            self.supply_demand_tolerance,
            0.0,
            1.0,
        )?;
        ConfigError::check_range("confluence.stop_buffer_pct", self.stop_buffer_pct, 0.0, 0.5)?;
        ConfigError::check_positive("confluence.fallback_stop_pct", self.fallback_stop_pct)?;
        ConfigError::check_range("confluence.fallback_stop_pct", self.fallback_stop_pct, 0.0, 0.5)?;
        Ok(())
    }
}

/// Bullish/bearish tally of one analysis pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfluenceTally {
    pub bullish_score: f64,
    pub bearish_score: f64,
    pub factors: Vec<ConfluenceFactor>,
}

pub struct ConfluenceScorer {
    config: ConfluenceConfig,
}

impl ConfluenceScorer {
    pub fn new(config: ConfluenceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConfluenceConfig {
        &self.config
    }

    /// Collect every active factor and tally them per side
    pub fn tally(&self, structure: &MarketStructure, smc: &SmcAnalysis, price: f64) -> ConfluenceTally {
        let mut factors = Vec::new();

        if structure.trend_direction != Bias::Neutral {
            factors.push(factor(FactorKind::TrendAlignment, structure.trend_direction, None));
        }

        if let Some(brk) = structure.latest_break() {
            if brk.direction != Bias::Neutral {
                factors.push(factor(FactorKind::StructureBreak, brk.direction, Some(brk.level)));
            }
        }

        for ob in &smc.order_blocks {
            if ob.direction == Bias::Neutral {
                continue;
            }
            if ob.contains(price) || ob.edge_distance_pct(price) <= self.config.order_block_tolerance {
                let mid = (ob.top + ob.bottom) / 2.0;
                factors.push(factor(FactorKind::OrderBlock, ob.direction, Some(mid)));
            }
        }

        for lz in &smc.liquidity_unswept {
            if (lz.level - price).abs() / price <= self.config.liquidity_tolerance {
                // resting sell stops below attract a bounce, buy stops above a rejection
                let direction = match lz.side {
                    LiquiditySide::Low => Bias::Bullish,
                    LiquiditySide::High => Bias::Bearish,
                };
                factors.push(factor(FactorKind::LiquidityZone, direction, Some(lz.level)));
            }
        }

        for fvg in &smc.fair_value_gaps {
            if fvg.direction != Bias::Neutral && fvg.contains(price) {
                let mid = (fvg.top + fvg.bottom) / 2.0;
                factors.push(factor(FactorKind::FairValueGap, fvg.direction, Some(mid)));
            }
        }

        for zone in &smc.supply_demand_zones {
            if zone.contains(price) || zone.edge_distance_pct(price) <= self.config.supply_demand_tolerance {
                let direction = match zone.kind {
                    ZoneKind::Demand => Bias::Bullish,
                    ZoneKind::Supply => Bias::Bearish,
                };
                let mid = (zone.top + zone.bottom) / 2.0;
                factors.push(factor(FactorKind::SupplyDemand, direction, Some(mid)));
            }
        }

        let side_score = |bias: Bias| -> f64 {
            factors
                .iter()
                .filter(|f| f.direction == bias)
                .map(|f| f.raw_score)
                .sum()
        };

        ConfluenceTally {
            bullish_score: side_score(Bias::Bullish),
            bearish_score: side_score(Bias::Bearish),
            factors,
        }
    }

    /// Score one timeframe into a signal. Bad inputs yield an invalid WAIT.
    pub fn score(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
        structure: &MarketStructure,
        smc: &SmcAnalysis,
        price: f64,
    ) -> Signal {
        let mut signal = Signal::wait(symbol, timeframe, timestamp, price);
        if !price.is_finite() || price <= 0.0 {
            debug!(symbol, %timeframe, price, "Non-positive price, returning WAIT");
            return signal;
        }

        let tally = self.tally(structure, smc, price);
        let direction = self.pick_direction(&tally);

        signal.confluence_score = tally.factors.len();
        signal.factors = tally.factors;

        if !direction.is_actionable() {
            debug!(
                symbol,
                %timeframe,
                bullish = tally.bullish_score,
                bearish = tally.bearish_score,
                "No decisive confluence"
            );
            return signal;
        }

        let stop = self.stop_loss(direction, price, structure, smc);
        let risk = (price - stop).abs();
        if !risk.is_finite() || risk <= 0.0 {
            debug!(symbol, %timeframe, "Zero risk distance, returning WAIT");
            return signal;
        }
        let target = self.take_profit(direction, price, risk, structure, smc);
        let rr = round2((target - price).abs() / risk);

        signal.direction = direction;
        signal.stop_loss = stop;
        signal.take_profit = target;
        signal.risk_reward_ratio = rr;
        signal.valid = rr >= self.config.min_rr_ratio;

        debug!(
            symbol,
            %timeframe,
            direction = %signal.direction,
            entry = price,
            stop,
            target,
            rr,
            confluence = signal.confluence_score,
            "Confluence signal"
        );
        signal
    }

    /// Convenience wrapper over a pre-assembled timeframe analysis
    pub fn score_analysis(&self, symbol: &str, timestamp: DateTime<Utc>, analysis: &TimeframeAnalysis) -> Signal {
        self.score(
            symbol,
            analysis.timeframe,
            timestamp,
            &analysis.market_structure,
            &analysis.smc,
            analysis.current_price,
        )
    }

    fn pick_direction(&self, tally: &ConfluenceTally) -> SignalDirection {
        if tally.factors.len() < self.config.min_confluence_factors {
            return SignalDirection::Wait;
        }
        let min = self.config.min_direction_score;
        if tally.bullish_score >= min && tally.bullish_score > tally.bearish_score {
            SignalDirection::Buy
        } else if tally.bearish_score >= min && tally.bearish_score > tally.bullish_score {
            SignalDirection::Sell
        } else {
            SignalDirection::Wait
        }
    }

    fn stop_loss(&self, direction: SignalDirection, entry: f64, structure: &MarketStructure, smc: &SmcAnalysis) -> f64 {
        let buffer = entry * self.config.stop_buffer_pct;
        match direction {
            SignalDirection::Buy => {
                let protecting = structure
                    .swing_lows
                    .iter()
                    .copied()
                    .chain(
                        smc.order_blocks
                            .iter()
                            .filter(|ob| ob.direction == Bias::Bullish)
                            .map(|ob| ob.bottom),
                    )
                    .chain(
                        smc.supply_demand_zones
                            .iter()
                            .filter(|z| z.kind == ZoneKind::Demand)
                            .map(|z| z.bottom),
                    )
                    .filter(|level| *level < entry)
                    .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.max(l))));
                match protecting {
                    Some(level) => level - buffer,
                    None => entry * (1.0 - self.config.fallback_stop_pct),
                }
            }
            SignalDirection::Sell => {
                let protecting = structure
                    .swing_highs
                    .iter()
                    .copied()
                    .chain(
                        smc.order_blocks
                            .iter()
                            .filter(|ob| ob.direction == Bias::Bearish)
                            .map(|ob| ob.top),
                    )
                    .chain(
                        smc.supply_demand_zones
                            .iter()
                            .filter(|z| z.kind == ZoneKind::Supply)
                            .map(|z| z.top),
                    )
                    .filter(|level| *level > entry)
                    .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))));
                match protecting {
                    Some(level) => level + buffer,
                    None => entry * (1.0 + self.config.fallback_stop_pct),
                }
            }
            SignalDirection::Wait => entry,
        }
    }

    fn take_profit(
        &self,
        direction: SignalDirection,
        entry: f64,
        risk: f64,
        structure: &MarketStructure,
        smc: &SmcAnalysis,
    ) -> f64 {
        let multiple = if self.config.min_rr_ratio > 0.0 {
            self.config.min_rr_ratio
        } else {
            2.0
        };
        match direction {
            SignalDirection::Buy => {
                let floor = entry + risk * multiple;
                let nearest = smc
                    .liquidity_unswept
                    .iter()
                    .filter(|lz| lz.side == LiquiditySide::High)
                    .map(|lz| lz.level)
                    .chain(
                        smc.supply_demand_zones
                            .iter()
                            .filter(|z| z.kind == ZoneKind::Supply)
                            .map(|z| z.bottom),
                    )
                    .chain(structure.swing_highs.iter().copied())
                    .filter(|level| *level > entry)
                    .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))));
                nearest.map_or(floor, |level| level.max(floor))
            }
            SignalDirection::Sell => {
                let floor = entry - risk * multiple;
                let nearest = smc
                    .liquidity_unswept
                    .iter()
                    .filter(|lz| lz.side == LiquiditySide::Low)
                    .map(|lz| lz.level)
                    .chain(
                        smc.supply_demand_zones
                            .iter()
                            .filter(|z| z.kind == ZoneKind::Demand)
                            .map(|z| z.top),
                    )
                    .chain(structure.swing_lows.iter().copied())
                    .filter(|level| *level < entry)
                    .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.max(l))));
                nearest.map_or(floor, |level| level.min(floor))
            }
            SignalDirection::Wait => entry,
        }
    }
}

fn factor(kind: FactorKind, direction: Bias, reference_level: Option<f64>) -> ConfluenceFactor {
    ConfluenceFactor {
        kind,
        direction,
        raw_score: kind.base_score(),
        reference_level,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
