//! Multi-timeframe cascade
//!
//! Top-down agreement check: the higher timeframes set a bias, the middle
//! timeframes must show a setup in that direction, and the lower timeframes
//! must carry a qualified trigger. Each tier yields a 0-100 strength; the
//! weighted sum is the cascade score.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::types::{Bias, PriceBand, Timeframe, TimeframeAnalysis, TimeframeRole};

/// Cascade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Tier weights (must sum to 1.0)
    pub htf_weight: f64,
    pub mtf_weight: f64,
    pub ltf_weight: f64,
    /// Cascade score at or above which the timeframes count as aligned (0-100)
    pub alignment_threshold: f64,
    /// Minimum R:R for a lower-timeframe trigger
    pub min_rr_ratio: f64,
    /// Minimum confluence count for a lower-timeframe trigger
    pub min_trigger_confluence: usize,
    /// How close an order block must be to count as a setup, fraction of price
    pub order_block_proximity: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            htf_weight: 0.40,
            mtf_weight: 0.35,
            ltf_weight: 0.25,
            alignment_threshold: 70.0,
            min_rr_ratio: 2.0,
            min_trigger_confluence: 3,
            order_block_proximity: 0.005, // 0.5%
        }
    }
}

impl CascadeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_sum("cascade", &[self.htf_weight, self.mtf_weight, self.ltf_weight], 1.0)?;
        ConfigError::check_range("cascade.alignment_threshold", self.alignment_threshold, 0.0, 100.0)?;
        ConfigError::check_range("cascade.order_block_proximity", self.order_block_proximity, 0.0, 1.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtfBias {
    pub direction: Bias,
    pub strength: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtfConfirmation {
    pub confirmed: bool,
    pub strength: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtfTrigger {
    pub valid: bool,
    pub strength: f64,
    pub reason: String,
}

/// Outcome of the top-down agreement check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub htf_bias: HtfBias,
    pub mtf_confirmation: MtfConfirmation,
    pub ltf_trigger: LtfTrigger,
    pub cascade_score: f64,
    pub is_aligned: bool,
}

pub struct MultiTimeframeCascade {
    config: CascadeConfig,
}

impl MultiTimeframeCascade {
    pub fn new(config: CascadeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Run all three tiers over the analyses of one symbol
    pub fn analyze(&self, analyses: &[TimeframeAnalysis]) -> CascadeResult {
        let by_role = |role: TimeframeRole| -> Vec<&TimeframeAnalysis> {
            analyses.iter().filter(|a| a.timeframe.role() == role).collect()
        };
        let htf = by_role(TimeframeRole::Htf);
        let mtf = by_role(TimeframeRole::Mtf);
        let ltf = by_role(TimeframeRole::Ltf);

        let bias = self.htf_bias(&htf);
        let confirmation = self.mtf_confirmation(&mtf, &bias);
        let trigger = self.ltf_trigger(&ltf, &bias, &confirmation);
        let result = self.combine(bias, confirmation, trigger);

        debug!(
            htf = result.htf_bias.strength,
            mtf = result.mtf_confirmation.strength,
            ltf = result.ltf_trigger.strength,
            score = result.cascade_score,
            aligned = result.is_aligned,
            "Cascade evaluated"
        );
        result
    }

    /// Weighted vote of higher-timeframe trends (D1 counts double)
    pub fn htf_bias(&self, htf: &[&TimeframeAnalysis]) -> HtfBias {
        if htf.is_empty() {
            return HtfBias {
                direction: Bias::Neutral,
                strength: 0.0,
                reason: "No HTF data".to_string(),
            };
        }

        let mut bullish = 0.0;
        let mut bearish = 0.0;
        let mut total = 0.0;
        for a in htf {
            let weight = if a.timeframe == Timeframe::D1 { 2.0 } else { 1.0 };
            match a.market_structure.trend_direction {
                Bias::Bullish => bullish += weight,
                Bias::Bearish => bearish += weight,
                Bias::Neutral => {}
            }
            total += weight;
        }

        let (direction, strength) = if bullish > bearish {
            (Bias::Bullish, bullish / total * 100.0)
        } else if bearish > bullish {
            (Bias::Bearish, bearish / total * 100.0)
        } else {
            (Bias::Neutral, 0.0)
        };

        HtfBias {
            direction,
            strength,
            reason: format!("HTF vote over {} timeframes", htf.len()),
        }
    }

    /// Fraction of mid timeframes with a setup in the bias direction
    pub fn mtf_confirmation(&self, mtf: &[&TimeframeAnalysis], bias: &HtfBias) -> MtfConfirmation {
        if mtf.is_empty() || bias.direction == Bias::Neutral {
            return MtfConfirmation {
                confirmed: false,
                strength: 0.0,
                reason: "No MTF data or neutral HTF bias".to_string(),
            };
        }

        let confirmed = mtf.iter().filter(|a| self.has_setup(a, bias.direction)).count();
        MtfConfirmation {
            confirmed: confirmed > 0,
            strength: confirmed as f64 / mtf.len() as f64 * 100.0,
            reason: format!("{}/{} MTF setups aligned", confirmed, mtf.len()),
        }
    }

    /// Fraction of lower-timeframe signals that qualify as triggers
    pub fn ltf_trigger(&self, ltf: &[&TimeframeAnalysis], bias: &HtfBias, mtf: &MtfConfirmation) -> LtfTrigger {
        if ltf.is_empty() || !mtf.confirmed {
            return LtfTrigger {
                valid: false,
                strength: 0.0,
                reason: "No LTF data or MTF not confirmed".to_string(),
            };
        }

        let wanted = bias.direction.signal_direction();
        let triggers = ltf
            .iter()
            .filter_map(|a| a.signal.as_ref())
            .filter(|s| {
                s.direction == wanted
                    && s.confluence_score >= self.config.min_trigger_confluence
                    && s.risk_reward_ratio >= self.config.min_rr_ratio
            })
            .count();

        LtfTrigger {
            valid: triggers > 0,
            strength: triggers as f64 / ltf.len() as f64 * 100.0,
            reason: format!("{}/{} LTF triggers aligned", triggers, ltf.len()),
        }
    }

    /// Weighted sum of tier strengths
    pub fn cascade_score(&self, htf_strength: f64, mtf_strength: f64, ltf_strength: f64) -> f64 {
        htf_strength * self.config.htf_weight
            + mtf_strength * self.config.mtf_weight
            + ltf_strength * self.config.ltf_weight
    }

    pub fn combine(&self, htf_bias: HtfBias, mtf_confirmation: MtfConfirmation, ltf_trigger: LtfTrigger) -> CascadeResult {
        let cascade_score = self.cascade_score(htf_bias.strength, mtf_confirmation.strength, ltf_trigger.strength);
        CascadeResult {
            htf_bias,
            mtf_confirmation,
            ltf_trigger,
            cascade_score,
            is_aligned: cascade_score >= self.config.alignment_threshold,
        }
    }

    fn has_setup(&self, analysis: &TimeframeAnalysis, direction: Bias) -> bool {
        if let Some(brk) = analysis.market_structure.latest_break() {
            if brk.direction == direction {
                return true;
            }
        }
        let price = analysis.current_price;
        analysis.smc.order_blocks.iter().any(|ob| {
            ob.direction == direction
                && (ob.contains(price) || ob.edge_distance_pct(price) <= self.config.order_block_proximity)
        })
    }
}
