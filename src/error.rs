//! Typed errors and skip reasons

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Invalid construction-time settings. The only error class that is fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} weights must sum to {expected}, got {actual:.4}")]
    WeightSum {
        name: &'static str,
        expected: f64,
        actual: f64,
    },
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("grade thresholds must be strictly descending: {0:?}")]
    GradeOrder([f64; 4]),
}

impl ConfigError {
    /// Checks that a set of weights adds up to `expected` (within 1e-6)
    pub fn check_sum(name: &'static str, weights: &[f64], expected: f64) -> Result<(), Self> {
        let actual: f64 = weights.iter().sum();
        if (actual - expected).abs() > 1e-6 || weights.iter().any(|w| *w < 0.0) {
            return Err(ConfigError::WeightSum {
                name,
                expected,
                actual,
            });
        }
        Ok(())
    }

    pub fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), Self> {
        if !(min..=max).contains(&value) {
            return Err(ConfigError::OutOfRange {
                name,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    pub fn check_positive(name: &'static str, value: f64) -> Result<(), Self> {
        if value.is_nan() || value <= 0.0 {
            return Err(ConfigError::NonPositive { name, value });
        }
        Ok(())
    }
}

/// Why the simulator passed on a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MalformedSignal,
    DuplicateTimestamp,
    SymbolMismatch,
    NoMatchingBar,
    SpreadTooWide,
    LowConfluence,
    LowRiskReward,
    NoSupportingFactor,
    QualityRejected,
    BelowMinQuality,
    RiskRejected,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::MalformedSignal => "MALFORMED_SIGNAL",
            SkipReason::DuplicateTimestamp => "DUPLICATE_TIMESTAMP",
            SkipReason::SymbolMismatch => "SYMBOL_MISMATCH",
            SkipReason::NoMatchingBar => "NO_MATCHING_BAR",
            SkipReason::SpreadTooWide => "SPREAD_TOO_WIDE",
            SkipReason::LowConfluence => "LOW_CONFLUENCE",
            SkipReason::LowRiskReward => "LOW_RISK_REWARD",
            SkipReason::NoSupportingFactor => "NO_SUPPORTING_FACTOR",
            SkipReason::QualityRejected => "QUALITY_REJECTED",
            SkipReason::BelowMinQuality => "BELOW_MIN_QUALITY",
            SkipReason::RiskRejected => "RISK_REJECTED",
        };
        write!(f, "{}", s)
    }
}
