//! Risk Manager - Position sizing and risk controls
//!
//! Implements:
//! - Confidence-weighted, pip-based position sizing
//! - Maximum open positions per risk profile
//! - Daily loss limit (reset when the replayed date changes)
//! - Correlation-aware size reduction and exposure cap
//! - Portfolio risk cap (scales the candidate down instead of rejecting)

pub mod correlation;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::types::{pip_size, pip_value_per_lot, LOT_UNITS};

pub use correlation::correlation;

/// Preset risk appetites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl Default for RiskProfile {
    fn default() -> Self {
        RiskProfile::Moderate
    }
}

/// Per-profile limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileLimits {
    /// Fraction of balance risked per trade at full confidence
    pub max_position_risk: f64,
    pub max_positions: usize,
    pub min_rr_ratio: f64,
}

impl RiskProfile {
    pub fn limits(&self) -> ProfileLimits {
        match self {
            RiskProfile::Conservative => ProfileLimits {
                max_position_risk: 0.01,
                max_positions: 3,
                min_rr_ratio: 2.5,
            },
            RiskProfile::Moderate => ProfileLimits {
                max_position_risk: 0.02,
                max_positions: 5,
                min_rr_ratio: 2.0,
            },
            RiskProfile::Aggressive => ProfileLimits {
                max_position_risk: 0.03,
                max_positions: 8,
                min_rr_ratio: 1.8,
            },
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conservative" | "low" => Some(RiskProfile::Conservative),
            "moderate" | "medium" => Some(RiskProfile::Moderate),
            "aggressive" | "high" => Some(RiskProfile::Aggressive),
            _ => None,
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskProfile::Conservative => write!(f, "conservative"),
            RiskProfile::Moderate => write!(f, "moderate"),
            RiskProfile::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// Risk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub profile: RiskProfile,
    /// Maximum summed risk fraction across open positions
    pub max_portfolio_risk: f64,
    /// Maximum summed risk fraction across positions correlated with a candidate
    pub max_correlation_exposure: f64,
    /// Maximum realized daily loss as a fraction of balance
    pub max_daily_loss: f64,
    /// |correlation| above which two pairs count as correlated
    pub correlation_threshold: f64,
    /// Floor of the combined correlation adjustment
    pub min_correlation_factor: f64,
    /// Lot size bounds
    pub min_lot: f64,
    pub max_lot: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            profile: RiskProfile::Moderate,
            max_portfolio_risk: 0.05,       // 5%
            max_correlation_exposure: 0.15, // 15%
            max_daily_loss: 0.02,           // 2%
            correlation_threshold: 0.5,
            min_correlation_factor: 0.2,
            min_lot: 0.01,
            max_lot: 10.0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range("risk.max_portfolio_risk", self.max_portfolio_risk, 0.0, 1.0)?;
        ConfigError::check_positive("risk.max_portfolio_risk", self.max_portfolio_risk)?;
        ConfigError::check_range("risk.max_correlation_exposure", self.max_correlation_exposure, 0.0, 1.0)?;
        ConfigError::check_positive("risk.max_correlation_exposure", self.max_correlation_exposure)?;
        ConfigError::check_range("risk.max_daily_loss", self.max_daily_loss, 0.0, 1.0)?;
        ConfigError::check_range("risk.correlation_threshold", self.correlation_threshold, 0.0, 1.0)?;
        ConfigError::check_range("risk.min_correlation_factor", self.min_correlation_factor, 0.0, 1.0)?;
        ConfigError::check_positive("risk.min_lot", self.min_lot)?;
        if self.max_lot < self.min_lot {
            return Err(ConfigError::OutOfRange {
                name: "risk.max_lot",
                value: self.max_lot,
                min: self.min_lot,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }
}

/// Why a trade was refused. Never fatal; the caller records the reason.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("Maximum positions reached ({max})")]
    MaxPositions { max: usize },
    #[error("Daily loss limit reached ({loss_pct:.1}%)")]
    DailyLossLimit { loss_pct: f64 },
    #[error("Position already exists for {0}")]
    PositionExists(String),
    #[error("Correlation exposure limit exceeded ({exposure_pct:.1}%)")]
    CorrelationExposure { exposure_pct: f64 },
    #[error("Portfolio risk too high ({risk_pct:.1}%)")]
    PortfolioRisk { risk_pct: f64 },
    #[error("Invalid price levels: entry={entry} stop={stop}")]
    InvalidPrice { entry: f64, stop: f64 },
    #[error("Zero stop distance")]
    ZeroStopDistance,
    #[error("Position size {size:.4} below minimum lot")]
    BelowMinimumSize { size: f64 },
}

impl RiskRejection {
    /// Stable label for counting rejections
    pub fn code(&self) -> &'static str {
        match self {
            RiskRejection::MaxPositions { .. } => "max_positions",
            RiskRejection::DailyLossLimit { .. } => "daily_loss_limit",
            RiskRejection::PositionExists(_) => "position_exists",
            RiskRejection::CorrelationExposure { .. } => "correlation_exposure",
            RiskRejection::PortfolioRisk { .. } => "portfolio_risk",
            RiskRejection::InvalidPrice { .. } => "invalid_price",
            RiskRejection::ZeroStopDistance => "zero_stop_distance",
            RiskRejection::BelowMinimumSize { .. } => "below_minimum_size",
        }
    }
}

/// Accepted sizing for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    /// Lots
    pub size: f64,
    /// Budgeted account currency at risk (balance × adjusted risk)
    pub risk_amount: f64,
    /// Budgeted fraction of balance at risk; what the portfolio cap sums
    pub risk_percentage: f64,
    /// What the final lot size loses at the stop. Exceeds `risk_amount`
    /// when the raw size was clamped up to the minimum lot.
    pub actual_risk_amount: f64,
    /// Stop distance in pips
    pub stop_distance: f64,
    pub correlation_factor: f64,
}

/// Point-in-time snapshot of the risk book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub profile: RiskProfile,
    pub balance: f64,
    pub initial_balance: f64,
    pub daily_pnl: f64,
    pub daily_return_pct: f64,
    pub total_return_pct: f64,
    pub open_positions: usize,
    pub max_positions: usize,
    pub total_risk_pct: f64,
    pub remaining_risk_capacity_pct: f64,
    pub leverage_ratio: f64,
    pub daily_loss_limit_pct: f64,
    pub daily_loss_used_pct: f64,
}

/// Risk manager for position sizing and limits.
///
/// Exclusively owned by one simulation run; all mutation goes through `&mut self`.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    limits: ProfileLimits,
    initial_balance: f64,
    balance: f64,
    daily_pnl: f64,
    current_day: Option<NaiveDate>,
    /// Open positions by symbol, ordered for deterministic sums
    positions: BTreeMap<String, PositionRisk>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, initial_balance: f64) -> Result<Self, ConfigError> {
        config.validate()?;
        ConfigError::check_positive("risk.initial_balance", initial_balance)?;
        let limits = config.profile.limits();
        Ok(Self {
            config,
            limits,
            initial_balance,
            balance: initial_balance,
            daily_pnl: 0.0,
            current_day: None,
            positions: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn limits(&self) -> ProfileLimits {
        self.limits
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionRisk> {
        self.positions.get(symbol)
    }

    /// Summed risk fraction of all open positions
    pub fn total_risk(&self) -> f64 {
        self.positions.values().map(|p| p.risk_percentage).sum()
    }

    /// Clear all state back to a fresh book
    pub fn reset(&mut self, balance: f64) {
        self.initial_balance = balance;
        self.balance = balance;
        self.daily_pnl = 0.0;
        self.current_day = None;
        self.positions.clear();
    }

    /// Start a new trading day when the replayed date changes
    pub fn roll_day(&mut self, day: NaiveDate) {
        if self.current_day != Some(day) {
            if self.current_day.is_some() {
                debug!(%day, daily_pnl = self.daily_pnl, "Daily P&L reset");
            }
            self.current_day = Some(day);
            self.daily_pnl = 0.0;
        }
    }

    /// Risk fraction of open positions correlated with `symbol` beyond the threshold
    pub fn correlated_exposure(&self, symbol: &str) -> f64 {
        self.positions
            .values()
            .filter(|p| p.symbol != symbol)
            .filter(|p| correlation(symbol, &p.symbol).abs() > self.config.correlation_threshold)
            .map(|p| p.risk_percentage)
            .sum()
    }

    /// Size reduction for correlation with the open book, floored
    pub fn correlation_factor(&self, symbol: &str) -> f64 {
        if self.positions.is_empty() {
            return 1.0;
        }
        let max_corr = self
            .positions
            .keys()
            .filter(|s| s.as_str() != symbol)
            .map(|s| correlation(symbol, s).abs())
            .fold(0.0, f64::max);
        let mut factor = 1.0 - max_corr * 0.5;

        let exposure = self.correlated_exposure(symbol);
        if exposure > self.config.max_correlation_exposure {
            factor *= self.config.max_correlation_exposure / exposure;
        }
        factor.max(self.config.min_correlation_factor)
    }

    /// Compute the position size for a candidate trade.
    ///
    /// Does not mutate state: identical inputs against an unchanged book give
    /// identical output.
    pub fn calculate_position_size(
        &self,
        symbol: &str,
        entry: f64,
        stop: f64,
        confidence: f64,
    ) -> Result<PositionRisk, RiskRejection> {
        self.check_position_count()?;
        self.check_daily_loss()?;

        if !entry.is_finite() || !stop.is_finite() || entry <= 0.0 || stop <= 0.0 {
            return Err(RiskRejection::InvalidPrice { entry, stop });
        }

        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        let base_risk = self.limits.max_position_risk * confidence;
        let correlation_factor = self.correlation_factor(symbol);
        let mut adjusted_risk = base_risk * correlation_factor;

        let risk_pips = (entry - stop).abs() / pip_size(symbol);
        if risk_pips.is_nan() || risk_pips <= 0.0 {
            return Err(RiskRejection::ZeroStopDistance);
        }
        if adjusted_risk <= 0.0 {
            return Err(RiskRejection::BelowMinimumSize { size: 0.0 });
        }

        let mut risk_amount = self.balance * adjusted_risk;
        let raw_size = risk_amount / (risk_pips * pip_value_per_lot(symbol));
        let mut size = round2(raw_size.clamp(self.config.min_lot, self.config.max_lot));

        let current = self.total_risk();
        if current + adjusted_risk > self.config.max_portfolio_risk {
            let headroom = self.config.max_portfolio_risk - current;
            if headroom <= 0.0 {
                return Err(RiskRejection::PortfolioRisk {
                    risk_pct: current * 100.0,
                });
            }
            let scale = headroom / adjusted_risk;
            size = floor2(size * scale);
            risk_amount *= scale;
            adjusted_risk = headroom;
            debug!(symbol, scale, size, "Scaled to portfolio headroom");
            if size < self.config.min_lot {
                return Err(RiskRejection::BelowMinimumSize { size });
            }
        }

        let actual_risk_amount = size * risk_pips * pip_value_per_lot(symbol);
        if raw_size < self.config.min_lot {
            debug!(symbol, size, risk_amount, actual_risk_amount, "Minimum lot exceeds risk budget");
        }

        Ok(PositionRisk {
            symbol: symbol.to_string(),
            size,
            risk_amount,
            risk_percentage: adjusted_risk,
            actual_risk_amount,
            stop_distance: risk_pips,
            correlation_factor,
        })
    }

    /// Pure gate query: Ok if a new trade on `symbol` is allowed
    pub fn can_trade(&self, symbol: &str, _confidence: f64) -> Result<(), RiskRejection> {
        self.check_position_count()?;
        self.check_daily_loss()?;

        if self.positions.contains_key(symbol) {
            return Err(RiskRejection::PositionExists(symbol.to_string()));
        }

        let exposure = self.correlated_exposure(symbol);
        if exposure > self.config.max_correlation_exposure {
            return Err(RiskRejection::CorrelationExposure {
                exposure_pct: exposure * 100.0,
            });
        }

        let total = self.total_risk();
        if total >= self.config.max_portfolio_risk * 0.8 {
            return Err(RiskRejection::PortfolioRisk {
                risk_pct: total * 100.0,
            });
        }
        Ok(())
    }

    /// Register an accepted position
    pub fn open_position(&mut self, risk: PositionRisk) {
        info!(
            symbol = %risk.symbol,
            size = risk.size,
            risk_pct = risk.risk_percentage * 100.0,
            "Position opened"
        );
        self.positions.insert(risk.symbol.clone(), risk);
    }

    /// Drop a position and book its realized P&L
    pub fn close_position(&mut self, symbol: &str, pnl: f64) -> Option<PositionRisk> {
        let closed = self.positions.remove(symbol)?;
        self.balance += pnl;
        self.daily_pnl += pnl;
        debug!(symbol, pnl, balance = self.balance, "Position closed");
        Some(closed)
    }

    pub fn risk_summary(&self) -> RiskSummary {
        let total_risk = self.total_risk();
        let exposure: f64 = self.positions.values().map(|p| p.size * LOT_UNITS).sum();
        let pct_of_balance = |v: f64| {
            if self.balance > 0.0 {
                v / self.balance * 100.0
            } else {
                0.0
            }
        };

        RiskSummary {
            profile: self.config.profile,
            balance: self.balance,
            initial_balance: self.initial_balance,
            daily_pnl: self.daily_pnl,
            daily_return_pct: pct_of_balance(self.daily_pnl),
            total_return_pct: (self.balance - self.initial_balance) / self.initial_balance * 100.0,
            open_positions: self.positions.len(),
            max_positions: self.limits.max_positions,
            total_risk_pct: total_risk * 100.0,
            remaining_risk_capacity_pct: (self.config.max_portfolio_risk - total_risk) * 100.0,
            leverage_ratio: if self.balance > 0.0 { exposure / self.balance } else { 0.0 },
            daily_loss_limit_pct: self.config.max_daily_loss * 100.0,
            daily_loss_used_pct: if self.daily_pnl < 0.0 {
                pct_of_balance(-self.daily_pnl)
            } else {
                0.0
            },
        }
    }

    fn check_position_count(&self) -> Result<(), RiskRejection> {
        if self.positions.len() >= self.limits.max_positions {
            return Err(RiskRejection::MaxPositions {
                max: self.limits.max_positions,
            });
        }
        Ok(())
    }

    fn check_daily_loss(&self) -> Result<(), RiskRejection> {
        if self.daily_pnl < 0.0 && self.balance > 0.0 {
            let loss = -self.daily_pnl / self.balance;
            if loss >= self.config.max_daily_loss {
                return Err(RiskRejection::DailyLossLimit {
                    loss_pct: loss * 100.0,
                });
            }
        }
        Ok(())
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn floor2(v: f64) -> f64 {
    (v * 100.0 + 1e-9).floor() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default(), 10_000.0).unwrap()
    }

    fn position(symbol: &str, risk_percentage: f64) -> PositionRisk {
        PositionRisk {
            symbol: symbol.to_string(),
            size: 0.4,
            risk_amount: 10_000.0 * risk_percentage,
            risk_percentage,
            actual_risk_amount: 10_000.0 * risk_percentage,
            stop_distance: 50.0,
            correlation_factor: 1.0,
        }
    }

    #[test]
    fn test_position_sizing() {
        let rm = manager();
        let risk = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap();

        assert!((risk.stop_distance - 50.0).abs() < 1e-6);
        assert!((risk.size - 0.40).abs() < 1e-9, "Expected 0.40 lots, got {:.4}", risk.size);
        assert!((risk.risk_amount - 200.0).abs() < 1e-6);
        assert!((risk.risk_percentage - 0.02).abs() < 1e-12);
        assert_eq!(risk.correlation_factor, 1.0);
    }

    #[test]
    fn test_confidence_scales_risk() {
        let rm = manager();
        let risk = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 0.5).unwrap();
        assert!((risk.size - 0.20).abs() < 1e-9);
        assert!(risk.risk_percentage <= 0.02 * 0.5 + 1e-12);
    }

    #[test]
    fn test_jpy_pip_size() {
        let rm = manager();
        let risk = rm.calculate_position_size("USDJPY", 150.00, 149.50, 1.0).unwrap();
        assert!((risk.stop_distance - 50.0).abs() < 1e-6);
        // 200 / (50 * 1000)
        assert!((risk.size - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_min_lot_clamp_reports_actual_risk() {
        let rm = manager();
        let risk = rm.calculate_position_size("USDJPY", 150.00, 149.50, 1.0).unwrap();
        // raw 0.004 lots clamped up to 0.01: 0.01 * 50 pips * 1000 per pip
        assert!((risk.risk_amount - 200.0).abs() < 1e-6);
        assert!((risk.actual_risk_amount - 500.0).abs() < 1e-6, "got {:.4}", risk.actual_risk_amount);

        let eur = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap();
        assert!((eur.actual_risk_amount - eur.risk_amount).abs() < 1e-6);
    }

    #[test]
    fn test_zero_stop_distance_rejected() {
        let rm = manager();
        let err = rm.calculate_position_size("EURUSD", 1.1, 1.1, 1.0).unwrap_err();
        assert_eq!(err, RiskRejection::ZeroStopDistance);
    }

    #[test]
    fn test_size_clamped() {
        let rm = manager();
        let risk = rm.calculate_position_size("EURUSD", 1.10000, 1.09999, 1.0).unwrap();
        assert_eq!(risk.size, 10.0);
    }

    #[test]
    fn test_correlation_reduces_size() {
        let mut rm = manager();
        rm.open_position(position("EURUSD", 0.02));
        // EURCHF 0.9 with EURUSD: 1 - 0.45
        assert!((rm.correlation_factor("EURCHF") - 0.55).abs() < 1e-12);
        let risk = rm.calculate_position_size("EURCHF", 1.0000, 0.9950, 1.0).unwrap();
        assert!((risk.risk_percentage - 0.011).abs() < 1e-12);
    }

    #[test]
    fn test_portfolio_breach_scales_down() {
        let mut rm = manager();
        rm.open_position(position("XAUUSD", 0.02));
        rm.open_position(position("BTCUSD", 0.02));
        // 0.04 open + 0.02 candidate > 0.05: scale to the remaining 0.01
        let risk = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap();
        assert!((risk.size - 0.20).abs() < 1e-9, "got {}", risk.size);
        assert!((rm.total_risk() + risk.risk_percentage - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_correlated_exposure_scales_factor() {
        let config = RiskConfig {
            max_portfolio_risk: 0.5,
            ..Default::default()
        };
        let mut rm = RiskManager::new(config, 10_000.0).unwrap();
        rm.open_position(position("EURCHF", 0.08));
        rm.open_position(position("EURAUD", 0.08));
        // 1 - 0.5 * 0.9, then 0.15 / 0.16 for the correlated exposure
        assert!((rm.correlated_exposure("EURUSD") - 0.16).abs() < 1e-12);
        let factor = rm.correlation_factor("EURUSD");
        assert!((factor - 0.55 * 0.15 / 0.16).abs() < 1e-12, "got {:.6}", factor);
    }

    #[test]
    fn test_correlation_factor_floor() {
        let config = RiskConfig {
            max_portfolio_risk: 1.0,
            ..Default::default()
        };
        let mut rm = RiskManager::new(config, 10_000.0).unwrap();
        rm.open_position(position("EURCHF", 0.4));
        rm.open_position(position("EURAUD", 0.4));
        // 0.55 * 0.15 / 0.8 is below the floor
        assert_eq!(rm.correlation_factor("EURUSD"), 0.2);
        let risk = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap();
        assert_eq!(risk.correlation_factor, 0.2);
        assert!((risk.risk_percentage - 0.004).abs() < 1e-12);
    }

    #[test]
    fn test_sizing_stops_at_daily_loss() {
        let mut rm = manager();
        rm.roll_day(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        rm.open_position(position("GBPUSD", 0.02));
        rm.close_position("GBPUSD", -250.0);

        let err = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap_err();
        assert!(matches!(err, RiskRejection::DailyLossLimit { .. }));
        assert_eq!(err.code(), "daily_loss_limit");
    }

    #[test]
    fn test_scaled_below_min_lot_rejects() {
        let mut rm = manager();
        rm.open_position(position("XAUUSD", 0.02));
        rm.open_position(position("BTCUSD", 0.0298));
        // 0.0002 headroom scales 0.40 lots to 0.004, floored to 0.00
        let err = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap_err();
        match err {
            RiskRejection::BelowMinimumSize { size } => assert!(size < 0.01, "got {}", size),
            other => panic!("expected BelowMinimumSize, got {:?}", other),
        }
    }

    #[test]
    fn test_portfolio_full_rejects() {
        let mut rm = manager();
        rm.open_position(position("XAUUSD", 0.025));
        rm.open_position(position("BTCUSD", 0.025));
        let err = rm.calculate_position_size("EURUSD", 1.1000, 1.0950, 1.0).unwrap_err();
        assert!(matches!(err, RiskRejection::PortfolioRisk { .. }));
    }

    #[test]
    fn test_can_trade_rejects_existing_symbol() {
        let mut rm = manager();
        rm.open_position(position("EURUSD", 0.01));
        let err = rm.can_trade("EURUSD", 1.0).unwrap_err();
        assert_eq!(err.to_string(), "Position already exists for EURUSD");
        assert_eq!(err.code(), "position_exists");
        assert!(rm.can_trade("USDJPY", 1.0).is_ok());
    }

    #[test]
    fn test_can_trade_max_positions() {
        let config = RiskConfig {
            profile: RiskProfile::Conservative,
            ..Default::default()
        };
        let mut rm = RiskManager::new(config, 10_000.0).unwrap();
        for s in ["AAA", "BBB", "CCC"] {
            rm.open_position(position(s, 0.001));
        }
        let err = rm.can_trade("EURUSD", 1.0).unwrap_err();
        assert_eq!(err, RiskRejection::MaxPositions { max: 3 });
        assert!(rm.calculate_position_size("EURUSD", 1.1, 1.09, 1.0).is_err());
    }

    #[test]
    fn test_can_trade_portfolio_threshold() {
        let mut rm = manager();
        rm.open_position(position("XAUUSD", 0.025));
        rm.open_position(position("BTCUSD", 0.02));
        let err = rm.can_trade("EURUSD", 1.0).unwrap_err();
        assert!(err.to_string().starts_with("Portfolio risk too high"));
    }

    #[test]
    fn test_correlation_exposure_rejects() {
        let config = RiskConfig {
            max_portfolio_risk: 0.5,
            ..Default::default()
        };
        let mut rm = RiskManager::new(config, 10_000.0).unwrap();
        rm.open_position(position("EURCHF", 0.08));
        rm.open_position(position("EURAUD", 0.08));
        let err = rm.can_trade("EURUSD", 1.0).unwrap_err();
        assert!(err.to_string().starts_with("Correlation exposure limit exceeded"));
    }

    #[test]
    fn test_daily_loss_and_roll() {
        let mut rm = manager();
        let day1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        rm.roll_day(day1);
        rm.open_position(position("EURUSD", 0.02));
        rm.close_position("EURUSD", -250.0);

        let err = rm.can_trade("GBPUSD", 1.0).unwrap_err();
        assert!(matches!(err, RiskRejection::DailyLossLimit { .. }));

        rm.roll_day(day2);
        assert_eq!(rm.daily_pnl(), 0.0);
        assert!(rm.can_trade("GBPUSD", 1.0).is_ok());
        assert!((rm.balance() - 9_750.0).abs() < 1e-9);
    }

    #[test]
    fn test_sizing_is_idempotent() {
        let mut rm = manager();
        rm.open_position(position("GBPUSD", 0.01));
        let a = rm.calculate_position_size("EURUSD", 1.1, 1.095, 0.8).unwrap();
        let b = rm.calculate_position_size("EURUSD", 1.1, 1.095, 0.8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_risk_summary() {
        let mut rm = manager();
        rm.open_position(position("EURUSD", 0.02));
        let summary = rm.risk_summary();
        assert_eq!(summary.open_positions, 1);
        assert!((summary.total_risk_pct - 2.0).abs() < 1e-9);
        assert!((summary.remaining_risk_capacity_pct - 3.0).abs() < 1e-9);
        assert!((summary.leverage_ratio - 4.0).abs() < 1e-9);
    }
}
