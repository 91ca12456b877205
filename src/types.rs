//! Core types used throughout SMCBot
//!
//! Defines the detector facts consumed per timeframe, the signal record
//! produced by the scorer, and the small closed enums shared by the
//! grading, risk and backtesting layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Units in one standard FX lot
pub const LOT_UNITS: f64 = 100_000.0;

/// Pip size for a currency pair: 0.01 for JPY-quoted pairs, else 0.0001
pub fn pip_size(symbol: &str) -> f64 {
    if symbol.to_uppercase().contains("JPY") {
        0.01
    } else {
        0.0001
    }
}

/// Account-currency value of one pip for one standard lot
pub fn pip_value_per_lot(symbol: &str) -> f64 {
    pip_size(symbol) * LOT_UNITS
}

/// Chart timeframes understood by the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::H1
    }
}

impl Timeframe {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    /// Fixed top-down role of this timeframe
    pub fn role(&self) -> TimeframeRole {
        match self {
            Timeframe::D1 | Timeframe::H4 => TimeframeRole::Htf,
            Timeframe::H1 | Timeframe::M15 => TimeframeRole::Mtf,
            _ => TimeframeRole::Ltf,
        }
    }

    /// Parse from string ("H4", "4h", "m15", "15m", ...)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "m1" | "1m" => Some(Timeframe::M1),
            "m5" | "5m" => Some(Timeframe::M5),
            "m15" | "15m" => Some(Timeframe::M15),
            "m30" | "30m" => Some(Timeframe::M30),
            "h1" | "1h" => Some(Timeframe::H1),
            "h4" | "4h" => Some(Timeframe::H4),
            "d1" | "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        write!(f, "{}", s)
    }
}

/// Role of a timeframe in the top-down cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeframeRole {
    Htf,
    Mtf,
    Ltf,
}

/// Directional lean of a trend, factor, zone or cascade bias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    #[serde(alias = "sideways", alias = "consolidation")]
    Neutral,
}

impl Default for Bias {
    fn default() -> Self {
        Bias::Neutral
    }
}

impl Bias {
    /// Trade direction that follows this bias
    pub fn signal_direction(&self) -> SignalDirection {
        match self {
            Bias::Bullish => SignalDirection::Buy,
            Bias::Bearish => SignalDirection::Sell,
            Bias::Neutral => SignalDirection::Wait,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bullish => write!(f, "BULLISH"),
            Bias::Bearish => write!(f, "BEARISH"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Trade direction of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Buy,
    Sell,
    Wait,
}

impl Default for SignalDirection {
    fn default() -> Self {
        SignalDirection::Wait
    }
}

impl SignalDirection {
    /// +1 for buy, -1 for sell, 0 for wait
    pub fn sign(&self) -> f64 {
        match self {
            SignalDirection::Buy => 1.0,
            SignalDirection::Sell => -1.0,
            SignalDirection::Wait => 0.0,
        }
    }

    pub fn bias(&self) -> Bias {
        match self {
            SignalDirection::Buy => Bias::Bullish,
            SignalDirection::Sell => Bias::Bearish,
            SignalDirection::Wait => Bias::Neutral,
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalDirection::Wait)
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalDirection::Buy => write!(f, "BUY"),
            SignalDirection::Sell => write!(f, "SELL"),
            SignalDirection::Wait => write!(f, "WAIT"),
        }
    }
}

/// Kind of confluence evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    TrendAlignment,
    StructureBreak,
    OrderBlock,
    LiquidityZone,
    FairValueGap,
    SupplyDemand,
}

impl FactorKind {
    pub const ALL: [FactorKind; 6] = [
        FactorKind::TrendAlignment,
        FactorKind::StructureBreak,
        FactorKind::OrderBlock,
        FactorKind::LiquidityZone,
        FactorKind::FairValueGap,
        FactorKind::SupplyDemand,
    ];

    /// Base score contributed by one active instance
    pub fn base_score(&self) -> f64 {
        match self {
            FactorKind::TrendAlignment => 2.0,
            FactorKind::StructureBreak => 3.0,
            FactorKind::OrderBlock => 2.0,
            FactorKind::LiquidityZone => 1.0,
            FactorKind::FairValueGap => 2.0,
            FactorKind::SupplyDemand => 2.0,
        }
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactorKind::TrendAlignment => "trend_alignment",
            FactorKind::StructureBreak => "structure_break",
            FactorKind::OrderBlock => "order_block",
            FactorKind::LiquidityZone => "liquidity_zone",
            FactorKind::FairValueGap => "fair_value_gap",
            FactorKind::SupplyDemand => "supply_demand",
        };
        write!(f, "{}", s)
    }
}

/// One piece of confluence evidence found during an analysis pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceFactor {
    pub kind: FactorKind,
    pub direction: Bias,
    pub raw_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_level: Option<f64>,
}

/// Quality grade bands, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Institutional,
    Professional,
    Intermediate,
    Basic,
    Poor,
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityGrade::Institutional => write!(f, "INSTITUTIONAL"),
            QualityGrade::Professional => write!(f, "PROFESSIONAL"),
            QualityGrade::Intermediate => write!(f, "INTERMEDIATE"),
            QualityGrade::Basic => write!(f, "BASIC"),
            QualityGrade::Poor => write!(f, "POOR"),
        }
    }
}

/// Lifecycle state of a simulated trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    StoppedOut,
    TargetHit,
}

impl TradeStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, TradeStatus::Open)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::StoppedOut => write!(f, "STOPPED_OUT"),
            TradeStatus::TargetHit => write!(f, "TARGET_HIT"),
        }
    }
}

// ============================================================================
// Detector facts
// ============================================================================

/// A break of market structure (BOS / CHoCH / MSS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureBreak {
    pub timestamp: DateTime<Utc>,
    pub direction: Bias,
    pub level: f64,
}

/// Swing structure of one timeframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStructure {
    #[serde(default)]
    pub trend_direction: Bias,
    /// Chronological, latest last
    #[serde(default)]
    pub structure_breaks: Vec<StructureBreak>,
    #[serde(default)]
    pub swing_highs: Vec<f64>,
    #[serde(default)]
    pub swing_lows: Vec<f64>,
}

impl MarketStructure {
    pub fn latest_break(&self) -> Option<&StructureBreak> {
        self.structure_breaks.last()
    }
}

/// A valid order block zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub direction: Bias,
    pub top: f64,
    pub bottom: f64,
}

/// Which side of the market a liquidity pool sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquiditySide {
    /// Buy-side liquidity resting above equal highs
    High,
    /// Sell-side liquidity resting below equal lows
    Low,
}

/// A clustered-stop liquidity level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub side: LiquiditySide,
    pub level: f64,
    #[serde(default)]
    pub swept_recently: bool,
}

/// An active (unfilled) fair value gap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub direction: Bias,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Supply,
    Demand,
}

/// A valid supply or demand zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyDemandZone {
    pub kind: ZoneKind,
    pub top: f64,
    pub bottom: f64,
}

/// Price band helpers shared by the zone-shaped facts
pub trait PriceBand {
    fn top(&self) -> f64;
    fn bottom(&self) -> f64;

    fn contains(&self, price: f64) -> bool {
        self.bottom() <= price && price <= self.top()
    }

    /// Smallest relative distance from price to either edge
    fn edge_distance_pct(&self, price: f64) -> f64 {
        if price <= 0.0 {
            return f64::INFINITY;
        }
        let to_top = (price - self.top()).abs();
        let to_bottom = (price - self.bottom()).abs();
        to_top.min(to_bottom) / price
    }
}

impl PriceBand for OrderBlock {
    fn top(&self) -> f64 {
        self.top
    }
    fn bottom(&self) -> f64 {
        self.bottom
    }
}

impl PriceBand for FairValueGap {
    fn top(&self) -> f64 {
        self.top
    }
    fn bottom(&self) -> f64 {
        self.bottom
    }
}

impl PriceBand for SupplyDemandZone {
    fn top(&self) -> f64 {
        self.top
    }
    fn bottom(&self) -> f64 {
        self.bottom
    }
}

/// Smart-money-concepts facts of one timeframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmcAnalysis {
    #[serde(default)]
    pub order_blocks: Vec<OrderBlock>,
    #[serde(default)]
    pub liquidity_unswept: Vec<LiquidityZone>,
    #[serde(default)]
    pub liquidity_swept: Vec<LiquidityZone>,
    #[serde(default)]
    pub fair_value_gaps: Vec<FairValueGap>,
    #[serde(default)]
    pub supply_demand_zones: Vec<SupplyDemandZone>,
}

/// Everything known about one timeframe at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub current_price: f64,
    #[serde(default)]
    pub market_structure: MarketStructure,
    #[serde(default)]
    pub smc: SmcAnalysis,
    #[serde(default)]
    pub signal: Option<Signal>,
}

// ============================================================================
// Signals and bars
// ============================================================================

/// Single-timeframe trade signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub direction: SignalDirection,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    #[serde(default)]
    pub factors: Vec<ConfluenceFactor>,
    /// Number of active factors behind this signal
    pub confluence_score: usize,
    pub valid: bool,
}

impl Signal {
    /// A non-actionable signal carrying only the observed price
    pub fn wait(symbol: &str, timeframe: Timeframe, timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            timestamp,
            direction: SignalDirection::Wait,
            entry: price,
            stop_loss: 0.0,
            take_profit: 0.0,
            risk_reward_ratio: 0.0,
            factors: Vec::new(),
            confluence_score: 0,
            valid: false,
        }
    }

    /// Factors pointing the same way as the signal
    pub fn supporting_factors(&self) -> impl Iterator<Item = &ConfluenceFactor> {
        let bias = self.direction.bias();
        self.factors.iter().filter(move |f| f.direction == bias)
    }

    /// Stop distance as a fraction of entry
    pub fn risk_percentage(&self) -> f64 {
        if self.entry > 0.0 {
            (self.entry - self.stop_loss).abs() / self.entry
        } else {
            0.0
        }
    }

    /// Has a symbol, an actionable direction and positive, correctly ordered levels
    pub fn is_well_formed(&self) -> bool {
        if self.symbol.is_empty() || !self.direction.is_actionable() {
            return false;
        }
        let levels = [self.entry, self.stop_loss, self.take_profit];
        if levels.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return false;
        }
        match self.direction {
            SignalDirection::Buy => self.stop_loss < self.entry && self.entry < self.take_profit,
            SignalDirection::Sell => self.take_profit < self.entry && self.entry < self.stop_loss,
            SignalDirection::Wait => false,
        }
    }
}

/// OHLC price bar (bid side), with optional spread in pips
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub spread_pips: Option<f64>,
}
