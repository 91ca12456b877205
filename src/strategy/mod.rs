//! Signal pipeline
//!
//! - `confluence`: per-timeframe facts to a single signal
//! - `cascade`: HTF → MTF → LTF agreement
//! - `quality`: 0-100 quality score, grade and execution gate
//! - `history` / `session`: readiness helpers owned by the grader

pub mod cascade;
pub mod confluence;
pub mod history;
pub mod quality;
pub mod session;

pub use cascade::{CascadeConfig, CascadeResult, HtfBias, LtfTrigger, MtfConfirmation, MultiTimeframeCascade};
pub use confluence::{ConfluenceConfig, ConfluenceScorer, ConfluenceTally};
pub use history::SignalHistory;
pub use quality::{
    ComponentScores, ExecutionReadiness, FactorWeights, LiquidityPositioning, QualityConfig, QualityReport,
    RiskRewardCheck, SignalQualityGrader, WeightedConfluence,
};
pub use session::TradingSession;
