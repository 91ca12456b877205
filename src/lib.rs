//! SMCBot Library
//!
//! Smart-money-concepts signal grading, risk-gated position sizing and
//! deterministic bar-by-bar backtesting for FX pairs

pub mod backtesting;
pub mod config;
pub mod error;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod types;
