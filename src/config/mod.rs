//! Configuration management for SMCBot
//!
//! Loads from config files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::backtesting::{BacktestConfig, SimulatorSettings};
use crate::error::ConfigError;
use crate::risk::RiskConfig;
use crate::strategy::{CascadeConfig, ConfluenceConfig, QualityConfig};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub run: RunConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub confluence: ConfluenceConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Symbols to backtest
    pub symbols: Vec<String>,
    /// Directory holding `<symbol>.csv` price bars
    pub bars_dir: PathBuf,
    /// Directory holding `<symbol>.json` signal events
    pub signals_dir: PathBuf,
    /// Where result bundles and trade logs are written
    pub output_dir: PathBuf,
    /// Run symbols on the rayon pool
    pub parallel: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("run.symbols", vec!["EURUSD"])?
            .set_default("run.bars_dir", "./data/bars")?
            .set_default("run.signals_dir", "./data/signals")?
            .set_default("run.output_dir", "./data/results")?
            .set_default("run.parallel", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (SMCBOT__RISK__PROFILE=aggressive)
            .add_source(Environment::with_prefix("SMCBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Check every component section; the first violation wins
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.confluence.validate()?;
        self.cascade.validate()?;
        self.quality.validate()?;
        self.risk.validate()?;
        self.backtest.validate()?;
        Ok(())
    }

    pub fn simulator_settings(&self) -> SimulatorSettings {
        SimulatorSettings {
            backtest: self.backtest.clone(),
            confluence: self.confluence.clone(),
            quality: self.quality.clone(),
            cascade: self.cascade.clone(),
            risk: self.risk.clone(),
        }
    }

    /// One-line summary for logging
    pub fn digest(&self) -> String {
        format!(
            "symbols={:?} profile={} balance={:.2} min_quality={:.1} min_rr={:.2} parallel={}",
            self.run.symbols,
            self.risk.profile,
            self.backtest.initial_balance,
            self.backtest.min_signal_quality,
            self.backtest.min_rr_ratio,
            self.run.parallel
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
