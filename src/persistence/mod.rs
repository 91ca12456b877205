//! File Persistence Module
//!
//! Loads price bars (CSV) and signal events (JSON) for backtesting, and
//! writes result bundles (JSON) and trade logs (CSV) for analysis.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backtesting::sweep::{LoadFailure, SweepReport, SymbolData};
use crate::backtesting::{BacktestResult, SignalEvent, Trade};
use crate::types::PriceBar;

/// Price bar row as found in CSV files.
///
/// `timestamp` accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarRecord {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub spread_pips: Option<f64>,
}

impl BarRecord {
    pub fn into_bar(self) -> Result<PriceBar> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        Ok(PriceBar {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            spread_pips: self.spread_pips,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(secs) = raw.parse::<i64>() {
        if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
            return Ok(dt);
        }
    }
    bail!("Unrecognized timestamp '{}'", raw)
}

/// Load price bars from a CSV file with a header row, sorted by timestamp.
///
/// Unreadable rows, unparseable timestamps and non-finite or inverted
/// prices are dropped with a warning. Only failing to open the file is an error.
pub fn load_price_bars(path: &Path) -> Result<Vec<PriceBar>> {
    let file = File::open(path).with_context(|| format!("Failed to open price file {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(file);

    let mut bars = Vec::new();
    let mut malformed = 0usize;
    let mut invalid = 0usize;
    for (row, result) in reader.deserialize::<BarRecord>().enumerate() {
        let bar = match result.map_err(anyhow::Error::from).and_then(BarRecord::into_bar) {
            Ok(bar) => bar,
            Err(e) => {
                debug!(path = %path.display(), row = row + 1, error = %e, "Skipping unreadable price row");
                malformed += 1;
                continue;
            }
        };
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) || bar.low > bar.high {
            invalid += 1;
            continue;
        }
        bars.push(bar);
    }
    if malformed + invalid > 0 {
        warn!(path = %path.display(), malformed, invalid, "Dropped bad price rows");
    }

    bars.sort_by_key(|b| b.timestamp);
    info!(path = %path.display(), bars = bars.len(), "Loaded price bars");
    Ok(bars)
}

/// Load signal events from a JSON array
pub fn load_signal_events(path: &Path) -> Result<Vec<SignalEvent>> {
    let file = File::open(path).with_context(|| format!("Failed to open signal file {}", path.display()))?;
    let events: Vec<SignalEvent> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse signal events from {}", path.display()))?;
    info!(path = %path.display(), signals = events.len(), "Loaded signal events");
    Ok(events)
}

/// Load bars and signals for one symbol from `<bars_dir>/<symbol>.csv` and
/// `<signals_dir>/<symbol>.json`. A missing signal file replays bars only.
pub fn load_symbol_data(bars_dir: &Path, signals_dir: &Path, symbol: &str) -> Result<SymbolData> {
    let bars = load_price_bars(&bars_dir.join(format!("{}.csv", symbol)))?;

    let signals_path = signals_dir.join(format!("{}.json", symbol));
    let signals = if signals_path.exists() {
        load_signal_events(&signals_path)?
    } else {
        warn!(symbol, path = %signals_path.display(), "No signal file, replaying bars only");
        Vec::new()
    };

    Ok(SymbolData {
        symbol: symbol.to_string(),
        bars,
        signals,
    })
}

/// Load every symbol, setting aside the ones whose files cannot be read
pub fn load_symbols(bars_dir: &Path, signals_dir: &Path, symbols: &[String]) -> (Vec<SymbolData>, Vec<LoadFailure>) {
    let mut loaded = Vec::with_capacity(symbols.len());
    let mut failed = Vec::new();
    for symbol in symbols {
        match load_symbol_data(bars_dir, signals_dir, symbol) {
            Ok(data) => loaded.push(data),
            Err(e) => {
                warn!(symbol = %symbol, error = %format!("{:#}", e), "Skipping symbol");
                failed.push(LoadFailure {
                    symbol: symbol.clone(),
                    error: format!("{:#}", e),
                });
            }
        }
    }
    (loaded, failed)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("Failed creating {}", parent.display()))?;
        }
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
    Ok(())
}

/// Write a backtest result bundle as pretty JSON
pub fn save_result(path: &Path, result: &BacktestResult) -> Result<()> {
    write_json(path, result)?;
    info!(path = %path.display(), symbol = %result.symbol, "Saved backtest result");
    Ok(())
}

pub fn load_result(path: &Path) -> Result<BacktestResult> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse backtest result from {}", path.display()))
}

pub fn save_sweep_report(path: &Path, report: &SweepReport) -> Result<()> {
    write_json(path, report)?;
    info!(path = %path.display(), symbols = report.results.len(), "Saved sweep report");
    Ok(())
}

/// Write trades to CSV, one row per trade, header included
pub fn save_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for trade in trades {
        writer.serialize(trade).context("Failed to write trade record")?;
    }
    writer.flush().context("Failed to flush trade writer")?;
    Ok(())
}

pub fn load_trades_csv(path: &Path) -> Result<Vec<Trade>> {
    let file = File::open(path).with_context(|| format!("Failed to open trade file {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut trades = Vec::new();
    for result in reader.deserialize() {
        let trade: Trade = result.context("Failed to deserialize trade record")?;
        trades.push(trade);
    }
    Ok(trades)
}

/// Output paths for one symbol under `output_dir`
pub fn result_paths(output_dir: &Path, symbol: &str) -> (PathBuf, PathBuf) {
    let stem = symbol.to_lowercase();
    (
        output_dir.join(format!("{}_result.json", stem)),
        output_dir.join(format!("{}_trades.csv", stem)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-04T10:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-04 10:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("1709546400").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_load_price_bars_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eurusd.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "timestamp,open,high,low,close,spread_pips").unwrap();
        writeln!(f, "2024-03-04 11:00:00,1.1,1.102,1.099,1.101,0.8").unwrap();
        writeln!(f, "2024-03-04 10:00:00,1.1,1.101,1.098,1.1,").unwrap();
        writeln!(f, "2024-03-04 12:00:00,1.1,1.090,1.095,1.1,").unwrap();
        drop(f);

        let bars = load_price_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].spread_pips, None);
        assert_eq!(bars[1].spread_pips, Some(0.8));
    }

    #[test]
    fn test_bad_rows_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gbpusd.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "timestamp,open,high,low,close,spread_pips").unwrap();
        writeln!(f, "2024-03-04 10:00:00,1.25,1.251,1.249,1.25,").unwrap();
        writeln!(f, "not-a-time,1.25,1.251,1.249,1.25,").unwrap();
        writeln!(f, "2024-03-04 11:00:00,abc,1.251,1.249,1.25,").unwrap();
        writeln!(f, "2024-03-04 12:00:00,1.25,1.252,1.248,1.251,1.1").unwrap();
        drop(f);

        let bars = load_price_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].spread_pips, Some(1.1));
    }

    #[test]
    fn test_load_symbols_sets_failures_aside() {
        let dir = tempfile::tempdir().unwrap();
        let bars_dir = dir.path().join("bars");
        let signals_dir = dir.path().join("signals");
        fs::create_dir_all(&bars_dir).unwrap();
        fs::create_dir_all(&signals_dir).unwrap();

        let mut f = File::create(bars_dir.join("EURUSD.csv")).unwrap();
        writeln!(f, "timestamp,open,high,low,close").unwrap();
        writeln!(f, "2024-03-04 10:00:00,1.1,1.101,1.099,1.1").unwrap();
        drop(f);
        fs::write(bars_dir.join("USDJPY.csv"), "timestamp,open,high,low,close\n").unwrap();
        fs::write(signals_dir.join("USDJPY.json"), "{ not json").unwrap();

        let symbols: Vec<String> = ["EURUSD", "GBPUSD", "USDJPY"].iter().map(|s| s.to_string()).collect();
        let (loaded, failed) = load_symbols(&bars_dir, &signals_dir, &symbols);

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "EURUSD");
        assert_eq!(loaded[0].bars.len(), 1);
        assert!(loaded[0].signals.is_empty());

        let names: Vec<&str> = failed.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(names, vec!["GBPUSD", "USDJPY"]);
        assert!(failed[0].error.contains("Failed to open price file"));
        assert!(failed[1].error.contains("Failed to parse signal events"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_price_bars(Path::new("/nonexistent/bars.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open price file"));
    }

    #[test]
    fn test_result_paths() {
        let (json, csv) = result_paths(Path::new("out"), "EURUSD");
        assert_eq!(json, Path::new("out/eurusd_result.json"));
        assert_eq!(csv, Path::new("out/eurusd_trades.csv"));
    }
}
