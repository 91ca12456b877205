//! Per-symbol signal history for near-duplicate detection
//!
//! Owned by a single grader; entries age out relative to the newest
//! recorded signal time, so replayed history behaves like live history.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::types::{Signal, SignalDirection};

/// Entries within this fraction of entry price are considered the same level
const DUPLICATE_PRICE_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
struct HistoryEntry {
    timestamp: DateTime<Utc>,
    direction: SignalDirection,
    entry: f64,
}

#[derive(Debug, Clone)]
pub struct SignalHistory {
    duplicate_window: Duration,
    retention: Duration,
    by_symbol: HashMap<String, Vec<HistoryEntry>>,
}

impl SignalHistory {
    pub fn new(duplicate_window_hours: i64, retention_hours: i64) -> Self {
        Self {
            duplicate_window: Duration::hours(duplicate_window_hours),
            retention: Duration::hours(retention_hours.max(duplicate_window_hours)),
            by_symbol: HashMap::new(),
        }
    }

    /// Same symbol and direction, entry within 0.1%, inside the window
    pub fn is_duplicate(&self, signal: &Signal) -> bool {
        let Some(entries) = self.by_symbol.get(&signal.symbol) else {
            return false;
        };
        if signal.entry <= 0.0 {
            return false;
        }
        entries.iter().any(|e| {
            let age = (signal.timestamp - e.timestamp).abs();
            age <= self.duplicate_window
                && e.direction == signal.direction
                && (e.entry - signal.entry).abs() / signal.entry < DUPLICATE_PRICE_TOLERANCE
        })
    }

    pub fn record(&mut self, signal: &Signal) {
        self.by_symbol
            .entry(signal.symbol.clone())
            .or_default()
            .push(HistoryEntry {
                timestamp: signal.timestamp,
                direction: signal.direction,
                entry: signal.entry,
            });
        self.prune(signal.timestamp);
    }

    /// Drop entries older than the retention period
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        for entries in self.by_symbol.values_mut() {
            entries.retain(|e| e.timestamp > cutoff);
        }
        self.by_symbol.retain(|_, entries| !entries.is_empty());
    }

    pub fn len(&self) -> usize {
        self.by_symbol.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_symbol.clear();
    }
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::new(4, 24)
    }
}
