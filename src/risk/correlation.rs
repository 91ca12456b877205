//! Static pairwise correlation table for the major FX pairs

/// (pair, pair, correlation). Lookups are symmetric.
const PAIR_CORRELATIONS: &[(&str, &str, f64)] = &[
    ("EURUSD", "EURGBP", 0.6),
    ("EURUSD", "EURJPY", 0.7),
    ("EURUSD", "EURAUD", 0.8),
    ("EURUSD", "EURCHF", 0.9),
    ("EURUSD", "GBPUSD", 0.6),
    ("EURUSD", "AUDUSD", 0.7),
    ("EURUSD", "NZDUSD", 0.6),
    ("EURUSD", "USDCAD", -0.7),
    ("EURUSD", "USDCHF", -0.8),
    ("EURUSD", "USDJPY", -0.3),
    ("GBPUSD", "EURGBP", -0.7),
    ("GBPUSD", "GBPJPY", 0.8),
    ("GBPUSD", "GBPAUD", 0.9),
    ("GBPUSD", "GBPCHF", 0.8),
    ("USDJPY", "EURJPY", 0.8),
    ("USDJPY", "GBPJPY", 0.7),
    ("USDJPY", "AUDJPY", 0.6),
    ("AUDUSD", "NZDUSD", 0.8),
    ("AUDUSD", "USDCAD", -0.5),
    ("USDCHF", "USDJPY", 0.4),
];

/// Correlation between two symbols; 1.0 for the same symbol, 0.0 if unlisted
pub fn correlation(a: &str, b: &str) -> f64 {
    let a = a.to_uppercase();
    let b = b.to_uppercase();
    if a == b {
        return 1.0;
    }
    PAIR_CORRELATIONS
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, _, c)| *c)
        .unwrap_or(0.0)
}
