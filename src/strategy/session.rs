//! FX trading sessions (UTC hours, end hour inclusive)

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingSession {
    Asia,
    London,
    #[serde(alias = "new_york")]
    NewYork,
    Overlap,
}

impl TradingSession {
    pub fn contains_hour(&self, hour: u32) -> bool {
        match self {
            TradingSession::Asia => hour < 8,
            TradingSession::London => (8..=16).contains(&hour),
            TradingSession::NewYork => (13..=21).contains(&hour),
            TradingSession::Overlap => (13..=16).contains(&hour),
        }
    }

    pub fn is_open_at(&self, ts: DateTime<Utc>) -> bool {
        self.contains_hour(ts.hour())
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "asia" | "tokyo" => Some(TradingSession::Asia),
            "london" => Some(TradingSession::London),
            "newyork" | "ny" => Some(TradingSession::NewYork),
            "overlap" => Some(TradingSession::Overlap),
            _ => None,
        }
    }
}

impl fmt::Display for TradingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingSession::Asia => write!(f, "asia"),
            TradingSession::London => write!(f, "london"),
            TradingSession::NewYork => write!(f, "newyork"),
            TradingSession::Overlap => write!(f, "overlap"),
        }
    }
}

/// True if any of the allowed sessions is open at `ts`
pub fn in_allowed_session(allowed: &[TradingSession], ts: DateTime<Utc>) -> bool {
    allowed.iter().any(|s| s.is_open_at(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_session_hours() {
        let default = [TradingSession::London, TradingSession::NewYork, TradingSession::Overlap];
        assert!(in_allowed_session(&default, at(8)));
        assert!(in_allowed_session(&default, at(21)));
        assert!(!in_allowed_session(&default, at(22)));
        assert!(!in_allowed_session(&default, at(3)));
        assert!(in_allowed_session(&[TradingSession::Asia], at(3)));
        assert!(!in_allowed_session(&[TradingSession::Overlap], at(12)));
    }

    #[test]
    fn test_parse() {
        assert_eq!(TradingSession::from_str("new_york"), Some(TradingSession::NewYork));
        assert_eq!(TradingSession::from_str("London"), Some(TradingSession::London));
        assert_eq!(TradingSession::from_str("sydney"), None);
    }
}
