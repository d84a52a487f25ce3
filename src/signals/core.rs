//! Core signal types shared by the detectors, the scorer and the gate.

use crate::market_data::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the anticipated move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "CALL",
            Direction::Put => "PUT",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Call => Direction::Put,
            Direction::Put => Direction::Call,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete confidence tier, ordered Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub const HIGH_MIN_SCORE: u32 = 7;
    pub const MEDIUM_MIN_SCORE: u32 = 4;

    /// Step function of the winning score. Tiers are open-ended above.
    pub fn from_score(score: u32) -> Self {
        if score >= Self::HIGH_MIN_SCORE {
            Confidence::High
        } else if score >= Self::MEDIUM_MIN_SCORE {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }

    pub fn fraction(&self) -> f64 {
        match self {
            Confidence::Low => 0.5,
            Confidence::Medium => 0.7,
            Confidence::High => 0.9,
        }
    }

    /// e.g. "MEDIUM (70%)"
    pub fn display(&self) -> String {
        format!("{} ({:.0}%)", self.label(), self.fraction() * 100.0)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Broad market regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Uptrend,
    Downtrend,
    Range,
    Undefined,
}

impl Trend {
    pub fn label(&self) -> &'static str {
        match self {
            Trend::Uptrend => "UPTREND",
            Trend::Downtrend => "DOWNTREND",
            Trend::Range => "RANGE",
            Trend::Undefined => "UNDEFINED",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Candlestick pattern found on the latest bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub name: &'static str,
    pub direction: Direction,
}

/// Price/oscillator disagreement over the divergence lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    pub name: &'static str,
    pub direction: Direction,
}

/// Pipe-joined names in detection order, empty when nothing fired.
pub fn join_names<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().collect::<Vec<_>>().join("|")
}

/// Directional call for one (symbol, timeframe), built fresh every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub score: u32,
    pub confidence: Confidence,
    pub confidence_pct: f64,
    pub confidence_display: String,
    pub patterns: String,
    pub divergences: String,
    pub trend: Trend,
    pub price: f64,
    pub duration_candles: u32,
    pub duration_minutes: u32,
    pub mtf_ok: bool,
}

impl Signal {
    /// One-line operator summary.
    pub fn summary(&self) -> String {
        format!(
            "{} {} -> {} | {} | score={} | trend={} | patterns={} | divs={} | duration~{} bars (~{} min)",
            self.symbol,
            self.timeframe,
            self.direction,
            self.confidence_display,
            self.score,
            self.trend,
            self.patterns,
            self.divergences,
            self.duration_candles,
            self.duration_minutes
        )
    }
}

/// Round to the 6 decimals stored in the log.
pub fn round_price(price: f64) -> f64 {
    (price * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_steps() {
        assert_eq!(Confidence::from_score(8), Confidence::High);
        assert_eq!(Confidence::from_score(7), Confidence::High);
        assert_eq!(Confidence::from_score(6), Confidence::Medium);
        assert_eq!(Confidence::from_score(5), Confidence::Medium);
        assert_eq!(Confidence::from_score(4), Confidence::Medium);
        assert_eq!(Confidence::from_score(3), Confidence::Low);
        assert_eq!(Confidence::from_score(2), Confidence::Low);
        assert_eq!(Confidence::from_score(0), Confidence::Low);
        assert_eq!(Confidence::from_score(12), Confidence::High);
    }

    #[test]
    fn test_confidence_fraction_and_display() {
        assert_eq!(Confidence::High.fraction(), 0.9);
        assert_eq!(Confidence::Medium.fraction(), 0.7);
        assert_eq!(Confidence::Low.fraction(), 0.5);
        assert_eq!(Confidence::High.display(), "HIGH (90%)");
        assert_eq!(Confidence::Medium.display(), "MEDIUM (70%)");
        assert_eq!(Confidence::Low.display(), "LOW (50%)");
        assert!(Confidence::Low < Confidence::Medium && Confidence::Medium < Confidence::High);
    }

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(Vec::<&str>::new()), "");
        assert_eq!(join_names(["Hammer", "Bullish Engulfing"]), "Hammer|Bullish Engulfing");
    }

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(1.23456789), 1.234568);
        assert_eq!(round_price(30000.0), 30000.0);
    }

    #[test]
    fn test_direction_serde() {
        assert_eq!(serde_json::to_string(&Direction::Call).unwrap(), "\"CALL\"");
        assert_eq!(Direction::Put.opposite(), Direction::Call);
    }
}
