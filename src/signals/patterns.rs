//! Candlestick patterns on the latest one or two bars.

use super::core::{Direction, Pattern};
use crate::market_data::Bar;

pub const MIN_PATTERN_BARS: usize = 3;

/// Long wick must reach this multiple of the body.
const LONG_WICK_RATIO: f64 = 2.0;
/// Opposite wick must stay under this multiple of the body.
const SHORT_WICK_RATIO: f64 = 0.5;

pub const HAMMER: &str = "Hammer";
pub const SHOOTING_STAR: &str = "Shooting Star";
pub const BULLISH_ENGULFING: &str = "Bullish Engulfing";
pub const BEARISH_ENGULFING: &str = "Bearish Engulfing";

/// All patterns firing on the latest bars, in detection order.
pub fn detect_patterns(bars: &[Bar]) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    if bars.len() < MIN_PATTERN_BARS {
        return patterns;
    }

    let last = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];
    let body = last.body();
    let lower = last.lower_wick();
    let upper = last.upper_wick();

    if lower >= body * LONG_WICK_RATIO && upper < body * SHORT_WICK_RATIO {
        patterns.push(Pattern {
            name: HAMMER,
            direction: Direction::Call,
        });
    }
    if upper >= body * LONG_WICK_RATIO && lower < body * SHORT_WICK_RATIO {
        patterns.push(Pattern {
            name: SHOOTING_STAR,
            direction: Direction::Put,
        });
    }

    if last.is_bullish() && prev.is_bearish() {
        patterns.push(Pattern {
            name: BULLISH_ENGULFING,
            direction: Direction::Call,
        });
    }
    if last.is_bearish() && prev.is_bullish() {
        patterns.push(Pattern {
            name: BEARISH_ENGULFING,
            direction: Direction::Put,
        });
    }

    patterns
}
