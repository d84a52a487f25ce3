//! Price vs oscillator divergences over a short lookback.

use super::core::{Direction, Divergence};
use crate::indicators::{IndicatorFrame, Series};

/// Bars between the compared points.
pub const DIVERGENCE_LOOKBACK: usize = 3;
pub const MIN_DIVERGENCE_BARS: usize = DIVERGENCE_LOOKBACK + 1;

pub const RSI_BULLISH: &str = "RSI Bullish Divergence";
pub const RSI_BEARISH: &str = "RSI Bearish Divergence";
pub const MACD_BULLISH: &str = "MACD Bullish Divergence";
pub const MACD_BEARISH: &str = "MACD Bearish Divergence";

/// RSI divergences first, then MACD; bullish before bearish within each.
pub fn detect_divergences(frame: &IndicatorFrame) -> Vec<Divergence> {
    let mut divergences = Vec::new();
    if frame.len() < MIN_DIVERGENCE_BARS {
        return divergences;
    }
    let (Some(close_now), Some(close_then)) = (
        frame.close_back(0),
        frame.close_back(DIVERGENCE_LOOKBACK),
    ) else {
        return divergences;
    };

    let oscillators: [(&Series, &'static str, &'static str); 2] = [
        (&frame.rsi, RSI_BULLISH, RSI_BEARISH),
        (&frame.macd, MACD_BULLISH, MACD_BEARISH),
    ];

    for (series, bullish, bearish) in oscillators {
        let (Some(osc_now), Some(osc_then)) =
            (series.latest(), series.back(DIVERGENCE_LOOKBACK))
        else {
            continue;
        };

        if close_now < close_then && osc_now > osc_then {
            divergences.push(Divergence {
                name: bullish,
                direction: Direction::Call,
            });
        }
        if close_now > close_then && osc_now < osc_then {
            divergences.push(Divergence {
                name: bearish,
                direction: Direction::Put,
            });
        }
    }

    divergences
}
