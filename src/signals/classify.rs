//! Trend regime and move-duration estimates from the latest indicator values.

use super::core::Trend;
use crate::indicators::IndicatorFrame;

/// ADX below this is treated as a ranging market.
pub const RANGE_ADX_THRESHOLD: f64 = 20.0;

pub const MIN_DURATION_BARS: u32 = 1;
pub const MAX_DURATION_BARS: u32 = 10;
/// Bars needed before a duration is estimated at all.
pub const DURATION_MIN_HISTORY: usize = 6;
/// Velocity is measured across this many bar steps.
pub const VELOCITY_SPAN: usize = 4;

pub fn classify_trend(frame: &IndicatorFrame) -> Trend {
    let (Some(long), Some(very_long)) = (frame.ema_long.latest(), frame.ema_very_long.latest())
    else {
        return Trend::Undefined;
    };
    let Some(adx) = frame.adx.latest() else {
        return Trend::Undefined;
    };

    if adx < RANGE_ADX_THRESHOLD {
        Trend::Range
    } else if long > very_long {
        Trend::Uptrend
    } else {
        Trend::Downtrend
    }
}

/// How many bars the current move should persist: ATR over average per-bar
/// displacement, clamped to `[1, 10]`.
pub fn estimate_duration(frame: &IndicatorFrame) -> u32 {
    if frame.len() < DURATION_MIN_HISTORY {
        return MIN_DURATION_BARS;
    }
    let (Some(now), Some(then)) = (frame.close_back(0), frame.close_back(VELOCITY_SPAN)) else {
        return MIN_DURATION_BARS;
    };

    let velocity = (now - then).abs() / VELOCITY_SPAN as f64;
    if velocity <= 0.0 {
        return MIN_DURATION_BARS;
    }
    let Some(atr) = frame.atr.latest() else {
        return MIN_DURATION_BARS;
    };

    duration_from_ratio(atr / velocity)
}

fn duration_from_ratio(ratio: f64) -> u32 {
    if !ratio.is_finite() {
        return if ratio > 0.0 {
            MAX_DURATION_BARS
        } else {
            MIN_DURATION_BARS
        };
    }
    let bars = ratio.floor().max(0.0).min(MAX_DURATION_BARS as f64) as u32;
    bars.clamp(MIN_DURATION_BARS, MAX_DURATION_BARS)
}
