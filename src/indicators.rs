//! Technical indicator computation over a bar sequence.
//!
//! Every series is positionally aligned with the input bars. Positions where
//! the lookback window is not yet full hold `None` and must never feed a
//! decision.

use crate::error::BarError;
use crate::market_data::{Bar, validate_bars};

/// Additive floor on the ATR when normalising candle bodies.
pub const BODY_STRENGTH_EPSILON: f64 = 1e-9;

/// An indicator series aligned with the bars it was computed from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series(Vec<Option<f64>>);

impl Series {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied().flatten()
    }

    /// Value at the latest bar.
    pub fn latest(&self) -> Option<f64> {
        self.0.last().copied().flatten()
    }

    /// Value `bars_back` positions before the latest bar.
    pub fn back(&self, bars_back: usize) -> Option<f64> {
        let last = self.0.len().checked_sub(1)?;
        self.get(last.checked_sub(bars_back)?)
    }

    /// Index of the first defined value.
    pub fn first_defined(&self) -> Option<usize> {
        self.0.iter().position(Option::is_some)
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.0
    }
}

impl From<Vec<Option<f64>>> for Series {
    fn from(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }
}

/// Lookback lengths of the indicator set.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSettings {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_long: usize,
    pub ema_very_long: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub adx_period: usize,
    pub atr_period: usize,
    pub roc_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            ema_long: 50,
            ema_very_long: 200,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            adx_period: 14,
            atr_period: 14,
            roc_period: 5,
        }
    }
}

/// Bars extended with their derived indicator series.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorFrame {
    pub bars: Vec<Bar>,
    pub ema_fast: Series,
    pub ema_slow: Series,
    pub ema_long: Series,
    pub ema_very_long: Series,
    pub rsi: Series,
    pub macd: Series,
    pub macd_signal: Series,
    pub adx: Series,
    pub atr: Series,
    pub obv: Series,
    pub roc: Series,
    pub body_strength: Series,
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Close `bars_back` positions before the latest bar.
    pub fn close_back(&self, bars_back: usize) -> Option<f64> {
        let last = self.bars.len().checked_sub(1)?;
        self.bars.get(last.checked_sub(bars_back)?).map(|b| b.close)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorCalculator {
    pub settings: IndicatorSettings,
}

impl IndicatorCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: IndicatorSettings) -> Self {
        Self { settings }
    }

    /// Compute the full indicator set. An empty input yields an empty frame.
    pub fn compute(&self, bars: &[Bar]) -> Result<IndicatorFrame, BarError> {
        if bars.is_empty() {
            return Ok(IndicatorFrame::default());
        }
        validate_bars(bars)?;

        let s = &self.settings;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let (macd, macd_signal) = macd(&closes, s.macd_fast, s.macd_slow, s.macd_signal);
        let atr = atr(bars, s.atr_period);
        let body_strength = bars
            .iter()
            .zip(&atr)
            .map(|(bar, atr)| atr.map(|a| bar.body() / (a + BODY_STRENGTH_EPSILON)))
            .collect::<Vec<_>>();

        Ok(IndicatorFrame {
            bars: bars.to_vec(),
            ema_fast: ema(&closes, s.ema_fast).into(),
            ema_slow: ema(&closes, s.ema_slow).into(),
            ema_long: ema(&closes, s.ema_long).into(),
            ema_very_long: ema(&closes, s.ema_very_long).into(),
            rsi: rsi(&closes, s.rsi_period).into(),
            macd: macd.into(),
            macd_signal: macd_signal.into(),
            adx: adx(bars, s.adx_period).into(),
            atr: atr.into(),
            obv: obv(bars).into(),
            roc: roc(&closes, s.roc_period).into(),
            body_strength: body_strength.into(),
        })
    }
}

/// Recursive exponential average over a possibly sparse series.
///
/// Undefined inputs produce undefined outputs and leave the state untouched;
/// the output is defined once `min_periods` observations have been seen.
fn ewm(values: &[Option<f64>], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut state: Option<f64> = None;
    let mut seen = 0usize;

    for value in values {
        match value {
            Some(v) => {
                let next = match state {
                    Some(prev) => alpha * v + (1.0 - alpha) * prev,
                    None => *v,
                };
                state = Some(next);
                seen += 1;
                out.push((seen >= min_periods).then_some(next));
            }
            None => out.push(None),
        }
    }
    out
}

/// Exponential moving average, `alpha = 2 / (period + 1)`, seeded with the
/// first value and defined from position `period - 1`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let input: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    ewm(&input, 2.0 / (period as f64 + 1.0), period)
}

/// Relative strength index with Wilder smoothing (`alpha = 1 / period`).
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let change = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(Some(change.max(0.0)));
        losses.push(Some((-change).max(0.0)));
    }

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm(&gains, alpha, period);
    let avg_loss = ewm(&losses, alpha, period);

    avg_gain
        .into_iter()
        .zip(avg_loss)
        .map(|(gain, loss)| match (gain, loss) {
            (Some(_), Some(loss)) if loss == 0.0 => Some(100.0),
            (Some(gain), Some(loss)) => Some(100.0 - 100.0 / (1.0 + gain / loss)),
            _ => None,
        })
        .collect()
}

/// MACD main line (fast EMA minus slow EMA) and its signal line.
pub fn macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let main: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let signal_line = if signal == 0 {
        vec![None; closes.len()]
    } else {
        ewm(&main, 2.0 / (signal as f64 + 1.0), signal)
    };

    (main, signal_line)
}

fn true_range(bars: &[Bar], index: usize) -> f64 {
    let bar = &bars[index];
    let range = bar.high - bar.low;
    if index == 0 {
        return range;
    }
    let prev_close = bars[index - 1].close;
    range
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

/// Average true range: mean of the first `period` true ranges, then Wilder
/// smoothing.
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }

    let ranges: Vec<f64> = (0..bars.len()).map(|i| true_range(bars, i)).collect();
    let n = period as f64;
    let mut current = ranges[..period].iter().sum::<f64>() / n;
    out[period - 1] = Some(current);

    for i in period..bars.len() {
        current = (current * (n - 1.0) + ranges[i]) / n;
        out[i] = Some(current);
    }
    out
}

/// Average directional index (Wilder). Defined from position `2 * period - 1`.
pub fn adx(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let len = bars.len();
    let mut out = vec![None; len];
    if period == 0 || len < 2 * period {
        return out;
    }

    let mut tr = vec![0.0; len];
    let mut plus_dm = vec![0.0; len];
    let mut minus_dm = vec![0.0; len];
    for i in 1..len {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        tr[i] = true_range(bars, i);
    }

    let n = period as f64;
    let mut smooth_tr: f64 = tr[1..=period].iter().sum();
    let mut smooth_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[1..=period].iter().sum();

    let dx_at = |tr: f64, plus: f64, minus: f64| -> f64 {
        if tr == 0.0 {
            return 0.0;
        }
        let plus_di = 100.0 * plus / tr;
        let minus_di = 100.0 * minus / tr;
        let sum = plus_di + minus_di;
        if sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / sum
        }
    };

    let mut dx = vec![0.0; len];
    dx[period] = dx_at(smooth_tr, smooth_plus, smooth_minus);
    for i in (period + 1)..len {
        smooth_tr = smooth_tr - smooth_tr / n + tr[i];
        smooth_plus = smooth_plus - smooth_plus / n + plus_dm[i];
        smooth_minus = smooth_minus - smooth_minus / n + minus_dm[i];
        dx[i] = dx_at(smooth_tr, smooth_plus, smooth_minus);
    }

    let first = 2 * period - 1;
    let mut current = dx[period..=first].iter().sum::<f64>() / n;
    out[first] = Some(current);
    for i in (first + 1)..len {
        current = (current * (n - 1.0) + dx[i]) / n;
        out[i] = Some(current);
    }
    out
}

/// On-balance volume: running volume flow, flat when the close is unchanged.
pub fn obv(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(bars.len());
    let mut total = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev = bars[i - 1].close;
            if bar.close > prev {
                total += bar.volume;
            } else if bar.close < prev {
                total -= bar.volume;
            }
        }
        out.push(Some(total));
    }
    out
}

/// Rate of change in percent over `period` bars.
pub fn roc(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let base = closes[i - period];
            (base != 0.0).then(|| (closes[i] - base) / base * 100.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_ema_of_constant_series() {
        let values = vec![5.0; 30];
        let out = ema(&values, 9);
        assert!(out[..8].iter().all(Option::is_none));
        for v in &out[8..] {
            assert!((v.unwrap() - 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ema_recursion() {
        let out = ema(&[1.0, 2.0, 3.0], 3);
        // alpha = 0.5: 1.0 -> 1.5 -> 2.25
        assert_eq!(out, vec![None, None, Some(2.25)]);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&rising, 14);
        assert!(out[12].is_none());
        assert_eq!(out[29], Some(100.0));

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&falling, 14);
        assert!(out[29].unwrap() < 1e-9);
    }

    #[test]
    fn test_rsi_stays_bounded() {
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0)
            .collect();
        for value in rsi(&closes, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_macd_definition_points() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let (main, signal) = macd(&closes, 12, 26, 9);
        assert!(main[24].is_none());
        assert!(main[25].is_some());
        assert!(signal[32].is_none());
        assert!(signal[33].is_some());
        // Steady uptrend: fast average sits above the slow one.
        assert!(main[59].unwrap() > 0.0);
    }

    #[test]
    fn test_atr_of_constant_range() {
        let bars = bars_from_closes(&vec![50.0; 20]);
        let out = atr(&bars, 14);
        assert!(out[12].is_none());
        assert!((out[13].unwrap() - 2.0).abs() < 1e-12);
        assert!((out[19].unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_adx_strong_trend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 3.0).collect();
        let out = adx(&bars_from_closes(&closes), 14);
        assert!(out[26].is_none());
        assert!(out[27].is_some());
        assert!(out[59].unwrap() > 25.0);
    }

    #[test]
    fn test_obv_flow() {
        let mut bars = bars_from_closes(&[10.0, 11.0, 11.0, 9.0]);
        bars[1].volume = 5.0;
        bars[2].volume = 7.0;
        bars[3].volume = 3.0;
        assert_eq!(obv(&bars), vec![Some(0.0), Some(5.0), Some(5.0), Some(2.0)]);
    }

    #[test]
    fn test_roc() {
        let out = roc(&[100.0, 1.0, 1.0, 1.0, 1.0, 110.0], 5);
        assert!(out[4].is_none());
        assert!((out[5].unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_frame_empty_input() {
        let frame = IndicatorCalculator::new().compute(&[]).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.ema_fast.latest(), None);
    }

    #[test]
    fn test_frame_rejects_malformed_bars() {
        let mut bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        bars[1].open = f64::INFINITY;
        assert!(IndicatorCalculator::new().compute(&bars).is_err());
    }

    #[test]
    fn test_frame_lookback_alignment() {
        let closes: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.1).sin()).collect();
        let frame = IndicatorCalculator::new()
            .compute(&bars_from_closes(&closes))
            .unwrap();

        assert_eq!(frame.len(), 200);
        assert_eq!(frame.ema_very_long.first_defined(), Some(199));
        assert_eq!(frame.ema_long.first_defined(), Some(49));
        assert_eq!(frame.atr.first_defined(), Some(13));
        assert_eq!(frame.body_strength.first_defined(), Some(13));
        assert!(frame.ema_very_long.latest().is_some());
        assert!(frame.ema_very_long.back(1).is_none());
    }

    #[test]
    fn test_series_back() {
        let series = Series::from(vec![Some(1.0), None, Some(3.0), Some(4.0)]);
        assert_eq!(series.latest(), Some(4.0));
        assert_eq!(series.back(1), Some(3.0));
        assert_eq!(series.back(2), None);
        assert_eq!(series.back(3), Some(1.0));
        assert_eq!(series.back(4), None);
    }
}
