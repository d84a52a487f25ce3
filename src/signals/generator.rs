//! Signal assembly for one (symbol, timeframe).

use super::classify::{classify_trend, estimate_duration};
use super::core::{Confidence, Direction, Signal, join_names, round_price};
use super::divergence::detect_divergences;
use super::patterns::detect_patterns;
use super::scoring::CompositeScorer;
use crate::config::StrategyConfig;
use crate::error::BarError;
use crate::indicators::{IndicatorCalculator, IndicatorFrame};
use crate::market_data::{Bar, Timeframe};
use chrono::{DateTime, Utc};
use log::debug;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct SignalGenerator {
    calculator: IndicatorCalculator,
    scorer: CompositeScorer,
    use_divergences: bool,
}

impl Default for SignalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalGenerator {
    /// All stages enabled.
    pub fn new() -> Self {
        Self {
            calculator: IndicatorCalculator::new(),
            scorer: CompositeScorer::new(),
            use_divergences: true,
        }
    }

    pub fn from_strategy(strategy: &StrategyConfig) -> Self {
        Self {
            calculator: IndicatorCalculator::new(),
            scorer: CompositeScorer::with_volume_flow(strategy.use_volume_flow),
            use_divergences: strategy.use_divergences,
        }
    }

    /// Compute indicators and assemble a signal. `Ok(None)` means there was
    /// nothing to decide on: no bars, or CALL and PUT scored the same.
    pub fn generate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[Bar],
        now: DateTime<Utc>,
    ) -> Result<Option<Signal>, BarError> {
        let frame = self.calculator.compute(bars)?;
        Ok(self.assemble(symbol, timeframe, &frame, now))
    }

    pub fn assemble(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        frame: &IndicatorFrame,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let last = frame.latest_bar()?;

        let patterns = detect_patterns(&frame.bars);
        let divergences = if self.use_divergences {
            detect_divergences(frame)
        } else {
            Vec::new()
        };

        let call = self.scorer.score(frame, Direction::Call, &divergences);
        let put = self.scorer.score(frame, Direction::Put, &divergences);
        debug!("{} {}: CALL={} PUT={}", symbol, timeframe, call, put);

        let (direction, score) = match call.cmp(&put) {
            Ordering::Equal => return None,
            Ordering::Greater => (Direction::Call, call),
            Ordering::Less => (Direction::Put, put),
        };

        let confidence = Confidence::from_score(score);
        let duration_candles = estimate_duration(frame);

        Some(Signal {
            timestamp: now,
            symbol: symbol.to_string(),
            timeframe,
            direction,
            score,
            confidence,
            confidence_pct: confidence.fraction(),
            confidence_display: confidence.display(),
            patterns: join_names(patterns.iter().map(|p| p.name)),
            divergences: join_names(divergences.iter().map(|d| d.name)),
            trend: classify_trend(frame),
            price: round_price(last.close),
            duration_candles,
            duration_minutes: duration_candles * timeframe.minutes(),
            mtf_ok: false,
        })
    }
}
