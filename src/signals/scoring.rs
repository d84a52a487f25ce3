//! Composite directional score.
//!
//! Each rule is additive and evaluated independently for the candidate
//! direction. Rules whose inputs are undefined contribute nothing.

use super::core::{Direction, Divergence};
use crate::indicators::IndicatorFrame;

pub const DIVERGENCE_POINTS: u32 = 2;
pub const VOLUME_FLOW_LOOKBACK: usize = 3;
pub const BODY_STRENGTH_THRESHOLD: f64 = 0.7;
pub const STRONG_TREND_ADX: f64 = 25.0;

/// Per-rule contributions for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub ema_alignment: u32,
    pub macd_alignment: u32,
    pub divergences: u32,
    pub volume_flow: u32,
    pub momentum: u32,
    pub body_strength: u32,
    pub trend_strength: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.ema_alignment
            + self.macd_alignment
            + self.divergences
            + self.volume_flow
            + self.momentum
            + self.body_strength
            + self.trend_strength
    }
}

#[derive(Debug, Clone)]
pub struct CompositeScorer {
    use_volume_flow: bool,
}

impl Default for CompositeScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeScorer {
    pub fn new() -> Self {
        Self {
            use_volume_flow: true,
        }
    }

    pub fn with_volume_flow(use_volume_flow: bool) -> Self {
        Self { use_volume_flow }
    }

    pub fn score(
        &self,
        frame: &IndicatorFrame,
        direction: Direction,
        divergences: &[Divergence],
    ) -> u32 {
        self.breakdown(frame, direction, divergences).total()
    }

    pub fn breakdown(
        &self,
        frame: &IndicatorFrame,
        direction: Direction,
        divergences: &[Divergence],
    ) -> ScoreBreakdown {
        let mut score = ScoreBreakdown::default();
        if frame.is_empty() {
            return score;
        }

        // `favours(a, b)` is true when a sits above b for CALL, below for PUT.
        let favours = |a: Option<f64>, b: Option<f64>| -> bool {
            match (a, b) {
                (Some(a), Some(b)) => match direction {
                    Direction::Call => a > b,
                    Direction::Put => a < b,
                },
                _ => false,
            }
        };

        if favours(frame.ema_fast.latest(), frame.ema_slow.latest()) {
            score.ema_alignment = 1;
        }
        if favours(frame.macd.latest(), frame.macd_signal.latest()) {
            score.macd_alignment = 1;
        }

        score.divergences = divergences
            .iter()
            .filter(|d| d.direction == direction)
            .count() as u32
            * DIVERGENCE_POINTS;

        if self.use_volume_flow
            && frame.len() > VOLUME_FLOW_LOOKBACK
            && favours(frame.obv.latest(), frame.obv.back(VOLUME_FLOW_LOOKBACK))
        {
            score.volume_flow = 1;
        }

        if favours(frame.roc.latest(), Some(0.0)) {
            score.momentum = 1;
        }

        if frame
            .body_strength
            .latest()
            .is_some_and(|b| b > BODY_STRENGTH_THRESHOLD)
        {
            score.body_strength = 1;
        }

        if frame.adx.latest().is_some_and(|adx| adx >= STRONG_TREND_ADX) {
            score.trend_strength = 1;
        }

        score
    }
}
