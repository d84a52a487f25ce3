//! Multi-timeframe confirmation.
//!
//! A short-timeframe and a long-timeframe signal only become actionable when
//! they belong to the same symbol, agree on direction and trend, and both
//! carry enough score.

use super::core::{Direction, Signal};
use crate::error::GateRejection;

pub const DEFAULT_MIN_CONFIRMATION_SCORE: u32 = 3;

/// Two signals for one symbol that passed the gate. Both are flagged
/// confirmed and are persisted and reported together.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedPair {
    short: Signal,
    long: Signal,
}

impl ConfirmedPair {
    pub fn short(&self) -> &Signal {
        &self.short
    }

    pub fn long(&self) -> &Signal {
        &self.long
    }

    pub fn symbol(&self) -> &str {
        &self.short.symbol
    }

    pub fn direction(&self) -> Direction {
        self.short.direction
    }

    /// Short timeframe first.
    pub fn signals(&self) -> [&Signal; 2] {
        [&self.short, &self.long]
    }

    pub fn into_signals(self) -> (Signal, Signal) {
        (self.short, self.long)
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    min_score: u32,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self {
            min_score: DEFAULT_MIN_CONFIRMATION_SCORE,
        }
    }

    pub fn with_min_score(min_score: u32) -> Self {
        Self { min_score }
    }

    pub fn min_score(&self) -> u32 {
        self.min_score
    }

    pub fn confirm(
        &self,
        short: Option<Signal>,
        long: Option<Signal>,
    ) -> Result<ConfirmedPair, GateRejection> {
        let (Some(mut short), Some(mut long)) = (short, long) else {
            return Err(GateRejection::MissingSignal);
        };

        if short.symbol != long.symbol {
            return Err(GateRejection::SymbolMismatch);
        }
        if short.direction != long.direction {
            return Err(GateRejection::DirectionMismatch);
        }
        if short.score < self.min_score || long.score < self.min_score {
            return Err(GateRejection::ScoreBelowMinimum);
        }
        if short.trend != long.trend {
            return Err(GateRejection::TrendMismatch);
        }

        short.mtf_ok = true;
        long.mtf_ok = true;
        Ok(ConfirmedPair { short, long })
    }
}
