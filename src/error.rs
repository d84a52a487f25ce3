use crate::market_data::Timeframe;
use thiserror::Error;

/// Failure taxonomy of the signal pipeline.
///
/// A tie between CALL and PUT scores is not represented here: the assembler
/// returns `None` for it and the engine treats it as "no decision".
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable bars for {symbol} {timeframe}")]
    DataUnavailable { symbol: String, timeframe: Timeframe },

    #[error("{symbol}: timeframes did not confirm ({reason})")]
    Unconfirmed { symbol: String, reason: GateRejection },

    #[error("failed to append signals for {symbol} to the log: {source}")]
    PersistenceFailure {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("computation failed for {symbol} {timeframe}: {detail}")]
    UnexpectedComputationFailure {
        symbol: String,
        timeframe: Timeframe,
        detail: String,
    },
}

/// Why the multi-timeframe gate refused a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    MissingSignal,
    SymbolMismatch,
    DirectionMismatch,
    ScoreBelowMinimum,
    TrendMismatch,
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            GateRejection::MissingSignal => "missing signal on a timeframe",
            GateRejection::SymbolMismatch => "signals are for different symbols",
            GateRejection::DirectionMismatch => "direction mismatch",
            GateRejection::ScoreBelowMinimum => "score below minimum",
            GateRejection::TrendMismatch => "trend mismatch",
        };
        f.write_str(text)
    }
}

/// Reasons a bar sequence is rejected before any indicator is computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar {index} has a non-finite value")]
    NonFinite { index: usize },

    #[error("bar {index} is not after the previous bar")]
    OutOfOrder { index: usize },

    #[error("bar {index} has high below low")]
    InvertedRange { index: usize },
}
