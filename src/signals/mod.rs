//! Signal Generation Module
//!
//! Pattern and divergence detection, composite scoring, regime/duration
//! classification, per-timeframe signal assembly and the multi-timeframe
//! confirmation gate. Everything here is pure: no I/O and no state carried
//! between cycles.

pub mod classify;
pub mod coordinator;
pub mod core;
pub mod divergence;
pub mod generator;
pub mod patterns;
pub mod scoring;

pub use coordinator::{ConfirmationGate, ConfirmedPair};
pub use self::core::{Confidence, Direction, Divergence, Pattern, Signal, Trend};
pub use generator::SignalGenerator;
pub use scoring::CompositeScorer;
