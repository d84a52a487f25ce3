//! The polling loop tying sources, signal generation, the gate and the log
//! together.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::market_data::{BarSource, Timeframe};
use crate::signals::{ConfirmationGate, Signal, SignalGenerator};
use crate::sources::build_source;
use crate::store::{CsvSignalLog, SignalSink};
use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, error, info, warn};
use tokio::time::{Duration, sleep};

/// What happened to one symbol during a cycle.
#[derive(Debug)]
pub struct SymbolOutcome {
    pub symbol: String,
    /// Signals written to the log this cycle.
    pub persisted: Vec<Signal>,
    pub errors: Vec<EngineError>,
}

#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<SymbolOutcome>,
}

impl CycleReport {
    pub fn persisted(&self) -> impl Iterator<Item = &Signal> {
        self.outcomes.iter().flat_map(|o| o.persisted.iter())
    }

    pub fn persisted_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.persisted.len()).sum()
    }

    pub fn errors(&self) -> impl Iterator<Item = &EngineError> {
        self.outcomes.iter().flat_map(|o| o.errors.iter())
    }
}

pub struct SignalEngine {
    source: Box<dyn BarSource>,
    sink: Box<dyn SignalSink>,
    generator: SignalGenerator,
    gate: ConfirmationGate,
    symbols: Vec<String>,
    timeframes: [Timeframe; 2],
    bar_limit: usize,
    require_confirmation: bool,
    poll_interval: Duration,
}

impl SignalEngine {
    pub fn new(
        config: &EngineConfig,
        source: Box<dyn BarSource>,
        sink: Box<dyn SignalSink>,
    ) -> Self {
        Self {
            source,
            sink,
            generator: SignalGenerator::from_strategy(&config.strategy),
            gate: ConfirmationGate::with_min_score(config.strategy.min_confirmation_score),
            symbols: config.symbols.clone(),
            timeframes: config.timeframes(),
            bar_limit: config.bar_limit,
            require_confirmation: config.strategy.require_mtf_confirmation,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    /// Build the configured bar source and open the CSV log.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let source = build_source(&config.source)?;
        let sink = CsvSignalLog::open(&config.log_path)?;
        info!(
            "Engine using {} source, logging to {}",
            source.name(),
            config.log_path.display()
        );
        Ok(Self::new(config, source, Box::new(sink)))
    }

    /// Poll until Ctrl-C.
    pub async fn run(&self) {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    }

    /// Cycle, then sleep `poll_interval_secs`, until `shutdown` resolves.
    ///
    /// The sleep starts after a cycle ends, so a slow cycle never shortens
    /// the pause before the next one. Shutdown is honoured mid-cycle too.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = &mut shutdown => break,
            }
            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = &mut shutdown => break,
            }
        }
        info!("Shutting down signal engine...");
    }

    /// One pass over every symbol. Each signal is stamped when it is built.
    pub async fn run_cycle(&self) -> CycleReport {
        self.cycle(None).await
    }

    /// One pass over every symbol with every signal stamped `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        self.cycle(Some(now)).await
    }

    async fn cycle(&self, fixed_time: Option<DateTime<Utc>>) -> CycleReport {
        let started_at = fixed_time.unwrap_or_else(now_secs);
        info!(
            "Cycle start: {} symbol(s) on {}/{}",
            self.symbols.len(),
            self.timeframes[0],
            self.timeframes[1]
        );

        let mut outcomes = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            outcomes.push(self.process_symbol(symbol, fixed_time).await);
        }

        let report = CycleReport {
            started_at,
            outcomes,
        };
        info!(
            "Cycle end: {} signal(s) logged, {} issue(s)",
            report.persisted_count(),
            report.errors().count()
        );
        report
    }

    async fn process_symbol(
        &self,
        symbol: &str,
        fixed_time: Option<DateTime<Utc>>,
    ) -> SymbolOutcome {
        let mut outcome = SymbolOutcome {
            symbol: symbol.to_string(),
            persisted: Vec::new(),
            errors: Vec::new(),
        };

        let mut found: Vec<Option<Signal>> = Vec::with_capacity(self.timeframes.len());
        for &timeframe in &self.timeframes {
            match self.signal_for(symbol, timeframe, fixed_time).await {
                Ok(signal) => found.push(signal),
                Err(e) => {
                    report_error(&e);
                    outcome.errors.push(e);
                    found.push(None);
                }
            }
        }

        let to_persist = if self.require_confirmation {
            let mut found = found.into_iter();
            let (short, long) = (found.next().flatten(), found.next().flatten());
            match self.gate.confirm(short, long) {
                Ok(pair) => {
                    for signal in pair.signals() {
                        info!("CONFIRMED {}", signal.summary());
                    }
                    let (short, long) = pair.into_signals();
                    vec![short, long]
                }
                Err(reason) => {
                    // A missing timeframe was already reported as its own error.
                    if outcome.errors.is_empty() {
                        let e = EngineError::Unconfirmed {
                            symbol: symbol.to_string(),
                            reason,
                        };
                        report_error(&e);
                        outcome.errors.push(e);
                    }
                    Vec::new()
                }
            }
        } else {
            let signals: Vec<Signal> = found.into_iter().flatten().collect();
            for signal in &signals {
                info!("SIGNAL {}", signal.summary());
            }
            signals
        };

        if to_persist.is_empty() {
            return outcome;
        }

        match self.sink.append(&to_persist).await {
            Ok(()) => outcome.persisted = to_persist,
            Err(source) => {
                let e = EngineError::PersistenceFailure {
                    symbol: symbol.to_string(),
                    source,
                };
                report_error(&e);
                outcome.errors.push(e);
            }
        }
        outcome
    }

    async fn signal_for(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        fixed_time: Option<DateTime<Utc>>,
    ) -> Result<Option<Signal>, EngineError> {
        let bars = self.source.fetch(symbol, timeframe, self.bar_limit).await;
        if bars.is_empty() {
            return Err(EngineError::DataUnavailable {
                symbol: symbol.to_string(),
                timeframe,
            });
        }
        let now = fixed_time.unwrap_or_else(now_secs);

        let signal = self
            .generator
            .generate(symbol, timeframe, &bars, now)
            .map_err(|e| EngineError::UnexpectedComputationFailure {
                symbol: symbol.to_string(),
                timeframe,
                detail: e.to_string(),
            })?;

        if signal.is_none() {
            debug!("{} {}: CALL and PUT tied, no signal", symbol, timeframe);
        }
        Ok(signal)
    }
}

fn now_secs() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn report_error(e: &EngineError) {
    match e {
        EngineError::DataUnavailable { .. } => warn!("{}", e),
        EngineError::Unconfirmed { .. } => info!("{}", e),
        EngineError::PersistenceFailure { .. } | EngineError::UnexpectedComputationFailure { .. } => {
            error!("{}", e)
        }
    }
}
