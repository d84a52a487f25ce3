//! Bar source implementations.
//!
//! The engine only sees the `BarSource` trait. Which implementation backs it
//! is decided once, from configuration, when the engine is built.

pub mod binance;
pub mod deriv;
pub mod synthetic;

pub use binance::BinanceSource;
pub use deriv::DerivSource;
pub use synthetic::SyntheticSource;

use crate::config::SourceConfig;
use crate::market_data::{Bar, BarSource, Timeframe};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashSet;
use thiserror::Error;

/// Failures inside a source. Never crosses the `BarSource` boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("timed out waiting for the feed")]
    Timeout,

    #[error("feed rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Uses `fallback` whenever `primary` comes back empty.
pub struct FallbackSource {
    primary: Box<dyn BarSource>,
    fallback: Box<dyn BarSource>,
}

impl FallbackSource {
    pub fn new(primary: Box<dyn BarSource>, fallback: Box<dyn BarSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl BarSource for FallbackSource {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        let bars = self.primary.fetch(symbol, timeframe, limit).await;
        if !bars.is_empty() {
            return bars;
        }
        warn!(
            "{} returned no bars for {} {}, using {}",
            self.primary.name(),
            symbol,
            timeframe,
            self.fallback.name()
        );
        self.fallback.fetch(symbol, timeframe, limit).await
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

/// Sends forex symbols to `forex` and everything else to `primary`.
///
/// A symbol is forex when it is listed in `forex_symbols` or already carries
/// the forex feed's prefix.
pub struct RoutedSource {
    primary: Box<dyn BarSource>,
    forex: Box<dyn BarSource>,
    forex_symbols: HashSet<String>,
    forex_prefix: String,
}

impl RoutedSource {
    pub fn new(
        primary: Box<dyn BarSource>,
        forex: Box<dyn BarSource>,
        forex_symbols: impl IntoIterator<Item = String>,
        forex_prefix: impl Into<String>,
    ) -> Self {
        Self {
            primary,
            forex,
            forex_symbols: forex_symbols.into_iter().collect(),
            forex_prefix: forex_prefix.into(),
        }
    }

    pub fn is_forex(&self, symbol: &str) -> bool {
        self.forex_symbols.contains(symbol)
            || (!self.forex_prefix.is_empty() && symbol.starts_with(&self.forex_prefix))
    }
}

#[async_trait]
impl BarSource for RoutedSource {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        let source = if self.is_forex(symbol) {
            &self.forex
        } else {
            &self.primary
        };
        debug!("Routing {} {} to {}", symbol, timeframe, source.name());
        source.fetch(symbol, timeframe, limit).await
    }

    fn name(&self) -> &'static str {
        "routed"
    }
}

pub fn build_source(config: &SourceConfig) -> Result<Box<dyn BarSource>> {
    let source: Box<dyn BarSource> = match config {
        SourceConfig::Binance(binance) => Box::new(BinanceSource::new(binance)?),
        SourceConfig::Synthetic(synthetic) => Box::new(SyntheticSource::new(synthetic)),
        SourceConfig::BinanceWithFallback { binance, synthetic } => Box::new(FallbackSource::new(
            Box::new(BinanceSource::new(binance)?),
            Box::new(SyntheticSource::new(synthetic)),
        )),
        SourceConfig::Routed {
            binance,
            deriv,
            deriv_symbols,
            synthetic_fallback,
        } => {
            let routed = Box::new(RoutedSource::new(
                Box::new(BinanceSource::new(binance)?),
                Box::new(DerivSource::new(deriv)),
                deriv_symbols.iter().cloned(),
                deriv.symbol_prefix.clone(),
            ));
            match synthetic_fallback {
                Some(synthetic) => Box::new(FallbackSource::new(
                    routed,
                    Box::new(SyntheticSource::new(synthetic)),
                )),
                None => routed,
            }
        }
    };
    Ok(source)
}
