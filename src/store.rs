//! Append-only CSV log of confirmed signals.

use crate::signals::Signal;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

/// Timestamp layout used in the log, always UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const COLUMNS: [&str; 15] = [
    "timestamp",
    "symbol",
    "timeframe",
    "direction",
    "confidence_label",
    "confidence_pct",
    "confidence_display",
    "score",
    "patterns",
    "divergences",
    "trend",
    "price",
    "duration_candles",
    "duration_minutes",
    "mtf_ok",
];

/// One log row. Field order matches `COLUMNS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: String,
    pub symbol: String,
    pub timeframe: String,
    pub direction: String,
    pub confidence_label: String,
    pub confidence_pct: f64,
    pub confidence_display: String,
    pub score: u32,
    pub patterns: String,
    pub divergences: String,
    pub trend: String,
    pub price: f64,
    pub duration_candles: u32,
    pub duration_minutes: u32,
    pub mtf_ok: bool,
}

impl From<&Signal> for SignalRecord {
    fn from(signal: &Signal) -> Self {
        Self {
            timestamp: signal.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe.to_string(),
            direction: signal.direction.to_string(),
            confidence_label: signal.confidence.label().to_string(),
            confidence_pct: signal.confidence_pct,
            confidence_display: signal.confidence_display.clone(),
            score: signal.score,
            patterns: signal.patterns.clone(),
            divergences: signal.divergences.clone(),
            trend: signal.trend.to_string(),
            price: signal.price,
            duration_candles: signal.duration_candles,
            duration_minutes: signal.duration_minutes,
            mtf_ok: signal.mtf_ok,
        }
    }
}

/// Destination for signals the engine decided to keep.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Append all signals as one unit. Readers never see half of a batch.
    async fn append(&self, signals: &[Signal]) -> Result<()>;
}

pub struct CsvSignalLog {
    path: PathBuf,
}

impl CsvSignalLog {
    /// Open the log at `path`, creating it with a header row if it does not
    /// exist or is empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }

        let needs_header = match fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        if needs_header {
            let mut writer = csv::Writer::from_writer(vec![]);
            writer.write_record(COLUMNS)?;
            let header = writer.into_inner().context("failed to flush CSV header")?;
            write_synced(&path, &header)?;
            info!("Created signal log {}", path.display());
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Serialize records without a header, ready to append.
pub fn encode_records(signals: &[Signal]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(vec![]);
    for signal in signals {
        writer.serialize(SignalRecord::from(signal))?;
    }
    writer.into_inner().context("failed to flush CSV writer")
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening signal log {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("writing signal log {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("syncing signal log {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl SignalSink for CsvSignalLog {
    async fn append(&self, signals: &[Signal]) -> Result<()> {
        if signals.is_empty() {
            return Ok(());
        }
        let bytes = encode_records(signals)?;
        let path = self.path.clone();
        let count = signals.len();

        tokio::task::spawn_blocking(move || write_synced(&path, &bytes))
            .await
            .context("signal log writer task panicked")??;

        debug!("Appended {} signal(s) to {}", count, self.path.display());
        Ok(())
    }
}
