//! Read side of the signal log.

use crate::signals::Confidence;
use crate::store::{SignalRecord, TIMESTAMP_FORMAT};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_RECENT_LIMIT: usize = 50;

const HIGH_COLOR: &str = "#00FF99";
const MEDIUM_COLOR: &str = "#FFD700";
const LOW_COLOR: &str = "#FF4C4C";

/// Log row plus presentation fields derived at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentSignal {
    #[serde(flatten)]
    pub record: SignalRecord,
    pub elapsed_time: String,
    pub confidence_color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    /// No log yet, or nothing readable in it.
    Waiting,
    Ok,
}

/// What `recent` prints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalFeed {
    pub status: FeedStatus,
    pub count: usize,
    pub last_update: String,
    pub data: Vec<RecentSignal>,
}

pub fn confidence_color(label: &str) -> &'static str {
    if label == Confidence::High.label() {
        HIGH_COLOR
    } else if label == Confidence::Medium.label() {
        MEDIUM_COLOR
    } else {
        LOW_COLOR
    }
}

/// "42s ago", "7 min ago", "2h 5min ago", "3d ago".
pub fn format_elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3_600 {
        format!("{} min ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h {}min ago", secs / 3_600, (secs % 3_600) / 60)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// The `limit` most recent rows, newest first. Rows that do not parse are
/// skipped; a missing log yields an empty list.
pub fn recent_signals(path: &Path, limit: usize, now: DateTime<Utc>) -> Result<Vec<RecentSignal>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening signal log {}", path.display()))?;

    let mut rows: Vec<(DateTime<Utc>, SignalRecord)> = Vec::new();
    let mut skipped = 0usize;
    for result in reader.deserialize::<SignalRecord>() {
        let parsed = result
            .ok()
            .filter(|r| r.price.is_finite() && r.confidence_pct.is_finite())
            .and_then(|r| parse_timestamp(&r.timestamp).map(|ts| (ts, r)));
        match parsed {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("Skipped {} malformed row(s) in {}", skipped, path.display());
    }

    // Stable sort keeps append order among rows sharing a timestamp.
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    rows.truncate(limit);

    Ok(rows
        .into_iter()
        .map(|(ts, record)| RecentSignal {
            elapsed_time: format_elapsed(ts, now),
            confidence_color: confidence_color(&record.confidence_label),
            record,
        })
        .collect())
}

pub fn signal_feed(path: &Path, limit: usize, now: DateTime<Utc>) -> Result<SignalFeed> {
    let data = recent_signals(path, limit, now)?;
    let status = if data.is_empty() {
        FeedStatus::Waiting
    } else {
        FeedStatus::Ok
    };
    Ok(SignalFeed {
        status,
        count: data.len(),
        last_update: now.format(TIMESTAMP_FORMAT).to_string(),
        data,
    })
}
