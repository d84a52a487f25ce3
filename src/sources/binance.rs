//! Binance spot REST klines.

use super::SourceError;
use crate::config::BinanceConfig;
use crate::market_data::{Bar, BarSource, Timeframe};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;

/// Binance caps a single klines request at this many rows.
const MAX_KLINES_PER_REQUEST: usize = 1000;

pub struct BinanceSource {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceSource {
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building Binance HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn klines_url(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> String {
        format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            timeframe,
            limit.clamp(1, MAX_KLINES_PER_REQUEST)
        )
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, SourceError> {
        let url = self.klines_url(symbol, timeframe, limit);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<Vec<Value>> = response.json().await?;
        parse_klines(&rows)
    }
}

fn number_at(row: &[Value], index: usize) -> Result<f64, SourceError> {
    let value = row
        .get(index)
        .ok_or_else(|| SourceError::Malformed(format!("kline row has no column {}", index)))?;
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| SourceError::Malformed(format!("column {} is not numeric: {}", index, s))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| SourceError::Malformed(format!("column {} out of range", index))),
        other => Err(SourceError::Malformed(format!(
            "column {} has unexpected type: {}",
            index, other
        ))),
    }
}

/// Turn raw kline arrays into bars ordered by open time, without duplicates.
pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Bar>, SourceError> {
    let mut bars = rows
        .iter()
        .map(|row| {
            let open_time = row
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| SourceError::Malformed("kline row has no open time".into()))?;
            let timestamp = DateTime::<Utc>::from_timestamp_millis(open_time)
                .ok_or_else(|| SourceError::Malformed(format!("bad open time {}", open_time)))?;

            Ok(Bar {
                timestamp,
                open: number_at(row, 1)?,
                high: number_at(row, 2)?,
                low: number_at(row, 3)?,
                close: number_at(row, 4)?,
                volume: number_at(row, 5)?,
            })
        })
        .collect::<Result<Vec<Bar>, SourceError>>()?;

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

#[async_trait]
impl BarSource for BinanceSource {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        match self.fetch_klines(symbol, timeframe, limit).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!("Binance klines for {} {} failed: {}", symbol, timeframe, e);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "binance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(open_time: i64, close: &str) -> Vec<Value> {
        json!([
            open_time, "100.0", "101.5", "99.5", close, "12.5",
            open_time + 179_999, "1250.0", 42, "6.0", "600.0", "0"
        ])
        .as_array()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_parse_klines_orders_and_dedups() {
        let rows = vec![
            row(1_700_000_180_000, "101.0"),
            row(1_700_000_000_000, "100.5"),
            row(1_700_000_180_000, "101.0"),
        ];
        let bars = parse_klines(&rows).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].close, 100.5);
        assert_eq!(bars[1].high, 101.5);
        assert_eq!(bars[1].volume, 12.5);
    }

    #[test]
    fn test_parse_klines_rejects_garbage() {
        let rows = vec![json!([1_700_000_000_000i64, "abc", "1", "1", "1", "1"])
            .as_array()
            .unwrap()
            .clone()];
        assert!(matches!(parse_klines(&rows), Err(SourceError::Malformed(_))));

        let short = vec![json!([1_700_000_000_000i64, "1"]).as_array().unwrap().clone()];
        assert!(parse_klines(&short).is_err());
    }

    #[test]
    fn test_klines_url() {
        let source = BinanceSource::new(&BinanceConfig {
            base_url: "https://api.binance.com/".into(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            source.klines_url("BTCUSDT", Timeframe::M3, 200),
            "https://api.binance.com/api/v3/klines?symbol=BTCUSDT&interval=3m&limit=200"
        );
        assert!(source.klines_url("BTCUSDT", Timeframe::M5, 5000).ends_with("limit=1000"));
    }

    #[tokio::test]
    async fn test_unreachable_host_returns_empty() {
        let source = BinanceSource::new(&BinanceConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
        })
        .unwrap();
        assert!(source.fetch("BTCUSDT", Timeframe::M3, 10).await.is_empty());
    }
}
