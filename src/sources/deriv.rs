//! Deriv websocket candles, used for forex pairs.

use super::SourceError;
use crate::config::DerivConfig;
use crate::market_data::{Bar, BarSource, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

/// Deriv candles carry no traded volume; every bar gets this instead.
pub const VOLUME_PROXY: f64 = 1.0;

pub struct DerivSource {
    url: String,
    api_token: Option<String>,
    timeout: Duration,
    symbol_prefix: String,
}

impl DerivSource {
    pub fn new(config: &DerivConfig) -> Self {
        Self {
            url: config.url.clone(),
            api_token: config.api_token.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            symbol_prefix: config.symbol_prefix.clone(),
        }
    }

    /// "EURUSD" -> "frxEURUSD". Already-prefixed symbols pass through.
    pub fn deriv_symbol(&self, symbol: &str) -> String {
        if symbol.starts_with(&self.symbol_prefix) {
            symbol.to_string()
        } else {
            format!("{}{}", self.symbol_prefix, symbol)
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, SourceError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| SourceError::Malformed("api token is not a valid header".into()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (mut ws, _) = timeout(self.timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| SourceError::Timeout)??;

        let payload = history_request(&self.deriv_symbol(symbol), timeframe, limit, Utc::now());
        debug!("Deriv request {}", payload);
        ws.send(Message::Text(payload.to_string().into())).await?;

        let reply = timeout(self.timeout, async {
            while let Some(message) = ws.next().await {
                match message? {
                    Message::Text(text) => {
                        return serde_json::from_str::<Value>(&text)
                            .map_err(|e| SourceError::Malformed(e.to_string()));
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Err(SourceError::Malformed("connection closed before a reply".into()))
        })
        .await
        .map_err(|_| SourceError::Timeout)??;

        let _ = ws.close(None).await;

        let mut bars = parse_candles(&reply)?;
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        Ok(bars)
    }
}

/// `ticks_history` request in candle style covering the last `limit` bars.
pub fn history_request(
    deriv_symbol: &str,
    timeframe: Timeframe,
    limit: usize,
    end: DateTime<Utc>,
) -> Value {
    let granularity = i64::from(timeframe.minutes()) * 60;
    let end = end.timestamp();
    let span = granularity.saturating_mul(i64::try_from(limit).unwrap_or(i64::MAX));
    json!({
        "ticks_history": deriv_symbol,
        "style": "candles",
        "granularity": granularity,
        "start": end.saturating_sub(span),
        "end": end,
    })
}

fn price_field(candle: &Value, key: &str) -> Result<f64, SourceError> {
    match candle.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| SourceError::Malformed(format!("{} out of range", key))),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| SourceError::Malformed(format!("{} is not numeric: {}", key, s))),
        _ => Err(SourceError::Malformed(format!("candle has no {}", key))),
    }
}

/// Bars from a `ticks_history` reply, ordered and deduplicated by epoch.
pub fn parse_candles(reply: &Value) -> Result<Vec<Bar>, SourceError> {
    if let Some(error) = reply.get("error") {
        return Err(SourceError::Rejected {
            code: error["code"].as_str().unwrap_or("unknown").to_string(),
            message: error["message"].as_str().unwrap_or_default().to_string(),
        });
    }
    let candles = reply
        .get("candles")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Malformed("reply has no candles".into()))?;

    let mut bars = candles
        .iter()
        .map(|candle| {
            let epoch = candle
                .get("epoch")
                .and_then(Value::as_i64)
                .ok_or_else(|| SourceError::Malformed("candle has no epoch".into()))?;
            let timestamp = DateTime::<Utc>::from_timestamp(epoch, 0)
                .ok_or_else(|| SourceError::Malformed(format!("bad epoch {}", epoch)))?;
            Ok(Bar {
                timestamp,
                open: price_field(candle, "open")?,
                high: price_field(candle, "high")?,
                low: price_field(candle, "low")?,
                close: price_field(candle, "close")?,
                volume: VOLUME_PROXY,
            })
        })
        .collect::<Result<Vec<Bar>, SourceError>>()?;

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    Ok(bars)
}

#[async_trait]
impl BarSource for DerivSource {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        match self.fetch_candles(symbol, timeframe, limit).await {
            Ok(bars) => {
                if bars.is_empty() {
                    warn!("Deriv returned no candles for {} {}", symbol, timeframe);
                }
                bars
            }
            Err(e) => {
                warn!("Deriv candles for {} {} failed: {}", symbol, timeframe, e);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "deriv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::net::TcpListener;

    fn source(url: String) -> DerivSource {
        DerivSource::new(&DerivConfig {
            url,
            timeout_secs: 2,
            ..DerivConfig::default()
        })
    }

    #[test]
    fn test_parse_candles() {
        let reply = json!({
            "echo_req": { "ticks_history": "frxEURUSD" },
            "candles": [
                { "epoch": 1_700_000_300i64, "open": 1.0801, "high": 1.0810, "low": 1.0799, "close": 1.0805 },
                { "epoch": 1_700_000_000i64, "open": "1.0790", "high": "1.0802", "low": "1.0788", "close": "1.0801" },
                { "epoch": 1_700_000_300i64, "open": 1.0801, "high": 1.0810, "low": 1.0799, "close": 1.0805 }
            ],
            "msg_type": "candles"
        });
        let bars = parse_candles(&reply).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        assert_eq!(bars[0].close, 1.0801);
        assert_eq!(bars[1].high, 1.0810);
        assert!(bars.iter().all(|b| b.volume == VOLUME_PROXY));
    }

    #[test]
    fn test_error_reply_is_rejected() {
        let reply = json!({
            "error": { "code": "InvalidSymbol", "message": "Symbol frxXXX is invalid." },
            "msg_type": "ticks_history"
        });
        match parse_candles(&reply) {
            Err(SourceError::Rejected { code, message }) => {
                assert_eq!(code, "InvalidSymbol");
                assert!(message.contains("invalid"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_candles_or_fields_are_malformed() {
        assert!(matches!(
            parse_candles(&json!({ "msg_type": "history" })),
            Err(SourceError::Malformed(_))
        ));
        let no_close = json!({ "candles": [{ "epoch": 1_700_000_000i64, "open": 1.0, "high": 1.0, "low": 1.0 }] });
        assert!(matches!(parse_candles(&no_close), Err(SourceError::Malformed(_))));
        assert!(parse_candles(&json!({ "candles": [] })).unwrap().is_empty());
    }

    #[test]
    fn test_history_request_shape() {
        let end = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let request = history_request("frxGBPJPY", Timeframe::M5, 200, end);
        assert_eq!(request["ticks_history"], "frxGBPJPY");
        assert_eq!(request["style"], "candles");
        assert_eq!(request["granularity"], 300);
        assert_eq!(request["end"], 1_700_000_000i64);
        assert_eq!(request["start"], 1_700_000_000i64 - 300 * 200);
    }

    #[test]
    fn test_deriv_symbol_prefix() {
        let source = source("ws://127.0.0.1:9".into());
        assert_eq!(source.deriv_symbol("EURUSD"), "frxEURUSD");
        assert_eq!(source.deriv_symbol("frxGBPJPY"), "frxGBPJPY");
    }

    #[tokio::test]
    async fn test_fetch_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let request = ws.next().await.unwrap().unwrap().into_text().unwrap();
            let request: Value = serde_json::from_str(&request).unwrap();

            let candles: Vec<Value> = (0..5)
                .map(|i| {
                    json!({
                        "epoch": 1_700_000_000i64 + i * 180,
                        "open": 160.0, "high": 160.5, "low": 159.5, "close": 160.2
                    })
                })
                .collect();
            let reply = json!({ "candles": candles, "msg_type": "candles" });
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
            request
        });

        let source = source(format!("ws://{}", addr));
        let bars = source.fetch("GBPJPY", Timeframe::M3, 3).await;
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[2].timestamp, Utc.timestamp_opt(1_700_000_720, 0).unwrap());

        let request = server.await.unwrap();
        assert_eq!(request["ticks_history"], "frxGBPJPY");
        assert_eq!(request["granularity"], 180);
    }

    #[tokio::test]
    async fn test_unreachable_host_returns_empty() {
        let source = source("ws://127.0.0.1:9".into());
        assert!(source.fetch("EURUSD", Timeframe::M3, 10).await.is_empty());
    }
}
