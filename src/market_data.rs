use crate::error::BarError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
use mockall::automock;

/// One OHLCV interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }
}

/// Bar interval length, written the exchange way ("3m", "1h", "1d").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    minutes: u32,
}

impl Timeframe {
    pub const M3: Timeframe = Timeframe { minutes: 3 };
    pub const M5: Timeframe = Timeframe { minutes: 5 };

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes > 0).then_some(Self { minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.minutes))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.minutes;
        if m % 1440 == 0 {
            write!(f, "{}d", m / 1440)
        } else if m % 60 == 0 {
            write!(f, "{}h", m / 60)
        } else {
            write!(f, "{}m", m)
        }
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("timeframe '{}' has no unit", s))?;
        let (count, unit) = s.split_at(split);
        let count: u32 = count
            .parse()
            .map_err(|_| anyhow::anyhow!("timeframe '{}' has no count", s))?;
        let per_unit = match unit {
            "m" => 1,
            "h" => 60,
            "d" => 1440,
            other => return Err(anyhow::anyhow!("unknown timeframe unit '{}'", other)),
        };
        let minutes = count
            .checked_mul(per_unit)
            .ok_or_else(|| anyhow::anyhow!("timeframe '{}' is too long", s))?;
        Self::from_minutes(minutes)
            .ok_or_else(|| anyhow::anyhow!("timeframe '{}' must be positive", s))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.to_string()
    }
}

/// Check that a fetched sequence is usable for a computation pass:
/// finite prices, high >= low, strictly ascending timestamps.
pub fn validate_bars(bars: &[Bar]) -> Result<(), BarError> {
    for (index, bar) in bars.iter().enumerate() {
        let values = [bar.open, bar.high, bar.low, bar.close, bar.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BarError::NonFinite { index });
        }
        if bar.high < bar.low {
            return Err(BarError::InvertedRange { index });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(BarError::OutOfOrder { index });
        }
    }
    Ok(())
}

/// Supplier of recent bars for a (symbol, timeframe) pair.
///
/// Implementations never fail past this boundary: any problem is logged and
/// reported as an empty vector, which the engine treats as "no usable data".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar>;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(minute: i64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("3m".parse::<Timeframe>().unwrap().minutes(), 3);
        assert_eq!("1h".parse::<Timeframe>().unwrap().minutes(), 60);
        assert_eq!("1d".parse::<Timeframe>().unwrap().minutes(), 1440);
        assert!("0m".parse::<Timeframe>().is_err());
        assert!("5x".parse::<Timeframe>().is_err());
        assert!("m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_overflow_is_an_error() {
        assert!("4000000d".parse::<Timeframe>().is_err());
        assert!("71582789h".parse::<Timeframe>().is_err());
        let widest: Timeframe = "2982616d".parse().unwrap();
        assert_eq!(widest.minutes(), 2982616 * 1440);
    }

    #[test]
    fn test_timeframe_display_roundtrips_labels() {
        for label in ["3m", "5m", "15m", "4h", "1d"] {
            assert_eq!(label.parse::<Timeframe>().unwrap().to_string(), label);
        }
        assert_eq!("120m".parse::<Timeframe>().unwrap().to_string(), "2h");
    }

    #[test]
    fn test_timeframe_serde_uses_label() {
        let tf: Timeframe = serde_json::from_str("\"5m\"").unwrap();
        assert_eq!(tf.minutes(), 5);
        assert_eq!(serde_json::to_string(&tf).unwrap(), "\"5m\"");
    }

    #[test]
    fn test_wick_geometry() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: 100.0,
            high: 106.0,
            low: 90.0,
            close: 105.0,
            volume: 1.0,
        };
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.lower_wick(), 10.0);
        assert_eq!(bar.upper_wick(), 1.0);
        assert!(bar.is_bullish());
    }

    #[test]
    fn test_validate_bars() {
        let good = vec![bar_at(0, 1.0), bar_at(1, 2.0), bar_at(2, 3.0)];
        assert!(validate_bars(&good).is_ok());

        let unordered = vec![bar_at(1, 1.0), bar_at(0, 2.0)];
        assert_eq!(
            validate_bars(&unordered),
            Err(BarError::OutOfOrder { index: 1 })
        );

        let mut nan = good.clone();
        nan[2].close = f64::NAN;
        assert_eq!(validate_bars(&nan), Err(BarError::NonFinite { index: 2 }));

        let mut inverted = good;
        inverted[0].high = -5.0;
        assert_eq!(
            validate_bars(&inverted),
            Err(BarError::InvertedRange { index: 0 })
        );
    }
}
