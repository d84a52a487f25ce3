//! Random-walk bars for running without an exchange connection.

use crate::config::SyntheticConfig;
use crate::market_data::{Bar, BarSource, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Symbols that get a forex-like price level and volatility.
const FX_BASES: [(&str, f64); 2] = [("EURUSD", 1.08), ("GBPJPY", 160.0)];
const FX_NOISE: f64 = 0.0005;
const DEFAULT_NOISE: f64 = 0.002;
const DEFAULT_BASE: f64 = 30_000.0;
const DEFAULT_BASE_SPREAD: f64 = 2_000.0;

pub struct SyntheticSource {
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new(config: &SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(&SyntheticConfig { seed: Some(seed) })
    }

    /// `limit` bars spaced by `timeframe`, the last one opening at `end`.
    pub fn generate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        end: DateTime<Utc>,
    ) -> Vec<Bar> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let fx_base = FX_BASES
            .iter()
            .find(|(fx, _)| *fx == symbol)
            .map(|(_, base)| *base);
        let (base, sigma) = match fx_base {
            Some(base) => (base, FX_NOISE),
            None => (
                DEFAULT_BASE + rng.gen_range(-DEFAULT_BASE_SPREAD..DEFAULT_BASE_SPREAD),
                DEFAULT_NOISE,
            ),
        };

        let step = timeframe.duration();
        let mut drift = 0.0;
        (0..limit)
            .map(|i| {
                drift += sigma * standard_normal(&mut *rng);
                let close = base * (1.0 + drift);
                let open = close * (1.0 + rng.gen_range(-0.0008..0.0008));
                let high = (close * (1.0 + rng.gen_range(0.0002..0.0015))).max(open);
                let low = (close * (1.0 - rng.gen_range(0.0002..0.0015))).min(open);
                Bar {
                    timestamp: end - step * (limit - 1 - i) as i32,
                    open,
                    high,
                    low,
                    close,
                    volume: rng.gen_range(10.0..1000.0),
                }
            })
            .collect()
    }
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[async_trait]
impl BarSource for SyntheticSource {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Bar> {
        self.generate(symbol, timeframe, limit, Utc::now().trunc_subsecs(0))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::validate_bars;
    use chrono::TimeZone;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_generates_valid_ordered_bars() {
        let source = SyntheticSource::seeded(42);
        let bars = source.generate("BTCUSDT", Timeframe::M3, 200, end());
        assert_eq!(bars.len(), 200);
        assert!(validate_bars(&bars).is_ok());
        assert_eq!(bars[199].timestamp, end());
        assert_eq!(bars[198].timestamp, end() - chrono::Duration::minutes(3));
        for bar in &bars {
            assert!(bar.high >= bar.open.max(bar.close));
            assert!(bar.low <= bar.open.min(bar.close));
            assert!((10.0..1000.0).contains(&bar.volume));
        }
    }

    #[test]
    fn test_fx_symbols_use_fx_levels() {
        let source = SyntheticSource::seeded(1);
        let bars = source.generate("EURUSD", Timeframe::M5, 50, end());
        assert!(bars.iter().all(|b| (0.9..1.3).contains(&b.close)));
    }

    #[test]
    fn test_same_seed_same_bars() {
        let a = SyntheticSource::seeded(9).generate("SOLUSDT", Timeframe::M3, 30, end());
        let b = SyntheticSource::seeded(9).generate("SOLUSDT", Timeframe::M3, 30, end());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let source = SyntheticSource::seeded(3);
        assert_eq!(source.fetch("ETHUSDT", Timeframe::M5, 120).await.len(), 120);
        assert!(source.fetch("ETHUSDT", Timeframe::M5, 0).await.is_empty());
    }
}
