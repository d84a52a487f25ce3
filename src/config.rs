use crate::market_data::Timeframe;
use crate::signals::coordinator::DEFAULT_MIN_CONFIRMATION_SCORE;
use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_short_timeframe")]
    pub short_timeframe: Timeframe,
    #[serde(default = "default_long_timeframe")]
    pub long_timeframe: Timeframe,
    #[serde(default = "default_bar_limit")]
    pub bar_limit: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

/// Which bar source the engine is built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Binance(BinanceConfig),
    Synthetic(SyntheticConfig),
    /// Binance first, synthetic bars when it returns nothing.
    BinanceWithFallback {
        #[serde(default)]
        binance: BinanceConfig,
        #[serde(default)]
        synthetic: SyntheticConfig,
    },
    /// Forex symbols go to Deriv, everything else to Binance.
    Routed {
        #[serde(default)]
        binance: BinanceConfig,
        #[serde(default)]
        deriv: DerivConfig,
        /// Symbols sent to Deriv in addition to those carrying its prefix.
        #[serde(default = "default_deriv_symbols")]
        deriv_symbols: Vec<String>,
        /// Synthetic bars for whatever the routed sources return nothing for.
        #[serde(default)]
        synthetic_fallback: Option<SyntheticConfig>,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Routed {
            binance: BinanceConfig::default(),
            deriv: DerivConfig::default(),
            deriv_symbols: default_deriv_symbols(),
            synthetic_fallback: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinanceConfig {
    #[serde(default = "default_binance_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: default_binance_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivConfig {
    #[serde(default = "default_deriv_url")]
    pub url: String,
    /// Sent as a bearer token when present.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Deriv's market prefix, "frx" for forex pairs.
    #[serde(default = "default_deriv_prefix")]
    pub symbol_prefix: String,
}

impl Default for DerivConfig {
    fn default() -> Self {
        Self {
            url: default_deriv_url(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
            symbol_prefix: default_deriv_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Fixed seed for reproducible bars; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Optional pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_true")]
    pub use_divergences: bool,
    #[serde(default = "default_true")]
    pub use_volume_flow: bool,
    #[serde(default = "default_true")]
    pub require_mtf_confirmation: bool,
    #[serde(default = "default_min_confirmation_score")]
    pub min_confirmation_score: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            use_divergences: true,
            use_volume_flow: true,
            require_mtf_confirmation: true,
            min_confirmation_score: default_min_confirmation_score(),
        }
    }
}

fn default_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "SOLUSDT", "EURUSD", "GBPJPY"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_short_timeframe() -> Timeframe {
    Timeframe::M3
}

fn default_long_timeframe() -> Timeframe {
    Timeframe::M5
}

fn default_bar_limit() -> usize {
    200 // enough for the 200-period average to be defined on the latest bar
}

fn default_poll_interval_secs() -> u64 {
    20
}

fn default_log_path() -> PathBuf {
    PathBuf::from("binary_signals_log.csv")
}

fn default_binance_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_deriv_url() -> String {
    "wss://ws.derivws.com/websockets/v3?app_id=1089".to_string()
}

fn default_deriv_prefix() -> String {
    "frx".to_string()
}

fn default_deriv_symbols() -> Vec<String> {
    vec!["EURUSD".to_string(), "GBPJPY".to_string()]
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_min_confirmation_score() -> u32 {
    DEFAULT_MIN_CONFIRMATION_SCORE
}

/// Smallest history any stage can use (duration estimate needs 6 bars).
const MIN_BAR_LIMIT: usize = 6;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            short_timeframe: default_short_timeframe(),
            long_timeframe: default_long_timeframe(),
            bar_limit: default_bar_limit(),
            poll_interval_secs: default_poll_interval_secs(),
            log_path: default_log_path(),
            source: SourceConfig::default(),
            strategy: StrategyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file, falling back to defaults when the file does not
    /// exist. A file that exists but does not parse is an error.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config: EngineConfig = serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(anyhow!("at least one symbol must be configured"));
        }
        if self.short_timeframe >= self.long_timeframe {
            return Err(anyhow!(
                "short timeframe {} must be shorter than long timeframe {}",
                self.short_timeframe,
                self.long_timeframe
            ));
        }
        if self.bar_limit < MIN_BAR_LIMIT {
            return Err(anyhow!(
                "bar_limit must be at least {}, got {}",
                MIN_BAR_LIMIT,
                self.bar_limit
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be positive"));
        }
        Ok(())
    }

    /// Short timeframe first.
    pub fn timeframes(&self) -> [Timeframe; 2] {
        [self.short_timeframe, self.long_timeframe]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.symbols.len(), 5);
        assert_eq!(config.short_timeframe.to_string(), "3m");
        assert_eq!(config.long_timeframe.to_string(), "5m");
        assert_eq!(config.bar_limit, 200);
        assert_eq!(config.poll_interval_secs, 20);
        assert_eq!(config.strategy.min_confirmation_score, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "symbols": ["BTCUSDT"],
                "source": { "kind": "synthetic", "seed": 7 },
                "strategy": { "use_divergences": false }
            }"#,
        )
        .unwrap();

        assert_eq!(config.symbols, vec!["BTCUSDT".to_string()]);
        assert_eq!(config.source, SourceConfig::Synthetic(SyntheticConfig { seed: Some(7) }));
        assert!(!config.strategy.use_divergences);
        assert!(config.strategy.use_volume_flow);
        assert!(config.strategy.require_mtf_confirmation);
        assert_eq!(config.long_timeframe.minutes(), 5);
    }

    #[test]
    fn test_fallback_source_parsing() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "source": { "kind": "binance_with_fallback", "binance": { "timeout_secs": 3 } } }"#,
        )
        .unwrap();
        match config.source {
            SourceConfig::BinanceWithFallback { binance, synthetic } => {
                assert_eq!(binance.timeout_secs, 3);
                assert_eq!(binance.base_url, "https://api.binance.com");
                assert_eq!(synthetic.seed, None);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_default_routes_forex_to_deriv() {
        match EngineConfig::default().source {
            SourceConfig::Routed {
                deriv,
                deriv_symbols,
                synthetic_fallback,
                ..
            } => {
                assert_eq!(deriv_symbols, vec!["EURUSD".to_string(), "GBPJPY".to_string()]);
                assert_eq!(deriv.symbol_prefix, "frx");
                assert!(deriv.url.starts_with("wss://"));
                assert_eq!(deriv.api_token, None);
                assert_eq!(synthetic_fallback, None);
            }
            other => panic!("unexpected default source {:?}", other),
        }
    }

    #[test]
    fn test_routed_source_parsing() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "source": {
                "kind": "routed",
                "deriv": { "api_token": "abc", "timeout_secs": 4 },
                "deriv_symbols": ["EURJPY"],
                "synthetic_fallback": { "seed": 3 }
            } }"#,
        )
        .unwrap();
        match config.source {
            SourceConfig::Routed {
                binance,
                deriv,
                deriv_symbols,
                synthetic_fallback,
            } => {
                assert_eq!(binance, BinanceConfig::default());
                assert_eq!(deriv.api_token.as_deref(), Some("abc"));
                assert_eq!(deriv.timeout_secs, 4);
                assert_eq!(deriv.symbol_prefix, "frx");
                assert_eq!(deriv_symbols, vec!["EURJPY".to_string()]);
                assert_eq!(synthetic_fallback, Some(SyntheticConfig { seed: Some(3) }));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_validation_errors() {
        let mut config = EngineConfig::default();
        config.short_timeframe = "5m".parse().unwrap();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.symbols.clear();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.bar_limit = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = EngineConfig::load_from_file("/nonexistent/engine.json").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "poll_interval_secs": 60, "long_timeframe": "15m" }}"#).unwrap();
        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.long_timeframe.minutes(), 15);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "not json").unwrap();
        assert!(EngineConfig::load_from_file(bad.path()).is_err());
    }
}
