//! Configuration module for the market data handler
//!
//! Layers built-in defaults, an optional `market-data.toml` and `CBPRO_`
//! prefixed environment variables.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

pub const DEFAULT_REST_ENDPOINT: &str = "https://api.pro.coinbase.com";
pub const DEFAULT_WS_ENDPOINT: &str = "wss://ws-feed.pro.coinbase.com";

const CONFIG_FILE: &str = "market-data";
const ENV_PREFIX: &str = "CBPRO";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Fixed trading pairs (e.g., "BTC-USD,ETH-USD"). Empty means discover by volume.
    #[serde(default, deserialize_with = "deserialize_pairs")]
    pub trading_pairs: Option<Vec<String>>,

    /// REST API endpoint for products, tickers and snapshots
    pub rest_endpoint: String,

    /// WebSocket feed endpoint
    pub ws_endpoint: String,

    /// How long a market ranking stays valid
    pub market_cache_ttl_secs: u64,

    /// Ticker fetch attempts while rate limited
    pub ticker_max_attempts: u32,
    pub ticker_retry_delay_ms: u64,

    /// Pause between instruments while building tracking entries
    pub snapshot_pacing_ms: u64,

    /// Stream keepalive settings
    pub message_timeout_secs: u64,
    pub ping_timeout_secs: u64,
    pub reconnect_cooldown_secs: u64,

    /// Periodic snapshot refresher pacing
    pub refresh_pacing_ms: u64,
    pub refresh_failure_delay_ms: u64,
    pub refresh_retry_delay_ms: u64,

    /// Order book depth levels reported in status logs
    pub depth_levels: usize,

    /// Port of the health check server
    pub health_port: u16,
}

/// REST client settings
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub endpoint: String,
    pub ticker_max_attempts: u32,
    pub ticker_retry_delay: Duration,
}

/// Diff listener keepalive settings
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub message_timeout: Duration,
    pub ping_timeout: Duration,
    pub reconnect_cooldown: Duration,
}

/// Snapshot refresher pacing
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    pub pacing: Duration,
    pub failure_delay: Duration,
    pub retry_delay: Duration,
}

impl Config {
    /// Load configuration from `.env`, `market-data.toml` and the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Self::defaults()?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from an explicit file, on top of the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(config::File::from(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("rest_endpoint", DEFAULT_REST_ENDPOINT)?
            .set_default("ws_endpoint", DEFAULT_WS_ENDPOINT)?
            .set_default("market_cache_ttl_secs", 1800_i64)?
            .set_default("ticker_max_attempts", 20_i64)?
            .set_default("ticker_retry_delay_ms", 500_i64)?
            .set_default("snapshot_pacing_ms", 600_i64)?
            .set_default("message_timeout_secs", 30_i64)?
            .set_default("ping_timeout_secs", 10_i64)?
            .set_default("reconnect_cooldown_secs", 30_i64)?
            .set_default("refresh_pacing_ms", 5000_i64)?
            .set_default("refresh_failure_delay_ms", 5000_i64)?
            .set_default("refresh_retry_delay_ms", 5000_i64)?
            .set_default("depth_levels", 20_i64)?
            .set_default("health_port", 9090_i64)?)
    }

    pub fn rest(&self) -> RestConfig {
        RestConfig {
            endpoint: self.rest_endpoint.clone(),
            ticker_max_attempts: self.ticker_max_attempts,
            ticker_retry_delay: Duration::from_millis(self.ticker_retry_delay_ms),
        }
    }

    pub fn listener(&self) -> ListenerConfig {
        ListenerConfig {
            message_timeout: Duration::from_secs(self.message_timeout_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            reconnect_cooldown: Duration::from_secs(self.reconnect_cooldown_secs),
        }
    }

    pub fn refresher(&self) -> RefresherConfig {
        RefresherConfig {
            pacing: Duration::from_millis(self.refresh_pacing_ms),
            failure_delay: Duration::from_millis(self.refresh_failure_delay_ms),
            retry_delay: Duration::from_millis(self.refresh_retry_delay_ms),
        }
    }

    pub fn market_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.market_cache_ttl_secs)
    }

    pub fn snapshot_pacing(&self) -> Duration {
        Duration::from_millis(self.snapshot_pacing_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trading_pairs: None,
            rest_endpoint: DEFAULT_REST_ENDPOINT.to_string(),
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            market_cache_ttl_secs: 1800,
            ticker_max_attempts: 20,
            ticker_retry_delay_ms: 500,
            snapshot_pacing_ms: 600,
            message_timeout_secs: 30,
            ping_timeout_secs: 10,
            reconnect_cooldown_secs: 30,
            refresh_pacing_ms: 5000,
            refresh_failure_delay_ms: 5000,
            refresh_retry_delay_ms: 5000,
            depth_levels: 20,
            health_port: 9090,
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Config::default().rest()
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Config::default().listener()
    }
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Config::default().refresher()
    }
}

/// Comma-separated pair list; blank entries are dropped and ids upper-cased.
fn deserialize_pairs<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Deserialize::deserialize(deserializer)?;
    let pairs: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(if pairs.is_empty() { None } else { Some(pairs) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
trading_pairs = "btc-usd, ETH-USD,"
ws_endpoint = "ws://127.0.0.1:9000"
message_timeout_secs = 5
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(
            config.trading_pairs,
            Some(vec!["BTC-USD".to_string(), "ETH-USD".to_string()])
        );
        assert_eq!(config.ws_endpoint, "ws://127.0.0.1:9000");
        assert_eq!(config.rest_endpoint, DEFAULT_REST_ENDPOINT);
        assert_eq!(config.listener().message_timeout, Duration::from_secs(5));
        assert_eq!(config.listener().ping_timeout, Duration::from_secs(10));
        assert_eq!(config.ticker_max_attempts, 20);
    }

    #[test]
    fn test_blank_pairs_mean_discovery() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, r#"trading_pairs = " , ""#).unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(config.trading_pairs.is_none());
    }

    #[test]
    fn test_default_component_configs() {
        let config = Config::default();
        assert_eq!(config.listener().reconnect_cooldown, Duration::from_secs(30));
        assert_eq!(config.rest().ticker_retry_delay, Duration::from_millis(500));
        assert_eq!(config.refresher().pacing, Duration::from_secs(5));
        assert_eq!(config.market_cache_ttl(), Duration::from_secs(1800));
    }
}
