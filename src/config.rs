//! Configuration types for market-ingest

use crate::error::ConfigError;
use crate::feed::{Channel, UPBIT_WS_URL};
use crate::telemetry::LogFormat;
use crate::ws::WsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Streaming venue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub url: String,

    /// Market codes subscribed on every channel
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Channels to run, one connector each
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,

    /// First retry delay after a failed session (seconds)
    #[serde(default = "default_initial_reconnect_delay")]
    pub initial_reconnect_delay_secs: u64,

    /// Upper bound for the retry delay (seconds)
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Consecutive undecodable frames that force a reconnect (0 disables)
    #[serde(default = "default_max_decode_errors")]
    pub max_consecutive_decode_errors: u32,
}

fn default_ws_url() -> String {
    UPBIT_WS_URL.to_string()
}
fn default_symbols() -> Vec<String> {
    vec!["KRW-BTC".to_string()]
}
fn default_channels() -> Vec<Channel> {
    Channel::ALL.to_vec()
}
fn default_initial_reconnect_delay() -> u64 {
    5
}
fn default_max_reconnect_delay() -> u64 {
    60
}
fn default_ping_interval() -> u64 {
    30
}
fn default_pong_timeout() -> u64 {
    10
}
fn default_max_decode_errors() -> u32 {
    crate::feed::DEFAULT_MAX_CONSECUTIVE_DECODE_ERRORS
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            symbols: default_symbols(),
            channels: default_channels(),
            initial_reconnect_delay_secs: default_initial_reconnect_delay(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            max_consecutive_decode_errors: default_max_decode_errors(),
        }
    }
}

impl FeedConfig {
    /// Transport settings shared by every connector
    pub fn ws_config(&self) -> WsConfig {
        WsConfig::new(self.url.clone())
            .initial_delay(Duration::from_secs(self.initial_reconnect_delay_secs))
            .max_delay(Duration::from_secs(self.max_reconnect_delay_secs))
            .ping_interval(Duration::from_secs(self.ping_interval_secs))
            .pong_timeout(Duration::from_secs(self.pong_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        let mut seen_symbols = HashSet::new();
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(ConfigError::Feed {
                    field: "symbols",
                    reason: "contains a blank market code".to_string(),
                });
            }
            if !seen_symbols.insert(symbol.as_str()) {
                return Err(ConfigError::Feed {
                    field: "symbols",
                    reason: format!("{} is listed more than once", symbol),
                });
            }
        }

        if self.channels.is_empty() {
            return Err(ConfigError::Missing("feed.channels"));
        }
        let mut seen_channels = HashSet::new();
        for channel in &self.channels {
            if !seen_channels.insert(*channel) {
                return Err(ConfigError::Feed {
                    field: "channels",
                    reason: format!("{} is listed more than once", channel),
                });
            }
        }

        if self.initial_reconnect_delay_secs == 0 {
            return Err(ConfigError::Feed {
                field: "initial_reconnect_delay_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_reconnect_delay_secs < self.initial_reconnect_delay_secs {
            return Err(ConfigError::Feed {
                field: "max_reconnect_delay_secs",
                reason: format!("must be at least {}", self.initial_reconnect_delay_secs),
            });
        }
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::Feed {
                field: "ping_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.pong_timeout_secs == 0 {
            return Err(ConfigError::Feed {
                field: "pong_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Ingestion buffer flush policy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Maximum records held before a flush is forced
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Occupancy that triggers a flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Maximum time between flushes (milliseconds)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Fraction of capacity above which a flush is triggered
    #[serde(default = "default_high_watermark")]
    pub high_watermark: f64,
}

fn default_capacity() -> usize {
    1500
}
fn default_flush_threshold() -> usize {
    150
}
fn default_flush_interval_ms() -> u64 {
    5000
}
fn default_high_watermark() -> f64 {
    0.8
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            flush_threshold: default_flush_threshold(),
            flush_interval_ms: default_flush_interval_ms(),
            high_watermark: default_high_watermark(),
        }
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.flush_interval_ms as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Buffer {
                field: "capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.flush_threshold == 0 || self.flush_threshold > self.capacity {
            return Err(ConfigError::Buffer {
                field: "flush_threshold",
                reason: format!("must be in [1, {}]", self.capacity),
            });
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Buffer {
                field: "flush_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(self.high_watermark > 0.0 && self.high_watermark <= 1.0) {
            return Err(ConfigError::Buffer {
                field: "high_watermark",
                reason: "must be in (0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// Time-series storage backend
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// InfluxDB v2 HTTP API
    Influx(InfluxConfig),
    /// Local Parquet files, one per measurement per batch
    Parquet(ParquetConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Influx(InfluxConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InfluxConfig {
    #[serde(default = "default_influx_url")]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_influx_org")]
    pub org: String,
    #[serde(default = "default_influx_bucket")]
    pub bucket: String,
    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}
fn default_influx_org() -> String {
    "one-bailey".to_string()
}
fn default_influx_bucket() -> String {
    "trading_data".to_string()
}
fn default_request_timeout() -> u64 {
    10
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: default_influx_url(),
            token: String::new(),
            org: default_influx_org(),
            bucket: default_influx_bucket(),
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ParquetConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for ParquetConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

/// Latest-value cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Redis endpoint; the in-process store is used when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Entry lifetime (seconds)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Bound on connecting and on every cache command (milliseconds)
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_cache_ttl() -> u64 {
    10
}
fn default_cache_timeout_ms() -> u64 {
    500
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_cache_ttl(),
            timeout_ms: default_cache_timeout_ms(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Periodic statistics reporting
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Emit a statistics snapshot every N processed records (0 disables)
    #[serde(default = "default_report_every")]
    pub report_every: u64,
}

fn default_report_every() -> u64 {
    50
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_every: default_report_every(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Prometheus scrape port (0 disables the exporter)
    #[serde(default)]
    pub metrics_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: 0,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override connection settings from `INFLUXDB_*` and `REDIS_URL`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let StorageConfig::Influx(influx) = &mut self.storage {
            if let Some(url) = lookup("INFLUXDB_URL") {
                influx.url = url;
            }
            if let Some(token) = lookup("INFLUXDB_TOKEN") {
                influx.token = token;
            }
            if let Some(org) = lookup("INFLUXDB_ORG") {
                influx.org = org;
            }
            if let Some(bucket) = lookup("INFLUXDB_BUCKET") {
                influx.bucket = bucket;
            }
        }

        if let Some(url) = lookup("REDIS_URL") {
            self.cache.redis_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.buffer.validate()?;
        self.feed.validate()?;

        if self.cache.timeout_ms == 0 {
            return Err(ConfigError::Missing("cache.timeout_ms"));
        }

        match &self.storage {
            StorageConfig::Influx(influx) => {
                if influx.url.is_empty() {
                    return Err(ConfigError::Missing("storage.url"));
                }
                if influx.org.is_empty() {
                    return Err(ConfigError::Missing("storage.org"));
                }
                if influx.bucket.is_empty() {
                    return Err(ConfigError::Missing("storage.bucket"));
                }
            }
            StorageConfig::Parquet(parquet) => {
                if parquet.output_dir.as_os_str().is_empty() {
                    return Err(ConfigError::Missing("storage.output_dir"));
                }
            }
        }

        Ok(())
    }
}
