//! YAML configuration loading for the `monitor` and `server` binaries.
//!
//! Two-struct pattern, matching the teacher's forwarder config loader
//! (`services/forwarder/src/config.rs`): a `Raw*` struct deserializes with
//! every field optional, then `load_*` validates required fields and fills
//! in defaults for the rest.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Fully validated configuration for the `monitor` binary.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub indexer_host: String,
    pub indexer_api_token: String,
    pub fetcher_rps: u32,
    /// `None` means "start from the indexer's current tip round".
    pub start_round: Option<u64>,
    pub publisher_timeout_ms: u64,
    pub metrics_port: u16,
    pub redis_host: String,
    pub redis_password: String,
    pub new_block_channel: String,
    pub log_level: String,
}

/// Fully validated configuration for the `server` binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub redis_host: String,
    pub redis_password: String,
    pub new_block_channel: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawMonitorConfig {
    #[serde(rename = "INDEXER_HOST")]
    indexer_host: Option<String>,
    #[serde(rename = "INDEXER_API_TOKEN")]
    indexer_api_token: Option<String>,
    #[serde(rename = "FETCHER_RPS")]
    fetcher_rps: Option<u32>,
    #[serde(rename = "START_ROUND")]
    start_round: Option<String>,
    #[serde(rename = "PUBLISHER_TIMEOUT")]
    publisher_timeout: Option<u64>,
    #[serde(rename = "METRICS_PORT")]
    metrics_port: Option<u16>,
    #[serde(rename = "REDIS_HOST")]
    redis_host: Option<String>,
    #[serde(rename = "REDIS_PASSWORD")]
    redis_password: Option<String>,
    #[serde(rename = "NEW_BLOCK_CHANNEL")]
    new_block_channel: Option<String>,
    #[serde(rename = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawServerConfig {
    #[serde(rename = "PORT")]
    port: Option<u16>,
    #[serde(rename = "METRICS_PORT")]
    metrics_port: Option<u16>,
    #[serde(rename = "REDIS_HOST")]
    redis_host: Option<String>,
    #[serde(rename = "REDIS_PASSWORD")]
    redis_password: Option<String>,
    #[serde(rename = "NEW_BLOCK_CHANNEL")]
    new_block_channel: Option<String>,
    #[serde(rename = "LOG_LEVEL")]
    log_level: Option<String>,
}

const DEFAULT_NEW_BLOCK_CHANNEL: &str = "new_block";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_METRICS_PORT: u16 = 9090;
const DEFAULT_PUBLISHER_TIMEOUT_MS: u64 = 5_000;
const START_ROUND_LATEST: &str = "latest";

pub fn load_monitor_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    monitor_config_from_str(&yaml)
}

pub fn monitor_config_from_str(yaml: &str) -> Result<MonitorConfig, ConfigError> {
    let raw: RawMonitorConfig = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let indexer_host = raw
        .indexer_host
        .ok_or_else(|| ConfigError::MissingField("INDEXER_HOST".to_owned()))?;
    let fetcher_rps = raw
        .fetcher_rps
        .ok_or_else(|| ConfigError::MissingField("FETCHER_RPS".to_owned()))?;
    if fetcher_rps == 0 {
        return Err(ConfigError::InvalidValue(
            "FETCHER_RPS must be greater than 0".to_owned(),
        ));
    }

    let start_round = match raw.start_round.as_deref() {
        None | Some(START_ROUND_LATEST) => None,
        Some(s) => Some(
            s.parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue(format!("START_ROUND: '{s}' is neither 'latest' nor a number")))?,
        ),
    };

    Ok(MonitorConfig {
        indexer_host,
        indexer_api_token: raw.indexer_api_token.unwrap_or_default(),
        fetcher_rps,
        start_round,
        publisher_timeout_ms: raw.publisher_timeout.unwrap_or(DEFAULT_PUBLISHER_TIMEOUT_MS),
        metrics_port: raw.metrics_port.unwrap_or(DEFAULT_METRICS_PORT),
        redis_host: require_redis_host(raw.redis_host)?,
        redis_password: raw.redis_password.unwrap_or_default(),
        new_block_channel: raw
            .new_block_channel
            .unwrap_or_else(|| DEFAULT_NEW_BLOCK_CHANNEL.to_owned()),
        log_level: raw.log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
    })
}

pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    server_config_from_str(&yaml)
}

pub fn server_config_from_str(yaml: &str) -> Result<ServerConfig, ConfigError> {
    let raw: RawServerConfig = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let port = raw.port.ok_or_else(|| ConfigError::MissingField("PORT".to_owned()))?;

    Ok(ServerConfig {
        port,
        metrics_port: raw.metrics_port.unwrap_or(DEFAULT_METRICS_PORT),
        redis_host: require_redis_host(raw.redis_host)?,
        redis_password: raw.redis_password.unwrap_or_default(),
        new_block_channel: raw
            .new_block_channel
            .unwrap_or_else(|| DEFAULT_NEW_BLOCK_CHANNEL.to_owned()),
        log_level: raw.log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
    })
}

fn require_redis_host(host: Option<String>) -> Result<String, ConfigError> {
    host.ok_or_else(|| ConfigError::MissingField("REDIS_HOST".to_owned()))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "I/O error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
