//! Server settings from `ARENA_MOCK_*` variables, subscriber setup, and the
//! lifecycle events `mock_server` emits while starting.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::http::{HttpUpstream, ProxyError};
use crate::router::API_PREFIX;

pub const ENV_ADDR: &str = "ARENA_MOCK_ADDR";
pub const ENV_STORE: &str = "ARENA_MOCK_STORE";
pub const ENV_ENABLED: &str = "ARENA_MOCK_ENABLED";
pub const ENV_UPSTREAM_URL: &str = "ARENA_MOCK_UPSTREAM_URL";
pub const ENV_UPSTREAM_TIMEOUT_MS: &str = "ARENA_MOCK_UPSTREAM_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "ARENA_MOCK_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "ARENA_MOCK_LOG_FORMAT";
pub const ENV_LOG_TARGET: &str = "ARENA_MOCK_LOG_TARGET";

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_STORE_PATH: &str = "data/arena_mock.sqlite";
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 15_000;

const CONTROL_PREFIX: &str = "/__mock/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub store_path: PathBuf,
    pub upstream_url: Option<String>,
    pub upstream_timeout_ms: u64,
    pub forced_enabled: Option<bool>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("ARENA_MOCK_ADDR=`{0}` is not a socket address")]
    InvalidAddr(String),
    #[error("ARENA_MOCK_UPSTREAM_TIMEOUT_MS=`{0}` is not a whole number of milliseconds")]
    InvalidTimeout(String),
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Blank values count as unset; unknown words for booleans and formats
    // fall back to the default instead of failing startup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let var = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let addr_raw = var(ENV_ADDR).unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_raw
            .parse()
            .map_err(|_| SettingsError::InvalidAddr(addr_raw.clone()))?;

        let upstream_timeout_ms = match var(ENV_UPSTREAM_TIMEOUT_MS) {
            Some(raw) => raw.parse().map_err(|_| SettingsError::InvalidTimeout(raw))?,
            None => DEFAULT_UPSTREAM_TIMEOUT_MS,
        };

        let defaults = LoggingConfig::default();
        let logging = LoggingConfig {
            level: var(ENV_LOG_LEVEL).unwrap_or(defaults.level),
            format: var(ENV_LOG_FORMAT)
                .and_then(|raw| LogFormat::parse(&raw))
                .unwrap_or(defaults.format),
            include_target: var(ENV_LOG_TARGET)
                .and_then(|raw| parse_switch(&raw))
                .unwrap_or(defaults.include_target),
        };

        Ok(Self {
            addr,
            store_path: var(ENV_STORE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            upstream_url: var(ENV_UPSTREAM_URL),
            upstream_timeout_ms,
            forced_enabled: var(ENV_ENABLED).and_then(|raw| parse_switch(&raw)),
            logging,
        })
    }

    pub fn upstream(&self) -> Result<Option<HttpUpstream>, ProxyError> {
        self.upstream_url
            .as_deref()
            .map(|url| HttpUpstream::new(url, self.upstream_timeout_ms))
            .transpose()
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(settings: &ServerSettings) {
    info!(
        component = "mock_server",
        event = "app.start",
        log_level = %settings.logging.level,
        log_format = ?settings.logging.format,
        store = %settings.store_path.display(),
        upstream = settings.upstream_url.as_deref().unwrap_or("none"),
        upstream_timeout_ms = settings.upstream_timeout_ms
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "mock_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        route = API_PREFIX,
        control_route = CONTROL_PREFIX
    );
}

pub fn log_mode_selected(enabled: bool, settings: &ServerSettings) {
    let reason = match settings.forced_enabled {
        Some(_) => ENV_ENABLED,
        None => "persisted",
    };
    info!(
        component = "mock_server",
        event = "mode.selected",
        enabled,
        reason,
        upstream = settings.upstream_url.as_deref().unwrap_or("none")
    );
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
