//! Generation and network-simulation parameters, with key-value persistence.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_SEED: u32 = 1337;
pub const MIN_SIZE: usize = 10;
pub const MAX_SIZE: usize = 5_000;
pub const DEFAULT_SIZE: usize = 200;
pub const MIN_SERIES_DAYS: u32 = 7;
pub const MAX_SERIES_DAYS: u32 = 365;
pub const DEFAULT_SERIES_DAYS: u32 = 90;
pub const MAX_NETWORK_DELAY_MS: u64 = 10_000;

pub const CONFIG_KEY: &str = "mock.config";
pub const ENABLED_KEY: &str = "mock.enabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Calm,
    Normal,
    Degen,
}

impl Volatility {
    pub fn amplitude(self) -> f64 {
        match self {
            Self::Calm => 0.5,
            Self::Normal => 1.0,
            Self::Degen => 2.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calm => "calm",
            Self::Normal => "normal",
            Self::Degen => "degen",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "calm" => Some(Self::Calm),
            "normal" => Some(Self::Normal),
            "degen" => Some(Self::Degen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    pub seed: u32,
    pub size: usize,
    pub volatility: Volatility,
    pub series_days: u32,
    pub network_delay_ms: u64,
    pub failure_rate_percent: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            size: DEFAULT_SIZE,
            volatility: Volatility::Normal,
            series_days: DEFAULT_SERIES_DAYS,
            network_delay_ms: 0,
            failure_rate_percent: 0.0,
        }
    }
}

impl MockConfig {
    pub fn clamped(mut self) -> Self {
        self.size = self.size.clamp(MIN_SIZE, MAX_SIZE);
        self.series_days = self.series_days.clamp(MIN_SERIES_DAYS, MAX_SERIES_DAYS);
        self.network_delay_ms = self.network_delay_ms.min(MAX_NETWORK_DELAY_MS);
        self.failure_rate_percent = if self.failure_rate_percent.is_finite() {
            self.failure_rate_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self
    }

    pub fn merged(&self, patch: &ConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(seed) = patch.seed {
            next.seed = seed;
        }
        if let Some(size) = patch.size {
            next.size = size;
        }
        if let Some(volatility) = patch.volatility {
            next.volatility = volatility;
        }
        if let Some(series_days) = patch.series_days {
            next.series_days = series_days;
        }
        if let Some(delay) = patch.network_delay_ms {
            next.network_delay_ms = delay;
        }
        if let Some(rate) = patch.failure_rate_percent {
            next.failure_rate_percent = rate;
        }
        next.clamped()
    }

    pub fn from_json_lenient(value: &Value) -> Self {
        Self::default().merged(&ConfigPatch::from_json(value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub seed: Option<u32>,
    pub size: Option<usize>,
    pub volatility: Option<Volatility>,
    pub series_days: Option<u32>,
    pub network_delay_ms: Option<u64>,
    pub failure_rate_percent: Option<f64>,
}

impl ConfigPatch {
    pub fn from_json(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        let field = |snake: &str, camel: &str| map.get(snake).or_else(|| map.get(camel));

        Self {
            seed: field("seed", "seed")
                .and_then(json_number)
                .map(|raw| raw.trunc().clamp(0.0, f64::from(u32::MAX)) as u32),
            size: field("size", "size")
                .and_then(json_number)
                .map(|raw| raw.trunc().clamp(0.0, MAX_SIZE as f64) as usize),
            volatility: field("volatility", "volatility")
                .and_then(Value::as_str)
                .and_then(Volatility::parse),
            series_days: field("series_days", "seriesDays")
                .and_then(json_number)
                .map(|raw| raw.trunc().clamp(0.0, f64::from(MAX_SERIES_DAYS)) as u32),
            network_delay_ms: field("network_delay_ms", "networkDelayMs")
                .and_then(json_number)
                .map(|raw| raw.trunc().clamp(0.0, MAX_NETWORK_DELAY_MS as f64) as u64),
            failure_rate_percent: field("failure_rate_percent", "failureRatePercent")
                .and_then(json_number),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn json_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config store lock poisoned")]
    Poisoned,
}

pub trait ConfigStore: Send + Sync + 'static {
    fn read(&self, key: &str) -> Result<Option<String>, ConfigStoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), ConfigStoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn read(&self, key: &str) -> Result<Option<String>, ConfigStoreError> {
        let entries = self.entries.lock().map_err(|_| ConfigStoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ConfigStoreError> {
        let mut entries = self.entries.lock().map_err(|_| ConfigStoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct SqliteConfigStore {
    conn: Mutex<Connection>,
}

impl SqliteConfigStore {
    pub fn open(path: &Path) -> Result<Self, ConfigStoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ConfigStore for SqliteConfigStore {
    fn read(&self, key: &str) -> Result<Option<String>, ConfigStoreError> {
        let conn = self.conn.lock().map_err(|_| ConfigStoreError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ConfigStoreError> {
        let conn = self.conn.lock().map_err(|_| ConfigStoreError::Poisoned)?;
        conn.execute(
            "
            INSERT INTO kv (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            ",
            params![key, value],
        )?;
        Ok(())
    }
}

// `revision` bumps on every apply/reset; anything cached from an older revision is stale.
pub struct ConfigModel {
    store: Arc<dyn ConfigStore>,
    current: MockConfig,
    revision: u64,
}

impl ConfigModel {
    pub fn load(store: Arc<dyn ConfigStore>) -> Self {
        let current = match store.read(CONFIG_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => MockConfig::from_json_lenient(&value),
                Err(err) => {
                    warn!(
                        component = "config",
                        event = "config.load",
                        outcome = "malformed",
                        error = %err
                    );
                    MockConfig::default()
                }
            },
            Ok(None) => MockConfig::default(),
            Err(err) => {
                warn!(
                    component = "config",
                    event = "config.load",
                    outcome = "store_error",
                    error = %err
                );
                MockConfig::default()
            }
        };

        info!(
            component = "config",
            event = "config.load",
            seed = current.seed,
            size = current.size,
            volatility = current.volatility.as_str()
        );

        Self {
            store,
            current,
            revision: 0,
        }
    }

    pub fn current(&self) -> &MockConfig {
        &self.current
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn apply(&mut self, patch: &ConfigPatch) -> &MockConfig {
        self.current = self.current.merged(patch);
        self.revision += 1;
        self.persist();
        info!(
            component = "config",
            event = "config.apply",
            revision = self.revision,
            seed = self.current.seed,
            size = self.current.size,
            volatility = self.current.volatility.as_str(),
            series_days = self.current.series_days,
            network_delay_ms = self.current.network_delay_ms,
            failure_rate_percent = self.current.failure_rate_percent
        );
        &self.current
    }

    pub fn reset(&mut self) -> &MockConfig {
        self.current = MockConfig::default();
        self.revision += 1;
        self.persist();
        info!(
            component = "config",
            event = "config.reset",
            revision = self.revision
        );
        &self.current
    }

    pub fn load_enabled(&self) -> bool {
        match self.store.read(ENABLED_KEY) {
            Ok(Some(raw)) => raw.trim() == "true",
            Ok(None) => false,
            Err(err) => {
                warn!(
                    component = "config",
                    event = "config.load",
                    key = ENABLED_KEY,
                    error = %err
                );
                false
            }
        }
    }

    pub fn persist_enabled(&self, enabled: bool) {
        let raw = if enabled { "true" } else { "false" };
        if let Err(err) = self.store.write(ENABLED_KEY, raw) {
            warn!(
                component = "config",
                event = "config.persist.error",
                key = ENABLED_KEY,
                error = %err
            );
        }
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.current)
            .map_err(ConfigStoreError::from)
            .and_then(|raw| self.store.write(CONFIG_KEY, &raw));
        if let Err(err) = result {
            warn!(
                component = "config",
                event = "config.persist.error",
                key = CONFIG_KEY,
                error = %err
            );
        }
    }
}
