//! Configuration management with validation and defaults
//!
//! The engine is told which ledger backend to use, its capacity or storage
//! location, and the reward flush interval. Everything here is loaded from
//! TOML with `SHOPCORE_*` environment overrides and validated before use.

use crate::errors::{ConfigurationError, ShopResult};
use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};

/// Top-level engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ShopConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Ledger backend selection
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    /// Bounded ring buffer, lost on restart
    InMemory,
    /// Unbounded append-only RocksDB store
    RocksDb,
}

impl std::str::FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(LedgerBackend::InMemory),
            "rocks_db" | "rocksdb" | "rocks" => Ok(LedgerBackend::RocksDb),
            other => Err(format!("unknown ledger backend '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

/// Ledger store settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// Maximum entries retained by the in-memory backend
    pub in_memory_capacity: usize,
    pub data_directory: String,
    /// Create the database and stamp its schema on startup
    pub auto_sync_structure: bool,
    pub write_buffer_size_mb: usize,
    pub compression_type: CompressionType,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::InMemory,
            in_memory_capacity: 1_000,
            data_directory: "./DB/shop_ledger".to_string(),
            auto_sync_structure: true,
            write_buffer_size_mb: 16,
            compression_type: CompressionType::Lz4,
        }
    }
}

/// Reward settlement settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RewardsConfig {
    /// Interval between flush cycles
    pub flush_interval_ms: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 250,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub log_level: LogLevel,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_level: LogLevel::Info,
        }
    }
}

const MIN_FLUSH_INTERVAL_MS: u64 = 10;
const MAX_FLUSH_INTERVAL_MS: u64 = 60_000;

impl ShopConfig {
    /// Small in-memory ledger with a fast flush, for tests and simulations
    pub fn testing() -> Self {
        Self {
            ledger: LedgerConfig {
                backend: LedgerBackend::InMemory,
                in_memory_capacity: 256,
                ..Default::default()
            },
            rewards: RewardsConfig {
                flush_interval_ms: 20,
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
        }
    }

    /// Persistent ledger for a live server
    pub fn production() -> Self {
        Self {
            ledger: LedgerConfig {
                backend: LedgerBackend::RocksDb,
                data_directory: "./DB/shop_ledger".to_string(),
                auto_sync_structure: true,
                write_buffer_size_mb: 64,
                compression_type: CompressionType::Lz4,
                ..Default::default()
            },
            rewards: RewardsConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> ShopResult<()> {
        if self.ledger.backend == LedgerBackend::InMemory && self.ledger.in_memory_capacity == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "ledger.in_memory_capacity".to_string(),
                value: "0".to_string(),
                reason: "Capacity must be at least 1".to_string(),
            }
            .into());
        }

        if self.ledger.backend == LedgerBackend::RocksDb {
            if self.ledger.data_directory.trim().is_empty() {
                return Err(ConfigurationError::MissingRequired("ledger.data_directory".to_string()).into());
            }
            if self.ledger.write_buffer_size_mb == 0 {
                return Err(ConfigurationError::InvalidValue {
                    field: "ledger.write_buffer_size_mb".to_string(),
                    value: "0".to_string(),
                    reason: "Write buffer cannot be zero".to_string(),
                }
                .into());
            }
        }

        let interval = self.rewards.flush_interval_ms;
        if !(MIN_FLUSH_INTERVAL_MS..=MAX_FLUSH_INTERVAL_MS).contains(&interval) {
            return Err(ConfigurationError::InvalidValue {
                field: "rewards.flush_interval_ms".to_string(),
                value: interval.to_string(),
                reason: format!(
                    "Flush interval must be between {}ms and {}ms",
                    MIN_FLUSH_INTERVAL_MS, MAX_FLUSH_INTERVAL_MS
                ),
            }
            .into());
        }

        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.rewards.flush_interval_ms)
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> ShopResult<ShopConfig> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => ShopConfig::default(),
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &str) -> ShopResult<ShopConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(config: &mut ShopConfig) -> ShopResult<()> {
        if let Ok(backend) = env::var("SHOPCORE_LEDGER_BACKEND") {
            config.ledger.backend = backend.parse().map_err(|reason| ConfigurationError::InvalidValue {
                field: "SHOPCORE_LEDGER_BACKEND".to_string(),
                value: backend.clone(),
                reason,
            })?;
        }

        if let Ok(capacity) = env::var("SHOPCORE_LEDGER_CAPACITY") {
            config.ledger.in_memory_capacity = capacity.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "SHOPCORE_LEDGER_CAPACITY".to_string(),
                value: capacity.clone(),
                reason: "Invalid capacity".to_string(),
            })?;
        }

        if let Ok(data_dir) = env::var("SHOPCORE_DATA_DIR") {
            config.ledger.data_directory = data_dir;
        }

        if let Ok(interval) = env::var("SHOPCORE_FLUSH_INTERVAL_MS") {
            config.rewards.flush_interval_ms = interval.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "SHOPCORE_FLUSH_INTERVAL_MS".to_string(),
                value: interval.clone(),
                reason: "Invalid interval".to_string(),
            })?;
        }

        Ok(())
    }

    pub fn save(&self, config: &ShopConfig, path: &str) -> ShopResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

/// Write the default configuration to `path`
pub fn generate_sample_config(path: &str) -> ShopResult<()> {
    ConfigLoader::new().save(&ShopConfig::default(), path)
}
