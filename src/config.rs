//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::bootstrap::IndexOptions;
use crate::commitlog::{CommitLogOptions, FilesystemOptions, Strategy, SyncMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub commitlog: CommitLogConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Commit log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CommitLogConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default = "default_block_size_secs")]
    pub block_size_secs: u64,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_flush_size_bytes")]
    pub flush_size_bytes: usize,

    #[serde(default = "default_sync")]
    pub sync: String,

    #[serde(default)]
    pub preallocate_bytes: u64,

    #[serde(default = "default_max_annotation_len")]
    pub max_annotation_len: usize,

    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("meridian").to_string_lossy().to_string())
        .unwrap_or_else(|| "./meridian_data".to_string())
}

fn default_strategy() -> String {
    "write_behind".to_string()
}

fn default_block_size_secs() -> u64 {
    15 * 60
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_flush_size_bytes() -> usize {
    64 * 1024
}

fn default_sync() -> String {
    "fsync".to_string()
}

fn default_max_annotation_len() -> usize {
    16 * 1024
}

fn default_open_timeout_secs() -> u64 {
    10
}

fn default_close_timeout_secs() -> u64 {
    30
}

impl Default for CommitLogConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            strategy: default_strategy(),
            block_size_secs: default_block_size_secs(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_size_bytes: default_flush_size_bytes(),
            sync: default_sync(),
            preallocate_bytes: 0,
            max_annotation_len: default_max_annotation_len(),
            open_timeout_secs: default_open_timeout_secs(),
            close_timeout_secs: default_close_timeout_secs(),
        }
    }
}

impl CommitLogConfig {
    /// Convert into the options value the commit log consumes.
    pub fn to_options(&self) -> Result<CommitLogOptions, ConfigError> {
        let strategy = match self.strategy.as_str() {
            "write_behind" => Strategy::WriteBehind,
            "write_wait" => Strategy::WriteWait,
            other => {
                return Err(ConfigError::Invalid {
                    field: "commitlog.strategy".to_string(),
                    value: other.to_string(),
                })
            }
        };
        let sync = match self.sync.as_str() {
            "fsync" => SyncMode::Fsync,
            "fdatasync" => SyncMode::Fdatasync,
            "none" => SyncMode::None,
            other => {
                return Err(ConfigError::Invalid {
                    field: "commitlog.sync".to_string(),
                    value: other.to_string(),
                })
            }
        };

        Ok(CommitLogOptions {
            filesystem: FilesystemOptions {
                file_path_prefix: PathBuf::from(&self.data_dir),
                sync,
                preallocate_bytes: self.preallocate_bytes,
            },
            strategy,
            block_size: Duration::from_secs(self.block_size_secs),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            flush_size_bytes: self.flush_size_bytes,
            max_annotation_len: self.max_annotation_len,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
            close_timeout: Duration::from_secs(self.close_timeout_secs),
            ..Default::default()
        })
    }
}

/// Bootstrap configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_index_block_size_secs")]
    pub index_block_size_secs: u64,
}

fn default_index_block_size_secs() -> u64 {
    3600
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            index_block_size_secs: default_index_block_size_secs(),
        }
    }
}

impl BootstrapConfig {
    pub fn to_index_options(&self) -> IndexOptions {
        IndexOptions::new(Duration::from_secs(self.index_block_size_secs))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("meridian").join("config.toml")),
            Some(PathBuf::from("/etc/meridian/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Commit log overrides
        if let Ok(data_dir) = std::env::var("MERIDIAN_DATA_DIR") {
            self.commitlog.data_dir = data_dir;
        }
        if let Ok(strategy) = std::env::var("MERIDIAN_STRATEGY") {
            self.commitlog.strategy = strategy;
        }
        if let Ok(interval) = std::env::var("MERIDIAN_FLUSH_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.commitlog.flush_interval_ms = ms;
            }
        }
        if let Ok(sync) = std::env::var("MERIDIAN_SYNC") {
            self.commitlog.sync = sync;
        }

        // Bootstrap overrides
        if let Ok(block_size) = std::env::var("MERIDIAN_INDEX_BLOCK_SIZE_SECS") {
            if let Ok(secs) = block_size.parse() {
                self.bootstrap.index_block_size_secs = secs;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("MERIDIAN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("MERIDIAN_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commitlog: CommitLogConfig::default(),
            bootstrap: BootstrapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {field}: {value}")]
    Invalid { field: String, value: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Meridian Configuration
#
# Environment variables override these settings:
# - MERIDIAN_DATA_DIR
# - MERIDIAN_STRATEGY
# - MERIDIAN_FLUSH_INTERVAL_MS
# - MERIDIAN_SYNC
# - MERIDIAN_INDEX_BLOCK_SIZE_SECS
# - MERIDIAN_LOG_LEVEL
# - MERIDIAN_LOG_FORMAT

[commitlog]
# Directory for commit log files
data_dir = "~/.local/share/meridian"

# Durability strategy: write_behind or write_wait
strategy = "write_behind"

# Logical time window per log file (seconds)
block_size_secs = 900

# Maximum time a non-empty batch waits before flush (ms)
flush_interval_ms = 1000

# Flush once the pending batch exceeds this many bytes
flush_size_bytes = 65536

# Sync policy: fsync, fdatasync, or none
sync = "fsync"

# Preallocate new log files to this size (0 disables)
preallocate_bytes = 0

# Writes with annotations longer than this are rejected
max_annotation_len = 16384

# Total-duration bounds on open and close (seconds)
open_timeout_secs = 10
close_timeout_secs = 30

[bootstrap]
# Index block size (seconds); must be a positive multiple of the data
# block size
index_block_size_secs = 3600

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/meridian/meridian.log"
"#
    .to_string()
}
