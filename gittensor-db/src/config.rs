//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/gittensor-db/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/gittensor-db/` (~/.config/gittensor-db/)
//! - Data: `$XDG_DATA_HOME/gittensor-db/` (~/.local/share/gittensor-db/)
//! - State/Logs: `$XDG_STATE_HOME/gittensor-db/` (~/.local/state/gittensor-db/)
//!
//! `GITTENSOR_DB_PATH` and `GITTENSOR_DB_BUSY_TIMEOUT_MS` override the
//! `[database]` section.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "gittensor-db";

/// Environment variable overriding `database.path`
pub const DB_PATH_ENV: &str = "GITTENSOR_DB_PATH";

/// Environment variable overriding `database.busy_timeout_ms`
pub const DB_BUSY_TIMEOUT_ENV: &str = "GITTENSOR_DB_BUSY_TIMEOUT_MS";

/// Log files are `<prefix>.<date>.<suffix>` in the state directory
pub const LOG_FILE_PREFIX: &str = "gittensor-db";
pub const LOG_FILE_SUFFIX: &str = "log";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Storage settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage settings
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Database file; defaults to [`Config::database_path`]
    pub path: Option<PathBuf>,

    /// How long a statement waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Directory of schema scripts; a `<name>.sql` found here replaces the
    /// embedded copy of that script
    pub migrations_dir: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            migrations_dir: None,
        }
    }
}

impl DatabaseConfig {
    /// Configured path, or the XDG default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Config::database_path)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.is_empty() {
                self.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(timeout) = std::env::var(DB_BUSY_TIMEOUT_ENV) {
            self.busy_timeout_ms = timeout.parse().map_err(|e| {
                Error::Config(format!("{} must be an integer: {}", DB_BUSY_TIMEOUT_ENV, e))
            })?;
        }
        Ok(())
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.database.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        if config.logging.max_files == 0 {
            return Err(Error::Config(
                "logging.max_files must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/gittensor-db/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/gittensor-db/gittensor.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("gittensor.db")
    }

    /// Returns the glob matching the daily log files
    ///
    /// `$XDG_STATE_HOME/gittensor-db/gittensor-db.*.log`, where `*` is the
    /// rotation date
    pub fn log_pattern() -> PathBuf {
        Self::state_dir().join(format!("{}.*.{}", LOG_FILE_PREFIX, LOG_FILE_SUFFIX))
    }
}
