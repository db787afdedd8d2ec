//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/chatsalvage/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/chatsalvage/` (~/.config/chatsalvage/)
//! - Data: `$XDG_DATA_HOME/chatsalvage/` (~/.local/share/chatsalvage/)
//! - State/Logs: `$XDG_STATE_HOME/chatsalvage/` (~/.local/state/chatsalvage/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Extension storage directory, relative to the platform config dir.
const EXTENSION_STORAGE: &str = "Code/User/globalStorage/saoudrizwan.claude-dev";

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
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where conversations are read from and crash reports written to
    #[serde(default)]
    pub storage: StorageConfig,

    /// Recovery pipeline tuning
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Analyzer limits
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Active task cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Path overrides; unset paths resolve to platform defaults
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Extension storage directory holding `tasks/<id>/api_conversation_history.json`
    pub tasks_root: Option<PathBuf>,
    /// Active crash report directory; dismissed reports go to its `Dismissed` subdirectory
    pub crash_reports_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured tasks root, or the extension's default storage directory
    pub fn tasks_root(&self) -> PathBuf {
        self.tasks_root.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(xdg_config_home)
                .join(EXTENSION_STORAGE)
        })
    }

    /// Configured crash report directory, or `$XDG_DATA_HOME/chatsalvage/crash-reports`
    pub fn crash_reports_dir(&self) -> PathBuf {
        self.crash_reports_dir
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("crash-reports"))
    }
}

/// Recovery pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecoveryConfig {
    /// Keep only the most recent N recovered messages
    #[serde(default)]
    pub max_messages: Option<usize>,

    /// Line-scan buffer size at which an unbalanced block is abandoned
    #[serde(default = "default_line_buffer_limit")]
    pub line_buffer_limit_bytes: usize,

    /// Preceding `{` positions tried per `"role"` anchor
    #[serde(default = "default_regex_backtrack_limit")]
    pub regex_backtrack_limit: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_messages: None,
            line_buffer_limit_bytes: default_line_buffer_limit(),
            regex_backtrack_limit: default_regex_backtrack_limit(),
        }
    }
}

fn default_line_buffer_limit() -> usize {
    8 * 1024 * 1024
}

fn default_regex_backtrack_limit() -> usize {
    32
}

/// Analyzer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Topics kept in a summary
    #[serde(default = "default_top_topics")]
    pub top_topics: usize,

    /// Key actions kept in a summary
    #[serde(default = "default_max_key_actions")]
    pub max_key_actions: usize,

    /// Shortest token counted as a topic
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_topics: default_top_topics(),
            max_key_actions: default_max_key_actions(),
            min_token_len: default_min_token_len(),
        }
    }
}

fn default_top_topics() -> usize {
    10
}

fn default_max_key_actions() -> usize {
    10
}

fn default_min_token_len() -> usize {
    3
}

/// Active task cache configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Seconds an active task pointer stays valid
    #[serde(default = "default_active_task_ttl")]
    pub active_task_ttl_secs: u64,
}

/// Longest accepted active task TTL (one week).
const MAX_ACTIVE_TASK_TTL_SECS: u64 = 7 * 24 * 60 * 60;

impl CacheConfig {
    /// TTL as a duration, clamped to one week.
    pub fn active_task_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.active_task_ttl_secs.min(MAX_ACTIVE_TASK_TTL_SECS) as i64)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            active_task_ttl_secs: default_active_task_ttl(),
        }
    }
}

fn default_active_task_ttl() -> u64 {
    300
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
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.recovery.line_buffer_limit_bytes == 0 {
            return Err(Error::Config(
                "recovery.line_buffer_limit_bytes must be positive".to_string(),
            ));
        }
        if self.recovery.regex_backtrack_limit == 0 {
            return Err(Error::Config(
                "recovery.regex_backtrack_limit must be positive".to_string(),
            ));
        }
        if self.analysis.min_token_len == 0 {
            return Err(Error::Config(
                "analysis.min_token_len must be positive".to_string(),
            ));
        }
        if self.cache.active_task_ttl_secs == 0 {
            return Err(Error::Config(
                "cache.active_task_ttl_secs must be positive".to_string(),
            ));
        }
        if self.cache.active_task_ttl_secs > MAX_ACTIVE_TASK_TTL_SECS {
            return Err(Error::Config(format!(
                "cache.active_task_ttl_secs must be at most {}",
                MAX_ACTIVE_TASK_TTL_SECS
            )));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/chatsalvage/config.toml` (~/.config/chatsalvage/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("chatsalvage").join("config.toml")
    }

    /// Returns the data directory path (for crash reports)
    ///
    /// `$XDG_DATA_HOME/chatsalvage/` (~/.local/share/chatsalvage/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("chatsalvage")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/chatsalvage/` (~/.local/state/chatsalvage/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("chatsalvage")
    }

    /// Returns today's log file path
    ///
    /// Logs rotate daily in UTC, so this is
    /// `$XDG_STATE_HOME/chatsalvage/chatsalvage.<YYYY-MM-DD>.log`
    pub fn log_path() -> PathBuf {
        Self::log_path_for(chrono::Utc::now().date_naive())
    }

    /// Returns the log file path for a given UTC day
    pub fn log_path_for(date: chrono::NaiveDate) -> PathBuf {
        Self::state_dir().join(format!("chatsalvage.{}.log", date.format("%Y-%m-%d")))
    }
}
