//! Configuration loading.
//!
//! Everything lives in one `config.toml`. Every section and field has a
//! default, so an empty file (or no file at all) yields a working setup.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// SQLite storage settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Inbox listing and planning limits.
    #[serde(default)]
    pub inbox: InboxConfig,

    /// Outbound new-message notices.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Log file output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SQLite storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the database file. Relative paths resolve against the
    /// working directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Inbox listing and planning limits.
#[derive(Debug, Clone, Deserialize)]
pub struct InboxConfig {
    /// Page size when a list request does not specify one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Upper bound for any requested page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Length of the default planning window, starting today.
    #[serde(default = "default_planning_window_days")]
    pub planning_window_days: u32,

    /// Length of the `upcoming-30d` event filter.
    #[serde(default = "default_upcoming_window_days")]
    pub upcoming_window_days: u32,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            planning_window_days: default_planning_window_days(),
            upcoming_window_days: default_upcoming_window_days(),
        }
    }
}

/// Outbound new-message notices.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Master switch. When off no notice is dispatched at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Link prefix for notices sent to vendors; the thread id is appended.
    #[serde(default = "default_vendor_link_base")]
    pub vendor_link_base: String,

    /// Link prefix for notices sent to buyers; the thread id is appended.
    #[serde(default = "default_buyer_link_base")]
    pub buyer_link_base: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vendor_link_base: default_vendor_link_base(),
            buyer_link_base: default_buyer_link_base(),
        }
    }
}

/// Log file output. Without a directory, logs go to stderr only.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory for JSON log files.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Filter applied to the file when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// How often a new log file is started.
    #[serde(default)]
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_log_level(),
            rotation: LogRotation::default(),
        }
    }
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// One file per hour.
    Hourly,
    /// One file per day.
    #[default]
    Daily,
    /// A single file that grows forever.
    Never,
}

// Default value functions for serde

fn default_db_path() -> PathBuf {
    PathBuf::from("leadbox.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_page_size() -> usize {
    50
}
fn default_max_page_size() -> usize {
    200
}
fn default_planning_window_days() -> u32 {
    90
}
fn default_upcoming_window_days() -> u32 {
    30
}
fn default_log_level() -> String {
    "info".to_owned()
}
fn default_true() -> bool {
    true
}
fn default_vendor_link_base() -> String {
    "/vendor/messages/".to_owned()
}
fn default_buyer_link_base() -> String {
    "/account/messages/".to_owned()
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

impl Config {
    /// Load from `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            tracing::info!(path = %path.display(), "loading config from file");
            load_config(path)
        } else {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Ok(Self::default())
        }
    }
}

/// Resolve the default config directory (`~/.leadbox/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".leadbox"))
}
