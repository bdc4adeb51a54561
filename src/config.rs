use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default refresh interval in seconds (1 hour)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60 * 60;

/// Default timeout for remote repository requests in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 3;

/// Default number of repositories fetched at the same time
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Default timeout for installer commands in seconds
pub const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 120;

const APP_NAME: &str = "git-plugin-updater";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Directory holding one folder per installed plugin
    pub plugins_dir: Option<PathBuf>,
    /// Drop the cached snapshot at the start of every run
    pub debug: bool,
    pub log_format: LogFormat,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub sources: SourcesConfig,
    pub installer: InstallerConfig,
}

/// Format of the log file
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache refresh interval in seconds
    pub refresh_interval: u64,
    pub backend: CacheBackend,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
            backend: CacheBackend::default(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }
}

/// Outbound request configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout: u64,
    /// Hosts for which TLS certificate verification is disabled
    pub ssl_disabled_hosts: Vec<String>,
    /// Hosts that may be reached over plain http
    pub insecure_hosts: Vec<String>,
    pub max_concurrent_fetches: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT_SECS,
            ssl_disabled_hosts: Vec::new(),
            insecure_hosts: Vec::new(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

/// Source-specific configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SourcesConfig {
    /// Skip pre-release tags when picking the newest tag
    pub ignore_prerelease: bool,
    pub github: GitHubConfig,
    pub bitbucket: BitbucketConfig,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GitHubConfig {
    pub enabled: bool,
    pub api_url: String,
    pub raw_url: String,
    /// Access token for private repositories and higher rate limits
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: crate::update::sources::github::DEFAULT_API_URL.to_string(),
            raw_url: crate::update::sources::github::DEFAULT_RAW_URL.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BitbucketConfig {
    pub enabled: bool,
    pub api_url: String,
}

impl Default for BitbucketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: crate::update::sources::bitbucket::DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitConfig {
    pub enabled: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Installer command templates
///
/// Placeholders: `{package}` (download URL), `{destination}` (plugin folder),
/// `{slug}` (plugin identifier). Each template is split on whitespace, the
/// first word is the program. Without an install command the package archive
/// is downloaded and unpacked into the destination directly; a custom install
/// command must use `{destination}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct InstallerConfig {
    pub install_command: Option<String>,
    /// Exit status 0 means the plugin is active
    pub status_command: Option<String>,
    pub activate_command: Option<String>,
    pub deactivate_command: Option<String>,
    /// Timeout in seconds for each command
    pub timeout: u64,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            install_command: None,
            status_command: Some("wp plugin is-active {slug}".to_string()),
            activate_command: Some("wp plugin activate {slug}".to_string()),
            deactivate_command: Some("wp plugin deactivate {slug}".to_string()),
            timeout: DEFAULT_INSTALL_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    ///
    /// A missing file at the default location yields the default config.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

/// Returns the path to the data directory for git-plugin-updater.
/// Uses $XDG_DATA_HOME/git-plugin-updater if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/git-plugin-updater,
/// or ./git-plugin-updater if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the database file.
pub fn db_path() -> PathBuf {
    data_dir().join("cache.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("git-plugin-updater.log")
}

/// Returns the default path of the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("config.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_NAME)
}
