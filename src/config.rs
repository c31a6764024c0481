//! Configuration file parser for ~/.config/gator/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{Fetcher, DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::util::{parse_duration, DurationError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid interval: {0}")]
    Duration(#[from] DurationError),

    #[error("Interval must be greater than zero, got {0:?}")]
    NonPositiveInterval(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` means `gator.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// User that feed and follow commands act as. Set by `login` and `register`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user: Option<String>,

    /// `User-Agent` header sent with every feed request.
    pub user_agent: String,

    /// Per-fetch timeout covering connect, headers and body.
    pub request_timeout_secs: u64,

    /// Responses larger than this are rejected.
    pub max_feed_bytes: usize,

    /// Feeds claimed and fetched concurrently per tick.
    pub workers: usize,

    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_SIZE,
            workers: 1,
            log_level: "info".to_string(),
        }
    }
}

const KNOWN_KEYS: [&str; 7] = [
    "database_path",
    "current_user",
    "user_agent",
    "request_timeout_secs",
    "max_feed_bytes",
    "workers",
    "log_level",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Zero `workers` or `request_timeout_secs` → `Err(ConfigError::InvalidValue)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            user = config.current_user.as_deref().unwrap_or("<none>"),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Write the configuration to `path` as TOML, creating the parent directory.
    ///
    /// The file is written to a sibling temp file and renamed into place, so a
    /// failed write never leaves a truncated config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, content)?;
        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Make `name` the current user in the config file at `path`.
    ///
    /// Other settings in the file are kept; unknown keys are dropped.
    pub fn set_current_user(path: &Path, name: &str) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.current_user = Some(name.to_string());
        config.save(path)?;
        tracing::info!(user = %name, path = %path.display(), "Current user set");
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Feed fetcher using the configured user agent, timeout and size cap.
    ///
    /// The HTTP client carries no timeout of its own, so an expired request
    /// always surfaces as `FetchError::Timeout`.
    pub fn fetcher(&self) -> Result<Fetcher, ConfigError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Fetcher::new(
            client,
            &self.user_agent,
            self.request_timeout(),
            self.max_feed_bytes,
        ))
    }

    /// Database file to open: the configured path, or `gator.db` in `config_dir`.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("gator.db"))
    }
}

/// Parse the polling interval passed to `agg`.
///
/// Uses [`parse_duration`]'s grammar and additionally rejects zero, since a
/// zero-period ticker would spin.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let interval = parse_duration(input)?;
    if interval.is_zero() {
        return Err(ConfigError::NonPositiveInterval(input.to_string()));
    }
    Ok(interval)
}

// ============================================================================
// Tests
// ============================================================================
