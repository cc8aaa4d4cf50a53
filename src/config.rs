//! Configuration file parser for ~/.config/aqiwatch/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::monitor::BackoffPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `Debug` masks `api_token`.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// Station identifier in the feed URL.
    pub station: String,

    /// Feed origin. Must be HTTPS except for loopback test servers.
    pub feed_base_url: String,

    /// Feed token (alternative to the AQI_API_TOKEN env var).
    /// Env var takes precedence over config file.
    #[serde(deserialize_with = "deserialize_token")]
    pub api_token: Option<SecretString>,

    /// Regular polling period in minutes, clamped to 1 .. 1440.
    pub poll_interval_minutes: u64,

    /// Deadline for a single fetch, in seconds.
    pub fetch_timeout_secs: u64,

    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_secs: u64,
    pub max_secs: u64,
    pub floor_secs: u64,
    /// Relative jitter, clamped to `[0, 1)`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            initial_secs: policy.initial.as_secs(),
            max_secs: policy.max.as_secs(),
            floor_secs: policy.floor.as_secs(),
            jitter: policy.jitter,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station: "A377965".to_string(),
            feed_base_url: "https://api.waqi.info".to_string(),
            api_token: None,
            poll_interval_minutes: 10,
            fetch_timeout_secs: 10,
            backoff: BackoffConfig::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("station", &self.station)
            .field("feed_base_url", &self.feed_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_interval_minutes", &self.poll_interval_minutes)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("backoff", &self.backoff)
            .finish()
    }
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from))
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const MAX_POLL_INTERVAL_MINUTES: u64 = 24 * 60;
    const MAX_FETCH_TIMEOUT_SECS: u64 = 600;
    const MAX_BACKOFF_SECS: u64 = 24 * 60 * 60;

    const KNOWN_KEYS: [&'static str; 6] = [
        "station",
        "feed_base_url",
        "api_token",
        "poll_interval_minutes",
        "fetch_timeout_secs",
        "backoff",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
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
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            station = %config.station,
            interval_minutes = config.poll_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Clamped to one minute .. one day.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_minutes
                .clamp(1, Self::MAX_POLL_INTERVAL_MINUTES)
                * 60,
        )
    }

    /// Clamped to one second .. ten minutes.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.clamp(1, Self::MAX_FETCH_TIMEOUT_SECS))
    }

    /// Retry policy with bounds made consistent: `floor ≤ initial ≤ max ≤ 1 day`.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let b = &self.backoff;
        let cap = |secs: u64| Duration::from_secs(secs.min(Self::MAX_BACKOFF_SECS));
        let floor = cap(b.floor_secs);
        let max = cap(b.max_secs).max(floor);
        let initial = cap(b.initial_secs).clamp(floor, max);
        let jitter = if b.jitter.is_finite() {
            b.jitter.clamp(0.0, 0.99)
        } else {
            0.0
        };
        BackoffPolicy {
            initial,
            max,
            floor,
            jitter,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
