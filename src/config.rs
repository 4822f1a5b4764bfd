//! Configuration file parser for ~/.config/headlines/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning for each one
//! since they are usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::observe::DEFAULT_GRACE;
use crate::remote::{DEFAULT_BASE_URL, DEFAULT_QUERY, DEFAULT_SORT_BY};
use crate::sync::{SearchParams, SyncSchedule};
use crate::work::{BackoffPolicy, Constraints, EngineSettings, MAX_BACKOFF, MIN_BACKOFF};

/// Environment variable that takes precedence over `api_key`.
pub const API_KEY_ENV: &str = "NEWS_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// News API key (alternative to the NEWS_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Scheme and host of the search API.
    pub base_url: String,

    /// Search query sent as `q`.
    pub query: String,

    /// Result ordering sent as `sortBy`.
    pub sort_by: String,

    /// Minutes between background syncs.
    pub sync_interval_minutes: u64,

    /// Only sync in the background while a network interface is up.
    pub require_network: bool,

    /// Skip background syncs while the battery is low.
    pub require_battery_not_low: bool,

    /// First retry delay of the background sync; later retries grow linearly.
    pub backoff_seconds: u64,

    /// Ceiling for a single retry delay.
    pub max_backoff_seconds: u64,

    /// Attempts per sync run before giving up (0 = unlimited).
    pub max_attempts: u32,

    /// Whole-request timeout for the search API.
    pub request_timeout_secs: u64,

    /// How often unmet sync constraints are re-checked.
    pub constraint_poll_secs: u64,

    /// How long views keep their live queries after the last subscriber leaves.
    pub view_grace_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            query: DEFAULT_QUERY.to_string(),
            sort_by: DEFAULT_SORT_BY.to_string(),
            sync_interval_minutes: 15,
            require_network: true,
            require_battery_not_low: true,
            backoff_seconds: MIN_BACKOFF.as_secs(),
            max_backoff_seconds: MAX_BACKOFF.as_secs(),
            max_attempts: 0,
            request_timeout_secs: 30,
            constraint_poll_secs: 30,
            view_grace_millis: DEFAULT_GRACE.as_millis() as u64,
        }
    }
}

/// Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("query", &self.query)
            .field("sort_by", &self.sort_by)
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("require_network", &self.require_network)
            .field("require_battery_not_low", &self.require_battery_not_low)
            .field("backoff_seconds", &self.backoff_seconds)
            .field("max_backoff_seconds", &self.max_backoff_seconds)
            .field("max_attempts", &self.max_attempts)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("constraint_poll_secs", &self.constraint_poll_secs)
            .field("view_grace_millis", &self.view_grace_millis)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 13] = [
        "api_key",
        "base_url",
        "query",
        "sort_by",
        "sync_interval_minutes",
        "require_network",
        "require_battery_not_low",
        "backoff_seconds",
        "max_backoff_seconds",
        "max_attempts",
        "request_timeout_secs",
        "constraint_poll_secs",
        "view_grace_millis",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading so a huge or corrupted file can't
        // exhaust memory.
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
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            query = %config.query,
            interval_minutes = config.sync_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// API key from `NEWS_API_KEY`, falling back to the config file.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key_with_env(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with_env(&self, env: Option<String>) -> Option<SecretString> {
        env.filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
            .map(SecretString::from)
    }

    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            query: self.query.clone(),
            sort_by: self.sort_by.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn view_grace(&self) -> Duration {
        Duration::from_millis(self.view_grace_millis)
    }

    /// Background and on-demand sync scheduling.
    ///
    /// Intervals and delays below one unit are clamped so a zero in the
    /// file can't produce a busy loop.
    pub fn sync_schedule(&self) -> SyncSchedule {
        let max_attempts = (self.max_attempts > 0).then_some(self.max_attempts);
        let max_delay = Duration::from_secs(self.max_backoff_seconds.max(1));
        let defaults = SyncSchedule::default();

        SyncSchedule {
            interval: Duration::from_secs(self.sync_interval_minutes.max(1).saturating_mul(60)),
            constraints: Constraints {
                requires_network: self.require_network,
                requires_battery_not_low: self.require_battery_not_low,
            },
            periodic_backoff: BackoffPolicy::linear(Duration::from_secs(
                self.backoff_seconds.max(1),
            ))
            .with_max_delay(max_delay)
            .with_max_attempts(max_attempts),
            immediate_backoff: defaults
                .immediate_backoff
                .with_max_delay(max_delay)
                .with_max_attempts(max_attempts),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            constraint_poll: Duration::from_secs(self.constraint_poll_secs.max(1)),
            ..EngineSettings::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("headlines_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url, "https://newsapi.org/");
        assert_eq!(config.query, "india");
        assert_eq!(config.sort_by, "publishedAt");
        assert_eq!(config.sync_interval_minutes, 15);
        assert!(config.require_network);
        assert!(config.require_battery_not_low);
        assert_eq!(config.backoff_seconds, 10);
        assert_eq!(config.max_attempts, 0);
        assert_eq!(config.view_grace_millis, 5000);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/headlines_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.query, "india");
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.sync_interval_minutes, 15);
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "query = \"rust\"\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.query, "rust");
        assert_eq!(config.sort_by, "publishedAt"); // default
        assert!(config.require_network); // default

        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
api_key = "test-key-123"
base_url = "http://localhost:8080"
query = "rust"
sort_by = "popularity"
sync_interval_minutes = 60
require_network = false
require_battery_not_low = false
backoff_seconds = 30
max_backoff_seconds = 600
max_attempts = 5
request_timeout_secs = 10
constraint_poll_secs = 5
view_grace_millis = 250
"#;
        let path = write_config("full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("test-key-123"));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.sort_by, "popularity");
        assert_eq!(config.sync_interval_minutes, 60);
        assert!(!config.require_network);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.view_grace(), Duration::from_millis(250));

        let schedule = config.sync_schedule();
        assert_eq!(schedule.interval, Duration::from_secs(3600));
        assert_eq!(schedule.constraints, Constraints::default());
        assert_eq!(schedule.periodic_backoff.delay_for(2), Duration::from_secs(60));
        assert_eq!(schedule.periodic_backoff.max_delay, Duration::from_secs(600));
        assert_eq!(schedule.periodic_backoff.max_attempts, Some(5));
        assert_eq!(
            config.engine_settings().constraint_poll,
            Duration::from_secs(5)
        );

        cleanup(&path);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = Config {
            sync_interval_minutes: 0,
            backoff_seconds: 0,
            constraint_poll_secs: 0,
            request_timeout_secs: 0,
            ..Config::default()
        };
        let schedule = config.sync_schedule();
        assert_eq!(schedule.interval, Duration::from_secs(60));
        assert_eq!(schedule.periodic_backoff.initial, Duration::from_secs(1));
        assert_eq!(schedule.periodic_backoff.max_attempts, None);
        assert_eq!(config.engine_settings().constraint_poll, Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let config = Config {
            sync_interval_minutes: u64::MAX,
            ..Config::default()
        };
        assert_eq!(config.sync_schedule().interval, Duration::from_secs(u64::MAX));

        let config: Config = toml::from_str(&format!("sync_interval_minutes = {}", i64::MAX)).unwrap();
        assert_eq!(
            config.sync_schedule().interval,
            Duration::from_secs((i64::MAX as u64).saturating_mul(60))
        );
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config(
            "unknown",
            "query = \"rust\"\ntheme = \"dark\"\nanother_unknown = 42\n",
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.query, "rust");

        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        // sync_interval_minutes should be an integer, not a string
        let path = write_config("wrongtype", "sync_interval_minutes = \"often\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        cleanup(&path);
    }

    #[test]
    fn test_env_key_takes_precedence() {
        let config = Config {
            api_key: Some("from-file".to_string()),
            ..Config::default()
        };

        let key = config.api_key_with_env(Some("from-env".to_string())).unwrap();
        assert_eq!(key.expose_secret(), "from-env");

        let key = config.api_key_with_env(Some("  ".to_string())).unwrap();
        assert_eq!(key.expose_secret(), "from-file");

        let key = config.api_key_with_env(None).unwrap();
        assert_eq!(key.expose_secret(), "from-file");
    }

    #[test]
    fn test_no_key_anywhere() {
        let config = Config {
            api_key: Some(String::new()),
            ..Config::default()
        };
        assert!(config.api_key_with_env(None).is_none());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = Config {
            api_key: Some("super-secret-key-12345".to_string()),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(
            !debug_output.contains("super-secret-key-12345"),
            "Debug output should not contain the API key"
        );
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_debug_shows_none_when_no_api_key() {
        let debug_output = format!("{:?}", Config::default());
        assert!(debug_output.contains("api_key: None"));
        assert!(!debug_output.contains("[REDACTED]"));
    }
}
