//! Configuration loading for the media indexer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/media-indexer/config.toml.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::context::DEFAULT_LANGUAGE;
use crate::error::MediaError;

/// Which pathname strategy derives the hash segment of media paths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathStrategyKind {
    /// Hash of the file name (default)
    #[default]
    Filename,
    /// Hash of the media id
    Id,
    /// No hash segment
    Plain,
}

/// Retry behaviour for transient storage failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts per write, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Constant delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    10
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Ids fetched per iterator batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Consumer workers handling indexing messages
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded depth of the message queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub path_strategy: PathStrategyKind,

    /// Optional prefix prepended to every generated path
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Base URL for absolute media URLs. Falls back to the request host.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Fallback base URL when neither `base_url` nor a request host is known
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// Languages cycled by the search document sweep
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Cron expression for periodic full sweeps
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,

    /// Timezone for the sweep schedule
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "media-indexer")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_app_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_languages() -> Vec<String> {
    vec![DEFAULT_LANGUAGE.to_string()]
}

fn default_sweep_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            retry: RetrySettings::default(),
            path_strategy: PathStrategyKind::default(),
            path_prefix: None,
            base_url: None,
            app_url: default_app_url(),
            languages: default_languages(),
            sweep_cron: default_sweep_cron(),
            timezone: default_timezone(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/media-indexer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (MEDIA_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MediaError> {
        let config_dir = ProjectDirs::from("", "", "media-indexer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| MediaError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| MediaError::Config(e.to_string()))?
            .set_default("batch_size", default_batch_size() as i64)
            .map_err(|e| MediaError::Config(e.to_string()))?
            .set_default("workers", default_workers() as i64)
            .map_err(|e| MediaError::Config(e.to_string()))?
            .set_default("app_url", default_app_url())
            .map_err(|e| MediaError::Config(e.to_string()))?
            .set_default("sweep_cron", default_sweep_cron())
            .map_err(|e| MediaError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // MEDIA_DB_PATH, MEDIA_RETRY__MAX_ATTEMPTS, MEDIA_LANGUAGES=en,de
        builder = builder.add_source(
            Environment::with_prefix("MEDIA")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("languages")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MediaError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MediaError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the indexer cannot run with.
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.batch_size == 0 {
            return Err(MediaError::Config("batch_size must be > 0".to_string()));
        }
        if self.workers == 0 {
            return Err(MediaError::Config("workers must be > 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MediaError::Config(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }
        if self.languages.is_empty() {
            return Err(MediaError::Config(
                "at least one language is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(base) = BaseDirs::new() {
                return base.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.path_strategy, PathStrategyKind::Filename);
        assert_eq!(settings.languages, vec!["default".to_string()]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert!(settings.batch_size > 0);
        assert!(!settings.languages.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let settings = Settings {
            batch_size: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            retry: RetrySettings {
                max_attempts: 0,
                delay_ms: 0,
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expanded_db_path_keeps_absolute() {
        let settings = Settings {
            db_path: "/var/lib/media".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/var/lib/media"));
    }

    #[test]
    fn test_path_strategy_serialization() {
        let kind: PathStrategyKind = serde_json::from_str("\"id\"").unwrap();
        assert_eq!(kind, PathStrategyKind::Id);
        assert_eq!(
            serde_json::to_string(&PathStrategyKind::Plain).unwrap(),
            "\"plain\""
        );
    }
}
