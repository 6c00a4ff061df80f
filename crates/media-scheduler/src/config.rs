//! Scheduler and worker pool configuration.

use serde::{Deserialize, Serialize};

use media_types::Settings;

use crate::SchedulerError;

/// Configuration of the cron scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone used for jobs registered without an explicit one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Seconds running jobs get to observe cancellation on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_timezone: settings.timezone.clone(),
            ..Default::default()
        }
    }

    /// Parse the configured timezone.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` for unknown IANA names.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }
}

/// Sizing of the message queue and its consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Consumer tasks running `handle`
    pub workers: usize,

    /// Messages buffered before producers wait
    pub queue_capacity: usize,

    /// Extra deliveries of a failing message before it is dead-lettered
    pub max_redeliveries: u32,

    /// Pause between deliveries of a failing message
    pub redelivery_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            max_redeliveries: 3,
            redelivery_delay_ms: 100,
        }
    }
}

impl DispatcherConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            workers: settings.workers,
            queue_capacity: settings.queue_capacity,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_redeliveries(mut self, max_redeliveries: u32) -> Self {
        self.max_redeliveries = max_redeliveries;
        self
    }

    pub fn with_redelivery_delay_ms(mut self, delay_ms: u64) -> Self {
        self.redelivery_delay_ms = delay_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.default_timezone, "UTC");
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.parse_timezone().unwrap().name(), "UTC");
    }

    #[test]
    fn test_parse_timezone_invalid() {
        let config = SchedulerConfig {
            default_timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.parse_timezone(),
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            workers: 9,
            queue_capacity: 12,
            timezone: "Europe/Berlin".to_string(),
            ..Default::default()
        };
        let dispatcher = DispatcherConfig::from_settings(&settings);
        assert_eq!(dispatcher.workers, 9);
        assert_eq!(dispatcher.queue_capacity, 12);
        assert_eq!(dispatcher.max_redeliveries, 3);

        let scheduler = SchedulerConfig::from_settings(&settings);
        assert_eq!(scheduler.parse_timezone().unwrap().name(), "Europe/Berlin");
    }

    #[test]
    fn test_serde_defaults() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_timezone, "UTC");
    }
}
