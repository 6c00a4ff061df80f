//! Periodic full sweep.
//!
//! Incremental messages only cover what the write path reported. The sweep
//! visits every row again, so lost change events, crashed workers and
//! dead-lettered batches converge eventually. Runs never overlap.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use media_types::Settings;

use crate::dispatcher::IndexingDispatcher;
use crate::registry::JobOutput;
use crate::{OverlapPolicy, SchedulerError, SchedulerService};

pub const SWEEP_JOB_NAME: &str = "full-sweep";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepJobConfig {
    /// Cron expression (default: "0 0 3 * * *" = daily at 03:00)
    pub cron: String,

    /// Timezone for scheduling; `None` uses the scheduler default
    pub timezone: Option<String>,

    /// Indexers to sweep; empty means all registered ones
    pub indexers: Vec<String>,
}

impl Default for SweepJobConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 3 * * *".to_string(),
            timezone: None,
            indexers: Vec::new(),
        }
    }
}

impl SweepJobConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cron: settings.sweep_cron.clone(),
            timezone: Some(settings.timezone.clone()),
            indexers: Vec::new(),
        }
    }

    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = cron.into();
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_indexers<I, S>(mut self, indexers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexers = indexers.into_iter().map(Into::into).collect();
        self
    }
}

/// Register the sweep job with the scheduler.
///
/// Fails if the config names an indexer the dispatcher does not know.
pub async fn create_sweep_job(
    scheduler: &SchedulerService,
    dispatcher: Arc<IndexingDispatcher>,
    config: SweepJobConfig,
) -> Result<uuid::Uuid, SchedulerError> {
    for name in &config.indexers {
        if !dispatcher.indexers().contains(name) {
            return Err(SchedulerError::UnknownIndexer(name.clone()));
        }
    }

    let indexers = config.indexers.clone();
    scheduler
        .register_job(
            SWEEP_JOB_NAME,
            &config.cron,
            config.timezone.as_deref(),
            OverlapPolicy::Skip,
            move |cancel| {
                let dispatcher = dispatcher.clone();
                let indexers = indexers.clone();
                async move { run_sweep_job(&dispatcher, &indexers, cancel).await }
            },
        )
        .await
}

/// Sweep the given indexers (all when empty) and summarize for the job
/// registry.
pub async fn run_sweep_job(
    dispatcher: &IndexingDispatcher,
    indexers: &[String],
    cancel: CancellationToken,
) -> Result<JobOutput, String> {
    let mut summaries = Vec::new();
    if indexers.is_empty() {
        summaries = dispatcher
            .sweep_all(&cancel)
            .await
            .map_err(|e| e.to_string())?;
    } else {
        for name in indexers {
            if cancel.is_cancelled() {
                break;
            }
            let summary = dispatcher
                .sweep(name, &cancel)
                .await
                .map_err(|e| e.to_string())?;
            summaries.push(summary);
        }
    }

    let mut output = JobOutput::new();
    let mut processed = 0;
    let mut dead_lettered = 0;
    for summary in &summaries {
        processed += summary.processed;
        dead_lettered += summary.dead_lettered;
        output = output
            .with_metadata(format!("{}.processed", summary.indexer), summary.processed.to_string())
            .with_metadata(format!("{}.completed", summary.indexer), summary.completed.to_string());
    }
    output = output
        .with_items_processed(processed)
        .with_metadata("dead_lettered", dead_lettered.to_string());

    if dead_lettered > 0 {
        warn!(dead_lettered, "Sweep left dead-lettered batches");
        return Err(format!("{} batches dead-lettered", dead_lettered));
    }
    info!(processed, indexers = summaries.len(), "Sweep job finished");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SweepJobConfig::default();
        assert_eq!(config.cron, "0 0 3 * * *");
        assert!(config.timezone.is_none());
        assert!(config.indexers.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = SweepJobConfig::default()
            .with_cron("0 */5 * * * *")
            .with_timezone("Europe/Berlin")
            .with_indexers(["media.indexer"]);
        assert_eq!(config.cron, "0 */5 * * * *");
        assert_eq!(config.timezone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(config.indexers, vec!["media.indexer"]);
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            sweep_cron: "0 30 1 * * *".to_string(),
            timezone: "Asia/Tokyo".to_string(),
            ..Default::default()
        };
        let config = SweepJobConfig::from_settings(&settings);
        assert_eq!(config.cron, "0 30 1 * * *");
        assert_eq!(config.timezone.as_deref(), Some("Asia/Tokyo"));
    }
}
