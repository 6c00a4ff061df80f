//! Run status of scheduled jobs.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed(String),
    /// Not run, e.g. because the previous run was still active
    Skipped(String),
}

/// Stats a job reports back to the registry.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_items_processed(self, count: u64) -> Self {
        self.with_metadata("items_processed", count.to_string())
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub cron_expr: String,
    /// When the job last finished
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub is_running: bool,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: impl Into<String>, cron_expr: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            cron_expr: cron_expr.into(),
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            next_run: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Thread-safe registry of job status, keyed by job name.
///
/// ```
/// use media_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("media-sweep", "0 0 3 * * *");
///
/// registry.record_start("media-sweep");
/// assert!(registry.is_running("media-sweep"));
///
/// registry.record_complete("media-sweep", JobResult::Success, 1500);
/// assert!(!registry.is_running("media-sweep"));
/// ```
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, replacing any previous status under the same name.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.write()
            .insert(job_name.to_string(), JobStatus::new(job_name, cron_expr));
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = true;
        }
    }

    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, HashMap::new());
    }

    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = false;
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            if matches!(result, JobResult::Failed(_)) {
                status.error_count += 1;
            }
            status.last_result = Some(result);
            status.last_run_metadata = metadata;
        }
    }

    /// Record a run that was not started. The running flag of the active
    /// run is left alone.
    pub fn record_skipped(&self, job_name: &str, reason: impl Into<String>) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.skip_count += 1;
            status.last_result = Some(JobResult::Skipped(reason.into()));
        }
    }

    pub fn set_next_run(&self, job_name: &str, next: Option<DateTime<Utc>>) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.next_run = next;
        }
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// All jobs, sorted by name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|status| status.is_running)
            .unwrap_or(false)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_complete() {
        let registry = JobRegistry::new();
        registry.register("sweep", "0 0 3 * * *");
        assert!(registry.is_registered("sweep"));
        assert_eq!(registry.job_count(), 1);

        registry.record_start("sweep");
        assert!(registry.is_running("sweep"));

        let metadata = JobOutput::new().with_items_processed(42).metadata;
        registry.record_complete_with_metadata("sweep", JobResult::Success, 120, metadata);

        let status = registry.get_status("sweep").unwrap();
        assert!(!status.is_running);
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 0);
        assert_eq!(status.last_duration_ms, Some(120));
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(status.last_run_metadata["items_processed"], "42");
        assert!(status.last_run.is_some());
    }

    #[test]
    fn test_failures_are_counted() {
        let registry = JobRegistry::new();
        registry.register("sweep", "* * * * * *");
        registry.record_complete("sweep", JobResult::Failed("boom".into()), 5);
        registry.record_complete("sweep", JobResult::Success, 5);

        let status = registry.get_status("sweep").unwrap();
        assert_eq!(status.run_count, 2);
        assert_eq!(status.error_count, 1);
    }

    #[test]
    fn test_skip_keeps_running_flag() {
        let registry = JobRegistry::new();
        registry.register("sweep", "* * * * * *");
        registry.record_start("sweep");
        registry.record_skipped("sweep", "previous run still active");

        let status = registry.get_status("sweep").unwrap();
        assert!(status.is_running);
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.run_count, 0);
        assert!(matches!(status.last_result, Some(JobResult::Skipped(_))));
    }

    #[test]
    fn test_unknown_job_is_ignored() {
        let registry = JobRegistry::new();
        registry.record_start("missing");
        registry.set_next_run("missing", Some(Utc::now()));
        assert!(registry.get_status("missing").is_none());
        assert!(!registry.is_running("missing"));
    }

    #[test]
    fn test_get_all_status_sorted() {
        let registry = JobRegistry::new();
        registry.register("b", "* * * * * *");
        registry.register("a", "* * * * * *");
        let names: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_status_serializes() {
        let status = JobStatus::new("sweep", "0 0 3 * * *");
        let json = serde_json::to_string(&status).unwrap();
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_name, "sweep");
        assert_eq!(back.skip_count, 0);
    }
}
