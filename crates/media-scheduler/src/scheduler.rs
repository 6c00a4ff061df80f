//! Cron scheduler with job status tracking and graceful shutdown.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::overlap::{OverlapGuard, OverlapPolicy};
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// Validate a 6-field cron expression (sec min hour day month weekday).
///
/// ```
/// use media_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 3 * * *").is_ok());
/// assert!(validate_cron_expression("invalid").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// Lifecycle wrapper around [`JobScheduler`].
///
/// Every job receives a clone of the shutdown token and reports its outcome
/// to the shared [`JobRegistry`].
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a stopped scheduler. Fails on an unknown default timezone.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!("Scheduler started");
        Ok(())
    }

    /// Cancel running jobs, give them up to `shutdown_timeout_secs` to
    /// finish, then stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.has_running_jobs() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.has_running_jobs() {
            warn!("Jobs still running at shutdown deadline");
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a cron job.
    ///
    /// * `timezone` - IANA name, or `None` for the configured default
    /// * `overlap` - whether a run may start while the previous one is active
    /// * `job_fn` - receives the shutdown token; its result is recorded in
    ///   the registry
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        overlap: OverlapPolicy,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        let tz: Tz = match timezone {
            Some(tz_str) => Self::parse_timezone(tz_str)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        self.registry.register(name, cron_expr);

        let job_name = name.to_string();
        let registry = self.registry.clone();
        let guard = OverlapGuard::new(overlap);
        let shutdown_token = self.shutdown_token.clone();

        let job = Job::new_async_tz(cron_expr, tz, move |uuid, mut lock| {
            let name = job_name.clone();
            let registry = registry.clone();
            let guard = guard.clone();
            let token = shutdown_token.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                match guard.try_acquire() {
                    Some(_run) => {
                        registry.record_start(&name);
                        info!(job = %name, "Job started");
                        let start = Instant::now();

                        let outcome = job_fn(token).await;
                        let duration_ms = start.elapsed().as_millis() as u64;
                        match outcome {
                            Ok(output) => {
                                info!(job = %name, duration_ms, "Job completed");
                                registry.record_complete_with_metadata(
                                    &name,
                                    JobResult::Success,
                                    duration_ms,
                                    output.metadata,
                                );
                            }
                            Err(e) => {
                                warn!(job = %name, duration_ms, error = %e, "Job failed");
                                registry.record_complete(&name, JobResult::Failed(e), duration_ms);
                            }
                        }
                    }
                    None => {
                        info!(job = %name, "Previous run still active, skipping");
                        registry.record_skipped(&name, "previous run still active");
                    }
                }

                if let Ok(next) = lock.next_tick_for_job(uuid).await {
                    registry.set_next_run(&name, next);
                }
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        if let Ok(next) = self.scheduler.clone().next_tick_for_job(uuid).await {
            self.registry.set_next_run(name, next);
        }
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");

        Ok(uuid)
    }

    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }

    fn has_running_jobs(&self) -> bool {
        self.registry
            .get_all_status()
            .iter()
            .any(|status| status.is_running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_shutdown() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        let token = scheduler.shutdown_token();
        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(token.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_when_not_running() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        assert!(matches!(
            scheduler.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_default_timezone() {
        let config = SchedulerConfig {
            default_timezone: "Invalid/Zone".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SchedulerService::new(config).await,
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("0 0 * * * *").is_ok());
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("0 0 0 * * SUN").is_ok());
        assert!(validate_cron_expression("").is_err());
        assert!(validate_cron_expression("* * *").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_records_status() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();
        scheduler
            .register_job(
                "sweep",
                "0 0 3 * * *",
                Some("Europe/Berlin"),
                OverlapPolicy::Skip,
                |_token| async { Ok(JobOutput::new()) },
            )
            .await
            .unwrap();

        let registry = scheduler.registry();
        let status = registry.get_status("sweep").unwrap();
        assert_eq!(status.cron_expr, "0 0 3 * * *");
        assert_eq!(status.run_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_rejects_bad_input() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let bad_cron = scheduler
            .register_job("a", "not cron", None, OverlapPolicy::Skip, |_t| async {
                Ok(JobOutput::new())
            })
            .await;
        assert!(matches!(bad_cron, Err(SchedulerError::InvalidCron(_))));

        let bad_tz = scheduler
            .register_job(
                "b",
                "0 0 3 * * *",
                Some("Nowhere/City"),
                OverlapPolicy::Skip,
                |_t| async { Ok(JobOutput::new()) },
            )
            .await;
        assert!(matches!(bad_tz, Err(SchedulerError::InvalidTimezone(_))));
        assert_eq!(scheduler.registry().job_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_runs_and_is_recorded() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        scheduler
            .register_job(
                "every-second",
                "* * * * * *",
                None,
                OverlapPolicy::Skip,
                |_token| async { Ok(JobOutput::new().with_items_processed(7)) },
            )
            .await
            .unwrap();
        scheduler.start().await.unwrap();

        let registry = scheduler.registry();
        let mut ran = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if registry.get_status("every-second").unwrap().run_count > 0 {
                ran = true;
                break;
            }
        }
        scheduler.shutdown().await.unwrap();

        assert!(ran, "job should have run within 4 seconds");
        let status = registry.get_status("every-second").unwrap();
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(status.last_run_metadata["items_processed"], "7");
    }
}
