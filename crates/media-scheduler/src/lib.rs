//! Scheduling and dispatch for the media indexer.
//!
//! - [`IndexingDispatcher`]: bounded message queue drained by a pool of
//!   workers, with redelivery, dead-lettering and checkpointed sweeps
//! - [`spawn_change_listeners`] / [`spawn_completion_listener`]: turn change
//!   and completion events into incremental messages, sweeping an indexer
//!   whose listener fell behind its channel
//! - [`SchedulerService`]: cron jobs with timezone support, overlap policy
//!   and graceful shutdown, recorded in a [`JobRegistry`]
//!
//! # Example
//!
//! ```ignore
//! use media_scheduler::{
//!     create_sweep_job, DispatcherConfig, IndexerRegistry, IndexingDispatcher,
//!     SchedulerConfig, SchedulerService, SweepJobConfig,
//! };
//!
//! let indexers = IndexerRegistry::new().with_indexer(media_indexer)?;
//! let dispatcher = Arc::new(IndexingDispatcher::start(storage, indexers, DispatcherConfig::default()));
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! create_sweep_job(&scheduler, dispatcher.clone(), SweepJobConfig::default()).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod dispatcher;
mod error;
mod indexers;
mod listeners;
mod overlap;
mod registry;
mod scheduler;

pub mod jobs;

pub use config::{DispatcherConfig, SchedulerConfig};
pub use dispatcher::{DispatchQueue, DispatchStats, IndexingDispatcher, SweepSummary};
pub use error::SchedulerError;
pub use indexers::IndexerRegistry;
pub use jobs::{create_sweep_job, run_sweep_job, SweepJobConfig, SWEEP_JOB_NAME};
pub use listeners::{spawn_change_listeners, spawn_completion_listener};
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{validate_cron_expression, SchedulerService};
