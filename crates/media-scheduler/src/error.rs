//! Error types for the scheduler crate.

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

use media_indexing::IndexingError;

/// Errors raised while scheduling or dispatching indexing work.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Error from the underlying tokio-cron-scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    /// No indexer registered under this name
    #[error("Unknown indexer: {0}")]
    UnknownIndexer(String),

    /// Two indexers registered under the same name
    #[error("Indexer already registered: {0}")]
    DuplicateIndexer(String),

    /// The message queue was shut down
    #[error("Message queue closed")]
    QueueClosed,

    /// A blocking task panicked or was aborted
    #[error("Task failed: {0}")]
    Task(String),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        SchedulerError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::InvalidCron("bad expression".to_string());
        assert!(err.to_string().contains("Invalid cron expression"));

        let err = SchedulerError::UnknownIndexer("nope".to_string());
        assert_eq!(err.to_string(), "Unknown indexer: nope");

        let err = SchedulerError::AlreadyRunning;
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_from_indexing_error() {
        let err: SchedulerError = IndexingError::UnknownIndexer("x".to_string()).into();
        assert!(matches!(err, SchedulerError::Indexing(_)));
    }
}
