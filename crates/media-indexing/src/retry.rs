//! Retry of transient write failures.

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use tracing::{debug, error, warn};

use media_types::RetrySettings;

use crate::error::IndexingError;
use crate::statement::WriteStatement;

/// How often and how patiently a write is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            delay: Duration::from_millis(settings.delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Runs a [`WriteStatement`], re-executing it with the same parameters while
/// it fails transiently.
///
/// Holds no state between calls, so one instance can be shared by any number
/// of callers.
pub struct RetryableWrite<S> {
    statement: S,
    policy: RetryPolicy,
}

impl<S: WriteStatement> RetryableWrite<S> {
    pub fn new(statement: S, policy: RetryPolicy) -> Self {
        Self { statement, policy }
    }

    /// Execute the statement. Returns affected rows.
    ///
    /// Permanent errors are returned on the first failure. Transient errors
    /// are retried until `max_attempts` is reached and then surface as
    /// [`IndexingError::RetriesExhausted`] carrying the last storage error.
    pub fn execute(&self, params: &S::Params) -> Result<usize, IndexingError> {
        let mut backoff = Constant::new(self.policy.delay);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.statement.execute(params) {
                Ok(rows) => {
                    if attempts > 1 {
                        debug!(
                            statement = self.statement.name(),
                            attempts = attempts,
                            "Write succeeded after retry"
                        );
                    }
                    return Ok(rows);
                }
                Err(e) if !e.is_transient() => return Err(e.into()),
                Err(e) => {
                    if attempts >= self.policy.max_attempts {
                        error!(
                            statement = self.statement.name(),
                            attempts = attempts,
                            error = %e,
                            "Max write retries exceeded"
                        );
                        return Err(IndexingError::RetriesExhausted {
                            statement: self.statement.name().to_string(),
                            attempts,
                            source: e,
                        });
                    }

                    let delay = backoff.next_backoff().unwrap_or(self.policy.delay);
                    warn!(
                        statement = self.statement.name(),
                        attempt = attempts,
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "Transient write failure, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }

    pub fn statement(&self) -> &S {
        &self.statement
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}
