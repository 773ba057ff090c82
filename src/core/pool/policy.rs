//! Failure policy for one job
//!
//! A [`Policy`] answers two questions and nothing else: what to do when a
//! batch attempt fails, and what to do when a table ends up failed.

use crate::config::RetryConfig;
use crate::domain::{ErrorClass, TabportError};
use std::time::Duration;

/// Decision after a failed batch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDecision {
    /// Try the batch again after the backoff delay
    Retry,
    /// Give up on this batch; other batches of the table keep running
    TableContinues,
    /// Give up on this batch and skip the table's not-yet-started batches
    TableFails,
}

/// Decision after a table failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDecision {
    JobContinues,
    /// Stop dispatching new work for every table
    JobAborts,
}

/// Retry, backoff and failure-scope rules for one job
#[derive(Debug, Clone)]
pub struct Policy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,

    /// Keep running a table's remaining batches after one of them failed
    pub batch_failure_continues_table: bool,

    /// Keep running later tables after a table failed
    pub table_failure_continues_job: bool,

    /// Integrity errors fail the table even when batch failures are tolerated
    pub integrity_is_fatal: bool,
}

impl Policy {
    /// Export policy: a failed batch fails its table, other tables go on
    pub fn for_export(retry: &RetryConfig) -> Self {
        Self {
            batch_failure_continues_table: false,
            table_failure_continues_job: true,
            integrity_is_fatal: true,
            ..Self::from_retry(retry)
        }
    }

    /// Import policy, driven by `continue_on_error` and whether the mode
    /// treats a checksum mismatch as fatal
    pub fn for_import(retry: &RetryConfig, continue_on_error: bool, integrity_is_fatal: bool) -> Self {
        Self {
            batch_failure_continues_table: continue_on_error,
            table_failure_continues_job: continue_on_error,
            integrity_is_fatal,
            ..Self::from_retry(retry)
        }
    }

    fn from_retry(retry: &RetryConfig) -> Self {
        Self {
            max_retries: retry.max_retries,
            initial_delay: Duration::from_millis(retry.initial_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            backoff_multiplier: retry.backoff_multiplier,
            batch_failure_continues_table: false,
            table_failure_continues_job: false,
            integrity_is_fatal: true,
        }
    }

    /// Decide what happens after attempt number `attempt` (1-based) failed
    pub fn on_batch_failure(&self, error: &TabportError, attempt: usize) -> BatchDecision {
        if error.is_retryable() && attempt <= self.max_retries {
            return BatchDecision::Retry;
        }

        if error.class() == ErrorClass::Integrity && self.integrity_is_fatal {
            return BatchDecision::TableFails;
        }

        if self.batch_failure_continues_table {
            BatchDecision::TableContinues
        } else {
            BatchDecision::TableFails
        }
    }

    /// Decide whether a failed table stops the whole job
    pub fn on_table_failure(&self, error: &TabportError) -> TableDecision {
        if error.class() == ErrorClass::Cancelled || !self.table_failure_continues_job {
            TableDecision::JobAborts
        } else {
            TableDecision::JobContinues
        }
    }

    /// Backoff before retry number `attempt` (1-based)
    ///
    /// `initial_delay * multiplier^(attempt-1)`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_retry(&RetryConfig::default())
    }
}
