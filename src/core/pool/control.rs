//! Job and table stop flags shared by the producer and the workers

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Cancellation state for one job
///
/// A job stops when the operator signals shutdown or when the policy aborts
/// it. A single table can be stopped on its own, which skips only that
/// table's not-yet-started batches.
#[derive(Debug, Clone)]
pub struct JobControl {
    inner: Arc<ControlInner>,
}

#[derive(Debug)]
struct ControlInner {
    shutdown: watch::Receiver<bool>,
    aborted: AtomicBool,
    stopped_tables: Mutex<HashSet<String>>,
}

impl JobControl {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                shutdown,
                aborted: AtomicBool::new(false),
                stopped_tables: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// A control that only stops through [`abort`](Self::abort)
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    /// Operator asked the job to stop
    pub fn is_interrupted(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// No new batch may start
    pub fn is_job_stopped(&self) -> bool {
        self.is_interrupted() || self.is_aborted()
    }

    pub fn stop_table(&self, table: &str) {
        let mut tables = self
            .inner
            .stopped_tables
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        tables.insert(table.to_string());
    }

    pub fn is_table_stopped(&self, table: &str) -> bool {
        self.inner
            .stopped_tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(table)
    }

    /// Whether a batch of `table` that has not started yet must be skipped
    pub fn should_skip(&self, table: &str) -> bool {
        self.is_job_stopped() || self.is_table_stopped(table)
    }
}
