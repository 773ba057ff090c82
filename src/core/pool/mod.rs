//! Bounded worker pool shared by every table of a job
//!
//! One pool per job: `W` worker tasks pull [`WorkItem`]s from a single
//! bounded queue of capacity `2 × W`, so the producer waits whenever the
//! workers fall behind. Every item that enters the queue produces exactly
//! one [`BatchOutcome`], including items that were skipped because their
//! table or the whole job was stopped.
//!
//! Each attempt runs under a timeout. Failed attempts are handed to the
//! job [`Policy`], which decides between retrying with backoff, giving up on
//! the batch only, or giving up on the batch and its table.

pub mod control;
pub mod policy;

pub use control::JobControl;
pub use policy::{BatchDecision, Policy, TableDecision};

use crate::domain::{Result, TabportError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A batch task addressed by table and sequence
#[derive(Debug, Clone)]
pub struct WorkItem<T> {
    pub table: String,
    pub sequence: usize,
    pub task: T,
}

/// How a batch ended
#[derive(Debug)]
pub enum BatchResult<O> {
    Completed(O),
    Failed {
        error: TabportError,
        decision: BatchDecision,
    },
    /// Never started because the table or job was stopped
    Skipped,
}

/// Final report for one batch
#[derive(Debug)]
pub struct BatchOutcome<O> {
    pub table: String,
    pub sequence: usize,
    pub attempts: usize,
    pub result: BatchResult<O>,
}

impl<O> BatchOutcome<O> {
    pub fn skipped(table: impl Into<String>, sequence: usize) -> Self {
        Self {
            table: table.into(),
            sequence,
            attempts: 0,
            result: BatchResult::Skipped,
        }
    }
}

/// The work a pool performs for one batch
///
/// `process` must be all-or-nothing: when it returns an error nothing of
/// the batch may have been committed, so that a retry starts clean.
#[async_trait]
pub trait BatchProcessor: Send + Sync + 'static {
    type Task: Send + Sync + 'static;
    type Output: Send + 'static;

    async fn process(&self, item: &WorkItem<Self::Task>) -> Result<Self::Output>;
}

/// Pool settings
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub workers: usize,
    pub batch_timeout: Duration,
    pub policy: Policy,
}

/// Running worker pool
///
/// Outcomes are delivered on the event channel given to
/// [`start`](Self::start), converted with `From<BatchOutcome<_>>`, so a
/// coordinator can interleave them with its own events on one ordered
/// channel.
pub struct WorkerPool<T> {
    sender: Option<mpsc::Sender<WorkItem<T>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> WorkerPool<T> {
    pub fn start<P, E>(
        processor: Arc<P>,
        options: PoolOptions,
        control: JobControl,
        events: mpsc::UnboundedSender<E>,
    ) -> Self
    where
        P: BatchProcessor<Task = T>,
        E: From<BatchOutcome<P::Output>> + Send + 'static,
    {
        let workers = options.workers.max(1);
        let (sender, receiver) = mpsc::channel::<WorkItem<T>>(workers * 2);
        let receiver = Arc::new(Mutex::new(receiver));
        let options = Arc::new(options);

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let processor = processor.clone();
                let options = options.clone();
                let control = control.clone();
                let events = events.clone();

                tokio::spawn(async move {
                    worker_loop(worker_id, receiver, processor, options, control, events).await;
                })
            })
            .collect();

        tracing::debug!(workers, queue_capacity = workers * 2, "Worker pool started");

        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Handle for enqueueing work
    ///
    /// The queue closes once the pool's own sender and every submitter have
    /// been dropped.
    pub fn submitter(&self) -> Option<Submitter<T>> {
        self.sender.clone().map(|sender| Submitter { sender })
    }

    /// Stop accepting work from this handle
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// Wait for every worker to drain the queue and exit
    pub async fn join(mut self) {
        self.close();
        let results = futures::future::join_all(std::mem::take(&mut self.handles)).await;
        for (i, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                tracing::error!(worker = i, error = %e, "Worker task panicked");
            }
        }
    }
}

/// Cloneable producer side of the pool queue
#[derive(Debug)]
pub struct Submitter<T> {
    sender: mpsc::Sender<WorkItem<T>>,
}

impl<T> Clone for Submitter<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> Submitter<T> {
    /// Enqueue one item, waiting while the queue is full
    pub async fn submit(&self, item: WorkItem<T>) -> Result<()> {
        self.sender
            .send(item)
            .await
            .map_err(|_| TabportError::Cancelled("worker pool is closed".to_string()))
    }
}

async fn worker_loop<P, E>(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<WorkItem<P::Task>>>>,
    processor: Arc<P>,
    options: Arc<PoolOptions>,
    control: JobControl,
    events: mpsc::UnboundedSender<E>,
) where
    P: BatchProcessor,
    E: From<BatchOutcome<P::Output>>,
{
    loop {
        let item = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(item) = item else {
            break;
        };

        let outcome = if control.should_skip(&item.table) {
            tracing::debug!(
                worker = worker_id,
                table = %item.table,
                sequence = item.sequence,
                "Skipping batch of stopped table"
            );
            BatchOutcome::skipped(item.table.clone(), item.sequence)
        } else {
            run_batch(worker_id, processor.as_ref(), &options, &control, &item).await
        };

        if events.send(E::from(outcome)).is_err() {
            // Coordinator is gone; nothing left to report to
            break;
        }
    }

    tracing::trace!(worker = worker_id, "Worker exiting");
}

async fn run_batch<P: BatchProcessor>(
    worker_id: usize,
    processor: &P,
    options: &PoolOptions,
    control: &JobControl,
    item: &WorkItem<P::Task>,
) -> BatchOutcome<P::Output> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(options.batch_timeout, processor.process(item)).await
        {
            Ok(result) => result,
            Err(_) => Err(TabportError::Timeout(format!(
                "batch {} of {} exceeded {:?}",
                item.sequence, item.table, options.batch_timeout
            ))),
        };

        let error = match result {
            Ok(output) => {
                return BatchOutcome {
                    table: item.table.clone(),
                    sequence: item.sequence,
                    attempts: attempt,
                    result: BatchResult::Completed(output),
                }
            }
            Err(error) => error,
        };

        let decision = options.policy.on_batch_failure(&error, attempt);
        match decision {
            BatchDecision::Retry if !control.is_job_stopped() => {
                let delay = options.policy.backoff_delay(attempt);
                tracing::warn!(
                    worker = worker_id,
                    table = %item.table,
                    sequence = item.sequence,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Batch attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            BatchDecision::Retry | BatchDecision::TableContinues | BatchDecision::TableFails => {
                // A retry that the job no longer allows ends the batch here
                let decision = match decision {
                    BatchDecision::Retry => BatchDecision::TableFails,
                    other => other,
                };
                if decision == BatchDecision::TableFails {
                    control.stop_table(&item.table);
                }
                tracing::error!(
                    worker = worker_id,
                    table = %item.table,
                    sequence = item.sequence,
                    attempts = attempt,
                    error_class = %error.class(),
                    error = %error,
                    "Batch failed"
                );
                return BatchOutcome {
                    table: item.table.clone(),
                    sequence: item.sequence,
                    attempts: attempt,
                    result: BatchResult::Failed { error, decision },
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` attempts of every batch with `error`
    struct Flaky {
        failures: usize,
        error: TabportError,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize, error: TabportError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BatchProcessor for Flaky {
        type Task = usize;
        type Output = usize;

        async fn process(&self, item: &WorkItem<usize>) -> Result<usize> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(item.task * 10)
        }
    }

    fn options(workers: usize, max_retries: usize) -> PoolOptions {
        let retry = RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            ..Default::default()
        };
        PoolOptions {
            workers,
            batch_timeout: Duration::from_secs(5),
            policy: Policy::for_import(&retry, false, true),
        }
    }

    /// Batch 0 hangs far beyond any timeout, every other batch returns at once
    struct Stalled {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BatchProcessor for Stalled {
        type Task = usize;
        type Output = usize;

        async fn process(&self, item: &WorkItem<usize>) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if item.sequence == 0 {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(item.task)
        }
    }

    /// Holds every batch until a permit is released
    struct Gated {
        gate: tokio::sync::Semaphore,
        started: AtomicUsize,
    }

    #[async_trait]
    impl BatchProcessor for Gated {
        type Task = usize;
        type Output = usize;

        async fn process(&self, item: &WorkItem<usize>) -> Result<usize> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| TabportError::Cancelled(e.to_string()))?;
            Ok(item.task)
        }
    }

    fn item(sequence: usize) -> WorkItem<usize> {
        WorkItem {
            table: "t".to_string(),
            sequence,
            task: sequence,
        }
    }

    async fn run<P: BatchProcessor<Task = usize, Output = usize>>(
        processor: Arc<P>,
        options: PoolOptions,
        control: JobControl,
        items: usize,
    ) -> Vec<BatchOutcome<usize>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchOutcome<usize>>();
        let pool = WorkerPool::start(processor, options, control, tx);
        let submitter = pool.submitter().unwrap();

        for i in 0..items {
            submitter.submit(item(i)).await.unwrap();
        }
        drop(submitter);
        pool.join().await;

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.sequence);
        outcomes
    }

    #[tokio::test]
    async fn test_every_item_reports_once() {
        let processor = Arc::new(Flaky::new(0, TabportError::Database("x".into())));
        let outcomes = run(processor.clone(), options(4, 0), JobControl::detached(), 20).await;

        assert_eq!(outcomes.len(), 20);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert!(matches!(outcome.result, BatchResult::Completed(v) if v == i * 10));
        }
        assert!(processor.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let processor = Arc::new(Flaky::new(2, TabportError::Connectivity("reset".into())));
        let outcomes = run(processor, options(1, 3), JobControl::detached(), 1).await;

        assert!(matches!(outcomes[0].result, BatchResult::Completed(0)));
        assert_eq!(outcomes[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_table_failure_skips_remaining_batches() {
        let processor = Arc::new(Flaky::new(1, TabportError::Serialization("bad".into())));
        let outcomes = run(processor, options(1, 3), JobControl::detached(), 5).await;

        assert!(matches!(
            outcomes[0].result,
            BatchResult::Failed {
                decision: BatchDecision::TableFails,
                ..
            }
        ));
        assert!(outcomes[1..]
            .iter()
            .all(|o| matches!(o.result, BatchResult::Skipped)));
    }

    #[tokio::test]
    async fn test_aborted_job_skips_everything() {
        let control = JobControl::detached();
        control.abort();
        let processor = Arc::new(Flaky::new(0, TabportError::Database("x".into())));
        let outcomes = run(processor.clone(), options(2, 0), control, 6).await;

        assert_eq!(outcomes.len(), 6);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, BatchResult::Skipped)));
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stalled_batch_times_out_and_is_retried() {
        let retry = RetryConfig {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            ..Default::default()
        };
        let options = PoolOptions {
            workers: 2,
            batch_timeout: Duration::from_millis(50),
            policy: Policy::for_import(&retry, true, true),
        };
        let processor = Arc::new(Stalled {
            calls: AtomicUsize::new(0),
        });

        let started = std::time::Instant::now();
        let outcomes = run(processor.clone(), options, JobControl::detached(), 3).await;
        assert!(started.elapsed() < Duration::from_secs(10));

        assert_eq!(outcomes[0].attempts, 2);
        match &outcomes[0].result {
            BatchResult::Failed { error, decision } => {
                assert!(matches!(error, TabportError::Timeout(_)));
                assert!(error.to_string().contains("exceeded 50ms"));
                assert_eq!(*decision, BatchDecision::TableContinues);
            }
            other => panic!("expected a timed out batch, got {other:?}"),
        }
        for outcome in &outcomes[1..] {
            assert!(matches!(outcome.result, BatchResult::Completed(v) if v == outcome.sequence));
            assert_eq!(outcome.attempts, 1);
        }
        assert_eq!(processor.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_producer_waits_when_queue_is_full() {
        let processor = Arc::new(Gated {
            gate: tokio::sync::Semaphore::new(0),
            started: AtomicUsize::new(0),
        });
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchOutcome<usize>>();
        let pool = WorkerPool::start(processor.clone(), options(1, 0), JobControl::detached(), tx);
        let submitter = pool.submitter().unwrap();

        // One batch held by the worker plus a queue of 2 x 1
        for i in 0..3 {
            tokio::time::timeout(Duration::from_secs(5), submitter.submit(item(i)))
                .await
                .unwrap()
                .unwrap();
        }
        let blocked = tokio::time::timeout(Duration::from_millis(100), submitter.submit(item(3))).await;
        assert!(blocked.is_err(), "fourth submit should wait for a free slot");
        assert_eq!(processor.started.load(Ordering::SeqCst), 1);

        processor.gate.add_permits(16);
        tokio::time::timeout(Duration::from_secs(5), submitter.submit(item(3)))
            .await
            .unwrap()
            .unwrap();
        drop(submitter);
        pool.join().await;

        let mut completed = 0;
        while let Some(outcome) = rx.recv().await {
            assert!(matches!(outcome.result, BatchResult::Completed(_)));
            completed += 1;
        }
        assert_eq!(completed, 4);
    }
}
