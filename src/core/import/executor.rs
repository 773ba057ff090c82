//! Import executor - per-table state machine over the shared worker pool
//!
//! A producer task walks the tables one at a time: it verifies the table's
//! artifacts against its manifest, prepares the target table for the import
//! mode and then feeds the batch files into the pool. Workers read, re-hash,
//! decode and apply each batch in its own transaction. The executor loop
//! receives the producer's phase events and the workers' outcomes on one
//! ordered channel and drives every table to a final state.

use crate::adapters::database::{ApplyOptions, DatabaseClient};
use crate::config::{RetryConfig, TabportConfig};
use crate::core::codec::Format;
use crate::core::import::resolver::{ConflictResolver, ImportMode};
use crate::core::import::summary::{ImportState, ImportSummary, TableImportResult};
use crate::core::manifest::{ArtifactStore, Manifest};
use crate::core::pool::{
    BatchDecision, BatchOutcome, BatchProcessor, BatchResult, JobControl, Policy, PoolOptions,
    Submitter, TableDecision, WorkItem, WorkerPool,
};
use crate::core::verification::checksum::{
    batch_digest, from_hex, to_hex, BatchDigest, ChecksumAccumulator,
};
use crate::domain::{Batch, BatchStatus, Result, RowRange, TableDescriptor, TableFilter, TabportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Resolved settings for one import job
#[derive(Debug, Clone)]
pub struct ImportJobConfig {
    pub input_dir: PathBuf,
    pub workers: usize,
    /// Rows per INSERT statement inside a batch transaction
    pub chunk_size: usize,
    pub mode: ImportMode,
    pub disable_fk: bool,
    pub continue_on_error: bool,
    pub filter: TableFilter,
    pub retry: RetryConfig,
}

impl ImportJobConfig {
    pub fn from_config(config: &TabportConfig) -> Self {
        let import = &config.import;
        Self {
            input_dir: PathBuf::from(&import.input_dir),
            workers: import.parallel_workers.resolve(),
            chunk_size: import.batch_size,
            mode: import.mode,
            disable_fk: import.disable_fk,
            continue_on_error: import.continue_on_error,
            filter: TableFilter::new(import.tables.clone(), import.exclude_tables.clone()),
            retry: config.retry.clone(),
        }
    }
}

/// Work for one import batch
#[derive(Debug, Clone)]
pub struct ImportTask {
    pub table: Arc<TableDescriptor>,
    pub range: RowRange,
    pub format: Format,
    pub compressed: bool,
    /// Digest recorded in the manifest entry
    pub digest: BatchDigest,
    pub rows: u64,
}

/// A batch that is committed in the target table
#[derive(Debug, Clone, Copy)]
pub struct AppliedBatch {
    pub inserted: u64,
    pub skipped: u64,
}

/// Reads, re-hashes, decodes and applies one batch file
struct ImportProcessor {
    db: Arc<dyn DatabaseClient>,
    store: ArtifactStore,
    options: ApplyOptions,
    strict: bool,
}

#[async_trait]
impl BatchProcessor for ImportProcessor {
    type Task = ImportTask;
    type Output = AppliedBatch;

    async fn process(&self, item: &WorkItem<ImportTask>) -> Result<AppliedBatch> {
        let task = &item.task;
        let RowRange::File(file) = &task.range else {
            return Err(TabportError::Configuration(format!(
                "import batch {} of {} is not a file batch",
                item.sequence, item.table
            )));
        };

        let bytes = self.store.read_batch(&item.table, file, task.compressed).await?;
        let digest = batch_digest(&bytes);
        if self.strict && digest != task.digest {
            return Err(TabportError::integrity(
                format!("{}#{}", item.table, item.sequence),
                to_hex(&task.digest),
                to_hex(&digest),
            ));
        }

        let rows = task.format.decode(&bytes)?;
        if rows.len() as u64 != task.rows {
            return Err(TabportError::Serialization(format!(
                "{file} holds {} rows, manifest says {}",
                rows.len(),
                task.rows
            )));
        }

        let outcome = self.db.apply_rows(&task.table, &rows, &self.options).await?;
        tracing::debug!(
            table = %item.table,
            sequence = item.sequence,
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            "Batch applied"
        );

        Ok(AppliedBatch {
            inserted: outcome.inserted,
            skipped: outcome.skipped,
        })
    }
}

enum ImportEvent {
    Phase {
        table: String,
        state: ImportState,
    },
    /// Verification and preparation passed; `batches` are being submitted
    Started {
        table: String,
        batches: usize,
        mismatch: Option<TabportError>,
    },
    /// The table failed before any batch was submitted
    TableFailed { table: String, error: TabportError },
    Batch(BatchOutcome<AppliedBatch>),
}

impl From<BatchOutcome<AppliedBatch>> for ImportEvent {
    fn from(outcome: BatchOutcome<AppliedBatch>) -> Self {
        ImportEvent::Batch(outcome)
    }
}

/// Aggregation state for one table
struct TableProgress {
    state: ImportState,
    result: TableImportResult,
    statuses: Vec<BatchStatus>,
    accounted: usize,
    checksum_ok: bool,
    started: bool,
    failed: bool,
    finished: bool,
}

impl TableProgress {
    fn new(table: &str, max_errors: usize) -> Self {
        Self {
            state: ImportState::Pending,
            result: TableImportResult::new(table, max_errors),
            statuses: Vec::new(),
            accounted: 0,
            checksum_ok: false,
            started: false,
            failed: false,
            finished: false,
        }
    }

    fn transition(&mut self, next: ImportState) {
        let from = self.state;
        match self.state.advance(next) {
            Ok(()) => {
                tracing::debug!(table = %self.result.table, from = %from, to = %next, "Import state changed");
                if next.is_outcome() {
                    self.result.state = next;
                }
            }
            Err(e) => tracing::warn!(table = %self.result.table, error = %e, "Ignoring state change"),
        }
    }
}

/// One import invocation
pub struct ImportJob {
    job_id: Uuid,
    db: Arc<dyn DatabaseClient>,
    config: ImportJobConfig,
    resolver: ConflictResolver,
    control: JobControl,
    policy: Policy,
}

impl ImportJob {
    pub fn new(
        db: Arc<dyn DatabaseClient>,
        config: ImportJobConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let resolver = ConflictResolver::new(config.mode, config.disable_fk, config.chunk_size);
        let policy = Policy::for_import(
            &config.retry,
            config.continue_on_error,
            resolver.verification_is_fatal(),
        );
        Self {
            job_id: Uuid::new_v4(),
            db,
            config,
            resolver,
            control: JobControl::new(shutdown),
            policy,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Execute the import
    ///
    /// # Errors
    ///
    /// Only an unreadable input directory or an invalid configuration is
    /// returned. Everything after that is reported per table.
    pub async fn run(self) -> Result<ImportSummary> {
        let start_time = Instant::now();

        if self.config.chunk_size == 0 {
            return Err(TabportError::Configuration(
                "import batch_size must be greater than zero".to_string(),
            ));
        }

        let store = ArtifactStore::new(&self.config.input_dir);
        let tables = self.enumerate_tables(&store).await?;

        tracing::info!(
            job_id = %self.job_id,
            tables = tables.len(),
            workers = self.config.workers,
            mode = %self.config.mode,
            disable_fk = self.config.disable_fk,
            continue_on_error = self.config.continue_on_error,
            input_dir = %store.root().display(),
            "Starting import"
        );

        let (events_tx, mut events) = mpsc::unbounded_channel::<ImportEvent>();
        let processor = Arc::new(ImportProcessor {
            db: self.db.clone(),
            store: store.clone(),
            options: self.resolver.apply_options(),
            strict: self.resolver.verification_is_fatal(),
        });

        let mut pool = WorkerPool::start(
            processor,
            PoolOptions {
                workers: self.config.workers,
                batch_timeout: Duration::from_secs(self.config.retry.batch_timeout_seconds),
                policy: self.policy.clone(),
            },
            self.control.clone(),
            events_tx.clone(),
        );
        let submitter = pool
            .submitter()
            .ok_or_else(|| TabportError::Cancelled("worker pool closed before start".to_string()))?;
        pool.close();

        let max_errors = self.config.retry.max_recorded_errors;
        let mut progress: HashMap<String, TableProgress> = tables
            .iter()
            .map(|name| (name.clone(), TableProgress::new(name, max_errors)))
            .collect();

        let producer = tokio::spawn(produce(
            self.db.clone(),
            store,
            tables.clone(),
            self.resolver.clone(),
            self.policy.clone(),
            self.control.clone(),
            submitter,
            events_tx,
        ));

        while let Some(event) = events.recv().await {
            match event {
                ImportEvent::Phase { table, state } => {
                    if let Some(entry) = progress.get_mut(&table) {
                        entry.transition(state);
                    }
                }
                ImportEvent::Started {
                    table,
                    batches,
                    mismatch,
                } => {
                    let Some(entry) = progress.get_mut(&table) else {
                        continue;
                    };
                    entry.transition(ImportState::Applying);
                    entry.started = true;
                    entry.statuses = vec![BatchStatus::Pending; batches];
                    entry.checksum_ok = mismatch.is_none();
                    if let Some(error) = mismatch {
                        tracing::warn!(table = %table, error = %error, "Importing table with checksum mismatch");
                        entry.result.errors.record(&error, None);
                    }
                    self.try_finish(entry);
                }
                ImportEvent::TableFailed { table, error } => {
                    let Some(entry) = progress.get_mut(&table) else {
                        continue;
                    };
                    tracing::error!(table = %table, error = %error, "Table import failed");
                    entry.result.errors.record(&error, None);
                    entry.failed = true;
                    entry.finished = true;
                    entry.transition(ImportState::Failed);
                }
                ImportEvent::Batch(outcome) => {
                    let Some(entry) = progress.get_mut(&outcome.table) else {
                        continue;
                    };
                    self.record_outcome(entry, outcome);
                    self.try_finish(entry);
                }
            }
        }

        if let Err(e) = producer.await {
            tracing::error!(error = %e, "Import producer task panicked");
        }
        pool.join().await;

        let mut summary = ImportSummary::new(self.job_id, self.config.mode);
        summary.interrupted = self.control.is_interrupted();
        for name in tables {
            let Some(mut entry) = progress.remove(&name) else {
                continue;
            };
            if !entry.state.is_outcome() {
                entry.result.errors.record(
                    &TabportError::Cancelled("table not imported, job stopped".to_string()),
                    None,
                );
                entry.transition(ImportState::Failed);
            }
            entry.transition(ImportState::Done);
            summary.tables.push(entry.result);
        }

        let summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Tables with a manifest under the input directory, or the explicit
    /// include list when one is given
    async fn enumerate_tables(&self, store: &ArtifactStore) -> Result<Vec<String>> {
        let discovered = store.discover().await?;
        let filter = &self.config.filter;
        let tables = if filter.include.is_empty() {
            discovered
                .into_iter()
                .filter(|name| filter.matches(name))
                .collect()
        } else {
            filter
                .include
                .iter()
                .filter(|name| filter.matches(name))
                .cloned()
                .collect()
        };
        Ok(tables)
    }

    fn record_outcome(&self, entry: &mut TableProgress, outcome: BatchOutcome<AppliedBatch>) {
        let sequence = outcome.sequence;
        if sequence >= entry.statuses.len() {
            tracing::error!(
                table = %outcome.table,
                sequence,
                "Outcome for a batch that was never submitted"
            );
            return;
        }
        entry.accounted += 1;

        match outcome.result {
            BatchResult::Completed(applied) => {
                entry.statuses[sequence] = BatchStatus::Done;
                entry.result.rows_imported += applied.inserted;
                entry.result.rows_skipped += applied.skipped;
                if applied.skipped > 0 {
                    let conflict = TabportError::Conflict(format!(
                        "{} rows already present, skipped",
                        applied.skipped
                    ));
                    entry.result.errors.record(&conflict, Some(sequence));
                }
            }
            BatchResult::Failed { error, decision } => {
                entry.statuses[sequence] = BatchStatus::Failed;
                entry.result.errors.record(&error, Some(sequence));
                if !entry.failed {
                    entry.failed = true;
                    self.on_table_failure(&outcome.table, &error, decision);
                }
            }
            BatchResult::Skipped => {}
        }
    }

    /// Settle the table once every submitted batch is accounted for
    fn try_finish(&self, entry: &mut TableProgress) {
        if entry.finished || !entry.started || entry.accounted < entry.statuses.len() {
            return;
        }
        entry.finished = true;

        let not_applied = entry
            .statuses
            .iter()
            .filter(|s| **s != BatchStatus::Done)
            .count();

        if entry.failed || not_applied > 0 {
            if !entry.failed {
                entry.result.errors.record(
                    &TabportError::Cancelled(format!(
                        "{not_applied} of {} batches not applied",
                        entry.statuses.len()
                    )),
                    None,
                );
            }
            entry.transition(ImportState::Failed);
        } else if entry.checksum_ok {
            entry.result.checksum_verified = true;
            entry.transition(ImportState::Verified);
        } else {
            entry.transition(ImportState::Unverified);
        }

        tracing::info!(
            table = %entry.result.table,
            state = %entry.result.state,
            rows_imported = entry.result.rows_imported,
            rows_skipped = entry.result.rows_skipped,
            "Table import finished"
        );
    }

    fn on_table_failure(&self, table: &str, error: &TabportError, decision: BatchDecision) {
        if decision == BatchDecision::TableFails {
            self.control.stop_table(table);
        }
        if self.policy.on_table_failure(error) == TableDecision::JobAborts {
            tracing::error!(table = %table, "Aborting import job");
            self.control.abort();
        }
    }
}

/// Result of checking a table's files against its manifest
struct Verification {
    manifest: Manifest,
    digests: Vec<BatchDigest>,
    mismatch: Option<TabportError>,
}

/// Read every batch file, compare its digest and recompute the chain
async fn verify_artifacts(store: &ArtifactStore, table: &str) -> Result<Verification> {
    let manifest = store.read_manifest(table).await?;
    let mut accumulator = ChecksumAccumulator::new(manifest.batch_count);
    let mut digests = Vec::with_capacity(manifest.batch_count);
    let mut mismatch = None;

    for entry in &manifest.batches {
        let bytes = store
            .read_batch(table, &entry.file, manifest.compressed)
            .await?;
        let actual = batch_digest(&bytes);
        let expected = from_hex(&entry.digest)?;
        if actual != expected && mismatch.is_none() {
            mismatch = Some(TabportError::integrity(
                format!("{table}#{}", entry.sequence),
                &entry.digest,
                to_hex(&actual),
            ));
        }
        accumulator.record(entry.sequence, actual)?;
        digests.push(expected);
    }

    let checksum = accumulator.finish()?;
    if checksum != manifest.checksum && mismatch.is_none() {
        mismatch = Some(TabportError::integrity(table, &manifest.checksum, checksum));
    }

    Ok(Verification {
        manifest,
        digests,
        mismatch,
    })
}

/// Resolve the target table and check it can hold the exported columns
async fn describe_target(db: &dyn DatabaseClient, manifest: &Manifest) -> Result<TableDescriptor> {
    let target = db.describe_table(&manifest.table).await?.ok_or_else(|| {
        TabportError::Configuration(format!("target table '{}' does not exist", manifest.table))
    })?;

    let missing: Vec<&str> = manifest
        .columns
        .iter()
        .filter(|c| target.column(c).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(TabportError::Configuration(format!(
            "target table '{}' has no column(s) {}",
            manifest.table,
            missing.join(", ")
        )));
    }
    Ok(target)
}

/// Verify, prepare and submit each table in turn
async fn produce(
    db: Arc<dyn DatabaseClient>,
    store: ArtifactStore,
    tables: Vec<String>,
    resolver: ConflictResolver,
    policy: Policy,
    control: JobControl,
    submitter: Submitter<ImportTask>,
    events: mpsc::UnboundedSender<ImportEvent>,
) {
    // Stop the job before the next table is looked at, not when the
    // executor loop gets to the event
    let fail = |table: &str, error: TabportError, fatal: bool| {
        control.stop_table(table);
        if fatal || policy.on_table_failure(&error) == TableDecision::JobAborts {
            tracing::error!(table = %table, "Aborting import job");
            control.abort();
        }
        let _ = events.send(ImportEvent::TableFailed {
            table: table.to_string(),
            error,
        });
    };
    let phase = |table: &str, state: ImportState| {
        let _ = events.send(ImportEvent::Phase {
            table: table.to_string(),
            state,
        });
    };

    for table in tables {
        if control.is_job_stopped() {
            tracing::info!(table = %table, "Import stopped before table was started");
            continue;
        }

        phase(&table, ImportState::Verifying);
        let verification = match verify_artifacts(&store, &table).await {
            Ok(v) => v,
            Err(error) => {
                fail(&table, error, false);
                continue;
            }
        };
        if let Some(error) = &verification.mismatch {
            if resolver.verification_is_fatal() {
                fail(&table, error.clone(), false);
                continue;
            }
        }

        let target = match describe_target(db.as_ref(), &verification.manifest).await {
            Ok(target) => Arc::new(target),
            Err(error) => {
                fail(&table, error, false);
                continue;
            }
        };

        if control.is_job_stopped() {
            continue;
        }
        phase(&table, ImportState::Preparing);
        if let Err(error) = resolver.prepare(db.as_ref(), &target).await {
            fail(&table, error, true);
            continue;
        }

        let Verification {
            manifest,
            digests,
            mismatch,
        } = verification;
        if events
            .send(ImportEvent::Started {
                table: table.clone(),
                batches: manifest.batches.len(),
                mismatch,
            })
            .is_err()
        {
            return;
        }

        for (entry, digest) in manifest.batches.into_iter().zip(digests) {
            let batch = Batch::new(&table, entry.sequence, RowRange::File(entry.file));
            if control.should_skip(&table) {
                let _ = events.send(ImportEvent::Batch(BatchOutcome::skipped(
                    batch.table,
                    batch.sequence,
                )));
                continue;
            }

            let item = WorkItem {
                table: batch.table.clone(),
                sequence: batch.sequence,
                task: ImportTask {
                    table: target.clone(),
                    range: batch.range,
                    format: manifest.format,
                    compressed: manifest.compressed,
                    digest,
                    rows: entry.rows,
                },
            };
            if submitter.submit(item).await.is_err() {
                let _ = events.send(ImportEvent::Batch(BatchOutcome::skipped(
                    batch.table,
                    batch.sequence,
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDatabase;
    use crate::core::export::{ExportJob, ExportJobConfig};
    use crate::domain::{Column, ErrorClass, Value};
    use tempfile::TempDir;

    fn users() -> TableDescriptor {
        TableDescriptor::new(
            "users",
            vec![Column::new("id", "int8"), Column::new("email", "text")],
            vec!["id".to_string()],
        )
    }

    fn user_rows(range: std::ops::RangeInclusive<i64>) -> Vec<Vec<Value>> {
        range
            .map(|i| vec![Value::Int(i), Value::Text(format!("u{i}@example.com"))])
            .collect()
    }

    async fn export_users(dir: &TempDir, rows: i64) {
        let source = MemoryDatabase::new("source");
        source.create_table(users());
        source.insert_rows("users", user_rows(1..=rows)).unwrap();

        let config = ExportJobConfig {
            output_dir: dir.path().to_path_buf(),
            format: Format::Csv,
            batch_size: 10,
            workers: 3,
            compress: false,
            filter: TableFilter::default(),
            where_clause: None,
            query: None,
            retry: RetryConfig::default(),
        };
        let (_tx, rx) = watch::channel(false);
        let summary = ExportJob::new(Arc::new(source), config, rx).run().await.unwrap();
        assert!(summary.is_successful());
    }

    fn target() -> Arc<MemoryDatabase> {
        let db = MemoryDatabase::new("target");
        db.create_table(users());
        Arc::new(db)
    }

    fn job_config(dir: &TempDir, mode: ImportMode) -> ImportJobConfig {
        ImportJobConfig {
            input_dir: dir.path().to_path_buf(),
            workers: 4,
            chunk_size: 7,
            mode,
            disable_fk: false,
            continue_on_error: false,
            filter: TableFilter::default(),
            retry: RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
        }
    }

    async fn import(db: Arc<MemoryDatabase>, config: ImportJobConfig) -> ImportSummary {
        let (_tx, rx) = watch::channel(false);
        ImportJob::new(db, config, rx).run().await.unwrap()
    }

    async fn corrupt_first_batch(dir: &TempDir) {
        let path = dir.path().join("users").join("users.000000.csv");
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        tokio::fs::write(&path, text.replacen("example.com", "exbmple.com", 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_is_verified() {
        let dir = TempDir::new().unwrap();
        export_users(&dir, 25).await;
        let db = target();

        let summary = import(db.clone(), job_config(&dir, ImportMode::Skip)).await;
        let users = summary.table("users").unwrap();
        assert_eq!(users.state, ImportState::Verified);
        assert!(users.checksum_verified);
        assert_eq!(users.rows_imported, 25);
        assert_eq!(db.rows("users").unwrap(), user_rows(1..=25));
    }

    #[tokio::test]
    async fn test_skip_counts_collisions_as_conflicts() {
        let dir = TempDir::new().unwrap();
        export_users(&dir, 25).await;
        let db = target();
        db.insert_rows("users", user_rows(5..=5)).unwrap();

        let summary = import(db.clone(), job_config(&dir, ImportMode::Skip)).await;
        let users = summary.table("users").unwrap();
        assert_eq!(users.state, ImportState::Verified);
        assert_eq!(users.rows_imported, 24);
        assert_eq!(users.rows_skipped, 1);
        assert_eq!(users.errors.count_class(ErrorClass::Conflict), 1);
        assert_eq!(db.row_count("users"), 25);
    }

    #[tokio::test]
    async fn test_truncate_replaces_existing_rows() {
        let dir = TempDir::new().unwrap();
        export_users(&dir, 25).await;
        let db = target();
        db.insert_rows("users", user_rows(1000..=1009)).unwrap();

        let summary = import(db.clone(), job_config(&dir, ImportMode::Truncate)).await;
        assert!(summary.is_successful());
        assert_eq!(db.row_count("users"), 25);
    }

    #[tokio::test]
    async fn test_corrupt_batch_under_cancel_writes_nothing() {
        let dir = TempDir::new().unwrap();
        export_users(&dir, 25).await;
        corrupt_first_batch(&dir).await;
        let db = target();

        let summary = import(db.clone(), job_config(&dir, ImportMode::Cancel)).await;
        let users = summary.table("users").unwrap();
        assert_eq!(users.state, ImportState::Failed);
        assert_eq!(users.errors.count_class(ErrorClass::Integrity), 1);
        assert_eq!(users.rows_imported, 0);
        assert_eq!(db.row_count("users"), 0);
    }

    #[tokio::test]
    async fn test_corrupt_batch_under_skip_is_unverified() {
        let dir = TempDir::new().unwrap();
        export_users(&dir, 25).await;
        corrupt_first_batch(&dir).await;
        let db = target();

        let summary = import(db.clone(), job_config(&dir, ImportMode::Skip)).await;
        let users = summary.table("users").unwrap();
        assert_eq!(users.state, ImportState::Unverified);
        assert!(!users.checksum_verified);
        assert_eq!(users.rows_imported, 25);
        assert!(summary.is_successful());
    }

    #[tokio::test]
    async fn test_included_table_without_manifest_fails() {
        let dir = TempDir::new().unwrap();
        export_users(&dir, 5).await;
        let mut config = job_config(&dir, ImportMode::Skip);
        config.filter = TableFilter::new(vec!["users".to_string(), "ghost".to_string()], vec![]);
        config.continue_on_error = true;

        let summary = import(target(), config).await;
        assert_eq!(summary.table("users").unwrap().state, ImportState::Verified);
        let ghost = summary.table("ghost").unwrap();
        assert_eq!(ghost.state, ImportState::Failed);
        assert_eq!(ghost.errors.count_class(ErrorClass::Configuration), 1);
    }

    #[tokio::test]
    async fn test_missing_input_dir_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let mut config = job_config(&dir, ImportMode::Skip);
        config.input_dir = dir.path().join("nope");

        let (_tx, rx) = watch::channel(false);
        let err = ImportJob::new(target(), config, rx).run().await.unwrap_err();
        assert!(matches!(err, TabportError::Configuration(_)));
    }
}
