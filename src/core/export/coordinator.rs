//! Export coordinator - main orchestrator for the export process
//!
//! A producer task enumerates and plans the tables, one at a time, and feeds
//! their batches into the job's worker pool. Workers fetch, encode and write
//! batch files. The coordinator loop receives the producer's plan events and
//! the workers' outcomes on one ordered channel, folds each table's batch
//! digests into its checksum, and writes the manifest once every planned
//! batch of the table has been accounted for.

use crate::adapters::database::DatabaseClient;
use crate::config::{RetryConfig, TabportConfig};
use crate::core::codec::Format;
use crate::core::export::summary::{ExportSummary, ExportTableState, TableExportResult};
use crate::core::manifest::{ArtifactStore, BatchEntry, Manifest, TOOL_VERSION};
use crate::core::plan::{plan_table, PlanRequest};
use crate::core::pool::{
    BatchOutcome, BatchProcessor, BatchResult, JobControl, Policy, PoolOptions, Submitter,
    TableDecision, WorkItem, WorkerPool,
};
use crate::core::verification::checksum::{batch_digest, to_hex, BatchDigest, ChecksumAccumulator};
use crate::domain::{BatchStatus, Result, RowRange, TableDescriptor, TableFilter, TabportError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Resolved settings for one export job
#[derive(Debug, Clone)]
pub struct ExportJobConfig {
    pub output_dir: PathBuf,
    pub format: Format,
    pub batch_size: usize,
    pub workers: usize,
    pub compress: bool,
    pub filter: TableFilter,
    pub where_clause: Option<String>,
    /// Custom query, exported under the single name in `filter.include`
    pub query: Option<String>,
    pub retry: RetryConfig,
}

impl ExportJobConfig {
    pub fn from_config(config: &TabportConfig) -> Self {
        let export = &config.export;
        Self {
            output_dir: PathBuf::from(&export.output_dir),
            format: export.format,
            batch_size: export.batch_size,
            workers: export.parallel_workers.resolve(),
            compress: export.compress,
            filter: TableFilter::new(export.tables.clone(), export.exclude_tables.clone()),
            where_clause: export.where_clause.clone(),
            query: export.query.clone(),
            retry: config.retry.clone(),
        }
    }
}

/// Work for one export batch
#[derive(Debug, Clone)]
pub struct ExportTask {
    pub table: Arc<TableDescriptor>,
    pub range: RowRange,
}

/// A batch file that is safely on disk
#[derive(Debug, Clone)]
pub struct ExportedBatch {
    pub rows: u64,
    pub file: String,
    pub digest: BatchDigest,
    pub columns: Vec<String>,
}

/// Fetches, encodes and writes one batch
struct ExportProcessor {
    db: Arc<dyn DatabaseClient>,
    store: ArtifactStore,
    format: Format,
    compress: bool,
    where_clause: Option<String>,
}

#[async_trait]
impl BatchProcessor for ExportProcessor {
    type Task = ExportTask;
    type Output = ExportedBatch;

    async fn process(&self, item: &WorkItem<ExportTask>) -> Result<ExportedBatch> {
        let table = &item.task.table;
        let rows = self
            .db
            .fetch_rows(table, &item.task.range, self.where_clause.as_deref())
            .await?;

        let bytes = self.format.encode(&table.name, &rows)?;
        let digest = batch_digest(&bytes);
        let file =
            ArtifactStore::batch_file_name(&table.name, item.sequence, self.format, self.compress);
        let written = self
            .store
            .write_batch(&table.name, &file, &bytes, self.compress)
            .await?;

        tracing::debug!(
            table = %table.name,
            sequence = item.sequence,
            rows = rows.len(),
            bytes = written,
            "Batch written"
        );

        Ok(ExportedBatch {
            rows: rows.len() as u64,
            file,
            digest,
            columns: rows.columns,
        })
    }
}

enum ExportEvent {
    Planned { table: String, batches: usize },
    PlanFailed { table: String, error: TabportError },
    Batch(BatchOutcome<ExportedBatch>),
}

impl From<BatchOutcome<ExportedBatch>> for ExportEvent {
    fn from(outcome: BatchOutcome<ExportedBatch>) -> Self {
        ExportEvent::Batch(outcome)
    }
}

/// Aggregation state for one table
struct TableProgress {
    descriptor: Arc<TableDescriptor>,
    result: TableExportResult,
    statuses: Vec<BatchStatus>,
    accounted: usize,
    accumulator: ChecksumAccumulator,
    entries: BTreeMap<usize, BatchEntry>,
    columns: Option<Vec<String>>,
    planned: bool,
    finished: bool,
}

impl TableProgress {
    fn new(descriptor: Arc<TableDescriptor>, max_errors: usize) -> Self {
        Self {
            result: TableExportResult::new(&descriptor.name, max_errors),
            descriptor,
            statuses: Vec::new(),
            accounted: 0,
            accumulator: ChecksumAccumulator::new(0),
            entries: BTreeMap::new(),
            columns: None,
            planned: false,
            finished: false,
        }
    }

    fn is_failed(&self) -> bool {
        self.statuses.contains(&BatchStatus::Failed) || !self.result.errors.is_empty()
    }
}

/// One export invocation
pub struct ExportJob {
    job_id: Uuid,
    db: Arc<dyn DatabaseClient>,
    config: ExportJobConfig,
    control: JobControl,
    policy: Policy,
}

impl ExportJob {
    pub fn new(
        db: Arc<dyn DatabaseClient>,
        config: ExportJobConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let policy = Policy::for_export(&config.retry);
        Self {
            job_id: Uuid::new_v4(),
            db,
            config,
            control: JobControl::new(shutdown),
            policy,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Execute the export
    ///
    /// # Errors
    ///
    /// Only errors raised before any batch runs are returned: an invalid
    /// configuration, a failed table listing or an unusable output
    /// directory. Failures after that are reported per table in the summary.
    pub async fn run(self) -> Result<ExportSummary> {
        let start_time = Instant::now();

        if self.config.batch_size == 0 {
            return Err(TabportError::Configuration(
                "batch_size must be greater than zero".to_string(),
            ));
        }

        let tables = self.enumerate_tables().await?;
        let store = ArtifactStore::new(&self.config.output_dir);
        tokio::fs::create_dir_all(store.root()).await.map_err(|e| {
            TabportError::Configuration(format!(
                "cannot create output directory {}: {e}",
                store.root().display()
            ))
        })?;

        tracing::info!(
            job_id = %self.job_id,
            tables = tables.len(),
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            format = %self.config.format,
            compress = self.config.compress,
            output_dir = %store.root().display(),
            "Starting export"
        );

        let (events_tx, mut events) = mpsc::unbounded_channel::<ExportEvent>();
        let processor = Arc::new(ExportProcessor {
            db: self.db.clone(),
            store: store.clone(),
            format: self.config.format,
            compress: self.config.compress,
            where_clause: self.config.where_clause.clone(),
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
        let mut order = Vec::with_capacity(tables.len());
        let mut progress: HashMap<String, TableProgress> = HashMap::new();
        for table in &tables {
            order.push(table.name.clone());
            progress.insert(
                table.name.clone(),
                TableProgress::new(table.clone(), max_errors),
            );
        }

        let producer = tokio::spawn(produce(
            self.db.clone(),
            store.clone(),
            tables,
            self.config.clone(),
            self.control.clone(),
            submitter,
            events_tx,
        ));

        while let Some(event) = events.recv().await {
            match event {
                ExportEvent::Planned { table, batches } => {
                    let Some(entry) = progress.get_mut(&table) else {
                        continue;
                    };
                    entry.planned = true;
                    entry.statuses = vec![BatchStatus::Pending; batches];
                    entry.accumulator = ChecksumAccumulator::new(batches);
                    tracing::info!(table = %table, batches, "Table planned");
                    self.try_finish(entry, &store).await;
                }
                ExportEvent::PlanFailed { table, error } => {
                    let Some(entry) = progress.get_mut(&table) else {
                        continue;
                    };
                    tracing::error!(table = %table, error = %error, "Failed to plan table");
                    entry.result.errors.record(&error, None);
                    entry.result.state = ExportTableState::Failed;
                    entry.finished = true;
                    self.on_table_failure(&table, &error);
                }
                ExportEvent::Batch(outcome) => {
                    let Some(entry) = progress.get_mut(&outcome.table) else {
                        continue;
                    };
                    self.record_outcome(entry, outcome);
                    self.try_finish(entry, &store).await;
                }
            }
        }

        if let Err(e) = producer.await {
            tracing::error!(error = %e, "Export producer task panicked");
        }
        pool.join().await;

        let mut summary = ExportSummary::new(self.job_id);
        summary.interrupted = self.control.is_interrupted();
        for name in order {
            if let Some(entry) = progress.remove(&name) {
                summary.tables.push(entry.result);
            }
        }

        let summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    async fn enumerate_tables(&self) -> Result<Vec<Arc<TableDescriptor>>> {
        if self.config.query.is_some() {
            let [name] = self.config.filter.include.as_slice() else {
                return Err(TabportError::Configuration(
                    "a custom query requires exactly one table name".to_string(),
                ));
            };
            let descriptor = self
                .db
                .describe_table(name)
                .await?
                .unwrap_or_else(|| TableDescriptor::new(name.clone(), Vec::new(), Vec::new()));
            return Ok(vec![Arc::new(descriptor)]);
        }

        let all = self.db.list_tables().await?;
        let missing: Vec<&String> = self
            .config
            .filter
            .include
            .iter()
            .filter(|name| !all.iter().any(|t| &t.name == *name))
            .collect();
        if !missing.is_empty() {
            return Err(TabportError::Configuration(format!(
                "tables not found: {}",
                missing
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let tables = self.config.filter.apply(all);
        for table in &tables {
            // Table names become directory names
            ArtifactStore::new(&self.config.output_dir).table_dir(&table.name)?;
        }
        Ok(tables.into_iter().map(Arc::new).collect())
    }

    fn record_outcome(&self, entry: &mut TableProgress, outcome: BatchOutcome<ExportedBatch>) {
        let sequence = outcome.sequence;
        if sequence >= entry.statuses.len() {
            tracing::error!(
                table = %outcome.table,
                sequence,
                "Outcome for a batch that was never planned"
            );
            return;
        }
        entry.accounted += 1;

        match outcome.result {
            BatchResult::Completed(batch) => {
                if let Err(e) = entry.accumulator.record(sequence, batch.digest) {
                    entry.result.errors.record(&e, Some(sequence));
                    entry.statuses[sequence] = BatchStatus::Failed;
                    return;
                }
                entry.statuses[sequence] = BatchStatus::Done;
                entry.result.rows += batch.rows;
                entry.result.batches += 1;
                if entry.columns.is_none() || sequence == 0 {
                    entry.columns = Some(batch.columns);
                }
                entry.entries.insert(
                    sequence,
                    BatchEntry {
                        sequence,
                        rows: batch.rows,
                        file: batch.file,
                        digest: to_hex(&batch.digest),
                    },
                );
            }
            BatchResult::Failed { error, .. } => {
                let first_failure = !entry.is_failed();
                entry.statuses[sequence] = BatchStatus::Failed;
                entry.result.errors.record(&error, Some(sequence));
                if first_failure {
                    self.on_table_failure(&outcome.table, &error);
                }
            }
            BatchResult::Skipped => {}
        }
    }

    /// Write the manifest once every planned batch is accounted for
    async fn try_finish(&self, entry: &mut TableProgress, store: &ArtifactStore) {
        if entry.finished || !entry.planned || entry.accounted < entry.statuses.len() {
            return;
        }
        entry.finished = true;
        let table = entry.descriptor.name.clone();

        if entry.is_failed() {
            entry.result.state = ExportTableState::Failed;
            return;
        }
        if !entry.accumulator.is_complete() {
            tracing::warn!(
                table = %table,
                missing = entry.accumulator.missing().len(),
                "Table stopped before all batches ran"
            );
            entry.result.state = ExportTableState::Cancelled;
            return;
        }

        // An empty table hashes to the checksum of the empty input
        let manifest = entry.accumulator.finish().map(|checksum| Manifest {
            table: table.clone(),
            format: self.config.format,
            compressed: self.config.compress,
            row_count: entry.result.rows,
            batch_count: entry.statuses.len(),
            checksum,
            created_at: Utc::now(),
            columns: entry
                .columns
                .take()
                .unwrap_or_else(|| entry.descriptor.column_names()),
            batches: std::mem::take(&mut entry.entries).into_values().collect(),
            where_clause: self.config.where_clause.clone(),
            query: self.config.query.clone(),
            tool_version: TOOL_VERSION.to_string(),
        });

        let written = match manifest {
            Ok(manifest) => store
                .write_manifest(&manifest)
                .await
                .map(|path| (path, manifest.checksum)),
            Err(e) => Err(e),
        };

        match written {
            Ok((path, checksum)) => {
                tracing::info!(
                    table = %table,
                    rows = entry.result.rows,
                    batches = entry.result.batches,
                    checksum = %checksum,
                    "Table exported"
                );
                entry.result.state = ExportTableState::Completed;
                entry.result.checksum = Some(checksum);
                entry.result.manifest_path = Some(path);
            }
            Err(error) => {
                tracing::error!(table = %table, error = %error, "Failed to write manifest");
                entry.result.errors.record(&error, None);
                entry.result.state = ExportTableState::Failed;
                self.on_table_failure(&table, &error);
            }
        }
    }

    fn on_table_failure(&self, table: &str, error: &TabportError) {
        self.control.stop_table(table);
        if self.policy.on_table_failure(error) == TableDecision::JobAborts {
            tracing::error!(table = %table, "Aborting export job");
            self.control.abort();
        }
    }
}

/// Plan each table in turn and feed its batches to the pool
async fn produce(
    db: Arc<dyn DatabaseClient>,
    store: ArtifactStore,
    tables: Vec<Arc<TableDescriptor>>,
    config: ExportJobConfig,
    control: JobControl,
    submitter: Submitter<ExportTask>,
    events: mpsc::UnboundedSender<ExportEvent>,
) {
    for table in tables {
        if control.is_job_stopped() {
            tracing::info!(table = %table.name, "Export stopped before table was planned");
            continue;
        }

        let planned = async {
            store.prepare_table_dir(&table.name).await?;
            plan_table(
                db.as_ref(),
                PlanRequest {
                    table: &table,
                    batch_size: config.batch_size,
                    filter: config.where_clause.as_deref(),
                    query: config.query.as_deref(),
                },
            )
            .await
        }
        .await;

        let batches = match planned {
            Ok(batches) => batches,
            Err(error) => {
                let _ = events.send(ExportEvent::PlanFailed {
                    table: table.name.clone(),
                    error,
                });
                continue;
            }
        };

        if events
            .send(ExportEvent::Planned {
                table: table.name.clone(),
                batches: batches.len(),
            })
            .is_err()
        {
            return;
        }

        for batch in batches {
            if control.should_skip(&table.name) {
                let _ = events.send(ExportEvent::Batch(BatchOutcome::skipped(
                    batch.table,
                    batch.sequence,
                )));
                continue;
            }

            let item = WorkItem {
                table: batch.table.clone(),
                sequence: batch.sequence,
                task: ExportTask {
                    table: table.clone(),
                    range: batch.range,
                },
            };
            if submitter.submit(item).await.is_err() {
                let _ = events.send(ExportEvent::Batch(BatchOutcome::skipped(
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
    use crate::core::verification::checksum::EMPTY_TABLE_CHECKSUM;
    use crate::domain::{Column, Value};
    use tempfile::TempDir;

    fn database(rows: i64) -> Arc<MemoryDatabase> {
        let db = MemoryDatabase::new("test");
        db.create_table(TableDescriptor::new(
            "users",
            vec![Column::new("id", "int8"), Column::new("email", "text")],
            vec!["id".to_string()],
        ));
        db.create_table(TableDescriptor::new(
            "empty",
            vec![Column::new("id", "int8")],
            vec!["id".to_string()],
        ));
        db.insert_rows(
            "users",
            (1..=rows)
                .map(|i| vec![Value::Int(i), Value::Text(format!("u{i}@example.com"))])
                .collect(),
        )
        .unwrap();
        Arc::new(db)
    }

    fn job_config(dir: &TempDir, workers: usize) -> ExportJobConfig {
        ExportJobConfig {
            output_dir: dir.path().to_path_buf(),
            format: Format::Csv,
            batch_size: 10,
            workers,
            compress: false,
            filter: TableFilter::default(),
            where_clause: None,
            query: None,
            retry: RetryConfig::default(),
        }
    }

    async fn export(db: Arc<MemoryDatabase>, config: ExportJobConfig) -> ExportSummary {
        let (_tx, rx) = watch::channel(false);
        ExportJob::new(db, config, rx).run().await.unwrap()
    }

    #[tokio::test]
    async fn test_export_writes_manifest_per_table() {
        let dir = TempDir::new().unwrap();
        let summary = export(database(25), job_config(&dir, 4)).await;

        assert!(summary.is_successful());
        let users = summary.table("users").unwrap();
        assert_eq!(users.rows, 25);
        assert_eq!(users.batches, 3);

        let manifest = ArtifactStore::new(dir.path())
            .read_manifest("users")
            .await
            .unwrap();
        assert_eq!(manifest.row_count, 25);
        assert_eq!(
            manifest.batches.iter().map(|b| b.rows).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
        assert_eq!(manifest.columns, vec!["id", "email"]);
    }

    #[tokio::test]
    async fn test_empty_table_gets_empty_checksum() {
        let dir = TempDir::new().unwrap();
        let summary = export(database(3), job_config(&dir, 2)).await;

        let empty = summary.table("empty").unwrap();
        assert_eq!(empty.state, ExportTableState::Completed);
        assert_eq!(empty.checksum.as_deref(), Some(EMPTY_TABLE_CHECKSUM));
    }

    #[tokio::test]
    async fn test_unknown_included_table_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let mut config = job_config(&dir, 2);
        config.filter = TableFilter::new(vec!["ghost".to_string()], vec![]);

        let (_tx, rx) = watch::channel(false);
        let err = ExportJob::new(database(1), config, rx).run().await.unwrap_err();
        assert!(matches!(err, TabportError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_custom_query_is_single_batch() {
        let dir = TempDir::new().unwrap();
        let mut config = job_config(&dir, 2);
        config.filter = TableFilter::new(vec!["recent_users".to_string()], vec![]);
        config.query = Some("SELECT * FROM users WHERE id > 20".to_string());

        let summary = export(database(25), config).await;
        let recent = summary.table("recent_users").unwrap();
        assert_eq!(recent.state, ExportTableState::Completed);
        assert_eq!(recent.rows, 5);
        assert_eq!(recent.batches, 1);
    }

    #[tokio::test]
    async fn test_interrupted_export_plans_nothing() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let summary = ExportJob::new(database(25), job_config(&dir, 2), rx)
            .run()
            .await
            .unwrap();
        assert!(summary.interrupted);
        assert!(!summary.is_successful());
        assert!(summary
            .tables
            .iter()
            .all(|t| t.state == ExportTableState::Cancelled));
    }
}
