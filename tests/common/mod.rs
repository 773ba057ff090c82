//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tabport::adapters::database::{ApplyOptions, ApplyOutcome, DatabaseClient};
use tabport::adapters::memory::MemoryDatabase;
use tabport::config::RetryConfig;
use tabport::core::codec::Format;
use tabport::core::export::{ExportJob, ExportJobConfig, ExportSummary};
use tabport::core::import::{ImportJob, ImportJobConfig, ImportMode, ImportSummary};
use tabport::domain::{Column, Result, RowRange, RowSet, TableDescriptor, TableFilter, TabportError, Value};
use tokio::sync::watch;

pub fn users_table() -> TableDescriptor {
    TableDescriptor::new(
        "users",
        vec![
            Column::new("id", "int8"),
            Column::new("email", "text"),
            Column::new("score", "float8"),
            Column::new("active", "bool"),
        ],
        vec!["id".to_string()],
    )
}

pub fn orders_table() -> TableDescriptor {
    TableDescriptor::new(
        "orders",
        vec![
            Column::new("id", "int8"),
            Column::new("user_id", "int8"),
            Column::new("note", "text"),
        ],
        vec!["id".to_string()],
    )
}

pub fn user_row(id: i64) -> Vec<Value> {
    let email: String = SafeEmail().fake();
    vec![
        Value::Int(id),
        if id % 7 == 0 {
            Value::Null
        } else {
            Value::Text(email)
        },
        Value::Float(id as f64 * 0.25),
        Value::Bool(id % 2 == 0),
    ]
}

pub fn order_row(id: i64) -> Vec<Value> {
    vec![
        Value::Int(id),
        Value::Int(id % 50 + 1),
        Value::Text(format!("order \"{id}\", line\nbreak")),
    ]
}

/// A source database with `users` and `orders`
pub fn source_database(users: i64, orders: i64) -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new("source");
    db.create_table(users_table());
    db.create_table(orders_table());
    db.insert_rows("users", (1..=users).map(user_row).collect())
        .unwrap();
    db.insert_rows("orders", (1..=orders).map(order_row).collect())
        .unwrap();
    Arc::new(db)
}

/// An empty target with the same schema
pub fn target_database() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new("target");
    db.create_table(users_table());
    db.create_table(orders_table());
    Arc::new(db)
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        ..Default::default()
    }
}

pub fn export_config(dir: &Path, format: Format, batch_size: usize, workers: usize) -> ExportJobConfig {
    ExportJobConfig {
        output_dir: dir.to_path_buf(),
        format,
        batch_size,
        workers,
        compress: false,
        filter: TableFilter::default(),
        where_clause: None,
        query: None,
        retry: fast_retry(),
    }
}

pub fn import_config(dir: &Path, mode: ImportMode) -> ImportJobConfig {
    ImportJobConfig {
        input_dir: dir.to_path_buf(),
        workers: 4,
        chunk_size: 100,
        mode,
        disable_fk: false,
        continue_on_error: false,
        filter: TableFilter::default(),
        retry: fast_retry(),
    }
}

pub async fn run_export(db: Arc<dyn DatabaseClient>, config: ExportJobConfig) -> ExportSummary {
    let (_tx, rx) = watch::channel(false);
    ExportJob::new(db, config, rx).run().await.unwrap()
}

pub async fn run_import(db: Arc<dyn DatabaseClient>, config: ImportJobConfig) -> ImportSummary {
    let (_tx, rx) = watch::channel(false);
    ImportJob::new(db, config, rx).run().await.unwrap()
}

/// Which call a [`FaultyDatabase`] breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Fetch,
    Apply,
    Truncate,
}

/// Wraps a [`MemoryDatabase`] and fails the first `failures` calls of one
/// kind for one table
pub struct FaultyDatabase {
    pub inner: Arc<MemoryDatabase>,
    point: FaultPoint,
    table: String,
    error: TabportError,
    remaining: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FaultyDatabase {
    pub fn new(
        inner: Arc<MemoryDatabase>,
        point: FaultPoint,
        table: &str,
        failures: usize,
        error: TabportError,
    ) -> Self {
        Self {
            inner,
            point,
            table: table.to_string(),
            error,
            remaining: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    fn check(&self, point: FaultPoint, table: &str) -> Result<()> {
        if point != self.point || table != self.table {
            return Ok(());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DatabaseClient for FaultyDatabase {
    async fn test_connection(&self) -> Result<()> {
        self.inner.test_connection().await
    }

    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        self.inner.list_tables().await
    }

    async fn describe_table(&self, name: &str) -> Result<Option<TableDescriptor>> {
        self.inner.describe_table(name).await
    }

    async fn count_rows(&self, table: &TableDescriptor, filter: Option<&str>) -> Result<u64> {
        self.inner.count_rows(table, filter).await
    }

    async fn key_boundaries(
        &self,
        table: &TableDescriptor,
        filter: Option<&str>,
        batch_size: usize,
    ) -> Result<Vec<Vec<Value>>> {
        self.inner.key_boundaries(table, filter, batch_size).await
    }

    async fn fetch_rows(
        &self,
        table: &TableDescriptor,
        range: &RowRange,
        filter: Option<&str>,
    ) -> Result<RowSet> {
        self.check(FaultPoint::Fetch, &table.name)?;
        self.inner.fetch_rows(table, range, filter).await
    }

    async fn truncate_table(&self, table: &TableDescriptor, disable_fk: bool) -> Result<()> {
        self.check(FaultPoint::Truncate, &table.name)?;
        self.inner.truncate_table(table, disable_fk).await
    }

    async fn apply_rows(
        &self,
        table: &TableDescriptor,
        rows: &RowSet,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome> {
        self.check(FaultPoint::Apply, &table.name)?;
        self.inner.apply_rows(table, rows, options).await
    }

    fn database_name(&self) -> &str {
        self.inner.database_name()
    }
}
