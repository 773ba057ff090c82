//! Database abstraction traits
//!
//! This module defines the trait that database adapters must implement
//! to work with Tabport. The pipeline only ever talks to a
//! `dyn DatabaseClient`; connection setup stays inside the adapters.

use crate::domain::{Result, RowRange, RowSet, TableDescriptor, Value};
use async_trait::async_trait;

/// How a write treats rows whose primary key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the existing row and count the incoming one as skipped
    Skip,
    /// Overwrite the existing row (upsert on the primary key)
    Replace,
    /// Fail the whole write with a conflict error
    Fail,
}

/// Options for applying one batch of rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub on_conflict: OnConflict,

    /// Suspend foreign-key enforcement for the duration of the write
    pub disable_fk: bool,

    /// Rows per INSERT statement inside the batch transaction
    pub chunk_size: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            on_conflict: OnConflict::Fail,
            disable_fk: false,
            chunk_size: 1000,
        }
    }
}

/// Result of applying one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Rows written (inserted or replaced)
    pub inserted: u64,

    /// Rows left out because their key already existed
    pub skipped: u64,
}

/// Database client trait for table export and import
///
/// All writes made by [`apply_rows`](Self::apply_rows) for one call are
/// atomic: either every row of the batch is committed or none is.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Test the database connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// List the user tables with column and primary-key metadata
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>>;

    /// Describe one table, `None` if it does not exist
    async fn describe_table(&self, name: &str) -> Result<Option<TableDescriptor>>;

    /// Count the rows matching an optional WHERE predicate
    async fn count_rows(&self, table: &TableDescriptor, filter: Option<&str>) -> Result<u64>;

    /// Key of every `batch_size`-th row in primary-key order
    ///
    /// The first entry is the smallest key. An empty result means the
    /// (filtered) table is empty.
    async fn key_boundaries(
        &self,
        table: &TableDescriptor,
        filter: Option<&str>,
        batch_size: usize,
    ) -> Result<Vec<Vec<Value>>>;

    /// Fetch the rows of one batch
    ///
    /// Rows come back in a deterministic order: key order for key ranges,
    /// all-column order for offset ranges. `RowRange::File` is not a
    /// database range and is rejected.
    async fn fetch_rows(
        &self,
        table: &TableDescriptor,
        range: &RowRange,
        filter: Option<&str>,
    ) -> Result<RowSet>;

    /// Remove every row from a table
    ///
    /// With `disable_fk` the removal ignores foreign keys that reference the
    /// table. The relaxation ends with the call.
    async fn truncate_table(&self, table: &TableDescriptor, disable_fk: bool) -> Result<()>;

    /// Write a batch of rows in one transaction
    async fn apply_rows(
        &self,
        table: &TableDescriptor,
        rows: &RowSet,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome>;

    /// Get the database name
    fn database_name(&self) -> &str;
}
