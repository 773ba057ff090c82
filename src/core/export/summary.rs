//! Export summary and reporting
//!
//! This module defines structures for tracking and reporting export results.

use crate::core::report::RecordedErrors;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Final state of one exported table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTableState {
    /// Every batch written and the manifest is in place
    Completed,
    /// A batch, the plan or the manifest failed
    Failed,
    /// Stopped before all batches ran, without a failure of its own
    Cancelled,
}

impl std::fmt::Display for ExportTableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExportTableState::Completed => "completed",
            ExportTableState::Failed => "failed",
            ExportTableState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Result for one table
#[derive(Debug, Clone)]
pub struct TableExportResult {
    pub table: String,
    pub state: ExportTableState,
    pub rows: u64,
    /// Batches written successfully
    pub batches: usize,
    /// Table checksum, present once the manifest is written
    pub checksum: Option<String>,
    pub manifest_path: Option<PathBuf>,
    pub errors: RecordedErrors,
}

impl TableExportResult {
    pub fn new(table: impl Into<String>, max_errors: usize) -> Self {
        Self {
            table: table.into(),
            state: ExportTableState::Cancelled,
            rows: 0,
            batches: 0,
            checksum: None,
            manifest_path: None,
            errors: RecordedErrors::new(max_errors),
        }
    }
}

/// Summary of an export job
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub job_id: Uuid,

    /// Per-table results, in enumeration order
    pub tables: Vec<TableExportResult>,

    /// Duration of the export
    pub duration: Duration,

    /// The operator stopped the job
    pub interrupted: bool,
}

impl ExportSummary {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            tables: Vec::new(),
            duration: Duration::from_secs(0),
            interrupted: false,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn total_batches(&self) -> usize {
        self.tables.iter().map(|t| t.batches).sum()
    }

    pub fn count(&self, state: ExportTableState) -> usize {
        self.tables.iter().filter(|t| t.state == state).count()
    }

    pub fn table(&self, name: &str) -> Option<&TableExportResult> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Every table completed and the job was not interrupted
    pub fn is_successful(&self) -> bool {
        !self.interrupted
            && self
                .tables
                .iter()
                .all(|t| t.state == ExportTableState::Completed)
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            job_id = %self.job_id,
            tables = self.tables.len(),
            completed = self.count(ExportTableState::Completed),
            failed = self.count(ExportTableState::Failed),
            cancelled = self.count(ExportTableState::Cancelled),
            rows = self.total_rows(),
            batches = self.total_batches(),
            duration_secs = self.duration.as_secs(),
            interrupted = self.interrupted,
            "Export completed"
        );

        for table in self.tables.iter().filter(|t| !t.errors.is_empty()) {
            tracing::warn!(
                table = %table.table,
                state = %table.state,
                error_count = table.errors.total(),
                "Table exported with errors"
            );
            for line in table.errors.lines() {
                tracing::warn!(table = %table.table, "{line}");
            }
        }
    }

    /// Human-readable report for the terminal
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Export {} ({:.1}s)", self.job_id, self.duration.as_secs_f64());

        for table in &self.tables {
            let _ = write!(
                out,
                "  {:<30} {:<10} rows={:<10} batches={}",
                table.table, table.state, table.rows, table.batches
            );
            if let Some(checksum) = &table.checksum {
                let _ = write!(out, " checksum={checksum}");
            }
            out.push('\n');
            for line in table.errors.lines() {
                let _ = writeln!(out, "      {line}");
            }
        }

        let _ = writeln!(
            out,
            "Tables: {} completed, {} failed, {} cancelled. Rows: {}",
            self.count(ExportTableState::Completed),
            self.count(ExportTableState::Failed),
            self.count(ExportTableState::Cancelled),
            self.total_rows()
        );
        if self.interrupted {
            out.push_str("Interrupted before completion\n");
        }
        out
    }
}
