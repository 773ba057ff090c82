//! Import summary and reporting

use crate::core::import::ImportMode;
use crate::core::report::RecordedErrors;
use crate::domain::TabportError;
use std::fmt::Write as _;
use std::time::Duration;
use uuid::Uuid;

/// Per-table import state
///
/// ```text
/// Verifying -> Preparing -> Applying -> Verified | Unverified | Failed -> Done
/// ```
///
/// Any non-terminal state may also move straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Pending,
    Verifying,
    Preparing,
    Applying,
    /// Every batch applied and the recomputed checksum matched
    Verified,
    /// Every batch applied but the checksum did not match (tolerated mode)
    Unverified,
    Failed,
    Done,
}

impl ImportState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition(self, next: ImportState) -> bool {
        use ImportState::*;
        matches!(
            (self, next),
            (Pending, Verifying)
                | (Verifying, Preparing)
                | (Preparing, Applying)
                | (Applying, Verified)
                | (Applying, Unverified)
                | (Pending | Verifying | Preparing | Applying, Failed)
                | (Verified | Unverified | Failed, Done)
        )
    }

    /// Move to `next`, refusing illegal transitions
    pub fn advance(&mut self, next: ImportState) -> Result<(), TabportError> {
        if !self.can_transition(next) {
            return Err(TabportError::Cancelled(format!(
                "illegal import state transition {self} -> {next}"
            )));
        }
        *self = next;
        Ok(())
    }

    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            ImportState::Verified | ImportState::Unverified | ImportState::Failed
        )
    }
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImportState::Pending => "pending",
            ImportState::Verifying => "verifying",
            ImportState::Preparing => "preparing",
            ImportState::Applying => "applying",
            ImportState::Verified => "verified",
            ImportState::Unverified => "unverified",
            ImportState::Failed => "failed",
            ImportState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result for one table
#[derive(Debug, Clone)]
pub struct TableImportResult {
    pub table: String,
    /// Outcome state: verified, unverified or failed
    pub state: ImportState,
    pub rows_imported: u64,
    pub rows_skipped: u64,
    pub checksum_verified: bool,
    pub errors: RecordedErrors,
}

impl TableImportResult {
    pub fn new(table: impl Into<String>, max_errors: usize) -> Self {
        Self {
            table: table.into(),
            state: ImportState::Pending,
            rows_imported: 0,
            rows_skipped: 0,
            checksum_verified: false,
            errors: RecordedErrors::new(max_errors),
        }
    }
}

/// Summary of an import job
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub job_id: Uuid,
    pub mode: ImportMode,
    pub tables: Vec<TableImportResult>,
    pub duration: Duration,
    pub interrupted: bool,
}

impl ImportSummary {
    pub fn new(job_id: Uuid, mode: ImportMode) -> Self {
        Self {
            job_id,
            mode,
            tables: Vec::new(),
            duration: Duration::from_secs(0),
            interrupted: false,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableImportResult> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn total_imported(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_imported).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_skipped).sum()
    }

    pub fn count(&self, state: ImportState) -> usize {
        self.tables.iter().filter(|t| t.state == state).count()
    }

    /// No table failed and the job was not interrupted
    ///
    /// Unverified tables are tolerated.
    pub fn is_successful(&self) -> bool {
        !self.interrupted && self.count(ImportState::Failed) == 0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            job_id = %self.job_id,
            mode = %self.mode,
            tables = self.tables.len(),
            verified = self.count(ImportState::Verified),
            unverified = self.count(ImportState::Unverified),
            failed = self.count(ImportState::Failed),
            rows_imported = self.total_imported(),
            rows_skipped = self.total_skipped(),
            duration_secs = self.duration.as_secs(),
            interrupted = self.interrupted,
            "Import completed"
        );

        for table in self.tables.iter().filter(|t| !t.errors.is_empty()) {
            tracing::warn!(
                table = %table.table,
                state = %table.state,
                error_count = table.errors.total(),
                "Table imported with errors"
            );
            for line in table.errors.lines() {
                tracing::warn!(table = %table.table, "{line}");
            }
        }
    }

    /// Human-readable report for the terminal
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Import {} mode={} ({:.1}s)",
            self.job_id,
            self.mode,
            self.duration.as_secs_f64()
        );

        for table in &self.tables {
            let _ = writeln!(
                out,
                "  {:<30} {:<10} imported={:<10} skipped={:<8} checksum={}",
                table.table,
                table.state,
                table.rows_imported,
                table.rows_skipped,
                if table.checksum_verified { "ok" } else { "unverified" }
            );
            for line in table.errors.lines() {
                let _ = writeln!(out, "      {line}");
            }
        }

        let _ = writeln!(
            out,
            "Tables: {} verified, {} unverified, {} failed. Rows imported: {}, skipped: {}",
            self.count(ImportState::Verified),
            self.count(ImportState::Unverified),
            self.count(ImportState::Failed),
            self.total_imported(),
            self.total_skipped()
        );
        if self.interrupted {
            out.push_str("Interrupted before completion\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ImportState::Pending, ImportState::Verifying, true)]
    #[test_case(ImportState::Verifying, ImportState::Preparing, true)]
    #[test_case(ImportState::Preparing, ImportState::Applying, true)]
    #[test_case(ImportState::Applying, ImportState::Unverified, true)]
    #[test_case(ImportState::Verifying, ImportState::Failed, true)]
    #[test_case(ImportState::Failed, ImportState::Done, true)]
    #[test_case(ImportState::Verifying, ImportState::Applying, false)]
    #[test_case(ImportState::Preparing, ImportState::Verified, false)]
    #[test_case(ImportState::Done, ImportState::Failed, false)]
    fn test_transitions(from: ImportState, to: ImportState, legal: bool) {
        assert_eq!(from.can_transition(to), legal);
    }

    #[test]
    fn test_advance_rejects_skipping_states() {
        let mut state = ImportState::Pending;
        state.advance(ImportState::Verifying).unwrap();
        assert!(state.advance(ImportState::Verified).is_err());
        assert_eq!(state, ImportState::Verifying);
    }

    #[test]
    fn test_unverified_is_tolerated() {
        let mut summary = ImportSummary::new(Uuid::new_v4(), ImportMode::Skip);
        let mut table = TableImportResult::new("users", 20);
        table.state = ImportState::Unverified;
        summary.tables.push(table);
        assert!(summary.is_successful());

        let mut failed = TableImportResult::new("orders", 20);
        failed.state = ImportState::Failed;
        summary.tables.push(failed);
        assert!(!summary.is_successful());
        assert!(summary.format_report().contains("1 unverified, 1 failed"));
    }
}
