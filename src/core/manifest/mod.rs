//! Per-table export manifest
//!
//! The manifest is written once, after every batch file of a table is in
//! place, and is the only thing import trusts about a table: its format,
//! batch files, per-batch digests and the table checksum.

pub mod store;

pub use store::{ArtifactStore, MANIFEST_FILE};

use crate::core::codec::Format;
use crate::core::verification::checksum::from_hex;
use crate::domain::{Result, TabportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version string recorded in every manifest
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One batch file of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub sequence: usize,
    pub rows: u64,
    /// File name relative to the table directory
    pub file: String,
    /// Hex SHA-256 of the encoded, uncompressed batch bytes
    pub digest: String,
}

/// Persisted metadata for one exported table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub table: String,
    pub format: Format,
    pub compressed: bool,
    pub row_count: u64,
    pub batch_count: usize,
    /// Hex SHA-256 over the raw batch digests in sequence order
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub batches: Vec<BatchEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub tool_version: String,
}

impl Manifest {
    /// Check the manifest is internally consistent
    ///
    /// Batch entries must be listed in sequence order starting at zero,
    /// their counts must add up and every digest must be well formed.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            TabportError::Configuration(format!("invalid manifest for '{}': {reason}", self.table))
        };

        if self.batch_count != self.batches.len() {
            return Err(invalid(format!(
                "batchCount is {} but {} batches are listed",
                self.batch_count,
                self.batches.len()
            )));
        }

        for (index, entry) in self.batches.iter().enumerate() {
            if entry.sequence != index {
                return Err(invalid(format!(
                    "batch at position {index} has sequence {}",
                    entry.sequence
                )));
            }
            if entry.file.contains(['/', '\\']) || entry.file.starts_with('.') {
                return Err(invalid(format!("batch file name '{}' is not allowed", entry.file)));
            }
            from_hex(&entry.digest).map_err(|e| invalid(e.to_string()))?;
        }

        let total: u64 = self.batches.iter().map(|b| b.rows).sum();
        if total != self.row_count {
            return Err(invalid(format!(
                "rowCount is {} but batches hold {total} rows",
                self.row_count
            )));
        }

        from_hex(&self.checksum).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }
}
