//! Import conflict resolution
//!
//! The import mode decides two things: how the target table is prepared
//! before any batch is applied, and how a batch treats rows whose key
//! already exists.

use crate::adapters::database::{ApplyOptions, DatabaseClient, OnConflict};
use crate::domain::{Result, TableDescriptor, TabportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an import treats existing data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Keep existing rows, count incoming collisions as skipped
    #[default]
    Skip,
    /// Upsert on the primary key
    Replace,
    /// Empty the table before the first batch
    Truncate,
    /// Refuse to import anything whose checksum does not verify
    Cancel,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Skip => "skip",
            ImportMode::Replace => "replace",
            ImportMode::Truncate => "truncate",
            ImportMode::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = TabportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ImportMode::Skip),
            "replace" => Ok(ImportMode::Replace),
            "truncate" => Ok(ImportMode::Truncate),
            "cancel" => Ok(ImportMode::Cancel),
            other => Err(TabportError::Configuration(format!(
                "invalid import mode '{other}', expected skip, replace, truncate or cancel"
            ))),
        }
    }
}

/// Applies one import mode to a table
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    mode: ImportMode,
    disable_fk: bool,
    chunk_size: usize,
}

impl ConflictResolver {
    pub fn new(mode: ImportMode, disable_fk: bool, chunk_size: usize) -> Self {
        Self {
            mode,
            disable_fk,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn mode(&self) -> ImportMode {
        self.mode
    }

    /// Prepare the target table before any batch is applied
    ///
    /// Only truncate mode touches the table. A failure here must stop the
    /// job before the table receives any row.
    pub async fn prepare(&self, db: &dyn DatabaseClient, table: &TableDescriptor) -> Result<()> {
        if self.mode == ImportMode::Truncate {
            tracing::info!(
                table = %table.name,
                disable_fk = self.disable_fk,
                "Truncating target table"
            );
            db.truncate_table(table, self.disable_fk).await?;
        }
        Ok(())
    }

    /// Write options for every batch of the table
    pub fn apply_options(&self) -> ApplyOptions {
        let on_conflict = match self.mode {
            ImportMode::Skip => OnConflict::Skip,
            ImportMode::Replace => OnConflict::Replace,
            ImportMode::Truncate | ImportMode::Cancel => OnConflict::Fail,
        };
        ApplyOptions {
            on_conflict,
            disable_fk: self.disable_fk,
            chunk_size: self.chunk_size,
        }
    }

    /// A checksum mismatch aborts the table before and during apply
    pub fn verification_is_fatal(&self) -> bool {
        self.mode == ImportMode::Cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("skip", ImportMode::Skip)]
    #[test_case("Replace", ImportMode::Replace)]
    #[test_case(" truncate ", ImportMode::Truncate)]
    #[test_case("CANCEL", ImportMode::Cancel)]
    fn test_parse_mode(input: &str, expected: ImportMode) {
        assert_eq!(input.parse::<ImportMode>().unwrap(), expected);
    }

    #[test]
    fn test_parse_invalid_mode() {
        let err = "merge".parse::<ImportMode>().unwrap_err();
        assert!(matches!(err, TabportError::Configuration(_)));
    }

    #[test_case(ImportMode::Skip, OnConflict::Skip)]
    #[test_case(ImportMode::Replace, OnConflict::Replace)]
    #[test_case(ImportMode::Truncate, OnConflict::Fail)]
    #[test_case(ImportMode::Cancel, OnConflict::Fail)]
    fn test_conflict_mapping(mode: ImportMode, expected: OnConflict) {
        let resolver = ConflictResolver::new(mode, true, 0);
        let options = resolver.apply_options();
        assert_eq!(options.on_conflict, expected);
        assert!(options.disable_fk);
        assert_eq!(options.chunk_size, 1);
    }

    #[test]
    fn test_only_cancel_is_fatal() {
        assert!(ConflictResolver::new(ImportMode::Cancel, false, 10).verification_is_fatal());
        assert!(!ConflictResolver::new(ImportMode::Skip, false, 10).verification_is_fatal());
    }

    #[test_case(ImportMode::Truncate, true ; "truncate with fk relaxed")]
    #[test_case(ImportMode::Truncate, false ; "truncate with fk enforced")]
    #[tokio::test]
    async fn test_prepare_passes_disable_fk_to_truncate(mode: ImportMode, disable_fk: bool) {
        use crate::adapters::memory::{MemoryDatabase, WriteKind};
        use crate::domain::{Column, Value};

        let db = MemoryDatabase::new("target");
        let table = TableDescriptor::new("t", vec![Column::new("id", "int8")], vec!["id".into()]);
        db.create_table(table.clone());
        db.insert_rows("t", vec![vec![Value::Int(1)]]).unwrap();

        ConflictResolver::new(mode, disable_fk, 10)
            .prepare(&db, &table)
            .await
            .unwrap();

        assert_eq!(db.row_count("t"), 0);
        let log = db.write_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, WriteKind::Truncate);
        assert_eq!(log[0].fk_disabled, disable_fk);
    }

    #[tokio::test]
    async fn test_prepare_leaves_table_alone_outside_truncate() {
        use crate::adapters::memory::MemoryDatabase;
        use crate::domain::{Column, Value};

        let db = MemoryDatabase::new("target");
        let table = TableDescriptor::new("t", vec![Column::new("id", "int8")], vec!["id".into()]);
        db.create_table(table.clone());
        db.insert_rows("t", vec![vec![Value::Int(1)]]).unwrap();

        ConflictResolver::new(ImportMode::Replace, true, 10)
            .prepare(&db, &table)
            .await
            .unwrap();
        assert_eq!(db.row_count("t"), 1);
        assert!(db.write_log().is_empty());
    }

    #[test]
    fn test_mode_serde() {
        let json = serde_json::to_string(&ImportMode::Truncate).unwrap();
        assert_eq!(json, "\"truncate\"");
        assert_eq!(ImportMode::default(), ImportMode::Skip);
    }
}
