//! Batch descriptors
//!
//! A batch is one unit of work for the worker pool: a slice of one table
//! identified by its sequence index and a row range.

use crate::domain::Value;
use std::fmt;

/// The rows a batch covers
#[derive(Debug, Clone, PartialEq)]
pub enum RowRange {
    /// Primary-key range: `lower <= key < upper`, open above when `upper` is `None`
    Key {
        lower: Vec<Value>,
        upper: Option<Vec<Value>>,
    },
    /// Offset/limit over a deterministic ordering of all columns
    Offset { offset: u64, limit: u64 },
    /// A custom query exported as a single batch
    Query(String),
    /// A batch file on import, relative to the table directory
    File(String),
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRange::Key { lower, upper } => {
                write!(f, "key >= {lower:?}")?;
                if let Some(upper) = upper {
                    write!(f, " and < {upper:?}")?;
                }
                Ok(())
            }
            RowRange::Offset { offset, limit } => write!(f, "offset {offset} limit {limit}"),
            RowRange::Query(_) => f.write_str("custom query"),
            RowRange::File(name) => write!(f, "file {name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// One planned batch of a table
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub table: String,
    /// Canonical position within the table, assigned at planning time
    pub sequence: usize,
    pub range: RowRange,
    pub status: BatchStatus,
}

impl Batch {
    pub fn new(table: impl Into<String>, sequence: usize, range: RowRange) -> Self {
        Self {
            table: table.into(),
            sequence,
            range,
            status: BatchStatus::Pending,
        }
    }
}
