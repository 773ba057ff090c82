//! Table metadata and row values
//!
//! These are the types shared by the database adapters, the codecs and the
//! pipeline. A [`TableDescriptor`] is built once per table and shared behind
//! an `Arc` for the whole job.

use crate::domain::{Result, TabportError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Total order used for primary-key comparison
    ///
    /// NULL sorts first, then booleans, then numbers (integers and floats
    /// compared numerically), then text.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Text(_) => 3,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Compare two composite keys lexicographically
pub fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.key_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Database type name as reported by the source (e.g. `integer`, `text`)
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Table metadata used for planning and applying batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<Column>,
    /// Primary-key column names, in key order
    pub primary_key: Vec<String>,
    pub estimated_rows: u64,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, primary_key: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
            estimated_rows: 0,
        }
    }

    pub fn with_estimated_rows(mut self, rows: u64) -> Self {
        self.estimated_rows = rows;
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Positions of the primary-key columns in `columns`
    ///
    /// Returns `None` when there is no key or a key column is missing from
    /// the column list, in which case the key is not usable for planning.
    pub fn primary_key_indices(&self) -> Option<Vec<usize>> {
        if self.primary_key.is_empty() {
            return None;
        }
        self.primary_key
            .iter()
            .map(|k| self.columns.iter().position(|c| &c.name == k))
            .collect()
    }

    pub fn has_usable_key(&self) -> bool {
        self.primary_key_indices().is_some()
    }
}

/// An ordered set of rows sharing one column list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, checking its width against the column list
    pub fn push(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(TabportError::Serialization(format!(
                "row has {} values but {} columns are declared",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reorder columns to match `target`
    ///
    /// Used on import, where the file's column order may differ from the
    /// target table's. Every target column must be present in the set.
    pub fn project(&self, target: &[String]) -> Result<RowSet> {
        let positions: Vec<usize> = target
            .iter()
            .map(|name| {
                self.columns.iter().position(|c| c == name).ok_or_else(|| {
                    TabportError::Configuration(format!(
                        "column '{name}' missing from batch data"
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(RowSet {
            columns: target.to_vec(),
            rows,
        })
    }
}

/// Include/exclude filter applied to enumerated tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    /// Only these tables when non-empty
    pub include: Vec<String>,
    /// Never these tables
    pub exclude: Vec<String>,
}

impl TableFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn matches(&self, table: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|t| t == table);
        included && !self.exclude.iter().any(|t| t == table)
    }

    pub fn apply(&self, tables: Vec<TableDescriptor>) -> Vec<TableDescriptor> {
        tables.into_iter().filter(|t| self.matches(&t.name)).collect()
    }
}
