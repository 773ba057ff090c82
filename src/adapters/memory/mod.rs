//! In-memory database adapter
//!
//! Tables live in process memory, ordered by primary key. It backs dry runs
//! (`target = "memory"`) and the test suite, and understands just enough SQL
//! for WHERE predicates of the form `column op literal [AND ...]` and custom
//! queries of the form `SELECT * FROM table [WHERE ...]`.
//!
//! Single-column foreign keys declared with
//! [`add_foreign_key`](MemoryDatabase::add_foreign_key) are enforced on
//! writes and truncates unless the caller suspends them. Every write is
//! recorded in a [`WriteRecord`] log.

use crate::adapters::database::{ApplyOptions, ApplyOutcome, DatabaseClient, OnConflict};
use crate::core::codec::parse_number;
use crate::domain::{
    compare_keys, Result, RowRange, RowSet, TableDescriptor, TabportError, Value,
};
use async_trait::async_trait;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock, RwLock};

#[derive(Debug, Clone)]
struct ForeignKey {
    column: usize,
    parent: String,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    descriptor: TableDescriptor,
    /// Sorted by primary key when the table has one, insertion order otherwise
    rows: Vec<Vec<Value>>,
    foreign_keys: Vec<ForeignKey>,
}

impl MemoryTable {
    fn key_indices(&self) -> Option<Vec<usize>> {
        self.descriptor.primary_key_indices()
    }

    /// Whether a single-column primary key holds `value`
    fn has_key(&self, value: &Value) -> bool {
        match self.key_indices().as_deref() {
            Some([index]) => self
                .rows
                .binary_search_by(|row| row[*index].key_cmp(value))
                .is_ok(),
            _ => false,
        }
    }
}

/// Kind of write recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Truncate,
    Apply,
}

/// One write made against the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub table: String,
    pub kind: WriteKind,
    /// Foreign-key enforcement was suspended for this write only
    pub fk_disabled: bool,
}

/// Process-local database
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Create (or replace) an empty table
    pub fn create_table(&self, descriptor: TableDescriptor) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.insert(
            descriptor.name.clone(),
            MemoryTable {
                descriptor,
                rows: Vec::new(),
                foreign_keys: Vec::new(),
            },
        );
    }

    /// Declare that `child.column` references the single-column primary key of `parent`
    ///
    /// # Errors
    ///
    /// Fails on an unknown table or column, or a parent without a
    /// single-column primary key.
    pub fn add_foreign_key(&self, child: &str, column: &str, parent: &str) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let parent_key = tables
            .get(parent)
            .ok_or_else(|| unknown_table(parent))?
            .descriptor
            .primary_key
            .len();
        if parent_key != 1 {
            return Err(TabportError::Database(format!(
                "relation \"{parent}\" has no single-column primary key"
            )));
        }

        let entry = tables.get_mut(child).ok_or_else(|| unknown_table(child))?;
        let index = entry
            .descriptor
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| {
                TabportError::Database(format!(
                    "column \"{column}\" of relation \"{child}\" does not exist"
                ))
            })?;
        entry.foreign_keys.push(ForeignKey {
            column: index,
            parent: parent.to_string(),
        });
        Ok(())
    }

    /// Insert rows given in table column order
    ///
    /// # Errors
    ///
    /// Fails on an unknown table, a row of the wrong width or a duplicate key.
    pub fn insert_rows(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let columns = self.with_table(table, |t| t.descriptor.column_names())?;
        let mut set = RowSet::new(columns);
        for row in rows {
            set.push(row)?;
        }
        let options = ApplyOptions {
            disable_fk: true,
            ..Default::default()
        };
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let staged = stage_rows(&tables, table, &set, &options)?;
        if let Some(entry) = tables.get_mut(table) {
            merge_rows(entry, staged, options.on_conflict);
        }
        Ok(())
    }

    /// Snapshot of a table's rows in storage order
    pub fn rows(&self, table: &str) -> Option<Vec<Vec<Value>>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(table).map(|t| t.rows.clone())
    }

    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Every truncate and apply made through [`DatabaseClient`], in order
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, table: &str, kind: WriteKind, fk_disabled: bool) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(WriteRecord {
                table: table.to_string(),
                kind,
                fk_disabled,
            });
    }

    fn with_table<R>(&self, name: &str, f: impl FnOnce(&MemoryTable) -> R) -> Result<R> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(name).map(f).ok_or_else(|| unknown_table(name))
    }

    /// Rows of a table that match `filter`, in storage order
    fn filtered(&self, name: &str, filter: Option<&str>) -> Result<(TableDescriptor, Vec<Vec<Value>>)> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let table = tables.get(name).ok_or_else(|| unknown_table(name))?;
        let predicate = Predicate::parse(filter, &table.descriptor)?;
        let rows = table
            .rows
            .iter()
            .filter(|r| predicate.matches(r))
            .cloned()
            .collect();
        Ok((table.descriptor.clone(), rows))
    }
}

#[async_trait]
impl DatabaseClient for MemoryDatabase {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .values()
            .map(|t| t.descriptor.clone().with_estimated_rows(t.rows.len() as u64))
            .collect())
    }

    async fn describe_table(&self, name: &str) -> Result<Option<TableDescriptor>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .get(name)
            .map(|t| t.descriptor.clone().with_estimated_rows(t.rows.len() as u64)))
    }

    async fn count_rows(&self, table: &TableDescriptor, filter: Option<&str>) -> Result<u64> {
        let (_, rows) = self.filtered(&table.name, filter)?;
        Ok(rows.len() as u64)
    }

    async fn key_boundaries(
        &self,
        table: &TableDescriptor,
        filter: Option<&str>,
        batch_size: usize,
    ) -> Result<Vec<Vec<Value>>> {
        let indices = table.primary_key_indices().ok_or_else(|| {
            TabportError::Configuration(format!("table '{}' has no usable primary key", table.name))
        })?;
        let (_, rows) = self.filtered(&table.name, filter)?;

        Ok(rows
            .iter()
            .step_by(batch_size.max(1))
            .map(|row| key_of(row, &indices))
            .collect())
    }

    async fn fetch_rows(
        &self,
        table: &TableDescriptor,
        range: &RowRange,
        filter: Option<&str>,
    ) -> Result<RowSet> {
        match range {
            RowRange::Key { lower, upper } => {
                let (descriptor, rows) = self.filtered(&table.name, filter)?;
                let indices = descriptor.primary_key_indices().ok_or_else(|| {
                    TabportError::Configuration(format!(
                        "table '{}' has no usable primary key",
                        table.name
                    ))
                })?;
                let rows = rows
                    .into_iter()
                    .filter(|row| {
                        let key = key_of(row, &indices);
                        compare_keys(&key, lower) != Ordering::Less
                            && upper
                                .as_ref()
                                .map_or(true, |u| compare_keys(&key, u) == Ordering::Less)
                    })
                    .collect();
                Ok(RowSet {
                    columns: descriptor.column_names(),
                    rows,
                })
            }
            RowRange::Offset { offset, limit } => {
                let (descriptor, mut rows) = self.filtered(&table.name, filter)?;
                rows.sort_by(|a, b| compare_keys(a, b));
                let rows = rows
                    .into_iter()
                    .skip(*offset as usize)
                    .take(*limit as usize)
                    .collect();
                Ok(RowSet {
                    columns: descriptor.column_names(),
                    rows,
                })
            }
            RowRange::Query(query) => {
                let (source, predicate) = parse_select(query)?;
                let (descriptor, rows) = self.filtered(&source, predicate.as_deref())?;
                Ok(RowSet {
                    columns: descriptor.column_names(),
                    rows,
                })
            }
            RowRange::File(name) => Err(TabportError::Configuration(format!(
                "cannot fetch file range '{name}' from a database"
            ))),
        }
    }

    async fn truncate_table(&self, table: &TableDescriptor, disable_fk: bool) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if !tables.contains_key(&table.name) {
            return Err(unknown_table(&table.name));
        }

        if !disable_fk {
            let referencing = tables.iter().find(|(_, child)| {
                child.foreign_keys.iter().any(|fk| {
                    fk.parent == table.name && child.rows.iter().any(|r| !r[fk.column].is_null())
                })
            });
            if let Some((child, _)) = referencing {
                return Err(TabportError::Database(format!(
                    "cannot truncate a table referenced in a foreign key constraint: \
                     table \"{child}\" references \"{}\"",
                    table.name
                )));
            }
        }

        if let Some(entry) = tables.get_mut(&table.name) {
            entry.rows.clear();
        }
        drop(tables);
        self.record(&table.name, WriteKind::Truncate, disable_fk);
        Ok(())
    }

    async fn apply_rows(
        &self,
        table: &TableDescriptor,
        rows: &RowSet,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());

        // Every check runs before the first row lands
        let staged = stage_rows(&tables, &table.name, rows, options)?;
        let outcome = match tables.get_mut(&table.name) {
            Some(entry) => merge_rows(entry, staged, options.on_conflict),
            None => return Err(unknown_table(&table.name)),
        };
        drop(tables);

        self.record(&table.name, WriteKind::Apply, options.disable_fk);
        Ok(outcome)
    }

    fn database_name(&self) -> &str {
        &self.name
    }
}

fn unknown_table(name: &str) -> TabportError {
    TabportError::Database(format!("relation \"{name}\" does not exist"))
}

fn key_of(row: &[Value], indices: &[usize]) -> Vec<Value> {
    indices.iter().map(|&i| row[i].clone()).collect()
}

fn cmp_row_key(row: &[Value], indices: &[usize], key: &[Value]) -> Ordering {
    for (&i, k) in indices.iter().zip(key) {
        match row[i].key_cmp(k) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Reorder incoming rows into table column order and validate them
///
/// Checks the columns, null keys, foreign keys and, under
/// [`OnConflict::Fail`], duplicate keys against the table and within the
/// batch. Once this returns the merge cannot fail.
fn stage_rows(
    tables: &BTreeMap<String, MemoryTable>,
    name: &str,
    incoming: &RowSet,
    options: &ApplyOptions,
) -> Result<Vec<Vec<Value>>> {
    let table = tables.get(name).ok_or_else(|| unknown_table(name))?;
    let descriptor = &table.descriptor;
    let positions = incoming
        .columns
        .iter()
        .map(|column| {
            descriptor
                .columns
                .iter()
                .position(|c| &c.name == column)
                .ok_or_else(|| {
                    TabportError::Database(format!(
                        "column \"{column}\" of relation \"{}\" does not exist",
                        descriptor.name
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let staged: Vec<Vec<Value>> = incoming
        .rows
        .iter()
        .map(|source| {
            let mut row = vec![Value::Null; descriptor.columns.len()];
            for (value, &pos) in source.iter().zip(&positions) {
                row[pos] = value.clone();
            }
            row
        })
        .collect();

    if !options.disable_fk {
        for fk in &table.foreign_keys {
            let parent = tables.get(&fk.parent);
            let missing = staged.iter().map(|row| &row[fk.column]).find(|value| {
                !value.is_null() && !parent.is_some_and(|p| p.has_key(value))
            });
            if let Some(value) = missing {
                return Err(TabportError::Database(format!(
                    "insert on \"{name}\" violates foreign key: {value:?} not present in \"{}\"",
                    fk.parent
                )));
            }
        }
    }

    let Some(indices) = table.key_indices() else {
        return Ok(staged);
    };

    let mut keys = Vec::with_capacity(staged.len());
    for row in &staged {
        let key = key_of(row, &indices);
        if key.iter().any(Value::is_null) {
            return Err(TabportError::Database(format!(
                "null value in primary key of relation \"{name}\""
            )));
        }
        keys.push(key);
    }

    if options.on_conflict == OnConflict::Fail {
        let existing = keys
            .iter()
            .find(|key| {
                table
                    .rows
                    .binary_search_by(|row| cmp_row_key(row, &indices, key))
                    .is_ok()
            })
            .cloned();
        keys.sort_by(|a, b| compare_keys(a, b));
        let repeated = keys
            .windows(2)
            .find(|pair| compare_keys(&pair[0], &pair[1]) == Ordering::Equal)
            .map(|pair| pair[0].clone());
        if let Some(key) = existing.or(repeated) {
            return Err(TabportError::Conflict(format!(
                "duplicate key {key:?} in relation \"{name}\""
            )));
        }
    }

    Ok(staged)
}

/// Merge validated rows into the table in place
fn merge_rows(table: &mut MemoryTable, staged: Vec<Vec<Value>>, on_conflict: OnConflict) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    let Some(indices) = table.key_indices() else {
        outcome.inserted = staged.len() as u64;
        table.rows.extend(staged);
        return outcome;
    };

    for row in staged {
        let key = key_of(&row, &indices);
        match table
            .rows
            .binary_search_by(|existing| cmp_row_key(existing, &indices, &key))
        {
            Ok(found) => match on_conflict {
                OnConflict::Replace => {
                    table.rows[found] = row;
                    outcome.inserted += 1;
                }
                OnConflict::Skip | OnConflict::Fail => outcome.skipped += 1,
            },
            Err(at) => {
                table.rows.insert(at, row);
                outcome.inserted += 1;
            }
        }
    }
    outcome
}

/// Conjunction of `column op literal` comparisons
#[derive(Debug, Default)]
struct Predicate {
    terms: Vec<(usize, CompareOp, Value)>,
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Predicate {
    fn parse(filter: Option<&str>, table: &TableDescriptor) -> Result<Self> {
        let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
            return Ok(Self::default());
        };
        let patterns = patterns()?;

        let mut terms = Vec::new();
        for part in patterns.and.split(filter) {
            let caps = patterns.term.captures(part).ok_or_else(|| {
                TabportError::Database(format!("unsupported predicate: {part}"))
            })?;
            let column = table
                .columns
                .iter()
                .position(|c| c.name == caps[1])
                .ok_or_else(|| {
                    TabportError::Database(format!("column \"{}\" does not exist", &caps[1]))
                })?;
            let op = match &caps[2] {
                "=" => CompareOp::Eq,
                "<>" | "!=" => CompareOp::Ne,
                "<" => CompareOp::Lt,
                "<=" => CompareOp::Le,
                ">" => CompareOp::Gt,
                _ => CompareOp::Ge,
            };
            terms.push((column, op, parse_literal(&caps[3])?));
        }
        Ok(Self { terms })
    }

    fn matches(&self, row: &[Value]) -> bool {
        self.terms.iter().all(|(column, op, literal)| {
            let value = &row[*column];
            // NULL never satisfies a comparison
            if value.is_null() || literal.is_null() {
                return false;
            }
            let ord = value.key_cmp(literal);
            match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Ne => ord != Ordering::Equal,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Ge => ord != Ordering::Less,
            }
        })
    }
}

fn parse_literal(token: &str) -> Result<Value> {
    if let Some(inner) = token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Value::Text(inner.replace("''", "'")));
    }
    match token.to_ascii_lowercase().as_str() {
        "null" => return Ok(Value::Null),
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    parse_number(token)
        .ok_or_else(|| TabportError::Database(format!("unsupported literal: {token}")))
}

struct Patterns {
    term: Regex,
    and: Regex,
    select: Regex,
}

/// The SQL subset patterns, compiled on first use
fn patterns() -> Result<&'static Patterns> {
    static PATTERNS: OnceLock<std::result::Result<Patterns, regex::Error>> = OnceLock::new();

    PATTERNS
        .get_or_init(|| {
            Ok(Patterns {
                term: Regex::new(r#"^\s*"?(\w+)"?\s*(<=|>=|<>|!=|=|<|>)\s*(.+?)\s*$"#)?,
                and: Regex::new(r"(?i)\s+and\s+")?,
                select: Regex::new(
                    r#"(?is)^\s*select\s+\*\s+from\s+"?(\w+)"?(?:\s+where\s+(.+?))?\s*;?\s*$"#,
                )?,
            })
        })
        .as_ref()
        .map_err(|e| TabportError::Configuration(format!("invalid pattern: {e}")))
}

/// Split `SELECT * FROM t [WHERE p]` into its table and predicate
fn parse_select(query: &str) -> Result<(String, Option<String>)> {
    let caps = patterns()?
        .select
        .captures(query)
        .ok_or_else(|| TabportError::Database(format!("unsupported query: {query}")))?;
    Ok((caps[1].to_string(), caps.get(2).map(|m| m.as_str().to_string())))
}
