//! CSV batch encoding
//!
//! Layout: one header record, then one record per row, `\n` terminated.
//! Fields are quoted only when they contain a delimiter, a quote or a line
//! break. Each header field is `name:kind` where kind is `int`, `float`,
//! `bool` or `text`; cells are parsed by the kind of their column.
//!
//! NULL is the token `\N`. A text cell starting with a backslash gets one
//! extra leading backslash so the literal text `\N` stays distinct from NULL.

use super::{format_float, parse_number};
use crate::domain::{Result, RowSet, TabportError, Value};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::fmt;
use std::str::FromStr;

const NULL_TOKEN: &str = "\\N";

/// Type of one CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Int,
    Float,
    Bool,
    Text,
}

impl CellKind {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(CellKind::Bool),
            Value::Int(_) => Some(CellKind::Int),
            Value::Float(_) => Some(CellKind::Float),
            Value::Text(_) => Some(CellKind::Text),
        }
    }

    fn parse(&self, cell: &str) -> Result<Value> {
        if cell == NULL_TOKEN {
            return Ok(Value::Null);
        }
        let invalid = || TabportError::Serialization(format!("invalid {self} cell '{cell}'"));
        match self {
            CellKind::Int => cell.parse::<i64>().map(Value::Int).map_err(|_| invalid()),
            CellKind::Float => match parse_number(cell) {
                Some(Value::Float(f)) => Ok(Value::Float(f)),
                Some(Value::Int(i)) => Ok(Value::Float(i as f64)),
                _ => Err(invalid()),
            },
            CellKind::Bool => match cell {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            CellKind::Text => Ok(Value::Text(unescape_text(cell).to_string())),
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CellKind::Int => "int",
            CellKind::Float => "float",
            CellKind::Bool => "bool",
            CellKind::Text => "text",
        })
    }
}

impl FromStr for CellKind {
    type Err = TabportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(CellKind::Int),
            "float" => Ok(CellKind::Float),
            "bool" => Ok(CellKind::Bool),
            "text" => Ok(CellKind::Text),
            other => Err(TabportError::Serialization(format!(
                "unknown CSV column kind '{other}'"
            ))),
        }
    }
}

/// Kind of every column, from the first non-NULL cell; all-NULL columns are text
fn column_kinds(rows: &RowSet) -> Result<Vec<CellKind>> {
    let mut kinds: Vec<Option<CellKind>> = vec![None; rows.columns.len()];
    for row in &rows.rows {
        for ((slot, value), column) in kinds.iter_mut().zip(row).zip(&rows.columns) {
            match (*slot, CellKind::of(value)) {
                (_, None) => {}
                (None, found) => *slot = found,
                (Some(seen), Some(found)) if seen != found => {
                    return Err(TabportError::Serialization(format!(
                        "column '{column}' mixes {seen} and {found} values"
                    )))
                }
                _ => {}
            }
        }
    }
    Ok(kinds
        .into_iter()
        .map(|k| k.unwrap_or(CellKind::Text))
        .collect())
}

fn escape_text(text: &str) -> String {
    if text.starts_with('\\') {
        format!("\\{text}")
    } else {
        text.to_string()
    }
}

fn unescape_text(cell: &str) -> &str {
    cell.strip_prefix('\\').unwrap_or(cell)
}

fn cell(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => NULL_TOKEN.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f)?,
        Value::Text(s) => escape_text(s),
    })
}

pub fn encode(rows: &RowSet) -> Result<Vec<u8>> {
    if rows.columns.is_empty() {
        return Ok(Vec::new());
    }
    let kinds = column_kinds(rows)?;

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    let header: Vec<String> = rows
        .columns
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| format!("{name}:{kind}"))
        .collect();
    writer.write_record(&header)?;

    for row in &rows.rows {
        let fields = row.iter().map(cell).collect::<Result<Vec<_>>>()?;
        writer.write_record(&fields)?;
    }

    writer
        .into_inner()
        .map_err(|e| TabportError::Serialization(format!("Failed to flush CSV batch: {e}")))
}

pub fn decode(bytes: &[u8]) -> Result<RowSet> {
    let mut reader = ReaderBuilder::new().has_headers(false).from_reader(bytes);
    let mut records = reader.records();

    let header = match records.next() {
        Some(header) => header?,
        None => return Ok(RowSet::default()),
    };
    let (columns, kinds) = parse_header(&header)?;

    let mut set = RowSet::new(columns);
    for (line, record) in records.enumerate() {
        let record = record?;
        if record.len() != kinds.len() {
            return Err(TabportError::Serialization(format!(
                "CSV row {} has {} fields, expected {}",
                line + 1,
                record.len(),
                kinds.len()
            )));
        }
        let row = kinds
            .iter()
            .zip(record.iter())
            .map(|(kind, cell)| kind.parse(cell))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| TabportError::Serialization(format!("CSV row {}: {e}", line + 1)))?;
        set.push(row)?;
    }

    Ok(set)
}

fn parse_header(header: &StringRecord) -> Result<(Vec<String>, Vec<CellKind>)> {
    header
        .iter()
        .map(|field| {
            let (name, kind) = field.rsplit_once(':').ok_or_else(|| {
                TabportError::Serialization(format!("CSV header field '{field}' has no kind"))
            })?;
            Ok((name.to_string(), kind.parse::<CellKind>()?))
        })
        .collect::<Result<Vec<_>>>()
        .map(|pairs| pairs.into_iter().unzip())
}
