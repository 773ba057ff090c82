//! JSON batch encoding
//!
//! One document per batch: `{"columns":[...],"rows":[[...],...]}` followed
//! by a newline. Cells map to JSON null, booleans, numbers and strings.

use crate::domain::{Result, RowSet, TabportError, Value};
use serde::{Deserialize, Serialize};
use serde_json::Number;

#[derive(Debug, Serialize, Deserialize)]
struct JsonBatch {
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

pub fn encode(rows: &RowSet) -> Result<Vec<u8>> {
    let encoded_rows = rows
        .rows
        .iter()
        .map(|row| row.iter().map(to_json).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;

    let batch = JsonBatch {
        columns: rows.columns.clone(),
        rows: encoded_rows,
    };

    let mut bytes = serde_json::to_vec(&batch)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<RowSet> {
    let batch: JsonBatch = serde_json::from_slice(bytes)?;

    let mut set = RowSet::new(batch.columns);
    for (index, row) in batch.rows.into_iter().enumerate() {
        let values = row
            .into_iter()
            .map(from_json)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| TabportError::Serialization(format!("JSON row {index}: {e}")))?;
        set.push(values)?;
    }
    Ok(set)
}

fn to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                TabportError::Serialization(format!("non-finite float {f} cannot be encoded"))
            })?,
        Value::Text(s) => serde_json::Value::String(s.clone()),
    })
}

fn from_json(value: serde_json::Value) -> Result<Value> {
    match value {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if n.is_u64() {
                Err(TabportError::Serialization(format!(
                    "integer {n} does not fit in 64 signed bits"
                )))
            } else {
                n.as_f64().map(Value::Float).ok_or_else(|| {
                    TabportError::Serialization(format!("unrepresentable number {n}"))
                })
            }
        }
        serde_json::Value::String(s) => Ok(Value::Text(s)),
        other => Err(TabportError::Serialization(format!(
            "nested JSON value not allowed in a cell: {other}"
        ))),
    }
}
