//! Batch file formats
//!
//! A [`Format`] turns a [`RowSet`] into bytes and back. Encoding is
//! deterministic: the same rows in the same order always produce the same
//! bytes, which is what makes batch digests comparable between export and
//! import.
//!
//! # Example
//!
//! ```
//! use tabport::core::codec::Format;
//! use tabport::domain::{RowSet, Value};
//!
//! let mut rows = RowSet::new(vec!["id".into(), "name".into()]);
//! rows.push(vec![Value::Int(1), Value::Text("Ann".into())]).unwrap();
//!
//! let bytes = Format::Csv.encode("users", &rows).unwrap();
//! assert_eq!(bytes, b"id:int,name:text\n1,Ann\n");
//! assert_eq!(Format::Csv.decode(&bytes).unwrap(), rows);
//! ```

pub mod csv;
pub mod json;
pub mod sql;

use crate::domain::{Result, RowSet, TabportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Batch file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Json,
    Sql,
}

impl Format {
    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Sql => "sql",
        }
    }

    /// Encode rows into batch bytes
    pub fn encode(&self, table: &str, rows: &RowSet) -> Result<Vec<u8>> {
        match self {
            Format::Csv => csv::encode(rows),
            Format::Json => json::encode(rows),
            Format::Sql => sql::encode(table, rows),
        }
    }

    /// Decode batch bytes into rows
    pub fn decode(&self, bytes: &[u8]) -> Result<RowSet> {
        match self {
            Format::Csv => csv::decode(bytes),
            Format::Json => json::decode(bytes),
            Format::Sql => sql::decode(bytes),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = TabportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "json" => Ok(Format::Json),
            "sql" => Ok(Format::Sql),
            other => Err(TabportError::Configuration(format!(
                "unsupported format '{other}' (expected csv, json or sql)"
            ))),
        }
    }
}

/// Render a float so that it decodes back to a float
///
/// Uses Rust's shortest round-trip formatting. Integral values keep a `.0`
/// suffix. Non-finite values have no portable rendering.
pub(crate) fn format_float(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(TabportError::Serialization(format!(
            "non-finite float {value} cannot be encoded"
        )));
    }
    let mut text = value.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    Ok(text)
}

/// Parse a bare numeric token into an integer or float value
pub(crate) fn parse_number(token: &str) -> Option<crate::domain::Value> {
    use crate::domain::Value;

    if token.is_empty() {
        return None;
    }
    let is_float = token.contains(['.', 'e', 'E']);
    if !is_float {
        return token.parse::<i64>().ok().map(Value::Int);
    }
    // Reject "inf", "NaN" and friends that f64::from_str would accept
    let valid = token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return None;
    }
    token
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use test_case::test_case;

    #[test_case(1.0, "1.0" ; "integral keeps suffix")]
    #[test_case(-0.5, "-0.5" ; "negative fraction")]
    #[test_case(0.1, "0.1" ; "shortest round trip")]
    #[test_case(1e21, "1000000000000000000000.0" ; "large integral")]
    fn test_format_float(value: f64, expected: &str) {
        assert_eq!(format_float(value).unwrap(), expected);
    }

    #[test]
    fn test_format_float_rejects_non_finite() {
        assert!(format_float(f64::NAN).is_err());
        assert!(format_float(f64::INFINITY).is_err());
    }

    #[test_case("42", Some(Value::Int(42)))]
    #[test_case("-7", Some(Value::Int(-7)))]
    #[test_case("2.5", Some(Value::Float(2.5)))]
    #[test_case("1e3", Some(Value::Float(1000.0)))]
    #[test_case("inf", None)]
    #[test_case("NaN", None)]
    #[test_case("abc", None)]
    fn test_parse_number(token: &str, expected: Option<Value>) {
        assert_eq!(parse_number(token), expected);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<Format>().unwrap(), Format::Csv);
        assert_eq!("sql".parse::<Format>().unwrap(), Format::Sql);
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn test_format_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Format::Json).unwrap(), "\"json\"");
    }
}
