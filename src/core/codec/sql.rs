//! SQL batch encoding
//!
//! One statement per row:
//!
//! ```text
//! INSERT INTO "users" ("id", "name") VALUES (1, 'O''Brien');
//! ```
//!
//! Identifiers use ANSI double quotes, strings use single quotes with `''`
//! escaping, and NULL/TRUE/FALSE are keywords. The decoder accepts exactly
//! this dialect (keywords are case-insensitive, unquoted identifiers are
//! allowed) and requires every statement to share one table and column list.

use super::{format_float, parse_number};
use crate::domain::{Result, RowSet, TabportError, Value};
use std::iter::Peekable;
use std::str::Chars;

pub fn encode(table: &str, rows: &RowSet) -> Result<Vec<u8>> {
    let prefix = format!(
        "INSERT INTO {} ({}) VALUES (",
        quote_ident(table),
        rows.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut out = String::new();
    for row in &rows.rows {
        let literals = row.iter().map(literal).collect::<Result<Vec<_>>>()?;
        out.push_str(&prefix);
        out.push_str(&literals.join(", "));
        out.push_str(");\n");
    }
    Ok(out.into_bytes())
}

pub fn decode(bytes: &[u8]) -> Result<RowSet> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| TabportError::Serialization(format!("SQL batch is not UTF-8: {e}")))?;

    let mut lexer = Lexer::new(text);
    let mut table: Option<String> = None;
    let mut set: Option<RowSet> = None;

    while !lexer.at_end() {
        let (stmt_table, columns, values) = lexer.insert_statement()?;

        match (&table, &mut set) {
            (Some(t), Some(existing)) => {
                if *t != stmt_table || existing.columns != columns {
                    return Err(TabportError::Serialization(format!(
                        "statement for {stmt_table} does not match the batch column list"
                    )));
                }
                existing.push(values)?;
            }
            _ => {
                let mut first = RowSet::new(columns);
                first.push(values)?;
                table = Some(stmt_table);
                set = Some(first);
            }
        }
    }

    Ok(set.unwrap_or_default())
}

/// Quote an identifier with ANSI double quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f)?,
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
    })
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.chars.peek().is_none()
    }

    fn error(message: impl Into<String>) -> TabportError {
        TabportError::Serialization(format!("SQL batch: {}", message.into()))
    }

    fn word(&mut self) -> String {
        self.skip_whitespace();
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' || c == '.' || c == '-' || c == '+' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        word
    }

    fn keyword(&mut self, expected: &str) -> Result<()> {
        let word = self.word();
        if word.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(Self::error(format!("expected {expected}, found '{word}'")))
        }
    }

    fn punct(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.chars.next() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(Self::error(format!("expected '{expected}', found '{c}'"))),
            None => Err(Self::error(format!("expected '{expected}', found end of input"))),
        }
    }

    /// Read a delimited token where the delimiter is escaped by doubling
    fn delimited(&mut self, delim: char) -> Result<String> {
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == delim => {
                    if self.chars.peek() == Some(&delim) {
                        self.chars.next();
                        out.push(delim);
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => out.push(c),
                None => return Err(Self::error("unterminated quoted token")),
            }
        }
    }

    fn identifier(&mut self) -> Result<String> {
        self.skip_whitespace();
        if self.chars.peek() == Some(&'"') {
            return self.delimited('"');
        }
        let word = self.word();
        if word.is_empty() {
            return Err(Self::error("expected identifier"));
        }
        Ok(word)
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_whitespace();
        if self.chars.peek() == Some(&'\'') {
            return self.delimited('\'').map(Value::Text);
        }
        let word = self.word();
        if word.eq_ignore_ascii_case("NULL") {
            Ok(Value::Null)
        } else if word.eq_ignore_ascii_case("TRUE") {
            Ok(Value::Bool(true))
        } else if word.eq_ignore_ascii_case("FALSE") {
            Ok(Value::Bool(false))
        } else {
            parse_number(&word).ok_or_else(|| Self::error(format!("invalid literal '{word}'")))
        }
    }

    /// Parse a comma-separated list in parentheses
    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.punct('(')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.chars.peek() == Some(&')') {
            self.chars.next();
            return Ok(items);
        }
        loop {
            items.push(item(&mut *self)?);
            self.skip_whitespace();
            match self.chars.next() {
                Some(',') => continue,
                Some(')') => return Ok(items),
                Some(c) => return Err(Self::error(format!("expected ',' or ')', found '{c}'"))),
                None => return Err(Self::error("unterminated list")),
            }
        }
    }

    fn insert_statement(&mut self) -> Result<(String, Vec<String>, Vec<Value>)> {
        self.keyword("INSERT")?;
        self.keyword("INTO")?;
        let table = self.identifier()?;
        let columns = self.list(Self::identifier)?;
        self.keyword("VALUES")?;
        let values = self.list(Self::value)?;
        self.punct(';')?;
        Ok((table, columns, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn sample() -> RowSet {
        let mut rows = RowSet::new(vec!["id".into(), "name".into(), "ok".into()]);
        rows.push(vec![Value::Int(1), "O'Brien".into(), Value::Bool(true)])
            .unwrap();
        rows.push(vec![Value::Int(2), Value::Null, Value::Bool(false)])
            .unwrap();
        rows
    }

    #[test]
    fn test_encode_layout() {
        let text = String::from_utf8(encode("users", &sample()).unwrap()).unwrap();
        assert_eq!(
            text,
            "INSERT INTO \"users\" (\"id\", \"name\", \"ok\") VALUES (1, 'O''Brien', TRUE);\n\
             INSERT INTO \"users\" (\"id\", \"name\", \"ok\") VALUES (2, NULL, FALSE);\n"
        );
    }

    #[test]
    fn test_decode_round_trip() {
        let rows = sample();
        assert_eq!(decode(&encode("users", &rows).unwrap()).unwrap(), rows);
    }

    #[test]
    fn test_decode_lenient_whitespace_and_case() {
        let input = b"insert into users (id, \"a \"\"b\"\"\")\n  values (-3, 'x;y');";
        let rows = decode(input).unwrap();
        assert_eq!(rows.columns, vec!["id".to_string(), "a \"b\"".to_string()]);
        assert_eq!(rows.rows[0], vec![Value::Int(-3), Value::Text("x;y".into())]);
    }

    #[test]
    fn test_float_literals() {
        let mut rows = RowSet::new(vec!["f".into()]);
        rows.push(vec![Value::Float(10.0)]).unwrap();
        rows.push(vec![Value::Float(-1.5)]).unwrap();
        assert_eq!(decode(&encode("t", &rows).unwrap()).unwrap(), rows);
    }

    #[test]
    fn test_empty_batch() {
        let rows = RowSet::new(vec!["id".into()]);
        assert!(encode("t", &rows).unwrap().is_empty());
        assert!(decode(b"").unwrap().is_empty());
    }

    #[test_case(b"INSERT INTO t (a) VALUES (1)" ; "missing semicolon")]
    #[test_case(b"UPDATE t SET a = 1;" ; "not an insert")]
    #[test_case(b"INSERT INTO t (a) VALUES ('open);" ; "unterminated string")]
    #[test_case(b"INSERT INTO t (a) VALUES (1);\nINSERT INTO t (b) VALUES (2);" ; "column list changes")]
    #[test_case(b"INSERT INTO t (a) VALUES (1);\nINSERT INTO u (a) VALUES (2);" ; "table changes")]
    #[test_case(b"INSERT INTO t (a, b) VALUES (1);" ; "value count mismatch")]
    #[test_case(b"INSERT INTO t (a) VALUES (bogus);" ; "unknown literal")]
    fn test_decode_errors(input: &[u8]) {
        assert!(matches!(decode(input), Err(TabportError::Serialization(_))));
    }
}
