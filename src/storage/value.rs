//! Backend-neutral parameter, row and write-result types.
//!
//! Adapters convert driver rows into [`Row`] and bind [`Value`] parameters
//! positionally, so callers above the contract never see engine types.

use chrono::{NaiveDate, NaiveDateTime};

use crate::interfaces::storage_adapter::{Result, StorageError};

/// A bound parameter or a decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
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

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Text(v.format("%Y-%m-%d").to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Convert sea-query bound values into adapter parameters.
pub fn from_sea_values(values: sea_query::Values) -> Vec<Value> {
    values.0.into_iter().map(from_sea_value).collect()
}

fn from_sea_value(value: sea_query::Value) -> Value {
    use sea_query::Value as V;

    match value {
        V::Bool(v) => v.into(),
        V::TinyInt(v) => v.map(i64::from).into(),
        V::SmallInt(v) => v.map(i64::from).into(),
        V::Int(v) => v.map(i64::from).into(),
        V::BigInt(v) => v.into(),
        V::TinyUnsigned(v) => v.map(i64::from).into(),
        V::SmallUnsigned(v) => v.map(i64::from).into(),
        V::Unsigned(v) => v.map(i64::from).into(),
        V::BigUnsigned(v) => v.map(|n| Value::Int(n as i64)).unwrap_or(Value::Null),
        V::Float(v) => v.map(f64::from).into(),
        V::Double(v) => v.into(),
        V::String(v) => v.map(|s| *s).into(),
        V::Char(v) => v.map(|c| c.to_string()).into(),
        V::Bytes(v) => v.map(|b| Value::Bytes(*b)).unwrap_or(Value::Null),
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}

/// One result row: ordered column names with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Raw value of a column, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    fn require(&self, column: &str) -> Result<&Value> {
        self.get(column).ok_or_else(|| StorageError::Decode {
            column: column.to_string(),
            reason: "column not present in row".to_string(),
        })
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Int(n) => Ok(Some(*n)),
            // The embedded engine keeps whatever text it was given in untyped columns.
            Value::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| mismatch(column, "integer", "text")),
            other => Err(mismatch(column, "integer", other.type_name())),
        }
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.get_opt_i64(column)?
            .ok_or_else(|| mismatch(column, "integer", "NULL"))
    }

    pub fn get_opt_str(&self, column: &str) -> Result<Option<String>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Int(n) => Ok(Some(n.to_string())),
            Value::Real(n) => Ok(Some(n.to_string())),
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map(Some)
                .map_err(|_| mismatch(column, "text", "non-utf8 bytes")),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<String> {
        self.get_opt_str(column)?
            .ok_or_else(|| mismatch(column, "text", "NULL"))
    }

    pub fn get_bool(&self, column: &str) -> Result<bool> {
        Ok(self.get_i64(column)? != 0)
    }

    /// Parse a date column written as `YYYY-MM-DD` (optionally with a time part).
    pub fn get_date(&self, column: &str) -> Result<NaiveDate> {
        let raw = self.get_str(column)?;
        let date_part = raw.get(..10).unwrap_or(&raw);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| StorageError::Decode {
            column: column.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn get_datetime(&self, column: &str) -> Result<NaiveDateTime> {
        self.get_opt_datetime(column)?
            .ok_or_else(|| mismatch(column, "datetime", "NULL"))
    }

    /// Parse a datetime column from either engine's text rendering.
    pub fn get_opt_datetime(&self, column: &str) -> Result<Option<NaiveDateTime>> {
        let Some(raw) = self.get_opt_str(column)? else {
            return Ok(None);
        };
        parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| StorageError::Decode {
                column: column.to_string(),
                reason: format!("unrecognised datetime '{}'", raw),
            })
    }
}

fn mismatch(column: &str, expected: &str, actual: &str) -> StorageError {
    StorageError::Decode {
        column: column.to_string(),
        reason: format!("expected {}, found {}", expected, actual),
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
}

/// Outcome of a write, identical in shape on every backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Identifier generated by the statement, when it generated one.
    pub last_insert_id: Option<i64>,
    pub affected_rows: u64,
}

impl ExecResult {
    pub fn new(last_insert_id: i64, affected_rows: u64) -> Self {
        Self {
            last_insert_id: (last_insert_id > 0).then_some(last_insert_id),
            affected_rows,
        }
    }
}
