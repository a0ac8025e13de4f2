//! Statement parameters and result rows
//!
//! Backends speak a small dynamically typed value model: integers, text,
//! binary blobs, integer arrays and NULL. Strategies build parameter lists
//! from it and decode returned rows with the typed accessors on [`Row`].

use crate::error::{Error, Result};
use crate::types::{EventKey, Payload};
use std::sync::Arc;

/// A single statement parameter or column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Integer of any width
    Int(i64),
    /// Text
    Text(Arc<str>),
    /// Binary blob
    Blob(Payload),
    /// Integer array
    IntArray(Vec<i64>),
}

impl SqlValue {
    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Int(_) => "int",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
            SqlValue::IntArray(_) => "int[]",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&EventKey> for SqlValue {
    fn from(k: &EventKey) -> Self {
        SqlValue::Text(k.as_shared())
    }
}

impl From<Arc<str>> for SqlValue {
    fn from(s: Arc<str>) -> Self {
        SqlValue::Text(s)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(Arc::from(s))
    }
}

impl From<&Payload> for SqlValue {
    fn from(p: &Payload) -> Self {
        SqlValue::Blob(p.clone())
    }
}

impl From<Option<Payload>> for SqlValue {
    fn from(p: Option<Payload>) -> Self {
        p.map_or(SqlValue::Null, SqlValue::Blob)
    }
}

impl From<Vec<i64>> for SqlValue {
    fn from(v: Vec<i64>) -> Self {
        SqlValue::IntArray(v)
    }
}

/// One result row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    /// Build a row from column values
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw column value
    pub fn get(&self, idx: usize) -> Result<&SqlValue> {
        self.values
            .get(idx)
            .ok_or_else(|| Error::UnexpectedRow(format!("missing column {}", idx)))
    }

    /// Integer column; NULL is an error
    pub fn get_int(&self, idx: usize) -> Result<i64> {
        match self.get(idx)? {
            SqlValue::Int(v) => Ok(*v),
            other => Err(mismatch(idx, "int", other)),
        }
    }

    /// Blob column; NULL maps to `None`
    pub fn get_blob(&self, idx: usize) -> Result<Option<Payload>> {
        match self.get(idx)? {
            SqlValue::Blob(p) => Ok(Some(p.clone())),
            SqlValue::Null => Ok(None),
            other => Err(mismatch(idx, "blob", other)),
        }
    }

    /// Integer array column; NULL maps to an empty array
    pub fn get_int_array(&self, idx: usize) -> Result<Vec<i64>> {
        match self.get(idx)? {
            SqlValue::IntArray(v) => Ok(v.clone()),
            SqlValue::Null => Ok(Vec::new()),
            other => Err(mismatch(idx, "int[]", other)),
        }
    }

    /// Consume the row into its values
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

fn mismatch(idx: usize, expected: &str, found: &SqlValue) -> Error {
    Error::UnexpectedRow(format!(
        "column {} expected {}, found {}",
        idx,
        expected,
        found.type_name()
    ))
}

/// Positional parameter reader with arity and type checks
///
/// Used by backends that interpret parameters themselves.
pub struct Params<'a> {
    values: &'a [SqlValue],
}

impl<'a> Params<'a> {
    /// Wrap a parameter list, requiring exactly `arity` values
    pub fn expect(values: &'a [SqlValue], arity: usize) -> Result<Self> {
        if values.len() != arity {
            return Err(Error::InvalidParameter(format!(
                "expected {} parameters, got {}",
                arity,
                values.len()
            )));
        }
        Ok(Self { values })
    }

    fn get(&self, idx: usize) -> Result<&'a SqlValue> {
        self.values.get(idx).ok_or_else(|| {
            Error::UnexpectedRow(format!(
                "parameter ${} out of {} parameters",
                idx + 1,
                self.values.len()
            ))
        })
    }

    /// Text parameter
    pub fn text(&self, idx: usize) -> Result<Arc<str>> {
        match self.get(idx)? {
            SqlValue::Text(s) => Ok(Arc::clone(s)),
            other => Err(param_mismatch(idx, "text", other)),
        }
    }

    /// Integer parameter
    pub fn int(&self, idx: usize) -> Result<i64> {
        match self.get(idx)? {
            SqlValue::Int(v) => Ok(*v),
            other => Err(param_mismatch(idx, "int", other)),
        }
    }

    /// Blob parameter
    pub fn blob(&self, idx: usize) -> Result<Payload> {
        match self.get(idx)? {
            SqlValue::Blob(p) => Ok(p.clone()),
            other => Err(param_mismatch(idx, "blob", other)),
        }
    }
}

fn param_mismatch(idx: usize, expected: &str, found: &SqlValue) -> Error {
    Error::InvalidParameter(format!(
        "parameter ${} expected {}, found {}",
        idx + 1,
        expected,
        found.type_name()
    ))
}
