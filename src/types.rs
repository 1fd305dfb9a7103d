//! Core value and status types shared by the engine and the API layer.

use std::fmt;

// ============================================================================
// Statement Execution Types
// ============================================================================

/// Outcome of a successful `step()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// SQLITE_ROW - a result row is available
    Row,
    /// SQLITE_DONE - the program ran to completion
    Done,
}

/// Storage classes reported for values (SQLITE_INTEGER, SQLITE_FLOAT, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ColumnType {
    /// SQLITE_INTEGER = 1
    Integer = 1,
    /// SQLITE_FLOAT = 2
    Float = 2,
    /// SQLITE_TEXT = 3
    Text = 3,
    /// SQLITE_BLOB = 4
    Blob = 4,
    /// SQLITE_NULL = 5
    Null = 5,
}

/// Text encodings understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8 (default)
    #[default]
    Utf8,
    /// UTF-16 little endian
    Utf16le,
    /// UTF-16 big endian
    Utf16be,
}

impl Encoding {
    /// SQLITE_UTF8 / SQLITE_UTF16LE / SQLITE_UTF16BE
    pub fn code(self) -> u8 {
        match self {
            Encoding::Utf8 => 1,
            Encoding::Utf16le => 2,
            Encoding::Utf16be => 3,
        }
    }

    /// Is this one of the UTF-16 variants?
    pub fn is_utf16(self) -> bool {
        !matches!(self, Encoding::Utf8)
    }
}

// ============================================================================
// Owned Value
// ============================================================================

/// An owned, self-contained value
///
/// Used where a value crosses the engine boundary by value: rows handed out
/// by the storage collaborator and column values copied out for the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL
    #[default]
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit IEEE float
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    /// Storage class of this value
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Null => ColumnType::Null,
            Value::Integer(_) => ColumnType::Integer,
            Value::Real(_) => ColumnType::Float,
            Value::Text(_) => ColumnType::Text,
            Value::Blob(_) => ColumnType::Blob,
        }
    }

    /// Is this NULL?
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", format_real(*r)),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "x'{}'", hex::encode(b)),
        }
    }
}

/// Render a float the way SQL shows it: whole numbers keep a trailing ".0"
pub fn format_real(r: f64) -> String {
    let s = r.to_string();
    if r.is_finite() && !s.contains('.') && !s.contains('e') && !s.contains('E') {
        format!("{}.0", s)
    } else {
        s
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_column_type() {
        assert_eq!(Value::Null.column_type(), ColumnType::Null);
        assert_eq!(Value::Integer(0).column_type(), ColumnType::Integer);
        assert_eq!(Value::Real(0.0).column_type(), ColumnType::Float);
        assert_eq!(Value::from("x").column_type(), ColumnType::Text);
        assert_eq!(Value::Blob(vec![]).column_type(), ColumnType::Blob);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_string(), "x'dead'");
        assert_eq!(Value::from(None::<i64>).to_string(), "NULL");
    }

    #[test]
    fn test_encoding_codes() {
        assert_eq!(Encoding::Utf8.code(), 1);
        assert!(Encoding::Utf16be.is_utf16());
        assert!(!Encoding::default().is_utf16());
    }
}
