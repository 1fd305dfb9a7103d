//! External Values (sqlite3_value)
//!
//! A `SqliteValue` is a value supplied by the driver layer: a set of type
//! flags plus the payload those flags describe, with text and blob bytes
//! borrowed from the caller. Binding copies it into an engine-owned
//! register cell.

use std::borrow::Cow;

use bitflags::bitflags;

use crate::error::Result;
use crate::mem::Allocator;
use crate::types::{ColumnType, Encoding, Value};
use crate::vdbe::mem::Mem;

bitflags! {
    /// Type flags reported by an external value (MEM_Null, MEM_Int, ...)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValueFlags: u16 {
        /// NULL
        const NULL = 0x0001;
        /// Integer payload in `i`
        const INT = 0x0004;
        /// Float payload in `r`
        const REAL = 0x0008;
        /// Float whose value is the integer in `i`
        const INT_REAL = 0x0020;
        /// Text payload
        const TEXT = 0x0002;
        /// Blob payload
        const BLOB = 0x0010;
        /// Blob of `n_zero` zero bytes; any byte payload is ignored
        const ZERO = 0x4000;
    }
}

// ============================================================================
// External Value
// ============================================================================

/// A driver-supplied value borrowed for the duration of a bind call
#[derive(Debug, Clone, Copy)]
pub struct SqliteValue<'a> {
    flags: ValueFlags,
    i: i64,
    r: f64,
    bytes: Option<&'a [u8]>,
    n_zero: usize,
    enc: Encoding,
}

impl<'a> SqliteValue<'a> {
    /// Build a value from raw parts. Inconsistent flag combinations are
    /// accepted; binding decides how to read them.
    pub fn from_raw(
        flags: ValueFlags,
        i: i64,
        r: f64,
        bytes: Option<&'a [u8]>,
        n_zero: usize,
        enc: Encoding,
    ) -> Self {
        Self {
            flags,
            i,
            r,
            bytes,
            n_zero,
            enc,
        }
    }

    /// NULL
    pub fn null() -> Self {
        Self::from_raw(ValueFlags::NULL, 0, 0.0, None, 0, Encoding::Utf8)
    }

    /// Integer
    pub fn integer(i: i64) -> Self {
        Self::from_raw(ValueFlags::INT, i, 0.0, None, 0, Encoding::Utf8)
    }

    /// Float
    pub fn real(r: f64) -> Self {
        Self::from_raw(ValueFlags::REAL, 0, r, None, 0, Encoding::Utf8)
    }

    /// Float carrying an exact integer
    pub fn int_real(i: i64) -> Self {
        Self::from_raw(ValueFlags::REAL | ValueFlags::INT_REAL, i, 0.0, None, 0, Encoding::Utf8)
    }

    /// Text in the given encoding
    pub fn text(bytes: &'a [u8], enc: Encoding) -> Self {
        Self::from_raw(ValueFlags::TEXT, 0, 0.0, Some(bytes), 0, enc)
    }

    /// Blob
    pub fn blob(bytes: &'a [u8]) -> Self {
        Self::from_raw(ValueFlags::BLOB, 0, 0.0, Some(bytes), 0, Encoding::Utf8)
    }

    /// Zero-filled blob of length `n`
    pub fn zero_blob(n: usize) -> Self {
        Self::from_raw(ValueFlags::BLOB | ValueFlags::ZERO, 0, 0.0, None, n, Encoding::Utf8)
    }

    /// Borrow a register cell as an external value
    pub fn from_mem(mem: &'a Mem) -> Self {
        match mem {
            Mem::Null => Self::null(),
            Mem::Integer(i) => Self::integer(*i),
            Mem::Real(r) => Self::real(*r),
            Mem::RealFromInteger(i) => Self::int_real(*i),
            Mem::Text { bytes, enc } => Self::text(bytes, *enc),
            Mem::Blob(b) => Self::blob(b),
            Mem::ZeroBlob(n) => Self::zero_blob(*n),
        }
    }

    /// Borrow an owned [`Value`]
    pub fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Null => Self::null(),
            Value::Integer(i) => Self::integer(*i),
            Value::Real(r) => Self::real(*r),
            Value::Text(s) => Self::text(s.as_bytes(), Encoding::Utf8),
            Value::Blob(b) => Self::blob(b),
        }
    }

    /// Raw type flags
    pub fn flags(&self) -> ValueFlags {
        self.flags
    }

    /// Storage class derived from the flags.
    ///
    /// Flag sets that name no storage class report NULL.
    pub fn value_type(&self) -> ColumnType {
        let f = self.flags;
        if f.contains(ValueFlags::INT) {
            ColumnType::Integer
        } else if f.intersects(ValueFlags::REAL | ValueFlags::INT_REAL) {
            ColumnType::Float
        } else if f.contains(ValueFlags::TEXT) {
            ColumnType::Text
        } else if f.contains(ValueFlags::BLOB) {
            ColumnType::Blob
        } else {
            ColumnType::Null
        }
    }

    /// Float reading of a REAL value
    pub fn as_double(&self) -> f64 {
        if self.flags.contains(ValueFlags::INT_REAL) {
            self.i as f64
        } else {
            self.r
        }
    }

    /// Copy this value into `dst` as an engine-owned cell.
    ///
    /// On allocation failure `dst` is left NULL and `NoMem` is returned.
    pub fn copy_into(&self, dst: &mut Mem, db_enc: Encoding, alloc: &Allocator) -> Result<()> {
        match self.value_type() {
            ColumnType::Integer => dst.set_int(self.i),
            ColumnType::Float => dst.set_real(self.as_double()),
            ColumnType::Blob => {
                if self.flags.contains(ValueFlags::ZERO) {
                    dst.set_zero_blob(self.n_zero);
                } else {
                    dst.set_blob(Cow::Borrowed(self.bytes.unwrap_or_default()), alloc)?;
                }
            }
            ColumnType::Text => {
                let bytes = self.bytes.unwrap_or_default();
                dst.set_text(Cow::Borrowed(bytes), self.enc, db_enc, alloc)?;
            }
            ColumnType::Null => dst.set_null(),
        }
        Ok(())
    }
}

impl Default for SqliteValue<'_> {
    fn default() -> Self {
        Self::null()
    }
}

// ============================================================================
// Value Extraction (sqlite3_value_*)
// ============================================================================

/// sqlite3_value_type - Get the storage class of a value
pub fn sqlite3_value_type(value: &SqliteValue<'_>) -> ColumnType {
    value.value_type()
}

/// sqlite3_value_int64 - Get an integer value
pub fn sqlite3_value_int64(value: &SqliteValue<'_>) -> i64 {
    match value.value_type() {
        ColumnType::Integer => value.i,
        ColumnType::Float => value.as_double() as i64,
        _ => 0,
    }
}

/// sqlite3_value_double - Get a float value
pub fn sqlite3_value_double(value: &SqliteValue<'_>) -> f64 {
    match value.value_type() {
        ColumnType::Integer => value.i as f64,
        ColumnType::Float => value.as_double(),
        _ => 0.0,
    }
}

/// sqlite3_value_bytes - Logical length of a text or blob value
pub fn sqlite3_value_bytes(value: &SqliteValue<'_>) -> usize {
    if value.flags.contains(ValueFlags::ZERO) {
        value.n_zero
    } else {
        value.bytes.map_or(0, <[u8]>::len)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(v: &SqliteValue<'_>) -> Mem {
        let alloc = Allocator::new();
        let mut m = Mem::Integer(99);
        v.copy_into(&mut m, Encoding::Utf8, &alloc).unwrap();
        m
    }

    #[test]
    fn test_value_type_priority() {
        assert_eq!(SqliteValue::int_real(3).value_type(), ColumnType::Float);
        assert_eq!(SqliteValue::zero_blob(4).value_type(), ColumnType::Blob);
        let odd = SqliteValue::from_raw(ValueFlags::empty(), 1, 1.0, None, 0, Encoding::Utf8);
        assert_eq!(odd.value_type(), ColumnType::Null);
    }

    #[test]
    fn test_bind_int_real_uses_integer_bits() {
        for i in [0, -1, i64::MIN, i64::MAX, 1 << 53] {
            let m = bind(&SqliteValue::int_real(i));
            assert_eq!(m, Mem::Real(i as f64));
        }
    }

    #[test]
    fn test_bind_int_real_ignores_stale_double() {
        let v = SqliteValue::from_raw(
            ValueFlags::REAL | ValueFlags::INT_REAL,
            7,
            123.5,
            None,
            0,
            Encoding::Utf8,
        );
        assert_eq!(bind(&v), Mem::Real(7.0));
    }

    #[test]
    fn test_bind_zero_blob_ignores_bytes() {
        let junk = [1u8, 2, 3];
        let v = SqliteValue::from_raw(
            ValueFlags::BLOB | ValueFlags::ZERO,
            0,
            0.0,
            Some(&junk),
            10,
            Encoding::Utf8,
        );
        assert_eq!(bind(&v), Mem::ZeroBlob(10));
        assert_eq!(sqlite3_value_bytes(&v), 10);
    }

    #[test]
    fn test_bind_blob_copies() {
        let src = vec![9u8, 8, 7];
        let m = bind(&SqliteValue::blob(&src));
        drop(src);
        assert_eq!(m, Mem::Blob(vec![9, 8, 7]));
    }

    #[test]
    fn test_bind_text_transcodes() {
        let alloc = Allocator::new();
        let mut m = Mem::Null;
        SqliteValue::text(b"ok", Encoding::Utf8)
            .copy_into(&mut m, Encoding::Utf16be, &alloc)
            .unwrap();
        assert_eq!(
            m,
            Mem::Text {
                bytes: vec![0, b'o', 0, b'k'],
                enc: Encoding::Utf16be
            }
        );
    }

    #[test]
    fn test_bind_unknown_is_null() {
        let v = SqliteValue::from_raw(ValueFlags::ZERO, 5, 0.0, None, 3, Encoding::Utf8);
        assert!(bind(&v).is_null());
    }

    #[test]
    fn test_bind_failure_leaves_null() {
        let alloc = Allocator::new();
        alloc.fault_sim().arm(0, 1);
        let mut m = Mem::Integer(1);
        assert!(SqliteValue::blob(b"abc")
            .copy_into(&mut m, Encoding::Utf8, &alloc)
            .is_err());
        assert!(m.is_null());
    }

    #[test]
    fn test_from_mem_round_trip_flags() {
        let m = Mem::RealFromInteger(-5);
        let v = SqliteValue::from_mem(&m);
        assert!(v.flags().contains(ValueFlags::INT_REAL));
        assert_eq!(sqlite3_value_double(&v), -5.0);
        assert_eq!(sqlite3_value_int64(&v), -5);
    }
}
