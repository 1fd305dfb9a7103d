//! VDBE Memory Cells
//!
//! Memory cells (`Mem`) are the registers of the virtual machine. A cell is
//! a closed sum type; every heap buffer it holds is exclusively owned by
//! the cell, so there is no separate "static" or "ephemeral" marking.
//!
//! `RealFromInteger` is a REAL that is known to hold an exact integer. It
//! reports itself as a float but keeps the integer so that values written
//! under REAL affinity round-trip without precision loss.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::mem::Allocator;
use crate::types::{format_real, ColumnType, Encoding, Value};
use crate::utf;

// ============================================================================
// Memory Cell
// ============================================================================

/// A single register value
#[derive(Clone, PartialEq, Default)]
pub enum Mem {
    /// NULL
    #[default]
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// Float holding an exact integer value
    RealFromInteger(i64),
    /// Text in the stated encoding
    Text { bytes: Vec<u8>, enc: Encoding },
    /// Binary data
    Blob(Vec<u8>),
    /// Blob of `n` zero bytes that has not been materialized
    ZeroBlob(usize),
}

/// Read-only, borrowed view of a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemView<'a> {
    /// NULL
    Null,
    /// Integer
    Integer(i64),
    /// Float (including integers stored as reals)
    Real(f64),
    /// Text bytes with their encoding
    Text(&'a [u8], Encoding),
    /// Blob bytes
    Blob(&'a [u8]),
    /// Zero-filled blob of the given logical length
    ZeroBlob(usize),
}

impl MemView<'_> {
    /// Storage class reported to callers
    pub fn column_type(&self) -> ColumnType {
        match self {
            MemView::Null => ColumnType::Null,
            MemView::Integer(_) => ColumnType::Integer,
            MemView::Real(_) => ColumnType::Float,
            MemView::Text(..) => ColumnType::Text,
            MemView::Blob(_) | MemView::ZeroBlob(_) => ColumnType::Blob,
        }
    }
}

/// A parsed numeric value
#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Int(i64),
    Real(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Real(r) => r,
        }
    }
}

/// Parse the longest numeric prefix of `s` (SQL text-to-number rules).
///
/// Text with no numeric prefix converts to integer 0.
fn parse_numeric(s: &str) -> Numeric {
    let s = s.trim_start();
    let b = s.as_bytes();
    let mut end = 0usize;
    if end < b.len() && (b[end] == b'+' || b[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < b.len() && b[end].is_ascii_digit() {
        end += 1;
    }
    let mut is_real = false;
    if end < b.len() && b[end] == b'.' {
        is_real = true;
        end += 1;
        while end < b.len() && b[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || (is_real && end == digits_start + 1) {
        return Numeric::Int(0);
    }
    if end < b.len() && (b[end] == b'e' || b[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < b.len() && (b[exp_end] == b'+' || b[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < b.len() && b[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            is_real = true;
            end = exp_end;
        }
    }
    let text = &s[..end];
    if !is_real {
        if let Ok(i) = text.parse::<i64>() {
            return Numeric::Int(i);
        }
    }
    Numeric::Real(text.parse::<f64>().unwrap_or(0.0))
}

impl Mem {
    // ========================================================================
    // Type Checking
    // ========================================================================

    /// Is the value NULL?
    pub fn is_null(&self) -> bool {
        matches!(self, Mem::Null)
    }

    /// Storage class reported to callers
    pub fn column_type(&self) -> ColumnType {
        self.view().column_type()
    }

    /// Borrowed view of the value
    pub fn view(&self) -> MemView<'_> {
        match self {
            Mem::Null => MemView::Null,
            Mem::Integer(i) => MemView::Integer(*i),
            Mem::Real(r) => MemView::Real(*r),
            Mem::RealFromInteger(i) => MemView::Real(*i as f64),
            Mem::Text { bytes, enc } => MemView::Text(bytes, *enc),
            Mem::Blob(b) => MemView::Blob(b),
            Mem::ZeroBlob(n) => MemView::ZeroBlob(*n),
        }
    }

    /// The exact integer behind an INTEGER or integer-valued REAL cell
    pub fn exact_integer(&self) -> Option<i64> {
        match self {
            Mem::Integer(i) | Mem::RealFromInteger(i) => Some(*i),
            _ => None,
        }
    }

    /// Logical length in bytes (text/blob), 8 for numbers, 0 for NULL
    pub fn len(&self) -> usize {
        match self {
            Mem::Null => 0,
            Mem::Integer(_) | Mem::Real(_) | Mem::RealFromInteger(_) => 8,
            Mem::Text { bytes, .. } => bytes.len(),
            Mem::Blob(b) => b.len(),
            Mem::ZeroBlob(n) => *n,
        }
    }

    /// True for NULL and for zero-length text/blob
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// Release any buffer and become NULL
    pub fn set_null(&mut self) {
        *self = Mem::Null;
    }

    /// Store an integer
    pub fn set_int(&mut self, value: i64) {
        *self = Mem::Integer(value);
    }

    /// Store a float
    pub fn set_real(&mut self, value: f64) {
        *self = Mem::Real(value);
    }

    /// Store a zero-filled blob of logical length `n`
    pub fn set_zero_blob(&mut self, n: usize) {
        *self = Mem::ZeroBlob(n);
    }

    /// Store a blob.
    ///
    /// Borrowed bytes are copied into an engine-owned buffer; owned bytes
    /// are moved in. On allocation failure the cell is left NULL.
    pub fn set_blob(&mut self, bytes: Cow<'_, [u8]>, alloc: &Allocator) -> Result<()> {
        self.set_null();
        let owned = match bytes {
            Cow::Borrowed(b) => alloc.try_copy(b)?,
            Cow::Owned(v) => v,
        };
        *self = Mem::Blob(owned);
        Ok(())
    }

    /// Store text given in `enc`, converting it to the database encoding.
    ///
    /// On allocation failure the cell is left NULL.
    pub fn set_text(
        &mut self,
        bytes: Cow<'_, [u8]>,
        enc: Encoding,
        db_enc: Encoding,
        alloc: &Allocator,
    ) -> Result<()> {
        self.set_null();
        let owned = if enc != db_enc {
            alloc.try_alloc(utf::transcoded_len_hint(bytes.len(), enc, db_enc))?;
            utf::transcode(&bytes, enc, db_enc)
        } else {
            let bytes = match bytes {
                Cow::Borrowed(b) => Cow::Borrowed(if enc.is_utf16() { utf::utf16_even(b) } else { b }),
                Cow::Owned(mut v) => {
                    if enc.is_utf16() {
                        v.truncate(v.len() & !1);
                    }
                    Cow::Owned(v)
                }
            };
            match bytes {
                Cow::Borrowed(b) => alloc.try_copy(b)?,
                Cow::Owned(v) => v,
            }
        };
        *self = Mem::Text {
            bytes: owned,
            enc: db_enc,
        };
        Ok(())
    }

    /// Convenience for UTF-8 string literals
    pub fn set_str(&mut self, s: &str, db_enc: Encoding, alloc: &Allocator) -> Result<()> {
        self.set_text(Cow::Borrowed(s.as_bytes()), Encoding::Utf8, db_enc, alloc)
    }

    /// Copy an owned [`Value`] into the cell
    pub fn set_value(&mut self, value: &Value, db_enc: Encoding, alloc: &Allocator) -> Result<()> {
        match value {
            Value::Null => self.set_null(),
            Value::Integer(i) => self.set_int(*i),
            Value::Real(r) => self.set_real(*r),
            Value::Text(s) => self.set_str(s, db_enc, alloc)?,
            Value::Blob(b) => self.set_blob(Cow::Borrowed(b), alloc)?,
        }
        Ok(())
    }

    /// Apply REAL affinity: integers become integer-valued reals
    pub fn apply_real_affinity(&mut self) {
        if let Mem::Integer(i) = *self {
            *self = Mem::RealFromInteger(i);
        }
    }

    /// Replace a zero-blob with real zero bytes
    pub fn materialize(&mut self, alloc: &Allocator) -> Result<()> {
        if let Mem::ZeroBlob(n) = *self {
            let mut buf = alloc.try_buffer(n)?;
            buf.resize(n, 0);
            *self = Mem::Blob(buf);
        }
        Ok(())
    }

    // ========================================================================
    // Coercions
    // ========================================================================

    fn numeric(&self) -> Option<Numeric> {
        match self {
            Mem::Null => None,
            Mem::Integer(i) => Some(Numeric::Int(*i)),
            Mem::Real(r) => Some(Numeric::Real(*r)),
            Mem::RealFromInteger(i) => Some(Numeric::Real(*i as f64)),
            Mem::Text { bytes, enc } => Some(parse_numeric(&utf::decode_to_string(bytes, *enc))),
            Mem::Blob(b) => Some(parse_numeric(&String::from_utf8_lossy(b))),
            Mem::ZeroBlob(_) => Some(Numeric::Int(0)),
        }
    }

    /// Value as an integer (reals truncate, text parses its numeric prefix)
    pub fn to_int(&self) -> i64 {
        match self {
            Mem::Integer(i) | Mem::RealFromInteger(i) => *i,
            Mem::Real(r) => real_to_int(*r),
            _ => match self.numeric() {
                Some(Numeric::Int(i)) => i,
                Some(Numeric::Real(r)) => real_to_int(r),
                None => 0,
            },
        }
    }

    /// Value as a float; integers are promoted without touching the cell
    pub fn to_real(&self) -> f64 {
        self.numeric().map_or(0.0, Numeric::as_f64)
    }

    /// Value rendered as UTF-8 text
    pub fn to_text(&self) -> String {
        match self {
            Mem::Null => String::new(),
            Mem::Integer(i) => i.to_string(),
            Mem::Real(r) => format_real(*r),
            Mem::RealFromInteger(i) => format_real(*i as f64),
            Mem::Text { bytes, enc } => utf::decode_to_string(bytes, *enc),
            Mem::Blob(b) => String::from_utf8_lossy(b).into_owned(),
            Mem::ZeroBlob(n) => "\0".repeat(*n),
        }
    }

    /// Value as bytes; zero-blobs are expanded
    pub fn to_blob(&self) -> Vec<u8> {
        match self {
            Mem::Blob(b) => b.clone(),
            Mem::ZeroBlob(n) => vec![0; *n],
            Mem::Text { bytes, .. } => bytes.clone(),
            Mem::Null => Vec::new(),
            _ => self.to_text().into_bytes(),
        }
    }

    /// Copy out as an owned [`Value`]
    pub fn to_value(&self) -> Value {
        match self {
            Mem::Null => Value::Null,
            Mem::Integer(i) => Value::Integer(*i),
            Mem::Real(r) => Value::Real(*r),
            Mem::RealFromInteger(i) => Value::Real(*i as f64),
            Mem::Text { .. } => Value::Text(self.to_text()),
            Mem::Blob(_) | Mem::ZeroBlob(_) => Value::Blob(self.to_blob()),
        }
    }

    /// Three-valued truth: `None` for NULL
    pub fn truth(&self) -> Option<bool> {
        match self {
            Mem::Null => None,
            Mem::Integer(i) | Mem::RealFromInteger(i) => Some(*i != 0),
            Mem::Real(r) => Some(*r != 0.0),
            _ => Some(self.to_real() != 0.0),
        }
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// Compare two non-NULL-aware cells using SQL sort order:
    /// NULL < numbers < text < blob. Text compares with BINARY collation.
    pub fn compare(&self, other: &Mem) -> Ordering {
        fn class(m: &Mem) -> u8 {
            match m {
                Mem::Null => 0,
                Mem::Integer(_) | Mem::Real(_) | Mem::RealFromInteger(_) => 1,
                Mem::Text { .. } => 2,
                Mem::Blob(_) | Mem::ZeroBlob(_) => 3,
            }
        }

        let (ca, cb) = (class(self), class(other));
        if ca != cb {
            return ca.cmp(&cb);
        }
        match (self, other) {
            (Mem::Null, Mem::Null) => Ordering::Equal,
            (Mem::Text { bytes: a, enc: ea }, Mem::Text { bytes: b, enc: eb }) => {
                if ea == eb {
                    a.cmp(b)
                } else {
                    self.to_text().cmp(&other.to_text())
                }
            }
            (Mem::Blob(a), Mem::Blob(b)) => a.cmp(b),
            (Mem::ZeroBlob(_), _) | (_, Mem::ZeroBlob(_)) => self.to_blob().cmp(&other.to_blob()),
            _ => compare_numbers(self, other),
        }
    }
}

fn real_to_int(r: f64) -> i64 {
    if r.is_nan() {
        0
    } else {
        // `as` saturates at the i64 bounds
        r as i64
    }
}

/// Compare an integer against a float without losing integer precision
fn int_float_compare(i: i64, r: f64) -> Ordering {
    if r.is_nan() {
        return Ordering::Greater;
    }
    if r < -9223372036854775808.0 {
        return Ordering::Greater;
    }
    if r >= 9223372036854775808.0 {
        return Ordering::Less;
    }
    let y = r as i64;
    match i.cmp(&y) {
        Ordering::Equal => (i as f64).partial_cmp(&r).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

fn compare_numbers(a: &Mem, b: &Mem) -> Ordering {
    match (a, b) {
        (Mem::Integer(x), Mem::Integer(y))
        | (Mem::RealFromInteger(x), Mem::RealFromInteger(y))
        | (Mem::Integer(x), Mem::RealFromInteger(y))
        | (Mem::RealFromInteger(x), Mem::Integer(y)) => x.cmp(y),
        (Mem::Integer(x) | Mem::RealFromInteger(x), Mem::Real(r)) => int_float_compare(*x, *r),
        (Mem::Real(r), Mem::Integer(y) | Mem::RealFromInteger(y)) => {
            int_float_compare(*y, *r).reverse()
        }
        (Mem::Real(x), Mem::Real(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

impl fmt::Debug for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mem::Null => write!(f, "NULL"),
            Mem::Integer(i) => write!(f, "INT({})", i),
            Mem::Real(r) => write!(f, "REAL({})", r),
            Mem::RealFromInteger(i) => write!(f, "INTREAL({})", i),
            Mem::Text { .. } => write!(f, "TEXT({:?})", self.to_text()),
            Mem::Blob(b) => write!(f, "BLOB({} bytes)", b.len()),
            Mem::ZeroBlob(n) => write!(f, "ZEROBLOB({})", n),
        }
    }
}

// ============================================================================
// Arithmetic Operations
// ============================================================================

/// Arithmetic operator selector for [`Mem::arith`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Remainder,
}

impl Mem {
    /// Compute `self <op> rhs` with SQL dynamic typing.
    ///
    /// NULL operands give NULL; integer overflow falls back to float;
    /// division or remainder by zero gives NULL.
    pub fn arith(&self, op: ArithOp, rhs: &Mem) -> Mem {
        let (Some(a), Some(b)) = (self.numeric(), rhs.numeric()) else {
            return Mem::Null;
        };

        if let (Numeric::Int(x), Numeric::Int(y)) = (a, b) {
            let exact = match op {
                ArithOp::Add => x.checked_add(y),
                ArithOp::Subtract => x.checked_sub(y),
                ArithOp::Multiply => x.checked_mul(y),
                ArithOp::Divide => {
                    if y == 0 {
                        return Mem::Null;
                    }
                    x.checked_div(y)
                }
                ArithOp::Remainder => {
                    if y == 0 {
                        return Mem::Null;
                    }
                    Some(x.wrapping_rem(if y == -1 { 1 } else { y }))
                }
            };
            if let Some(v) = exact {
                return Mem::Integer(v);
            }
        }

        let (x, y) = (a.as_f64(), b.as_f64());
        let r = match op {
            ArithOp::Add => x + y,
            ArithOp::Subtract => x - y,
            ArithOp::Multiply => x * y,
            ArithOp::Divide => {
                if y == 0.0 {
                    return Mem::Null;
                }
                x / y
            }
            ArithOp::Remainder => {
                let ia = real_to_int(x);
                let mut ib = real_to_int(y);
                if ib == 0 {
                    return Mem::Null;
                }
                if ib == -1 {
                    ib = 1;
                }
                (ia % ib) as f64
            }
        };
        if r.is_nan() {
            Mem::Null
        } else {
            Mem::Real(r)
        }
    }

    /// Text concatenation `self || rhs`, stored in the database encoding
    pub fn concat(&self, rhs: &Mem, db_enc: Encoding, alloc: &Allocator) -> Result<Mem> {
        if self.is_null() || rhs.is_null() {
            return Ok(Mem::Null);
        }
        let mut joined = self.to_text();
        joined.push_str(&rhs.to_text());
        let mut out = Mem::Null;
        out.set_text(Cow::Owned(joined.into_bytes()), Encoding::Utf8, db_enc, alloc)?;
        Ok(out)
    }
}

// ============================================================================
// Register File
// ============================================================================

/// The indexed array of cells a program operates on
#[derive(Debug)]
pub struct RegisterFile {
    cells: Vec<Mem>,
    alloc: Arc<Allocator>,
    db_enc: Encoding,
}

impl RegisterFile {
    /// Allocate `n` NULL registers
    pub fn new(n: usize, alloc: Arc<Allocator>, db_enc: Encoding) -> Self {
        Self {
            cells: vec![Mem::Null; n],
            alloc,
            db_enc,
        }
    }

    /// Number of registers
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the file has no registers
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Allocator used for register buffers
    pub fn allocator(&self) -> &Allocator {
        &self.alloc
    }

    /// Database text encoding
    pub fn encoding(&self) -> Encoding {
        self.db_enc
    }

    /// Cell at `idx`
    pub fn get(&self, idx: usize) -> &Mem {
        &self.cells[idx]
    }

    /// Mutable cell at `idx`
    pub fn get_mut(&mut self, idx: usize) -> &mut Mem {
        &mut self.cells[idx]
    }

    /// Replace the cell at `idx`
    pub fn set(&mut self, idx: usize, value: Mem) {
        self.cells[idx] = value;
    }

    /// Read-only view of register `idx`; NULL is a valid result
    pub fn read(&self, idx: usize) -> MemView<'_> {
        self.cells[idx].view()
    }

    /// Store an integer
    pub fn set_integer(&mut self, idx: usize, value: i64) {
        self.cells[idx].set_int(value);
    }

    /// Store a float
    pub fn set_real(&mut self, idx: usize, value: f64) {
        self.cells[idx].set_real(value);
    }

    /// Store NULL
    pub fn set_null(&mut self, idx: usize) {
        self.cells[idx].set_null();
    }

    /// Store a zero-filled blob
    pub fn set_zero_blob(&mut self, idx: usize, n: usize) {
        self.cells[idx].set_zero_blob(n);
    }

    /// Store text
    pub fn set_text(&mut self, idx: usize, bytes: Cow<'_, [u8]>, enc: Encoding) -> Result<()> {
        let (alloc, db_enc) = (&self.alloc, self.db_enc);
        self.cells[idx].set_text(bytes, enc, db_enc, alloc)
    }

    /// Store a blob
    pub fn set_blob(&mut self, idx: usize, bytes: Cow<'_, [u8]>) -> Result<()> {
        let alloc = &self.alloc;
        self.cells[idx].set_blob(bytes, alloc)
    }

    /// Move register `from` into `to`, leaving `from` NULL
    pub fn move_cell(&mut self, from: usize, to: usize) {
        let v = std::mem::take(&mut self.cells[from]);
        self.cells[to] = v;
    }

    /// Release every register
    pub fn clear_all(&mut self) {
        for cell in &mut self.cells {
            cell.set_null();
        }
    }

    /// Are all registers NULL?
    pub fn is_clean(&self) -> bool {
        self.cells.iter().all(Mem::is_null)
    }

    /// Iterate over the cells in a range
    pub fn range(&self, start: usize, count: usize) -> &[Mem] {
        &self.cells[start..start + count]
    }

    /// Check a register index against the file bounds
    pub fn check(&self, idx: i32) -> Result<usize> {
        usize::try_from(idx)
            .ok()
            .filter(|&i| i < self.cells.len())
            .ok_or_else(|| {
                Error::with_message(ErrorCode::Internal, format!("register {} out of range", idx))
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
