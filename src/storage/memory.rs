//! In-memory table store
//!
//! Rows are kept as vectors of [`Value`]. Clones share the same tables and
//! cursors, so a test can keep one handle for setup and fault injection
//! while the connection owns another.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, ErrorCode, ResultCode, Result};
use crate::storage::{CursorHandle, Storage};
use crate::types::Value;

/// Storage call that an injected error is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `open_cursor`
    Open,
    /// `advance`
    Advance,
    /// `read_column`
    ReadColumn,
}

#[derive(Debug)]
struct MemCursor {
    table: String,
    /// None until the first advance
    row: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    tables: HashMap<String, Vec<Vec<Value>>>,
    cursors: HashMap<u64, MemCursor>,
    next_cursor: u64,
    faults: HashMap<FaultPoint, Error>,
}

impl MemoryInner {
    fn take_fault(&mut self, point: FaultPoint) -> Result<()> {
        match self.faults.remove(&point) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn cursor(&self, handle: CursorHandle) -> Result<&MemCursor> {
        self.cursors.get(&handle.raw()).ok_or_else(|| {
            Error::with_message(ErrorCode::Misuse, format!("{} is not open", handle))
        })
    }
}

/// Shared in-memory [`Storage`] implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table
    pub fn create_table(&self, name: impl Into<String>, rows: Vec<Vec<Value>>) {
        self.inner.lock().tables.insert(name.into(), rows);
    }

    /// Append a row to an existing table (creating it if needed)
    pub fn insert_row(&self, table: &str, row: Vec<Value>) {
        self.inner
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Make the next call at `point` fail with `error`
    pub fn inject_error(&self, point: FaultPoint, error: Error) {
        self.inner.lock().faults.insert(point, error);
    }

    /// Make the next `advance` fail with a disk read error
    pub fn inject_io_error(&self) {
        self.inject_error(
            FaultPoint::Advance,
            Error::with_message(ResultCode::IOERR_READ, ErrorCode::IoErr.errstr()),
        );
    }
}

impl Storage for MemoryStorage {
    fn open_cursor(&self, table: &str) -> Result<CursorHandle> {
        let mut inner = self.inner.lock();
        inner.take_fault(FaultPoint::Open)?;
        if !inner.tables.contains_key(table) {
            return Err(Error::with_message(
                ErrorCode::Error,
                format!("no such table: {}", table),
            ));
        }
        let id = inner.next_cursor;
        inner.next_cursor += 1;
        inner.cursors.insert(
            id,
            MemCursor {
                table: table.to_string(),
                row: None,
            },
        );
        Ok(CursorHandle::new(id))
    }

    fn close_cursor(&self, handle: CursorHandle) {
        self.inner.lock().cursors.remove(&handle.raw());
    }

    fn advance(&self, handle: CursorHandle) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.take_fault(FaultPoint::Advance)?;
        let (table, next) = {
            let cur = inner.cursor(handle)?;
            (cur.table.clone(), cur.row.map_or(0, |r| r + 1))
        };
        let n_rows = inner.tables.get(&table).map_or(0, Vec::len);
        if let Some(cur) = inner.cursors.get_mut(&handle.raw()) {
            cur.row = Some(next.min(n_rows));
        }
        Ok(next < n_rows)
    }

    fn read_column(&self, handle: CursorHandle, col: usize) -> Result<Value> {
        let mut inner = self.inner.lock();
        inner.take_fault(FaultPoint::ReadColumn)?;
        let cur = inner.cursor(handle)?;
        let row = cur
            .row
            .and_then(|r| inner.tables.get(&cur.table).and_then(|t| t.get(r)));
        match row {
            Some(values) => Ok(values.get(col).cloned().unwrap_or(Value::Null)),
            None => Err(Error::with_message(
                ErrorCode::Misuse,
                format!("{} has no current row", handle),
            )),
        }
    }

    fn open_cursor_count(&self) -> usize {
        self.inner.lock().cursors.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStorage {
        let s = MemoryStorage::new();
        s.create_table(
            "t",
            vec![
                vec![Value::Integer(1), Value::from("a")],
                vec![Value::Integer(2), Value::from("b")],
            ],
        );
        s
    }

    #[test]
    fn test_scan_rows() {
        let s = store();
        let h = s.open_cursor("t").unwrap();
        assert!(s.advance(h).unwrap());
        assert_eq!(s.read_column(h, 1).unwrap(), Value::from("a"));
        assert!(s.advance(h).unwrap());
        assert_eq!(s.read_column(h, 0).unwrap(), Value::Integer(2));
        assert_eq!(s.read_column(h, 7).unwrap(), Value::Null);
        assert!(!s.advance(h).unwrap());
        assert!(!s.advance(h).unwrap());
        s.close_cursor(h);
        assert_eq!(s.open_cursor_count(), 0);
    }

    #[test]
    fn test_read_before_advance_is_misuse() {
        let s = store();
        let h = s.open_cursor("t").unwrap();
        assert_eq!(s.read_column(h, 0).unwrap_err().code(), ErrorCode::Misuse);
    }

    #[test]
    fn test_missing_table() {
        let s = store();
        let err = s.open_cursor("nope").unwrap_err();
        assert_eq!(err.message(), Some("no such table: nope"));
    }

    #[test]
    fn test_injected_error_is_one_shot() {
        let s = store();
        let shared = s.clone();
        let h = s.open_cursor("t").unwrap();
        shared.inject_io_error();
        let err = s.advance(h).unwrap_err();
        assert_eq!(err.extended_code(), ResultCode::IOERR_READ);
        assert_eq!(err.message(), Some("disk I/O error"));
        assert!(s.advance(h).unwrap());
    }
}
