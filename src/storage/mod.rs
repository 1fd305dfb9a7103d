//! Storage collaborator interface
//!
//! The engine reads table data only through the [`Storage`] trait: open a
//! cursor on a table, advance it row by row, read columns and close it.
//! Every call except `close_cursor` is fallible; the engine maps a failure
//! to a faulted halt and does not interpret it further.

pub mod memory;

pub use memory::{FaultPoint, MemoryStorage};

use std::fmt;

use crate::error::Result;
use crate::types::Value;

/// Opaque handle to an open storage cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(u64);

impl CursorHandle {
    /// Wrap a raw handle value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor#{}", self.0)
    }
}

/// Table access used by the cursor opcodes.
///
/// A freshly opened cursor is positioned before the first row; the first
/// `advance` moves it onto row 0.
pub trait Storage: Send + Sync {
    /// Open a read cursor on `table`
    fn open_cursor(&self, table: &str) -> Result<CursorHandle>;

    /// Release a cursor. Unknown handles are ignored.
    fn close_cursor(&self, handle: CursorHandle);

    /// Move to the next row. Returns false once the rows are exhausted.
    fn advance(&self, handle: CursorHandle) -> Result<bool>;

    /// Read column `col` of the current row
    fn read_column(&self, handle: CursorHandle, col: usize) -> Result<Value>;

    /// Number of cursors currently open
    fn open_cursor_count(&self) -> usize {
        0
    }
}
