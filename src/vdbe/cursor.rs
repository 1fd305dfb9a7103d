//! Cursor Table
//!
//! Slots holding the storage cursors a program has opened, indexed by the
//! P1 operand of the cursor opcodes.

use crate::storage::{CursorHandle, Storage};

/// An open cursor slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdbeCursor {
    /// Storage-side handle
    pub handle: CursorHandle,
    /// Table the cursor reads
    pub table: String,
}

/// Fixed-size table of cursor slots
#[derive(Debug, Default)]
pub struct CursorTable {
    slots: Vec<Option<VdbeCursor>>,
}

impl CursorTable {
    /// Create `n` empty slots
    pub fn new(n: usize) -> Self {
        Self {
            slots: (0..n).map(|_| None).collect(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the table has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Install a cursor in an empty slot.
    ///
    /// Opening over an active cursor is a contract violation by the
    /// program; it is asserted in debug builds and the old cursor is
    /// returned so the caller can still release it.
    pub fn open(&mut self, idx: usize, cursor: VdbeCursor) -> Option<VdbeCursor> {
        debug_assert!(self.slots[idx].is_none(), "cursor slot {} already open", idx);
        self.slots[idx].replace(cursor)
    }

    /// The cursor in slot `idx`, if open
    pub fn get(&self, idx: usize) -> Option<&VdbeCursor> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// Close the cursor in slot `idx`; no-op for an empty slot
    pub fn close(&mut self, idx: usize, storage: &dyn Storage) {
        if let Some(cur) = self.slots.get_mut(idx).and_then(Option::take) {
            storage.close_cursor(cur.handle);
        }
    }

    /// Close every open cursor
    pub fn close_all(&mut self, storage: &dyn Storage) {
        for idx in 0..self.slots.len() {
            self.close(idx, storage);
        }
    }

    /// Are all slots empty?
    pub fn all_closed(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Number of open cursors
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
