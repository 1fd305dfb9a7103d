//! Engine Memory Allocation
//!
//! Every buffer the engine takes ownership of (text and blob copies, aux
//! data entries) is obtained through an [`Allocator`]. Allocation is
//! fallible: a real reservation failure or a simulated fault yields
//! `SQLITE_NOMEM` and raises the sticky `malloc_failed` flag that the
//! interpreter checks after operations whose failure paths are silent.

pub mod fault;
pub mod status;

pub use fault::FaultSim;
pub use status::MemStatus;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, ErrorCode, Result};

/// Per-connection allocator front end
#[derive(Debug, Default)]
pub struct Allocator {
    status: MemStatus,
    fault: FaultSim,
    malloc_failed: AtomicBool,
}

impl Allocator {
    /// Create an allocator with no faults armed
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocation statistics
    pub fn status(&self) -> &MemStatus {
        &self.status
    }

    /// Fault simulator controlling this allocator
    pub fn fault_sim(&self) -> &FaultSim {
        &self.fault
    }

    /// Has any allocation failed since the flag was last cleared?
    pub fn malloc_failed(&self) -> bool {
        self.malloc_failed.load(Ordering::Acquire)
    }

    /// Clear the sticky failure flag, returning its previous value
    pub fn take_malloc_failed(&self) -> bool {
        self.malloc_failed.swap(false, Ordering::AcqRel)
    }

    fn fail(&self, size: usize) -> Error {
        self.status.record_failure();
        self.malloc_failed.store(true, Ordering::Release);
        tracing::debug!(target: "sqlvm::mem", size, "allocation failed");
        Error::new(ErrorCode::NoMem)
    }

    /// Reserve accounting for an allocation of `size` bytes.
    ///
    /// Used for allocations whose storage is created by ordinary Rust
    /// constructors (e.g. list entries) so they still honour the fault
    /// simulator.
    pub fn try_alloc(&self, size: usize) -> Result<()> {
        if self.fault.should_fail() {
            return Err(self.fail(size));
        }
        self.status.record_alloc(size);
        Ok(())
    }

    /// Allocate an empty buffer with room for `capacity` bytes.
    pub fn try_buffer(&self, capacity: usize) -> Result<Vec<u8>> {
        if self.fault.should_fail() {
            return Err(self.fail(capacity));
        }
        let mut buf = Vec::new();
        if buf.try_reserve_exact(capacity).is_err() {
            return Err(self.fail(capacity));
        }
        self.status.record_alloc(capacity);
        Ok(buf)
    }

    /// Copy `bytes` into a freshly allocated, engine-owned buffer.
    pub fn try_copy(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut buf = self.try_buffer(bytes.len())?;
        buf.extend_from_slice(bytes);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_copy_records_status() {
        let alloc = Allocator::new();
        let buf = alloc.try_copy(b"hello").unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(alloc.status().alloc_count(), 1);
        assert_eq!(alloc.status().bytes_allocated(), 5);
        assert!(!alloc.malloc_failed());
    }

    #[test]
    fn test_fault_sets_sticky_flag() {
        let alloc = Allocator::new();
        alloc.fault_sim().arm(0, 1);
        let err = alloc.try_copy(b"x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoMem);
        assert!(alloc.malloc_failed());
        assert!(alloc.take_malloc_failed());
        assert!(!alloc.malloc_failed());
        assert_eq!(alloc.status().failed_count(), 1);
        assert!(alloc.try_copy(b"y").is_ok());
    }
}
