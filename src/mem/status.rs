//! Allocation Statistics
//!
//! Atomic counters describing the engine-owned allocations made through an
//! [`Allocator`](super::Allocator).

use std::sync::atomic::{AtomicI64, Ordering};

/// Allocation statistics for one allocator
#[derive(Debug, Default)]
pub struct MemStatus {
    /// Successful allocations
    alloc_count: AtomicI64,
    /// Bytes handed out by successful allocations
    bytes_allocated: AtomicI64,
    /// Largest single allocation (bytes)
    largest: AtomicI64,
    /// Allocations that failed (real or simulated)
    failed_count: AtomicI64,
}

impl MemStatus {
    /// Create an empty tracker
    pub const fn new() -> Self {
        Self {
            alloc_count: AtomicI64::new(0),
            bytes_allocated: AtomicI64::new(0),
            largest: AtomicI64::new(0),
            failed_count: AtomicI64::new(0),
        }
    }

    /// Record a successful allocation
    pub fn record_alloc(&self, size: usize) {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        self.alloc_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(size, Ordering::Relaxed);
        self.largest.fetch_max(size, Ordering::Relaxed);
    }

    /// Record a failed allocation
    pub fn record_failure(&self) {
        self.failed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of successful allocations
    pub fn alloc_count(&self) -> i64 {
        self.alloc_count.load(Ordering::Relaxed)
    }

    /// Total bytes allocated
    pub fn bytes_allocated(&self) -> i64 {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    /// Largest single allocation
    pub fn largest(&self) -> i64 {
        self.largest.load(Ordering::Relaxed)
    }

    /// Number of failed allocations
    pub fn failed_count(&self) -> i64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.alloc_count.store(0, Ordering::Relaxed);
        self.bytes_allocated.store(0, Ordering::Relaxed);
        self.largest.store(0, Ordering::Relaxed);
        self.failed_count.store(0, Ordering::Relaxed);
    }
}
