//! Auxiliary Data Cache
//!
//! Per-program memo table used by scalar functions to keep an expensive
//! per-call-site value (a compiled pattern, a parsed format) alive across
//! rows. Entries are keyed by the address of the `Function` op and the
//! argument index. An entry stored under a negative index is the "any"
//! entry for its address: lookups for any index of that address find it,
//! but it is only replaced by another store under a negative index. Each
//! entry may carry a destructor that is run on its payload
//! when the payload is replaced or the cache is cleared.

use std::any::Any;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use crate::mem::Allocator;

/// Cached value
pub type AuxPayload = Box<dyn Any + Send>;

/// Destructor run on a payload when it leaves the cache
pub type AuxDestructor = Box<dyn FnOnce(AuxPayload) + Send>;

struct AuxEntry {
    op: i32,
    arg: i32,
    payload: AuxPayload,
    destructor: Option<AuxDestructor>,
}

impl AuxEntry {
    /// Lookup rule: an "any" entry answers every index of its address
    fn answers(&self, op: i32, arg: i32) -> bool {
        self.op == op && (self.arg == arg || self.arg < 0 || arg < 0)
    }

    /// Store rule: exact key only, with all negative indexes equal
    fn same_key(&self, op: i32, arg: i32) -> bool {
        self.op == op && (self.arg == arg || (self.arg < 0 && arg < 0))
    }

    fn destroy(self) {
        if let Some(destructor) = self.destructor {
            destructor(self.payload);
        }
    }
}

fn release(payload: AuxPayload, destructor: Option<AuxDestructor>) {
    if let Some(destructor) = destructor {
        destructor(payload);
    }
}

/// The auxiliary-data list of one program
pub struct AuxDataCache {
    /// Oldest first; scans walk from the back so the newest entry wins
    entries: Vec<AuxEntry>,
    alloc: Arc<Allocator>,
}

impl AuxDataCache {
    /// Create an empty cache drawing entries from `alloc`
    pub fn new(alloc: Arc<Allocator>) -> Self {
        Self {
            entries: Vec::new(),
            alloc,
        }
    }

    /// Associate `value` with `(op, arg)`.
    ///
    /// An entry with the same key has its old payload handed to its old destructor
    /// before being overwritten. When a new entry cannot be allocated,
    /// `destructor` is run on `value` immediately, the cache is left
    /// untouched and the allocator's `malloc_failed` flag records the
    /// failure.
    pub fn set(&mut self, op: i32, arg: i32, value: AuxPayload, destructor: Option<AuxDestructor>) {
        let arg = arg.max(-1);
        if let Some(idx) = self.entries.iter().rposition(|e| e.same_key(op, arg)) {
            let entry = &mut self.entries[idx];
            let old_payload = std::mem::replace(&mut entry.payload, value);
            let old_destructor = std::mem::replace(&mut entry.destructor, destructor);
            release(old_payload, old_destructor);
            return;
        }

        if self.alloc.try_alloc(size_of::<AuxEntry>()).is_err() || self.entries.try_reserve(1).is_err() {
            tracing::debug!(target: "sqlvm::vdbe", op, arg, "auxdata entry allocation failed");
            release(value, destructor);
            return;
        }
        self.entries.push(AuxEntry {
            op,
            arg,
            payload: value,
            destructor,
        });
    }

    /// Payload cached for `(op, arg)`
    pub fn get(&self, op: i32, arg: i32) -> Option<&(dyn Any + Send)> {
        self.entries
            .iter()
            .rposition(|e| e.answers(op, arg))
            .map(|idx| self.entries[idx].payload.as_ref())
    }

    /// Typed access to the payload cached for `(op, arg)`
    pub fn get_as<T: Any>(&self, op: i32, arg: i32) -> Option<&T> {
        self.get(op, arg).and_then(|p| p.downcast_ref::<T>())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destroy every entry, running destructors on their payloads
    pub fn clear_all(&mut self) {
        for entry in self.entries.drain(..).rev() {
            entry.destroy();
        }
    }
}

impl Drop for AuxDataCache {
    fn drop(&mut self) {
        self.clear_all();
    }
}

impl fmt::Debug for AuxDataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().rev().map(|e| (e.op, e.arg)))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_destructor(hits: &Arc<AtomicUsize>, seen: &Arc<parking_lot::Mutex<Vec<i32>>>) -> AuxDestructor {
        let hits = Arc::clone(hits);
        let seen = Arc::clone(seen);
        Box::new(move |payload| {
            hits.fetch_add(1, Ordering::SeqCst);
            if let Ok(v) = payload.downcast::<i32>() {
                seen.lock().push(*v);
            }
        })
    }

    #[test]
    fn test_set_and_get() {
        let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
        cache.set(4, 0, Box::new(10i32), None);
        cache.set(4, 1, Box::new(11i32), None);
        cache.set(5, 0, Box::new(20i32), None);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get_as::<i32>(4, 1), Some(&11));
        assert_eq!(cache.get_as::<i32>(5, 0), Some(&20));
        assert!(cache.get(6, 0).is_none());
    }

    #[test]
    fn test_replace_runs_old_destructor() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
        cache.set(1, 2, Box::new(1i32), Some(counting_destructor(&hits, &seen)));
        cache.set(1, 2, Box::new(2i32), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(cache.get_as::<i32>(1, 2), Some(&2));
    }

    #[test]
    fn test_negative_index_matches_any() {
        let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
        cache.set(7, -5, Box::new(3i32), None);
        assert_eq!(cache.get_as::<i32>(7, 0), Some(&3));
        assert_eq!(cache.get_as::<i32>(7, 9), Some(&3));
        assert!(cache.get(8, 0).is_none());
    }

    #[test]
    fn test_exact_store_keeps_any_entry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
        cache.set(7, -1, Box::new(1i32), Some(counting_destructor(&hits, &seen)));
        cache.set(7, 3, Box::new(2i32), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(cache.get_as::<i32>(7, 3), Some(&2));
    }

    #[test]
    fn test_allocation_failure_destroys_value() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let alloc = Arc::new(Allocator::new());
        let mut cache = AuxDataCache::new(Arc::clone(&alloc));
        cache.set(1, 1, Box::new(1i32), None);

        alloc.fault_sim().arm(0, 1);
        cache.set(2, 1, Box::new(99i32), Some(counting_destructor(&hits, &seen)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![99]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(2, 1).is_none());
        assert!(alloc.take_malloc_failed());
    }

    #[test]
    fn test_clear_all_and_drop_run_destructors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
        cache.set(1, 0, Box::new(1i32), Some(counting_destructor(&hits, &seen)));
        cache.set(2, 0, Box::new(2i32), Some(counting_destructor(&hits, &seen)));
        cache.clear_all();
        assert!(cache.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(*seen.lock(), vec![2, 1]);

        cache.set(3, 0, Box::new(3i32), Some(counting_destructor(&hits, &seen)));
        drop(cache);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
