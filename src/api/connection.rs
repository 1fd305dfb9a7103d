//! Database connection
//!
//! The connection is the owner shared by every program prepared on it. It
//! holds the last-error pair (behind a mutex), the interrupt flag, the
//! error mask, the allocator used for engine-owned buffers, the trace
//! callback and the storage collaborator.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, ErrorCode, Result, ResultCode};
use crate::mem::Allocator;
use crate::storage::{MemoryStorage, Storage};
use crate::types::Encoding;
use crate::vdbe::builder::CompiledProgram;
use crate::vdbe::engine::Program;
use crate::vdbe::trace::{TraceCallback, TraceFlags, Tracer};

use super::config::{ConnectionConfig, EXTENDED_CODE_MASK, PRIMARY_CODE_MASK};

// ============================================================================
// Error State
// ============================================================================

/// Last-error pair of a connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    /// Last result code (possibly extended)
    pub code: ResultCode,
    /// Last error message
    pub message: Option<String>,
}

impl ErrorState {
    /// Record the outcome of a program invocation.
    ///
    /// When either side carries a message the message is replaced by the
    /// program's (possibly clearing a stale one); otherwise only the code
    /// changes. The code is always updated.
    pub fn report(&mut self, code: ResultCode, message: Option<String>) {
        if self.message.is_some() || message.is_some() {
            self.message = message;
        }
        self.code = code;
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Database connection (sqlite3)
pub struct SqliteConnection {
    /// Last error code and message
    err: Mutex<ErrorState>,
    /// Mask applied to result codes returned to callers
    err_mask: AtomicI32,
    /// Interrupt request flag
    interrupted: AtomicBool,
    /// Programs currently running
    n_vdbe_active: AtomicUsize,
    /// Source of program ids used in trace labels
    next_program_id: AtomicU64,
    /// Allocator for engine-owned buffers
    alloc: Arc<Allocator>,
    /// Register text encoding
    encoding: Encoding,
    /// Trace callback
    tracer: RwLock<Tracer>,
    /// Table data
    storage: Arc<dyn Storage>,
}

impl SqliteConnection {
    /// Open a connection over `storage`
    pub fn open(config: ConnectionConfig, storage: Arc<dyn Storage>) -> Arc<Self> {
        let mut tracer = Tracer::new();
        tracer.set(None, config.trace_flags);
        tracing::debug!(target: "sqlvm::api", encoding = ?config.encoding, extended = config.extended_result_codes, "connection opened");
        Arc::new(Self {
            err: Mutex::new(ErrorState::default()),
            err_mask: AtomicI32::new(config.err_mask()),
            interrupted: AtomicBool::new(false),
            n_vdbe_active: AtomicUsize::new(0),
            next_program_id: AtomicU64::new(1),
            alloc: Arc::new(Allocator::new()),
            encoding: config.encoding,
            tracer: RwLock::new(tracer),
            storage,
        })
    }

    /// Open a connection with default settings over an empty in-memory store
    pub fn open_in_memory() -> Arc<Self> {
        Self::open(ConnectionConfig::default(), Arc::new(MemoryStorage::new()))
    }

    /// Create a program from compiled bytecode
    pub fn prepare(self: &Arc<Self>, compiled: CompiledProgram) -> Program {
        Program::new(Arc::clone(self), compiled)
    }

    pub(crate) fn next_program_id(&self) -> u64 {
        self.next_program_id.fetch_add(1, Ordering::Relaxed)
    }

    // ========================================================================
    // Error State
    // ========================================================================

    /// Apply a program outcome to the last-error pair under the mutex
    pub fn report(&self, code: ResultCode, message: Option<String>) {
        self.err.lock().report(code, message);
    }

    /// Record an API-level error, replacing any message
    pub fn set_error(&self, err: &Error) {
        let mut st = self.err.lock();
        st.code = err.extended_code();
        st.message = err.message().map(str::to_string);
    }

    /// Reset the last-error pair to OK
    pub fn clear_error(&self) {
        *self.err.lock() = ErrorState::default();
    }

    /// Copy of the last-error pair
    pub fn error_state(&self) -> ErrorState {
        self.err.lock().clone()
    }

    /// Current error mask
    pub fn err_mask(&self) -> i32 {
        self.err_mask.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Allocator for engine-owned buffers
    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.alloc
    }

    /// Register text encoding
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Storage collaborator
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Snapshot of the trace configuration
    pub fn tracer(&self) -> Tracer {
        self.tracer.read().clone()
    }

    // ========================================================================
    // Interrupt and Active Programs
    // ========================================================================

    /// Has an interrupt been requested?
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Number of programs currently running
    pub fn active_programs(&self) -> usize {
        self.n_vdbe_active.load(Ordering::SeqCst)
    }

    /// A program entered the running state. A pending interrupt is
    /// discarded when no other program was running.
    pub(crate) fn program_started(&self) {
        if self.n_vdbe_active.fetch_add(1, Ordering::SeqCst) == 0 {
            self.interrupted.store(false, Ordering::SeqCst);
        }
    }

    /// A program left the running state
    pub(crate) fn program_stopped(&self) {
        let _ = self
            .n_vdbe_active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("err", &*self.err.lock())
            .field("err_mask", &self.err_mask())
            .field("interrupted", &self.is_interrupted())
            .field("active", &self.active_programs())
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// C-style API
// ============================================================================

/// sqlite3_errcode - Primary code of the most recent error
pub fn sqlite3_errcode(conn: &SqliteConnection) -> ErrorCode {
    conn.err.lock().code.primary()
}

/// sqlite3_extended_errcode - Full code of the most recent error
pub fn sqlite3_extended_errcode(conn: &SqliteConnection) -> ResultCode {
    conn.err.lock().code
}

/// sqlite3_errmsg - Message of the most recent error
///
/// Falls back to the code's generic text when no message was recorded.
pub fn sqlite3_errmsg(conn: &SqliteConnection) -> String {
    let st = conn.err.lock();
    match st.message {
        Some(ref msg) => msg.clone(),
        None => sqlite3_errstr(st.code).to_string(),
    }
}

/// sqlite3_errstr - Generic English text for a result code
pub fn sqlite3_errstr(code: ResultCode) -> &'static str {
    code.primary().errstr()
}

/// sqlite3_extended_result_codes - Enable or disable extended result codes
pub fn sqlite3_extended_result_codes(conn: &SqliteConnection, onoff: bool) -> Result<()> {
    let mask = if onoff {
        EXTENDED_CODE_MASK
    } else {
        PRIMARY_CODE_MASK
    };
    conn.err_mask.store(mask, Ordering::Relaxed);
    Ok(())
}

/// sqlite3_interrupt - Ask running programs to stop at the next op boundary
pub fn sqlite3_interrupt(conn: &SqliteConnection) {
    tracing::debug!(target: "sqlvm::api", "interrupt requested");
    conn.interrupted.store(true, Ordering::SeqCst);
}

/// sqlite3_is_interrupted - Check if an interrupt is pending
pub fn sqlite3_is_interrupted(conn: &SqliteConnection) -> bool {
    conn.is_interrupted()
}

/// sqlite3_trace_v2 - Install or remove the trace callback
pub fn sqlite3_trace_v2(conn: &SqliteConnection, mask: TraceFlags, callback: Option<TraceCallback>) {
    conn.tracer.write().set(callback, mask);
}

// ============================================================================
// Tests
// ============================================================================
