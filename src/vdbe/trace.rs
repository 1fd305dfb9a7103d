//! VDBE Tracing and Profiling
//!
//! Application-visible execution tracing (the `sqlite3_trace_v2` callback)
//! and the optional per-opcode profiling sink a program reports to when it
//! halts.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::vdbe::ops::Opcode;

// ============================================================================
// Trace Flags
// ============================================================================

bitflags::bitflags! {
    /// Flags to control which events are traced
    ///
    /// These correspond to SQLite's SQLITE_TRACE_* constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TraceFlags: u32 {
        /// A program started running
        const STMT = 0x01;
        /// A program finished one invocation
        const PROFILE = 0x02;
        /// A result row was produced
        const ROW = 0x04;
        /// A program was finalized
        const CLOSE = 0x08;
    }
}

// ============================================================================
// Trace Event
// ============================================================================

/// Type of trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// Program is starting
    Stmt,
    /// Invocation completed, with timing
    Profile,
    /// A result row was produced
    Row,
    /// Program was finalized
    Close,
}

impl From<TraceEvent> for TraceFlags {
    fn from(event: TraceEvent) -> Self {
        match event {
            TraceEvent::Stmt => TraceFlags::STMT,
            TraceEvent::Profile => TraceFlags::PROFILE,
            TraceEvent::Row => TraceFlags::ROW,
            TraceEvent::Close => TraceFlags::CLOSE,
        }
    }
}

/// What a trace callback receives
#[derive(Debug, Clone, PartialEq)]
pub struct TraceInfo {
    pub event: TraceEvent,
    /// Label of the program that raised the event
    pub label: String,
    /// Wall time of the invocation, on `Profile`
    pub elapsed_ns: Option<u64>,
    /// Rows produced so far in this invocation, on `Row`
    pub row_count: Option<u64>,
}

/// Callback installed by `sqlite3_trace_v2`
pub type TraceCallback = Arc<dyn Fn(&TraceInfo) + Send + Sync>;

// ============================================================================
// Tracer
// ============================================================================

/// A connection's trace callback and the events it subscribed to
#[derive(Clone, Default)]
pub struct Tracer {
    callback: Option<TraceCallback>,
    mask: TraceFlags,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the callback and mask
    pub fn set(&mut self, callback: Option<TraceCallback>, mask: TraceFlags) {
        self.callback = callback;
        self.mask = mask;
    }

    pub fn mask(&self) -> TraceFlags {
        self.mask
    }

    /// Deliver `event` for program `label` if the callback subscribed to it.
    ///
    /// `metric` is the elapsed time for `Profile` and the running row count
    /// for `Row`; other events ignore it.
    pub fn notify(&self, event: TraceEvent, label: &str, metric: u64) {
        let Some(cb) = self.callback.as_ref() else {
            return;
        };
        if !self.mask.contains(event.into()) {
            return;
        }
        cb(&TraceInfo {
            event,
            label: label.to_string(),
            elapsed_ns: (event == TraceEvent::Profile).then_some(metric),
            row_count: (event == TraceEvent::Row).then_some(metric),
        });
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("has_callback", &self.callback.is_some())
            .field("mask", &self.mask)
            .finish()
    }
}

// ============================================================================
// Opcode Profiling
// ============================================================================

/// Execution counters for one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCounter {
    /// Instruction address
    pub addr: usize,
    /// Opcode at that address
    pub opcode: Opcode,
    /// Times executed
    pub count: u64,
    /// Total time spent executing it
    pub elapsed_ns: u64,
}

/// Counters for one program invocation, handed to a [`ProfileSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileReport {
    /// Program label
    pub label: String,
    /// Per-instruction counters (instructions never executed are omitted)
    pub ops: Vec<OpCounter>,
}

/// Destination for profiling data collected during an invocation.
///
/// Called from `halt()`. Errors are logged and discarded by the caller.
pub trait ProfileSink: Send {
    /// Persist one report
    fn record(&mut self, report: &ProfileReport) -> Result<()>;
}

/// Sink that drops every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProfileSink for NoopSink {
    fn record(&mut self, _report: &ProfileReport) -> Result<()> {
        Ok(())
    }
}

/// Sink that appends a timestamped text report to a file
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Append reports to `path`, creating it on first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ProfileSink for FileSink {
    fn record(&mut self, report: &ProfileReport) -> Result<()> {
        let io_err = |e: std::io::Error| Error::with_message(ErrorCode::CantOpen, e.to_string());

        let mut out = String::new();
        out.push_str(&format!(
            "-- {} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            report.label
        ));
        for op in &report.ops {
            out.push_str(&format!(
                "{:>4} {:<13} {:>8} {:>12}\n",
                op.addr,
                op.opcode.name(),
                op.count,
                op.elapsed_ns
            ));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(out.as_bytes()).map_err(io_err)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{sqlite3_trace_v2, SqliteConnection};
    use crate::vdbe::{Opcode, VdbeBuilder};
    use parking_lot::Mutex;

    fn recorder() -> (TraceCallback, Arc<Mutex<Vec<TraceInfo>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: TraceCallback = Arc::new(move |info: &TraceInfo| sink.lock().push(info.clone()));
        (cb, seen)
    }

    /// Two result rows, then the end of the program
    fn two_rows(conn: &Arc<SqliteConnection>) -> crate::vdbe::Program {
        let mut b = VdbeBuilder::new();
        let r = b.alloc_reg(1);
        b.add_op(Opcode::Integer, 1, r, 0);
        b.add_op(Opcode::ResultRow, r, 1, 0);
        b.add_op(Opcode::Integer, 2, r, 0);
        b.add_op(Opcode::ResultRow, r, 1, 0);
        let mut prog = conn.prepare(b.build().unwrap());
        prog.set_label("two_rows");
        prog
    }

    fn drain(prog: &mut crate::vdbe::Program) {
        while prog.step().unwrap() == crate::types::StepResult::Row {}
    }

    #[test]
    fn test_notify_fills_metric_by_event() {
        let (cb, seen) = recorder();
        let mut tracer = Tracer::new();
        tracer.set(Some(cb), TraceFlags::all());
        tracer.notify(TraceEvent::Row, "p", 3);
        tracer.notify(TraceEvent::Profile, "p", 900);
        tracer.notify(TraceEvent::Close, "p", 5);

        let seen = seen.lock();
        assert_eq!((seen[0].row_count, seen[0].elapsed_ns), (Some(3), None));
        assert_eq!((seen[1].row_count, seen[1].elapsed_ns), (None, Some(900)));
        assert_eq!((seen[2].row_count, seen[2].elapsed_ns), (None, None));
    }

    #[test]
    fn test_no_callback_is_silent() {
        let mut tracer = Tracer::new();
        tracer.set(None, TraceFlags::all());
        tracer.notify(TraceEvent::Stmt, "p", 0);
        assert_eq!(tracer.mask(), TraceFlags::all());
    }

    #[test]
    fn test_program_reports_rows_then_profile() {
        let conn = SqliteConnection::open_in_memory();
        let (cb, seen) = recorder();
        sqlite3_trace_v2(&conn, TraceFlags::ROW | TraceFlags::PROFILE, Some(cb));

        let mut prog = two_rows(&conn);
        drain(&mut prog);
        drain(&mut prog);

        let seen = seen.lock();
        let kinds: Vec<_> = seen.iter().map(|e| (e.event, e.row_count)).collect();
        assert_eq!(
            kinds,
            vec![
                (TraceEvent::Row, Some(1)),
                (TraceEvent::Row, Some(2)),
                (TraceEvent::Profile, None),
                (TraceEvent::Row, Some(1)),
                (TraceEvent::Row, Some(2)),
                (TraceEvent::Profile, None),
            ]
        );
        assert!(seen.iter().all(|e| e.label == "two_rows"));
    }

    #[test]
    fn test_program_start_and_close_only() {
        let conn = SqliteConnection::open_in_memory();
        let (cb, seen) = recorder();
        sqlite3_trace_v2(&conn, TraceFlags::STMT | TraceFlags::CLOSE, Some(cb));

        let mut prog = two_rows(&conn);
        assert_eq!(prog.step().unwrap(), crate::types::StepResult::Row);
        prog.reset();
        prog.finalize();

        let kinds: Vec<_> = seen.lock().iter().map(|e| e.event).collect();
        assert_eq!(kinds, vec![TraceEvent::Stmt, TraceEvent::Close]);
    }

    #[test]
    fn test_noop_sink() {
        let report = ProfileReport {
            label: "p".into(),
            ops: vec![],
        };
        assert!(NoopSink.record(&report).is_ok());
    }

    #[test]
    fn test_file_sink_unwritable_path() {
        let mut sink = FileSink::new("/nonexistent-dir/sub/profile.log");
        let report = ProfileReport {
            label: "p".into(),
            ops: vec![],
        };
        let err = sink.record(&report).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CantOpen);
    }
}
