//! VDBE Execution Engine
//!
//! A [`Program`] owns everything one compiled statement needs to run: the
//! instruction array, the register file, the cursor table, the bound
//! parameters and the auxiliary-data cache. `step()` drives the
//! fetch-decode-execute loop until a row is produced, the program halts or
//! an op faults. `halt()` finishes an invocation and hands its outcome to
//! the owning connection; `reset()` prepares the program to run again.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crate::api::SqliteConnection;
use crate::error::{Error, ErrorCode, Result, ResultCode};
use crate::mem::Allocator;
use crate::types::{ColumnType, Encoding, StepResult, Value};
use crate::vdbe::auxdata::{AuxDataCache, AuxDestructor, AuxPayload};
use crate::vdbe::builder::{explain_program, CompiledProgram};
use crate::vdbe::cursor::{CursorTable, VdbeCursor};
use crate::vdbe::func::FunctionContext;
use crate::vdbe::mem::{ArithOp, Mem, MemView, RegisterFile};
use crate::vdbe::ops::{cmp_flags, Opcode, VdbeOp, P4};
use crate::vdbe::trace::{OpCounter, ProfileReport, ProfileSink, TraceEvent};
use crate::vdbe::value::SqliteValue;

// ============================================================================
// Run State
// ============================================================================

/// Why an invocation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Halt op with success status, or ran off the end of the program
    Completed,
    /// An op reported an error
    Faulted,
    /// An interrupt was observed between ops
    Interrupted,
}

/// Program life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started since creation or the last reset
    Init,
    /// Executing (possibly paused on a result row)
    Running,
    /// Finished this invocation
    Halted(HaltReason),
}

/// What the interpreter does after one op
enum Flow {
    Continue,
    Jump(usize),
    Row,
    Halt,
}

// ============================================================================
// Program
// ============================================================================

/// A compiled statement and its execution state (sqlite3_stmt / Vdbe)
pub struct Program {
    conn: Arc<SqliteConnection>,
    code: Arc<CompiledProgram>,
    label: String,
    alloc: Arc<Allocator>,
    enc: Encoding,

    /// Next op to execute; None until the first step of an invocation
    pc: Option<usize>,
    state: RunState,
    /// Result code of the current or last invocation
    rc: ResultCode,
    /// Error message owned until halt hands it to the connection
    error_msg: Option<String>,
    /// The halt controller has already run for this invocation
    halt_done: bool,
    /// Counted in the connection's active-program total
    active: bool,

    registers: RegisterFile,
    params: Vec<Mem>,
    cursors: CursorTable,
    aux: AuxDataCache,
    /// (first register, count) of the current result row
    result_row: Option<(usize, usize)>,

    n_row: u64,
    started_at: Option<Instant>,
    profile_sink: Option<Box<dyn ProfileSink>>,
    counters: Vec<OpCounter>,
}

impl Program {
    /// Create a program owned by `conn`
    pub fn new(conn: Arc<SqliteConnection>, code: CompiledProgram) -> Self {
        let alloc = Arc::clone(conn.allocator());
        let enc = conn.encoding();
        let label = format!("program#{}", conn.next_program_id());
        let registers = RegisterFile::new(code.n_mem(), Arc::clone(&alloc), enc);
        let cursors = CursorTable::new(code.n_cursor());
        let params = vec![Mem::Null; code.n_var()];
        let aux = AuxDataCache::new(Arc::clone(&alloc));
        Self {
            conn,
            code: Arc::new(code),
            label,
            alloc,
            enc,
            pc: None,
            state: RunState::Init,
            rc: ResultCode::OK,
            error_msg: None,
            halt_done: false,
            active: false,
            registers,
            params,
            cursors,
            aux,
            result_row: None,
            n_row: 0,
            started_at: None,
            profile_sink: None,
            counters: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Owning connection
    pub fn connection(&self) -> &Arc<SqliteConnection> {
        &self.conn
    }

    /// Label used in trace events
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the trace label
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// The instructions
    pub fn ops(&self) -> &[VdbeOp] {
        self.code.ops()
    }

    /// EXPLAIN listing of the program
    pub fn explain(&self) -> String {
        explain_program(self.code.ops())
    }

    /// Program counter (None before the first step of an invocation)
    pub fn pc(&self) -> Option<usize> {
        self.pc
    }

    /// Current life-cycle state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Unmasked result code of the current or last invocation
    pub fn result_code(&self) -> ResultCode {
        self.rc
    }

    /// Error message not yet handed to the connection
    pub fn error_message(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    /// Register file
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Cursor table
    pub fn cursors(&self) -> &CursorTable {
        &self.cursors
    }

    /// Auxiliary-data cache
    pub fn aux_data(&self) -> &AuxDataCache {
        &self.aux
    }

    /// Install a profiling sink. Per-op counters are collected only while
    /// a sink is installed.
    pub fn set_profile_sink(&mut self, sink: Option<Box<dyn ProfileSink>>) {
        self.profile_sink = sink;
    }

    // ========================================================================
    // Auxiliary Data
    // ========================================================================

    /// Associate a cached value with `(op_addr, arg)`
    pub fn set_auxdata(&mut self, op_addr: i32, arg: i32, value: AuxPayload, destructor: Option<AuxDestructor>) {
        self.aux.set(op_addr, arg, value, destructor);
    }

    /// Value cached for `(op_addr, arg)`
    pub fn get_auxdata(&self, op_addr: i32, arg: i32) -> Option<&(dyn std::any::Any + Send)> {
        self.aux.get(op_addr, arg)
    }

    // ========================================================================
    // Parameter Binding
    // ========================================================================

    /// Number of bind parameters
    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    fn param_slot(&mut self, idx: i32) -> Result<usize> {
        if self.state != RunState::Init {
            let err = Error::with_message(ErrorCode::Misuse, "bind on a busy prepared statement");
            tracing::warn!(target: "sqlvm::vdbe", label = %self.label, "{}", err);
            self.conn.set_error(&err);
            return Err(err);
        }
        match usize::try_from(idx) {
            Ok(i) if i >= 1 && i <= self.params.len() => Ok(i - 1),
            _ => {
                let err = Error::new(ErrorCode::Range);
                self.conn.set_error(&err);
                Err(err)
            }
        }
    }

    /// Copy an external value into parameter `idx` (1-based).
    ///
    /// On allocation failure the parameter is left NULL and `NoMem` is
    /// returned.
    pub fn bind_value(&mut self, idx: i32, value: &SqliteValue<'_>) -> Result<()> {
        let slot = self.param_slot(idx)?;
        let result = value.copy_into(&mut self.params[slot], self.enc, &self.alloc);
        if let Err(ref err) = result {
            self.conn.set_error(err);
        }
        result
    }

    /// Reset every parameter to NULL
    pub fn clear_bindings(&mut self) {
        for p in &mut self.params {
            p.set_null();
        }
    }

    /// Bound value of parameter `idx` (1-based)
    pub fn parameter(&self, idx: usize) -> Option<&Mem> {
        idx.checked_sub(1).and_then(|i| self.params.get(i))
    }

    // ========================================================================
    // Result Row
    // ========================================================================

    fn row_cell(&self, col: usize) -> Option<&Mem> {
        let (start, count) = self.result_row?;
        (col < count).then(|| self.registers.get(start + col))
    }

    /// Number of values in the current row (0 when there is none)
    pub fn data_count(&self) -> usize {
        self.result_row.map_or(0, |(_, n)| n)
    }

    /// View of column `col` of the current row; NULL when out of range
    pub fn column_view(&self, col: usize) -> MemView<'_> {
        self.row_cell(col).map_or(MemView::Null, Mem::view)
    }

    /// Owned copy of column `col` of the current row
    pub fn column_value(&self, col: usize) -> Value {
        self.row_cell(col).map_or(Value::Null, Mem::to_value)
    }

    /// Storage class of column `col`
    pub fn column_type(&self, col: usize) -> ColumnType {
        self.column_view(col).column_type()
    }

    /// Column `col` as an integer
    pub fn column_int64(&self, col: usize) -> i64 {
        self.row_cell(col).map_or(0, Mem::to_int)
    }

    /// Column `col` as a float
    pub fn column_double(&self, col: usize) -> f64 {
        self.row_cell(col).map_or(0.0, Mem::to_real)
    }

    /// Column `col` rendered as UTF-8 text
    pub fn column_text(&self, col: usize) -> String {
        self.row_cell(col).map(Mem::to_text).unwrap_or_default()
    }

    /// Column `col` as bytes
    pub fn column_blob(&self, col: usize) -> Vec<u8> {
        self.row_cell(col).map(Mem::to_blob).unwrap_or_default()
    }

    /// Byte length of column `col`
    pub fn column_bytes(&self, col: usize) -> usize {
        self.row_cell(col).map_or(0, Mem::len)
    }

    /// The whole current row
    pub fn row(&self) -> Vec<Value> {
        (0..self.data_count()).map(|c| self.column_value(c)).collect()
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run until the next result row or the end of the program.
    ///
    /// A halted program is reset automatically before running again. When
    /// the program completes or faults the halt controller runs before this
    /// returns, so the connection already holds the outcome.
    pub fn step(&mut self) -> Result<StepResult> {
        if let RunState::Halted(_) = self.state {
            self.reset();
        }
        let tracer = self.conn.tracer();
        if self.state == RunState::Init {
            self.start();
            tracer.notify(TraceEvent::Stmt, &self.label, 0);
        }

        self.result_row = None;
        match self.run() {
            Ok(Flow::Row) => {
                self.n_row += 1;
                tracer.notify(TraceEvent::Row, &self.label, self.n_row);
                Ok(StepResult::Row)
            }
            Ok(_) => {
                self.state = RunState::Halted(HaltReason::Completed);
                self.halt();
                Ok(StepResult::Done)
            }
            Err(err) => Err(self.fault(err)),
        }
    }

    fn start(&mut self) {
        self.conn.program_started();
        self.active = true;
        self.pc = Some(0);
        self.state = RunState::Running;
        self.rc = ResultCode::OK;
        self.halt_done = false;
        self.n_row = 0;
        self.started_at = Some(Instant::now());
        self.counters = if self.profile_sink.is_some() {
            self.code
                .ops()
                .iter()
                .enumerate()
                .map(|(addr, op)| OpCounter {
                    addr,
                    opcode: op.opcode,
                    count: 0,
                    elapsed_ns: 0,
                })
                .collect()
        } else {
            Vec::new()
        };
        tracing::debug!(target: "sqlvm::vdbe", label = %self.label, n_op = self.code.ops().len(), "program start");
    }

    /// Record a fault, run the halt controller and build the error
    /// returned to the caller.
    fn fault(&mut self, err: Error) -> Error {
        let (rc, msg) = err.into_parts();
        let reason = if rc.primary() == ErrorCode::Interrupt {
            HaltReason::Interrupted
        } else {
            HaltReason::Faulted
        };
        let msg = match msg {
            Some(m) => Some(m),
            None if rc.primary() != ErrorCode::NoMem => Some(rc.primary().errstr().to_string()),
            None => None,
        };
        tracing::warn!(
            target: "sqlvm::vdbe",
            label = %self.label,
            pc = ?self.pc,
            code = %rc,
            "statement aborts: {}",
            msg.as_deref().unwrap_or("")
        );
        self.rc = rc;
        self.error_msg = msg.clone();
        self.state = RunState::Halted(reason);
        let masked = self.halt();
        match msg {
            Some(m) => Error::with_message(masked, m),
            None => Error::new(masked),
        }
    }

    fn run(&mut self) -> Result<Flow> {
        let code = Arc::clone(&self.code);
        let ops = code.ops();
        let mut pc = self.pc.unwrap_or(0);

        loop {
            if pc >= ops.len() {
                self.pc = Some(pc);
                return Ok(Flow::Halt);
            }
            if self.conn.is_interrupted() {
                self.pc = Some(pc);
                return Err(Error::new(ErrorCode::Interrupt));
            }

            let op = &ops[pc];
            self.pc = Some(pc);
            tracing::trace!(target: "sqlvm::vdbe", pc, opcode = %op.opcode, p1 = op.p1, p2 = op.p2, p3 = op.p3);

            let t0 = (!self.counters.is_empty()).then(Instant::now);
            let flow = self.exec_op(pc, op);
            if let (Some(t0), Some(c)) = (t0, self.counters.get_mut(pc)) {
                c.count += 1;
                c.elapsed_ns += u64::try_from(t0.elapsed().as_nanos()).unwrap_or(u64::MAX);
            }

            match flow? {
                Flow::Continue => pc += 1,
                Flow::Jump(target) => pc = target,
                Flow::Row => {
                    self.pc = Some(pc + 1);
                    return Ok(Flow::Row);
                }
                Flow::Halt => return Ok(Flow::Halt),
            }
        }
    }

    fn cursor(&self, idx: i32, op: &VdbeOp) -> Result<VdbeCursor> {
        self.cursors.get(idx as usize).cloned().ok_or_else(|| {
            Error::with_message(
                ErrorCode::Internal,
                format!("cursor {} is not open ({})", idx, op.opcode),
            )
        })
    }

    fn halt_error(op: &VdbeOp) -> Error {
        let rc = ResultCode::from_raw(op.p1);
        match op.p4.as_text() {
            Some(msg) => Error::with_message(rc, msg),
            None => Error::new(rc),
        }
    }

    /// Execute the op at `pc`
    fn exec_op(&mut self, pc: usize, op: &VdbeOp) -> Result<Flow> {
        let bad_p4 = || Error::with_message(ErrorCode::Internal, format!("bad P4 for {} at {}", op.opcode, pc));
        let (p1, p2, p3) = (op.p1 as usize, op.p2 as usize, op.p3 as usize);

        match op.opcode {
            // ================================================================
            // Constants and Register Moves
            // ================================================================
            Opcode::Integer => self.registers.set_integer(p2, i64::from(op.p1)),
            Opcode::Int64 => match op.p4 {
                P4::Int64(v) => self.registers.set_integer(p2, v),
                _ => return Err(bad_p4()),
            },
            Opcode::Real => match op.p4 {
                P4::Real(v) => self.registers.set_real(p2, v),
                _ => return Err(bad_p4()),
            },
            Opcode::String8 => match op.p4 {
                P4::Text(ref s) => {
                    self.registers
                        .set_text(p2, Cow::Borrowed(s.as_bytes()), Encoding::Utf8)?
                }
                _ => return Err(bad_p4()),
            },
            Opcode::Blob => match op.p4 {
                P4::Blob(ref b) => self.registers.set_blob(p2, Cow::Borrowed(b))?,
                _ => return Err(bad_p4()),
            },
            Opcode::ZeroBlob => self.registers.set_zero_blob(p2, op.p1.max(0) as usize),
            Opcode::Null => {
                for r in p2..=p3.max(p2) {
                    self.registers.set_null(r);
                }
            }
            Opcode::Variable => {
                let src = SqliteValue::from_mem(&self.params[p1 - 1]);
                src.copy_into(self.registers.get_mut(p2), self.enc, &self.alloc)?;
            }
            Opcode::Copy => {
                for i in 0..=p3 {
                    let v = self.registers.get(p1 + i).clone();
                    self.registers.set(p2 + i, v);
                }
            }
            Opcode::SCopy => {
                let v = self.registers.get(p1).clone();
                self.registers.set(p2, v);
            }
            Opcode::Move => {
                for i in 0..p3.max(1) {
                    self.registers.move_cell(p1 + i, p2 + i);
                }
            }
            Opcode::RealAffinity => self.registers.get_mut(p1).apply_real_affinity(),

            // ================================================================
            // Arithmetic
            // ================================================================
            Opcode::Add | Opcode::Subtract | Opcode::Multiply | Opcode::Divide | Opcode::Remainder => {
                let arith = match op.opcode {
                    Opcode::Add => ArithOp::Add,
                    Opcode::Subtract => ArithOp::Subtract,
                    Opcode::Multiply => ArithOp::Multiply,
                    Opcode::Divide => ArithOp::Divide,
                    _ => ArithOp::Remainder,
                };
                let result = self.registers.get(p2).arith(arith, self.registers.get(p1));
                self.registers.set(p3, result);
            }
            Opcode::Concat => {
                let result = self
                    .registers
                    .get(p2)
                    .concat(self.registers.get(p1), self.enc, &self.alloc)?;
                self.registers.set(p3, result);
            }

            // ================================================================
            // Comparison and Branching
            // ================================================================
            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let lhs = self.registers.get(p3);
                let rhs = self.registers.get(p1);
                let jump = if lhs.is_null() || rhs.is_null() {
                    if op.p5 & cmp_flags::NULLEQ != 0 {
                        let both = lhs.is_null() && rhs.is_null();
                        match op.opcode {
                            Opcode::Eq => both,
                            Opcode::Ne => !both,
                            _ => false,
                        }
                    } else {
                        op.p5 & cmp_flags::JUMPIFNULL != 0
                    }
                } else {
                    let ord = lhs.compare(rhs);
                    match op.opcode {
                        Opcode::Eq => ord == Ordering::Equal,
                        Opcode::Ne => ord != Ordering::Equal,
                        Opcode::Lt => ord == Ordering::Less,
                        Opcode::Le => ord != Ordering::Greater,
                        Opcode::Gt => ord == Ordering::Greater,
                        _ => ord != Ordering::Less,
                    }
                };
                if jump {
                    return Ok(Flow::Jump(p2));
                }
            }
            Opcode::IsNull => {
                if self.registers.get(p1).is_null() {
                    return Ok(Flow::Jump(p2));
                }
            }
            Opcode::NotNull => {
                if !self.registers.get(p1).is_null() {
                    return Ok(Flow::Jump(p2));
                }
            }
            Opcode::If | Opcode::IfNot => {
                let want = op.opcode == Opcode::If;
                let jump = match self.registers.get(p1).truth() {
                    Some(t) => t == want,
                    None => op.p3 != 0,
                };
                if jump {
                    return Ok(Flow::Jump(p2));
                }
            }

            // ================================================================
            // Cursors
            // ================================================================
            Opcode::OpenRead => {
                let P4::Table(ref table) = op.p4 else {
                    return Err(bad_p4());
                };
                let storage = self.conn.storage();
                let handle = storage.open_cursor(table)?;
                let cursor = VdbeCursor {
                    handle,
                    table: table.clone(),
                };
                if let Some(old) = self.cursors.open(p1, cursor) {
                    storage.close_cursor(old.handle);
                }
            }
            Opcode::Column => {
                let cur = self.cursor(op.p1, op)?;
                let value = self.conn.storage().read_column(cur.handle, p2)?;
                self.registers
                    .get_mut(p3)
                    .set_value(&value, self.enc, &self.alloc)?;
            }
            Opcode::Close => self.cursors.close(p1, self.conn.storage()),
            Opcode::Rewind => {
                let cur = self.cursor(op.p1, op)?;
                if !self.conn.storage().advance(cur.handle)? {
                    return Ok(Flow::Jump(p2));
                }
            }
            Opcode::Next => {
                let cur = self.cursor(op.p1, op)?;
                if self.conn.storage().advance(cur.handle)? {
                    return Ok(Flow::Jump(p2));
                }
            }

            // ================================================================
            // Results and Functions
            // ================================================================
            Opcode::ResultRow => {
                self.result_row = Some((p1, p2));
                return Ok(Flow::Row);
            }
            Opcode::Function => {
                let P4::Func(ref def) = op.p4 else {
                    return Err(bad_p4());
                };
                let n_arg = usize::from(op.p5);
                if def.n_arg >= 0 && def.n_arg as usize != n_arg {
                    return Err(Error::with_message(
                        ErrorCode::Error,
                        format!("wrong number of arguments to function {}()", def.name),
                    ));
                }

                self.alloc.take_malloc_failed();
                let (result, error) = {
                    let args = self.registers.range(p2, n_arg);
                    let mut ctx = FunctionContext::new(args, &mut self.aux, pc as i32, &self.alloc, self.enc);
                    let call = (def.func)(&mut ctx);
                    let (result, mut error) = ctx.into_outcome();
                    if let Err(e) = call {
                        let (rc, msg) = e.into_parts();
                        error = Some((rc, msg.unwrap_or_else(|| rc.primary().errstr().to_string())));
                    }
                    (result, error)
                };
                if self.alloc.take_malloc_failed() {
                    return Err(Error::new(ErrorCode::NoMem));
                }
                if let Some((rc, msg)) = error {
                    return Err(Error::with_message(rc, msg));
                }
                self.registers.set(p3, result);
            }

            // ================================================================
            // Control Flow
            // ================================================================
            Opcode::Goto => return Ok(Flow::Jump(p2)),
            Opcode::Gosub => {
                self.registers.set_integer(p1, pc as i64);
                return Ok(Flow::Jump(p2));
            }
            Opcode::Return => {
                let target = self
                    .registers
                    .get(p1)
                    .exact_integer()
                    .and_then(|a| usize::try_from(a).ok())
                    .map(|a| a + 1)
                    .filter(|&a| a <= self.code.ops().len());
                return match target {
                    Some(t) => Ok(Flow::Jump(t)),
                    None => Err(Error::with_message(
                        ErrorCode::Internal,
                        format!("bad return address in r[{}] at {}", op.p1, pc),
                    )),
                };
            }
            Opcode::Init => {
                if op.p2 > 0 {
                    return Ok(Flow::Jump(p2));
                }
            }
            Opcode::Noop => {}
            Opcode::Halt => {
                if op.p1 == 0 {
                    return Ok(Flow::Halt);
                }
                return Err(Self::halt_error(op));
            }
            Opcode::HaltIfNull => {
                if self.registers.get(p3).is_null() {
                    if op.p1 == 0 {
                        return Ok(Flow::Halt);
                    }
                    return Err(Self::halt_error(op));
                }
            }
        }

        Ok(Flow::Continue)
    }

    // ========================================================================
    // Halt / Reset / Finalize
    // ========================================================================

    /// Finish the current invocation.
    ///
    /// Before the first step this only reports the result code; the
    /// connection's error state is left untouched. Otherwise, once per
    /// invocation: raise the PROFILE trace event, hand the result code and
    /// error message to the connection, release the result row, cursors and
    /// registers, and flush per-op counters to the profiling sink. Never
    /// fails; the return value is the result code under the connection's
    /// error mask.
    pub fn halt(&mut self) -> ResultCode {
        let mask = self.conn.err_mask();
        if self.pc.is_none() || self.halt_done {
            return self.rc.masked(mask);
        }
        self.halt_done = true;
        if self.state == RunState::Running {
            self.state = RunState::Halted(HaltReason::Completed);
        }

        let elapsed_ns = self
            .started_at
            .map_or(0, |t| u64::try_from(t.elapsed().as_nanos()).unwrap_or(u64::MAX));
        self.conn.tracer().notify(TraceEvent::Profile, &self.label, elapsed_ns);

        self.conn.report(self.rc, self.error_msg.take());

        self.result_row = None;
        self.cursors.close_all(self.conn.storage());
        self.registers.clear_all();

        if let Some(sink) = self.profile_sink.as_mut() {
            let report = ProfileReport {
                label: self.label.clone(),
                ops: self.counters.drain(..).filter(|c| c.count > 0).collect(),
            };
            if let Err(err) = sink.record(&report) {
                tracing::debug!(target: "sqlvm::vdbe", label = %self.label, "profile sink failed: {}", err);
            }
        }

        if self.active {
            self.active = false;
            self.conn.program_stopped();
        }

        tracing::debug!(target: "sqlvm::vdbe", label = %self.label, state = ?self.state, code = %self.rc, "program halted");
        self.rc.masked(mask)
    }

    /// Halt if needed and return to the initial state. Bound parameters
    /// are kept. Returns the masked result code of the finished invocation.
    pub fn reset(&mut self) -> ResultCode {
        let rc = self.halt();
        self.aux.clear_all();
        self.registers.clear_all();
        self.cursors.close_all(self.conn.storage());
        self.error_msg = None;
        self.result_row = None;
        self.pc = None;
        self.rc = ResultCode::OK;
        self.state = RunState::Init;
        self.halt_done = false;
        self.n_row = 0;
        self.started_at = None;
        self.counters.clear();
        tracing::debug!(target: "sqlvm::vdbe", label = %self.label, "program reset");
        rc
    }

    /// Reset and destroy the program, returning the last result code
    pub fn finalize(mut self) -> ResultCode {
        let rc = self.reset();
        self.conn.tracer().notify(TraceEvent::Close, &self.label, 0);
        tracing::debug!(target: "sqlvm::vdbe", label = %self.label, "program finalized");
        rc
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if self.pc.is_some() {
            self.halt();
        }
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("label", &self.label)
            .field("pc", &self.pc)
            .field("state", &self.state)
            .field("rc", &self.rc)
            .field("n_op", &self.code.ops().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
