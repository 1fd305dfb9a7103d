//! Program Construction
//!
//! `VdbeBuilder` assembles instructions with forward labels and register /
//! cursor / parameter allocation. `CompiledProgram` is the immutable
//! `(ops, n_mem, n_cursor)` triple handed to the engine; it is validated
//! once on construction so the interpreter can trust operand bounds.

use std::fmt::Write;

use crate::error::{Error, ErrorCode, Result};
use crate::vdbe::ops::{Opcode, VdbeOp, P4};

// ============================================================================
// Compiled Program
// ============================================================================

/// A validated, immutable instruction array with its resource counts
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    ops: Vec<VdbeOp>,
    n_mem: usize,
    n_cursor: usize,
    n_var: usize,
}

impl CompiledProgram {
    /// Validate `ops` against the declared register, cursor and parameter
    /// counts.
    ///
    /// Fails with `Internal` if any register, cursor, parameter or jump
    /// operand is out of range.
    pub fn new(ops: Vec<VdbeOp>, n_mem: usize, n_cursor: usize, n_var: usize) -> Result<Self> {
        for (addr, op) in ops.iter().enumerate() {
            validate_op(addr, op, ops.len(), n_mem, n_cursor, n_var)?;
        }
        Ok(Self {
            ops,
            n_mem,
            n_cursor,
            n_var,
        })
    }

    /// The instructions
    pub fn ops(&self) -> &[VdbeOp] {
        &self.ops
    }

    /// Number of registers
    pub fn n_mem(&self) -> usize {
        self.n_mem
    }

    /// Number of cursor slots
    pub fn n_cursor(&self) -> usize {
        self.n_cursor
    }

    /// Number of bind parameters
    pub fn n_var(&self) -> usize {
        self.n_var
    }
}

fn invalid(addr: usize, op: &VdbeOp, what: &str) -> Error {
    Error::with_message(
        ErrorCode::Internal,
        format!("invalid {} at {} ({})", what, addr, op.opcode),
    )
}

/// Register ranges `(start, count)` read or written by `op`.
///
/// Widened to `i64` so operands near `i32::MAX` cannot overflow.
fn register_operands(op: &VdbeOp) -> Vec<(i64, i64)> {
    let (p1, p2, p3) = (i64::from(op.p1), i64::from(op.p2), i64::from(op.p3));
    match op.opcode {
        Opcode::Integer
        | Opcode::Int64
        | Opcode::Real
        | Opcode::String8
        | Opcode::Blob
        | Opcode::ZeroBlob
        | Opcode::Variable => vec![(p2, 1)],
        Opcode::Null => vec![(p2, (p3 - p2).max(0) + 1)],
        Opcode::Copy => vec![(p1, p3 + 1), (p2, p3 + 1)],
        Opcode::SCopy => vec![(p1, 1), (p2, 1)],
        Opcode::Move => vec![(p1, p3.max(1)), (p2, p3.max(1))],
        Opcode::Add
        | Opcode::Subtract
        | Opcode::Multiply
        | Opcode::Divide
        | Opcode::Remainder
        | Opcode::Concat => vec![(p1, 1), (p2, 1), (p3, 1)],
        Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
            vec![(p1, 1), (p3, 1)]
        }
        Opcode::RealAffinity
        | Opcode::IsNull
        | Opcode::NotNull
        | Opcode::If
        | Opcode::IfNot
        | Opcode::Gosub
        | Opcode::Return => vec![(p1, 1)],
        Opcode::Column | Opcode::HaltIfNull => vec![(p3, 1)],
        Opcode::ResultRow => vec![(p1, p2)],
        Opcode::Function => vec![(p2, i64::from(op.p5)), (p3, 1)],
        Opcode::OpenRead
        | Opcode::Close
        | Opcode::Rewind
        | Opcode::Next
        | Opcode::Goto
        | Opcode::Init
        | Opcode::Noop
        | Opcode::Halt => Vec::new(),
    }
}

fn validate_op(
    addr: usize,
    op: &VdbeOp,
    n_op: usize,
    n_mem: usize,
    n_cursor: usize,
    n_var: usize,
) -> Result<()> {
    // P3 is a register number or count for these, never a sentinel
    if matches!(op.opcode, Opcode::Null | Opcode::Copy | Opcode::Move) && op.p3 < 0 {
        return Err(invalid(addr, op, "register count"));
    }
    let n_mem = i64::try_from(n_mem).unwrap_or(i64::MAX);
    for (start, count) in register_operands(op) {
        if start < 0 || count < 0 || start + count > n_mem {
            return Err(invalid(addr, op, "register"));
        }
    }
    if op.opcode.uses_cursor() && (op.p1 < 0 || op.p1 as usize >= n_cursor) {
        return Err(invalid(addr, op, "cursor"));
    }
    if op.opcode.is_jump() && (op.p2 < 0 || op.p2 as usize > n_op) {
        return Err(invalid(addr, op, "jump target"));
    }
    if op.opcode == Opcode::Variable && (op.p1 < 1 || op.p1 as usize > n_var) {
        return Err(invalid(addr, op, "parameter"));
    }
    let p4_ok = match op.opcode {
        Opcode::Int64 => matches!(op.p4, P4::Int64(_)),
        Opcode::Real => matches!(op.p4, P4::Real(_)),
        Opcode::String8 => matches!(op.p4, P4::Text(_)),
        Opcode::Blob => matches!(op.p4, P4::Blob(_)),
        Opcode::OpenRead => matches!(op.p4, P4::Table(_)),
        Opcode::Function => matches!(op.p4, P4::Func(_)),
        _ => true,
    };
    if !p4_ok {
        return Err(invalid(addr, op, "P4 operand"));
    }
    Ok(())
}

// ============================================================================
// EXPLAIN Output
// ============================================================================

/// Generate EXPLAIN output for a VDBE program
pub fn explain_program(ops: &[VdbeOp]) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{:>4}  {:<13}  {:>4}  {:>4}  {:>4}  {:<12}  {:>2}  {}",
        "addr", "opcode", "p1", "p2", "p3", "p4", "p5", "comment"
    );
    let _ = writeln!(
        output,
        "----  -------------  ----  ----  ----  ------------  --  -------"
    );

    for (i, op) in ops.iter().enumerate() {
        let _ = writeln!(
            output,
            "{:>4}  {:<13}  {:>4}  {:>4}  {:>4}  {:<12}  {:02x}  {}",
            i,
            op.opcode.name(),
            op.p1,
            op.p2,
            op.p3,
            format_p4(&op.p4),
            op.p5,
            op.comment.as_deref().unwrap_or("")
        );
    }

    output
}

/// Format P4 operand for display
fn format_p4(p4: &P4) -> String {
    match p4 {
        P4::Unused => String::new(),
        P4::Int64(i) => i.to_string(),
        P4::Real(r) => format!("{:.6}", r),
        P4::Text(s) => {
            if s.chars().count() > 20 {
                format!("'{}...'", s.chars().take(17).collect::<String>())
            } else {
                format!("'{}'", s)
            }
        }
        P4::Blob(b) => {
            if b.len() > 10 {
                format!("x'{}'...", hex::encode(&b[..10]))
            } else {
                format!("x'{}'", hex::encode(b))
            }
        }
        P4::Func(f) => format!("func({})", f.name),
        P4::Table(t) => format!("table({})", t),
    }
}

// ============================================================================
// Program Builder
// ============================================================================

/// Label for forward jumps (resolved later)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(i32);

impl Label {
    /// Create an unresolved label
    pub fn new(id: i32) -> Self {
        Label(-id - 1)
    }

    /// Get the internal value (negative for unresolved)
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Check if this label is resolved
    pub fn is_resolved(&self) -> bool {
        self.0 >= 0
    }
}

/// Helper for building VDBE programs
#[derive(Debug, Default)]
pub struct VdbeBuilder {
    /// Accumulated instructions
    ops: Vec<VdbeOp>,
    /// Next label ID
    next_label: i32,
    /// (label_id, instruction_index) pairs awaiting resolution
    pending_labels: Vec<(i32, usize)>,
    /// Number of registers needed
    n_mem: usize,
    /// Number of cursors needed
    n_cursor: usize,
    /// Number of bind parameters
    n_var: usize,
}

impl VdbeBuilder {
    /// Create a new program builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the next instruction will get
    pub fn current_addr(&self) -> i32 {
        self.ops.len() as i32
    }

    /// Allocate a new label for forward jumps
    pub fn alloc_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Append a fully formed instruction
    pub fn push(&mut self, op: VdbeOp) -> i32 {
        let addr = self.current_addr();
        self.ops.push(op);
        addr
    }

    /// Add an instruction
    pub fn add_op(&mut self, opcode: Opcode, p1: i32, p2: i32, p3: i32) -> i32 {
        self.push(VdbeOp::new(opcode, p1, p2, p3))
    }

    /// Add an instruction with P4
    pub fn add_op4(&mut self, opcode: Opcode, p1: i32, p2: i32, p3: i32, p4: P4) -> i32 {
        self.push(VdbeOp::with_p4(opcode, p1, p2, p3, p4))
    }

    /// Add a jump instruction with a label target
    pub fn add_op_label(&mut self, opcode: Opcode, p1: i32, label: Label, p3: i32) -> i32 {
        let addr = self.push(VdbeOp::new(opcode, p1, label.value(), p3));
        if !label.is_resolved() {
            self.pending_labels.push((-label.value() - 1, addr as usize));
        }
        addr
    }

    /// Resolve a label to the current address
    pub fn resolve_label(&mut self, label: Label) {
        let target = self.current_addr();
        let label_id = -label.value() - 1;

        for &(id, idx) in &self.pending_labels {
            if id == label_id {
                self.ops[idx].p2 = target;
            }
        }
        self.pending_labels.retain(|&(id, _)| id != label_id);
    }

    /// Change P2 of an instruction
    pub fn change_p2(&mut self, addr: i32, p2: i32) {
        if let Some(op) = self.op_at_mut(addr) {
            op.p2 = p2;
        }
    }

    /// Change P5 of an instruction
    pub fn change_p5(&mut self, addr: i32, p5: u16) {
        if let Some(op) = self.op_at_mut(addr) {
            op.p5 = p5;
        }
    }

    /// Set comment on an instruction
    pub fn set_comment(&mut self, addr: i32, comment: impl Into<String>) {
        if let Some(op) = self.op_at_mut(addr) {
            op.comment = Some(comment.into());
        }
    }

    /// Allocate `n` consecutive registers, returning the first (0-based)
    pub fn alloc_reg(&mut self, n: usize) -> i32 {
        let start = self.n_mem;
        self.n_mem += n;
        start as i32
    }

    /// Allocate a cursor slot
    pub fn alloc_cursor(&mut self) -> i32 {
        let slot = self.n_cursor;
        self.n_cursor += 1;
        slot as i32
    }

    /// Allocate a bind parameter, returning its 1-based index
    pub fn alloc_var(&mut self) -> i32 {
        self.n_var += 1;
        self.n_var as i32
    }

    /// Get number of registers needed
    pub fn n_mem(&self) -> usize {
        self.n_mem
    }

    /// Get number of cursors needed
    pub fn n_cursor(&self) -> usize {
        self.n_cursor
    }

    /// Get instruction at address
    pub fn op_at(&self, addr: i32) -> Option<&VdbeOp> {
        usize::try_from(addr).ok().and_then(|a| self.ops.get(a))
    }

    /// Get mutable instruction at address
    pub fn op_at_mut(&mut self, addr: i32) -> Option<&mut VdbeOp> {
        usize::try_from(addr).ok().and_then(|a| self.ops.get_mut(a))
    }

    /// Finish the program.
    ///
    /// Fails with `Internal` if a label was never resolved or an operand is
    /// out of range.
    pub fn build(self) -> Result<CompiledProgram> {
        if let Some(&(id, addr)) = self.pending_labels.first() {
            return Err(Error::with_message(
                ErrorCode::Internal,
                format!("unresolved label {} used at {}", id, addr),
            ));
        }
        CompiledProgram::new(self.ops, self.n_mem, self.n_cursor, self.n_var)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_program() {
        let ops = vec![
            VdbeOp::new(Opcode::Init, 0, 1, 0),
            VdbeOp::with_p4(Opcode::Blob, 0, 0, 0, P4::Blob(vec![0xca, 0xfe])),
            VdbeOp::new(Opcode::ResultRow, 0, 1, 0).with_comment("output"),
            VdbeOp::new(Opcode::Halt, 0, 0, 0),
        ];

        let output = explain_program(&ops);
        assert!(output.contains("Init"));
        assert!(output.contains("x'cafe'"));
        assert!(output.contains("output"));
        assert_eq!(output.lines().count(), 6);
    }

    #[test]
    fn test_format_p4_truncates() {
        assert_eq!(format_p4(&P4::Unused), "");
        assert_eq!(format_p4(&P4::Int64(42)), "42");
        assert_eq!(format_p4(&P4::Text("hi".to_string())), "'hi'");
        assert_eq!(format_p4(&P4::Text("a".repeat(30))), format!("'{}...'", "a".repeat(17)));
        assert_eq!(format_p4(&P4::Blob(vec![0; 12])), "x'00000000000000000000'...");
    }

    #[test]
    fn test_vdbe_builder_labels() {
        let mut builder = VdbeBuilder::new();
        let r = builder.alloc_reg(1);

        let done = builder.alloc_label();
        builder.add_op(Opcode::Init, 0, 0, 0);
        builder.add_op_label(Opcode::Goto, 0, done, 0);
        builder.add_op(Opcode::Integer, 1, r, 0);
        builder.resolve_label(done);
        builder.add_op(Opcode::Halt, 0, 0, 0);

        let prog = builder.build().unwrap();
        assert_eq!(prog.ops().len(), 4);
        assert_eq!(prog.ops()[1].p2, 3);
        assert_eq!(prog.n_mem(), 1);
    }

    #[test]
    fn test_vdbe_builder_alloc() {
        let mut builder = VdbeBuilder::new();
        assert_eq!(builder.alloc_reg(3), 0);
        assert_eq!(builder.alloc_reg(2), 3);
        assert_eq!(builder.alloc_cursor(), 0);
        assert_eq!(builder.alloc_cursor(), 1);
        assert_eq!(builder.alloc_var(), 1);
        assert_eq!(builder.n_mem(), 5);
        assert_eq!(builder.n_cursor(), 2);
    }

    #[test]
    fn test_unresolved_label_rejected() {
        let mut builder = VdbeBuilder::new();
        let lbl = builder.alloc_label();
        builder.add_op_label(Opcode::Goto, 0, lbl, 0);
        let err = builder.build().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_out_of_range_operands_rejected() {
        let bad_reg = vec![VdbeOp::new(Opcode::Integer, 1, 4, 0)];
        assert!(CompiledProgram::new(bad_reg, 4, 0, 0).is_err());

        let bad_jump = vec![VdbeOp::new(Opcode::Goto, 0, 9, 0)];
        assert!(CompiledProgram::new(bad_jump, 0, 0, 0).is_err());

        let bad_cursor = vec![VdbeOp::new(Opcode::Close, 1, 0, 0)];
        assert!(CompiledProgram::new(bad_cursor, 0, 1, 0).is_err());

        let bad_var = vec![VdbeOp::new(Opcode::Variable, 0, 0, 0)];
        assert!(CompiledProgram::new(bad_var, 1, 0, 1).is_err());

        let bad_p4 = vec![VdbeOp::new(Opcode::String8, 0, 0, 0)];
        assert!(CompiledProgram::new(bad_p4, 1, 0, 0).is_err());
    }

    #[test]
    fn test_negative_register_counts_rejected() {
        for opcode in [Opcode::Null, Opcode::Copy, Opcode::Move] {
            let ops = vec![VdbeOp::new(opcode, 0, 1, -1)];
            let err = CompiledProgram::new(ops, 2, 0, 0).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Internal, "{}", opcode);
        }
    }

    #[test]
    fn test_register_ranges_checked_without_overflow() {
        let ops = vec![VdbeOp::new(Opcode::Copy, 0, 1, i32::MAX)];
        assert!(CompiledProgram::new(ops, 2, 0, 0).is_err());

        let ops = vec![VdbeOp::new(Opcode::Null, 0, i32::MIN, i32::MAX)];
        assert!(CompiledProgram::new(ops, 2, 0, 0).is_err());

        let ops = vec![VdbeOp::new(Opcode::ResultRow, i32::MAX, i32::MAX, 0)];
        assert!(CompiledProgram::new(ops, 2, 0, 0).is_err());
    }

    #[test]
    fn test_register_ranges_accepted() {
        // Null with P3 below P2 clears the single register P2
        let ops = vec![
            VdbeOp::new(Opcode::Null, 0, 1, 0),
            VdbeOp::new(Opcode::Copy, 0, 2, 1),
            VdbeOp::new(Opcode::Move, 0, 2, 0),
        ];
        assert!(CompiledProgram::new(ops, 4, 0, 0).is_ok());
    }

    #[test]
    fn test_jump_to_end_is_allowed() {
        let ops = vec![VdbeOp::new(Opcode::Goto, 0, 1, 0)];
        assert!(CompiledProgram::new(ops, 0, 0, 0).is_ok());
    }
}
