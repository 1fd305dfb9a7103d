//! VDBE Opcodes and Instructions
//!
//! Defines the instruction set executed by [`Program`](super::engine::Program).
//! Operand conventions follow SQLite's vdbe.c: P1..P3 are small integers
//! (registers, cursors, jump targets), P4 is a typed payload owned by the
//! program and P5 carries flags.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::vdbe::func::FunctionContext;

// ============================================================================
// Opcode Definitions
// ============================================================================

/// VDBE opcode
///
/// Hot opcodes (constants, register moves, arithmetic, comparison, column
/// fetch) come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ========================================================================
    // Constants and Register Moves
    // ========================================================================
    /// r[P2] = P1
    Integer = 0,
    /// r[P2] = P4 (Int64)
    Int64,
    /// r[P2] = P4 (Real)
    Real,
    /// r[P2] = P4 (Text)
    String8,
    /// r[P2] = P4 (Blob)
    Blob,
    /// r[P2] = zero-filled blob of P1 bytes
    ZeroBlob,
    /// r[P2..=P3] = NULL (just r[P2] when P3 <= P2)
    Null,
    /// r[P2] = parameter P1 (1-based)
    Variable,
    /// r[P2..P2+P3] = copy of r[P1..P1+P3]
    Copy,
    /// r[P2] = shallow copy of r[P1]
    SCopy,
    /// Move r[P1..P1+P3) to r[P2..P2+P3), leaving the sources NULL
    Move,
    /// Integer in r[P1] becomes an integer-valued REAL
    RealAffinity,

    // ========================================================================
    // Arithmetic
    // ========================================================================
    /// r[P3] = r[P2] + r[P1]
    Add,
    /// r[P3] = r[P2] - r[P1]
    Subtract,
    /// r[P3] = r[P2] * r[P1]
    Multiply,
    /// r[P3] = r[P2] / r[P1]
    Divide,
    /// r[P3] = r[P2] % r[P1]
    Remainder,
    /// r[P3] = r[P2] || r[P1]
    Concat,

    // ========================================================================
    // Comparison and Branching
    // ========================================================================
    /// Jump to P2 if r[P3] == r[P1]
    Eq,
    /// Jump to P2 if r[P3] != r[P1]
    Ne,
    /// Jump to P2 if r[P3] < r[P1]
    Lt,
    /// Jump to P2 if r[P3] <= r[P1]
    Le,
    /// Jump to P2 if r[P3] > r[P1]
    Gt,
    /// Jump to P2 if r[P3] >= r[P1]
    Ge,
    /// Jump to P2 if r[P1] is NULL
    IsNull,
    /// Jump to P2 if r[P1] is not NULL
    NotNull,
    /// Jump to P2 if r[P1] is true (or NULL and P3 != 0)
    If,
    /// Jump to P2 if r[P1] is false (or NULL and P3 != 0)
    IfNot,

    // ========================================================================
    // Cursors
    // ========================================================================
    /// Open cursor P1 on table P4
    OpenRead,
    /// r[P3] = column P2 of cursor P1
    Column,
    /// Close cursor P1
    Close,
    /// Move cursor P1 to its first row; jump to P2 if there is none
    Rewind,
    /// Advance cursor P1; jump to P2 if a row is available
    Next,

    // ========================================================================
    // Results and Functions
    // ========================================================================
    /// Yield r[P1..P1+P2) as a result row
    ResultRow,
    /// r[P3] = func(r[P2..P2+P5)), function in P4
    Function,

    // ========================================================================
    // Control Flow
    // ========================================================================
    /// Jump to P2
    Goto,
    /// r[P1] = address of this op; jump to P2
    Gosub,
    /// Jump to r[P1] + 1
    Return,
    /// Program entry; jump to P2 when non-zero
    Init,
    /// Do nothing
    Noop,
    /// Stop with result code P1 and optional message P4
    Halt,
    /// Halt like `Halt` if r[P3] is NULL
    HaltIfNull,
}

impl Opcode {
    /// Does P2 hold a jump target?
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::Gosub
                | Opcode::Init
                | Opcode::If
                | Opcode::IfNot
                | Opcode::Eq
                | Opcode::Ne
                | Opcode::Lt
                | Opcode::Le
                | Opcode::Gt
                | Opcode::Ge
                | Opcode::IsNull
                | Opcode::NotNull
                | Opcode::Rewind
                | Opcode::Next
        )
    }

    /// Does P1 name a cursor?
    pub fn uses_cursor(&self) -> bool {
        matches!(
            self,
            Opcode::OpenRead | Opcode::Column | Opcode::Close | Opcode::Rewind | Opcode::Next
        )
    }

    /// Opcode name as shown by EXPLAIN
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Integer => "Integer",
            Opcode::Int64 => "Int64",
            Opcode::Real => "Real",
            Opcode::String8 => "String8",
            Opcode::Blob => "Blob",
            Opcode::ZeroBlob => "ZeroBlob",
            Opcode::Null => "Null",
            Opcode::Variable => "Variable",
            Opcode::Copy => "Copy",
            Opcode::SCopy => "SCopy",
            Opcode::Move => "Move",
            Opcode::RealAffinity => "RealAffinity",
            Opcode::Add => "Add",
            Opcode::Subtract => "Subtract",
            Opcode::Multiply => "Multiply",
            Opcode::Divide => "Divide",
            Opcode::Remainder => "Remainder",
            Opcode::Concat => "Concat",
            Opcode::Eq => "Eq",
            Opcode::Ne => "Ne",
            Opcode::Lt => "Lt",
            Opcode::Le => "Le",
            Opcode::Gt => "Gt",
            Opcode::Ge => "Ge",
            Opcode::IsNull => "IsNull",
            Opcode::NotNull => "NotNull",
            Opcode::If => "If",
            Opcode::IfNot => "IfNot",
            Opcode::OpenRead => "OpenRead",
            Opcode::Column => "Column",
            Opcode::Close => "Close",
            Opcode::Rewind => "Rewind",
            Opcode::Next => "Next",
            Opcode::ResultRow => "ResultRow",
            Opcode::Function => "Function",
            Opcode::Goto => "Goto",
            Opcode::Gosub => "Gosub",
            Opcode::Return => "Return",
            Opcode::Init => "Init",
            Opcode::Noop => "Noop",
            Opcode::Halt => "Halt",
            Opcode::HaltIfNull => "HaltIfNull",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Function Definitions
// ============================================================================

/// Implementation of a scalar function
pub type ScalarFunc = Arc<dyn Fn(&mut FunctionContext<'_>) -> Result<()> + Send + Sync>;

/// A registered scalar function (FuncDef)
#[derive(Clone)]
pub struct FuncDef {
    /// Function name
    pub name: String,
    /// Number of arguments, -1 for variadic
    pub n_arg: i32,
    /// The implementation
    pub func: ScalarFunc,
}

impl FuncDef {
    pub fn new<F>(name: impl Into<String>, n_arg: i32, func: F) -> Self
    where
        F: Fn(&mut FunctionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            n_arg,
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FuncDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncDef")
            .field("name", &self.name)
            .field("n_arg", &self.n_arg)
            .finish_non_exhaustive()
    }
}

impl PartialEq for FuncDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.n_arg == other.n_arg && Arc::ptr_eq(&self.func, &other.func)
    }
}

// ============================================================================
// P4 Union Type
// ============================================================================

/// P4 operand - typed payload owned by the program
#[derive(Debug, Clone, PartialEq, Default)]
pub enum P4 {
    /// Not used
    #[default]
    Unused,
    /// 64-bit integer
    Int64(i64),
    /// Real number
    Real(f64),
    /// Text string
    Text(String),
    /// Binary blob
    Blob(Vec<u8>),
    /// Scalar function
    Func(Arc<FuncDef>),
    /// Table name for a cursor
    Table(String),
}

impl P4 {
    /// Check if P4 is unused
    pub fn is_unused(&self) -> bool {
        matches!(self, P4::Unused)
    }

    /// Text payload, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            P4::Text(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// VDBE Instruction
// ============================================================================

/// A single VDBE instruction
#[derive(Debug, Clone, PartialEq)]
pub struct VdbeOp {
    /// Operation code
    pub opcode: Opcode,
    /// First operand (usually register or cursor)
    pub p1: i32,
    /// Second operand (usually jump target or register)
    pub p2: i32,
    /// Third operand
    pub p3: i32,
    /// Fourth operand (type varies by opcode)
    pub p4: P4,
    /// Fifth operand (flags/extra info)
    pub p5: u16,
    /// Comment for EXPLAIN output
    pub comment: Option<String>,
}

impl VdbeOp {
    /// Create a new instruction with minimal operands
    pub fn new(opcode: Opcode, p1: i32, p2: i32, p3: i32) -> Self {
        Self::with_p4(opcode, p1, p2, p3, P4::Unused)
    }

    /// Create instruction with P4
    pub fn with_p4(opcode: Opcode, p1: i32, p2: i32, p3: i32, p4: P4) -> Self {
        Self {
            opcode,
            p1,
            p2,
            p3,
            p4,
            p5: 0,
            comment: None,
        }
    }

    /// Set comment for debugging
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set P5 flags
    pub fn with_p5(mut self, p5: u16) -> Self {
        self.p5 = p5;
        self
    }
}

impl fmt::Display for VdbeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:>4} {:>4} {:>4}",
            self.opcode.name(),
            self.p1,
            self.p2,
            self.p3
        )?;

        match &self.p4 {
            P4::Unused => {}
            P4::Int64(i) => write!(f, "  {}", i)?,
            P4::Real(r) => write!(f, "  {}", r)?,
            P4::Text(s) => write!(f, "  \"{}\"", s)?,
            P4::Blob(b) => write!(f, "  x'{}'", hex::encode(b))?,
            P4::Func(def) => write!(f, "  func({}/{})", def.name, def.n_arg)?,
            P4::Table(t) => write!(f, "  table({})", t)?,
        }

        if self.p5 != 0 {
            write!(f, "  p5={:#04x}", self.p5)?;
        }

        if let Some(ref comment) = self.comment {
            write!(f, "  ; {}", comment)?;
        }

        Ok(())
    }
}

// ============================================================================
// Comparison Flags (P5)
// ============================================================================

/// Comparison flags for P5 operand
pub mod cmp_flags {
    /// NULL == NULL is true and NULL compares unequal to non-NULL
    pub const NULLEQ: u16 = 0x80;
    /// Jump if either operand is NULL
    pub const JUMPIFNULL: u16 = 0x10;
}

// ============================================================================
// Tests
// ============================================================================
