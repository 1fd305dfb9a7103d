//! Virtual Database Engine (VDBE)

pub mod auxdata;
pub mod builder;
pub mod cursor;
pub mod engine;
pub mod func;
pub mod mem;
pub mod ops;
pub mod trace;
pub mod value;

pub use auxdata::{AuxDataCache, AuxDestructor, AuxPayload};
pub use builder::{explain_program, CompiledProgram, Label, VdbeBuilder};
pub use cursor::{CursorTable, VdbeCursor};
pub use engine::{HaltReason, Program, RunState};
pub use func::{
    sqlite3_get_auxdata, sqlite3_result_double, sqlite3_result_error, sqlite3_result_int64,
    sqlite3_result_null, sqlite3_result_text, sqlite3_set_auxdata, FunctionContext,
};
pub use mem::{ArithOp, Mem, MemView, RegisterFile};
pub use ops::{cmp_flags, FuncDef, Opcode, ScalarFunc, VdbeOp, P4};
pub use trace::{
    FileSink, NoopSink, OpCounter, ProfileReport, ProfileSink, TraceCallback, TraceEvent,
    TraceFlags, TraceInfo, Tracer,
};
pub use value::{
    sqlite3_value_bytes, sqlite3_value_double, sqlite3_value_int64, sqlite3_value_type,
    SqliteValue, ValueFlags,
};
