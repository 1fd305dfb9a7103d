//! sqlvm - register-based bytecode engine for an embedded SQL database
//!
//! Compiled programs (produced by [`vdbe::VdbeBuilder`] or any other
//! front end) run against a [`storage::Storage`] collaborator under the
//! ownership of a [`SqliteConnection`], which holds the shared error state.

pub mod error;
pub mod types;
pub mod utf;
pub mod mem;
pub mod storage;
pub mod vdbe;
pub mod api;

// Re-export main public types
pub use error::{Error, ErrorCode, Result, ResultCode};
pub use types::{ColumnType, Encoding, StepResult, Value};

// Re-export API types and functions
pub use api::{
    ConnectionConfig, ErrorState, SqliteConnection,
    sqlite3_step, sqlite3_reset, sqlite3_finalize,
    sqlite3_bind_value, sqlite3_bind_int64, sqlite3_bind_double, sqlite3_bind_text,
    sqlite3_bind_blob, sqlite3_bind_zeroblob, sqlite3_bind_null, sqlite3_clear_bindings,
    sqlite3_column_value, sqlite3_column_type, sqlite3_data_count,
    sqlite3_errcode, sqlite3_extended_errcode, sqlite3_errmsg, sqlite3_errstr,
    sqlite3_extended_result_codes, sqlite3_interrupt, sqlite3_trace_v2,
};
pub use vdbe::{CompiledProgram, Opcode, Program, SqliteValue, VdbeBuilder, P4};
