//! Prepared statement handling
//!
//! The sqlite3_stmt family of functions, expressed over [`Program`].

use crate::error::{Result, ResultCode};
use crate::types::{ColumnType, Encoding, StepResult, Value};
use crate::vdbe::engine::{Program, RunState};
use crate::vdbe::value::SqliteValue;

// ============================================================================
// Execution
// ============================================================================

/// sqlite3_step - Run the program to the next row or to completion
pub fn sqlite3_step(stmt: &mut Program) -> Result<StepResult> {
    stmt.step()
}

/// sqlite3_reset - Return the program to its initial state
///
/// Returns the (masked) result code of the invocation that was halted.
pub fn sqlite3_reset(stmt: &mut Program) -> ResultCode {
    stmt.reset()
}

/// sqlite3_finalize - Destroy the program
pub fn sqlite3_finalize(stmt: Program) -> ResultCode {
    stmt.finalize()
}

/// sqlite3_stmt_busy - Has the program started but not yet halted?
pub fn sqlite3_stmt_busy(stmt: &Program) -> bool {
    stmt.state() == RunState::Running
}

// ============================================================================
// Parameter Binding
// ============================================================================

/// sqlite3_bind_value - Bind a copy of an external value
pub fn sqlite3_bind_value(stmt: &mut Program, idx: i32, value: &SqliteValue<'_>) -> Result<()> {
    stmt.bind_value(idx, value)
}

/// sqlite3_bind_null - Bind NULL to parameter
pub fn sqlite3_bind_null(stmt: &mut Program, idx: i32) -> Result<()> {
    stmt.bind_value(idx, &SqliteValue::null())
}

/// sqlite3_bind_int64 - Bind i64 to parameter
pub fn sqlite3_bind_int64(stmt: &mut Program, idx: i32, value: i64) -> Result<()> {
    stmt.bind_value(idx, &SqliteValue::integer(value))
}

/// sqlite3_bind_double - Bind f64 to parameter
pub fn sqlite3_bind_double(stmt: &mut Program, idx: i32, value: f64) -> Result<()> {
    stmt.bind_value(idx, &SqliteValue::real(value))
}

/// sqlite3_bind_text - Bind UTF-8 text to parameter
pub fn sqlite3_bind_text(stmt: &mut Program, idx: i32, value: &str) -> Result<()> {
    stmt.bind_value(idx, &SqliteValue::text(value.as_bytes(), Encoding::Utf8))
}

/// sqlite3_bind_text16 - Bind UTF-16 (native byte order) text to parameter
pub fn sqlite3_bind_text16(stmt: &mut Program, idx: i32, value: &[u16]) -> Result<()> {
    let bytes: Vec<u8> = value.iter().flat_map(|u| u.to_le_bytes()).collect();
    stmt.bind_value(idx, &SqliteValue::text(&bytes, Encoding::Utf16le))
}

/// sqlite3_bind_blob - Bind blob to parameter
pub fn sqlite3_bind_blob(stmt: &mut Program, idx: i32, value: &[u8]) -> Result<()> {
    stmt.bind_value(idx, &SqliteValue::blob(value))
}

/// sqlite3_bind_zeroblob - Bind a zero-filled blob of `n` bytes
pub fn sqlite3_bind_zeroblob(stmt: &mut Program, idx: i32, n: usize) -> Result<()> {
    stmt.bind_value(idx, &SqliteValue::zero_blob(n))
}

/// sqlite3_bind_parameter_count - Number of parameters
pub fn sqlite3_bind_parameter_count(stmt: &Program) -> i32 {
    stmt.parameter_count() as i32
}

/// sqlite3_clear_bindings - Reset all parameters to NULL
pub fn sqlite3_clear_bindings(stmt: &mut Program) -> Result<()> {
    stmt.clear_bindings();
    Ok(())
}

// ============================================================================
// Column Access
// ============================================================================

fn col(idx: i32) -> usize {
    usize::try_from(idx).unwrap_or(usize::MAX)
}

/// sqlite3_data_count - Number of values in the current row
pub fn sqlite3_data_count(stmt: &Program) -> i32 {
    stmt.data_count() as i32
}

/// sqlite3_column_type - Storage class of a column
pub fn sqlite3_column_type(stmt: &Program, idx: i32) -> ColumnType {
    stmt.column_type(col(idx))
}

/// sqlite3_column_int64 - Get column as i64
pub fn sqlite3_column_int64(stmt: &Program, idx: i32) -> i64 {
    stmt.column_int64(col(idx))
}

/// sqlite3_column_double - Get column as f64
pub fn sqlite3_column_double(stmt: &Program, idx: i32) -> f64 {
    stmt.column_double(col(idx))
}

/// sqlite3_column_text - Get column as text
pub fn sqlite3_column_text(stmt: &Program, idx: i32) -> String {
    stmt.column_text(col(idx))
}

/// sqlite3_column_blob - Get column as blob
pub fn sqlite3_column_blob(stmt: &Program, idx: i32) -> Vec<u8> {
    stmt.column_blob(col(idx))
}

/// sqlite3_column_bytes - Byte length of a column
pub fn sqlite3_column_bytes(stmt: &Program, idx: i32) -> usize {
    stmt.column_bytes(col(idx))
}

/// sqlite3_column_value - Get column as an owned value
pub fn sqlite3_column_value(stmt: &Program, idx: i32) -> Value {
    stmt.column_value(col(idx))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SqliteConnection;
    use crate::error::ErrorCode;
    use crate::vdbe::builder::VdbeBuilder;
    use crate::vdbe::ops::Opcode;

    fn echo_params(n: usize) -> Program {
        let mut b = VdbeBuilder::new();
        let r = b.alloc_reg(n);
        for i in 0..n as i32 {
            let p = b.alloc_var();
            b.add_op(Opcode::Variable, p, r + i, 0);
        }
        b.add_op(Opcode::ResultRow, r, n as i32, 0);
        let conn = SqliteConnection::open_in_memory();
        conn.prepare(b.build().unwrap())
    }

    #[test]
    fn test_bind_and_read_back() {
        let mut stmt = echo_params(4);
        assert_eq!(sqlite3_bind_parameter_count(&stmt), 4);
        sqlite3_bind_int64(&mut stmt, 1, 7).unwrap();
        sqlite3_bind_text(&mut stmt, 2, "abc").unwrap();
        sqlite3_bind_zeroblob(&mut stmt, 3, 3).unwrap();
        sqlite3_bind_double(&mut stmt, 4, 1.5).unwrap();

        assert_eq!(sqlite3_step(&mut stmt).unwrap(), StepResult::Row);
        assert!(sqlite3_stmt_busy(&stmt));
        assert_eq!(sqlite3_data_count(&stmt), 4);
        assert_eq!(sqlite3_column_int64(&stmt, 0), 7);
        assert_eq!(sqlite3_column_text(&stmt, 1), "abc");
        assert_eq!(sqlite3_column_type(&stmt, 2), ColumnType::Blob);
        assert_eq!(sqlite3_column_bytes(&stmt, 2), 3);
        assert_eq!(sqlite3_column_blob(&stmt, 2), vec![0, 0, 0]);
        assert_eq!(sqlite3_column_double(&stmt, 3), 1.5);
        assert_eq!(sqlite3_column_text(&stmt, 0), "7");
        assert_eq!(sqlite3_column_value(&stmt, 9), Value::Null);
    }

    #[test]
    fn test_bind_out_of_range() {
        let mut stmt = echo_params(1);
        let err = sqlite3_bind_int64(&mut stmt, 2, 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Range);
        let err = sqlite3_bind_int64(&mut stmt, 0, 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Range);
    }

    #[test]
    fn test_bind_while_running_is_misuse() {
        let mut stmt = echo_params(1);
        sqlite3_step(&mut stmt).unwrap();
        let err = sqlite3_bind_null(&mut stmt, 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Misuse);
        assert!(sqlite3_reset(&mut stmt).is_ok());
        assert!(sqlite3_bind_null(&mut stmt, 1).is_ok());
    }

    #[test]
    fn test_bindings_survive_reset_until_cleared() {
        let mut stmt = echo_params(1);
        sqlite3_bind_text16(&mut stmt, 1, &"hé".encode_utf16().collect::<Vec<_>>()).unwrap();
        sqlite3_step(&mut stmt).unwrap();
        assert_eq!(sqlite3_column_text(&stmt, 0), "hé");

        sqlite3_reset(&mut stmt);
        sqlite3_step(&mut stmt).unwrap();
        assert_eq!(sqlite3_column_text(&stmt, 0), "hé");

        sqlite3_reset(&mut stmt);
        sqlite3_clear_bindings(&mut stmt).unwrap();
        sqlite3_step(&mut stmt).unwrap();
        assert_eq!(sqlite3_column_type(&stmt, 0), ColumnType::Null);
        assert!(sqlite3_finalize(stmt).is_ok());
    }
}
