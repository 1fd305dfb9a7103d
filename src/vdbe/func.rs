//! Scalar function context (sqlite3_context)
//!
//! A `FunctionContext` is handed to a [`FuncDef`](super::ops::FuncDef)
//! implementation by the `Function` opcode. It exposes the argument
//! registers, collects the result, and gives access to the program's
//! auxiliary-data cache keyed by the calling op's address.

use std::any::Any;
use std::borrow::Cow;

use crate::error::{ErrorCode, ResultCode};
use crate::mem::Allocator;
use crate::types::Encoding;
use crate::vdbe::auxdata::{AuxDataCache, AuxDestructor, AuxPayload};
use crate::vdbe::mem::{Mem, MemView};
use crate::vdbe::value::SqliteValue;

/// Execution context for one scalar function call
pub struct FunctionContext<'a> {
    args: &'a [Mem],
    result: Mem,
    error: Option<(ResultCode, String)>,
    aux: &'a mut AuxDataCache,
    op_addr: i32,
    alloc: &'a Allocator,
    db_enc: Encoding,
}

impl<'a> FunctionContext<'a> {
    pub(crate) fn new(
        args: &'a [Mem],
        aux: &'a mut AuxDataCache,
        op_addr: i32,
        alloc: &'a Allocator,
        db_enc: Encoding,
    ) -> Self {
        Self {
            args,
            result: Mem::Null,
            error: None,
            aux,
            op_addr,
            alloc,
            db_enc,
        }
    }

    /// Number of arguments
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// View of argument `i`
    pub fn arg(&self, i: usize) -> MemView<'_> {
        self.args[i].view()
    }

    /// Argument `i` as an external value
    pub fn arg_value(&self, i: usize) -> SqliteValue<'_> {
        SqliteValue::from_mem(&self.args[i])
    }

    /// Argument `i` rendered as text
    pub fn arg_text(&self, i: usize) -> String {
        self.args[i].to_text()
    }

    /// Address of the calling `Function` op
    pub fn op_addr(&self) -> i32 {
        self.op_addr
    }

    /// The result set so far
    pub fn result(&self) -> &Mem {
        &self.result
    }

    /// The error raised so far, if any
    pub fn error(&self) -> Option<(ResultCode, &str)> {
        self.error.as_ref().map(|(rc, msg)| (*rc, msg.as_str()))
    }

    pub(crate) fn into_outcome(self) -> (Mem, Option<(ResultCode, String)>) {
        (self.result, self.error)
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Result is NULL
    pub fn result_null(&mut self) {
        self.result.set_null();
    }

    /// Result is an integer
    pub fn result_int64(&mut self, value: i64) {
        self.result.set_int(value);
    }

    /// Result is a float
    pub fn result_double(&mut self, value: f64) {
        self.result.set_real(value);
    }

    /// Result is UTF-8 text
    pub fn result_text(&mut self, value: &str) {
        let (alloc, enc) = (self.alloc, self.db_enc);
        if self
            .result
            .set_text(Cow::Borrowed(value.as_bytes()), Encoding::Utf8, enc, alloc)
            .is_err()
        {
            self.result_error_nomem();
        }
    }

    /// Result is a blob
    pub fn result_blob(&mut self, value: &[u8]) {
        let alloc = self.alloc;
        if self.result.set_blob(Cow::Borrowed(value), alloc).is_err() {
            self.result_error_nomem();
        }
    }

    /// Result is a zero-filled blob
    pub fn result_zeroblob(&mut self, n: usize) {
        self.result.set_zero_blob(n);
    }

    /// Result is a copy of `value`
    pub fn result_value(&mut self, value: &SqliteValue<'_>) {
        let (alloc, enc) = (self.alloc, self.db_enc);
        if value.copy_into(&mut self.result, enc, alloc).is_err() {
            self.result_error_nomem();
        }
    }

    /// Raise an error with message `msg`
    pub fn result_error(&mut self, msg: &str) {
        self.result_error_code(ErrorCode::Error.into(), msg);
    }

    /// Raise an error with an explicit result code
    pub fn result_error_code(&mut self, rc: ResultCode, msg: &str) {
        self.error = Some((rc, msg.to_string()));
    }

    /// Raise an out-of-memory error
    pub fn result_error_nomem(&mut self) {
        self.result.set_null();
        self.error = Some((ErrorCode::NoMem.into(), ErrorCode::NoMem.errstr().to_string()));
    }

    // ========================================================================
    // Auxiliary Data
    // ========================================================================

    /// Value cached for argument `arg` of this call site
    pub fn get_auxdata(&self, arg: i32) -> Option<&(dyn Any + Send)> {
        self.aux.get(self.op_addr, arg)
    }

    /// Typed variant of [`get_auxdata`](Self::get_auxdata)
    pub fn get_auxdata_as<T: Any>(&self, arg: i32) -> Option<&T> {
        self.aux.get_as::<T>(self.op_addr, arg)
    }

    /// Cache `value` for argument `arg` of this call site.
    ///
    /// If the entry cannot be allocated, `destructor` runs on `value`
    /// immediately and the statement fails with `NoMem` once the function
    /// returns.
    pub fn set_auxdata(&mut self, arg: i32, value: AuxPayload, destructor: Option<AuxDestructor>) {
        self.aux.set(self.op_addr, arg, value, destructor);
    }
}

// ============================================================================
// C-style wrappers (sqlite3_result_*, sqlite3_*_auxdata)
// ============================================================================

/// sqlite3_result_int64
pub fn sqlite3_result_int64(ctx: &mut FunctionContext<'_>, value: i64) {
    ctx.result_int64(value);
}

/// sqlite3_result_double
pub fn sqlite3_result_double(ctx: &mut FunctionContext<'_>, value: f64) {
    ctx.result_double(value);
}

/// sqlite3_result_text
pub fn sqlite3_result_text(ctx: &mut FunctionContext<'_>, value: &str) {
    ctx.result_text(value);
}

/// sqlite3_result_null
pub fn sqlite3_result_null(ctx: &mut FunctionContext<'_>) {
    ctx.result_null();
}

/// sqlite3_result_error
pub fn sqlite3_result_error(ctx: &mut FunctionContext<'_>, msg: &str) {
    ctx.result_error(msg);
}

/// sqlite3_get_auxdata
pub fn sqlite3_get_auxdata<'c>(ctx: &'c FunctionContext<'_>, arg: i32) -> Option<&'c (dyn Any + Send)> {
    ctx.get_auxdata(arg)
}

/// sqlite3_set_auxdata
pub fn sqlite3_set_auxdata(
    ctx: &mut FunctionContext<'_>,
    arg: i32,
    value: AuxPayload,
    destructor: Option<AuxDestructor>,
) {
    ctx.set_auxdata(arg, value, destructor);
}

// ============================================================================
// Tests
// ============================================================================
