//! Error types and Result aliases
//!
//! Result codes follow SQLite's numbering: the low byte is the primary
//! code and the upper bits select an extended code. Connections may mask
//! extended codes down to primary codes (see `Connection::err_mask`).

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use thiserror::Error as ThisError;

// ============================================================================
// Primary Error Codes
// ============================================================================

/// Primary result codes (SQLITE_OK, SQLITE_ERROR, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result
    #[default]
    Ok = 0,
    /// Generic error
    Error = 1,
    /// Internal logic error
    Internal = 2,
    /// Access permission denied
    Perm = 3,
    /// Callback routine requested an abort
    Abort = 4,
    /// The database file is locked
    Busy = 5,
    /// A table in the database is locked
    Locked = 6,
    /// A malloc() failed
    NoMem = 7,
    /// Attempt to write a readonly database
    ReadOnly = 8,
    /// Operation terminated by interrupt
    Interrupt = 9,
    /// Some kind of disk I/O error occurred
    IoErr = 10,
    /// The database disk image is malformed
    Corrupt = 11,
    /// Unknown opcode or not found
    NotFound = 12,
    /// Insertion failed because database is full
    Full = 13,
    /// Unable to open the database file
    CantOpen = 14,
    /// Database lock protocol error
    Protocol = 15,
    /// Internal use only
    Empty = 16,
    /// The database schema changed
    Schema = 17,
    /// String or BLOB exceeds size limit
    TooBig = 18,
    /// Abort due to constraint violation
    Constraint = 19,
    /// Data type mismatch
    Mismatch = 20,
    /// Library used incorrectly
    Misuse = 21,
    /// Uses OS features not supported on host
    NoLfs = 22,
    /// Authorization denied
    Auth = 23,
    /// Not used
    Format = 24,
    /// Bind parameter out of range
    Range = 25,
    /// File opened that is not a database file
    NotADb = 26,
    /// Notifications from sqlite3_log()
    Notice = 27,
    /// Warnings from sqlite3_log()
    Warning = 28,
    /// step() has another row ready
    Row = 100,
    /// step() has finished executing
    Done = 101,
}

impl ErrorCode {
    /// Convert a raw primary code. Extended bits are ignored.
    pub fn from_i32(code: i32) -> Option<Self> {
        let code = match code & 0xff {
            0 => ErrorCode::Ok,
            1 => ErrorCode::Error,
            2 => ErrorCode::Internal,
            3 => ErrorCode::Perm,
            4 => ErrorCode::Abort,
            5 => ErrorCode::Busy,
            6 => ErrorCode::Locked,
            7 => ErrorCode::NoMem,
            8 => ErrorCode::ReadOnly,
            9 => ErrorCode::Interrupt,
            10 => ErrorCode::IoErr,
            11 => ErrorCode::Corrupt,
            12 => ErrorCode::NotFound,
            13 => ErrorCode::Full,
            14 => ErrorCode::CantOpen,
            15 => ErrorCode::Protocol,
            16 => ErrorCode::Empty,
            17 => ErrorCode::Schema,
            18 => ErrorCode::TooBig,
            19 => ErrorCode::Constraint,
            20 => ErrorCode::Mismatch,
            21 => ErrorCode::Misuse,
            22 => ErrorCode::NoLfs,
            23 => ErrorCode::Auth,
            24 => ErrorCode::Format,
            25 => ErrorCode::Range,
            26 => ErrorCode::NotADb,
            27 => ErrorCode::Notice,
            28 => ErrorCode::Warning,
            100 => ErrorCode::Row,
            101 => ErrorCode::Done,
            _ => return None,
        };
        Some(code)
    }

    /// Raw integer value
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// English description of the code (sqlite3_errstr)
    pub fn errstr(self) -> &'static str {
        match self {
            ErrorCode::Ok => "not an error",
            ErrorCode::Error => "SQL logic error",
            ErrorCode::Internal => "internal error",
            ErrorCode::Perm => "access permission denied",
            ErrorCode::Abort => "query aborted",
            ErrorCode::Busy => "database is locked",
            ErrorCode::Locked => "database table is locked",
            ErrorCode::NoMem => "out of memory",
            ErrorCode::ReadOnly => "attempt to write a readonly database",
            ErrorCode::Interrupt => "interrupted",
            ErrorCode::IoErr => "disk I/O error",
            ErrorCode::Corrupt => "database disk image is malformed",
            ErrorCode::NotFound => "unknown operation",
            ErrorCode::Full => "database or disk is full",
            ErrorCode::CantOpen => "unable to open database file",
            ErrorCode::Protocol => "locking protocol",
            ErrorCode::Empty => "empty",
            ErrorCode::Schema => "database schema has changed",
            ErrorCode::TooBig => "string or blob too big",
            ErrorCode::Constraint => "constraint failed",
            ErrorCode::Mismatch => "datatype mismatch",
            ErrorCode::Misuse => "bad parameter or other API misuse",
            ErrorCode::NoLfs => "large file support is disabled",
            ErrorCode::Auth => "authorization denied",
            ErrorCode::Format => "auxiliary database format error",
            ErrorCode::Range => "column index out of range",
            ErrorCode::NotADb => "file is not a database",
            ErrorCode::Notice => "notification message",
            ErrorCode::Warning => "warning message",
            ErrorCode::Row => "another row available",
            ErrorCode::Done => "no more rows available",
        }
    }
}

// ============================================================================
// Extended Result Codes
// ============================================================================

/// A possibly-extended result code
///
/// The low eight bits hold the primary [`ErrorCode`]; the remaining bits
/// distinguish extended codes such as `SQLITE_IOERR_READ`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResultCode(i32);

impl ResultCode {
    /// SQLITE_OK
    pub const OK: ResultCode = ResultCode(0);
    /// SQLITE_IOERR_READ
    pub const IOERR_READ: ResultCode = ResultCode(10 | (1 << 8));
    /// SQLITE_IOERR_SHORT_READ
    pub const IOERR_SHORT_READ: ResultCode = ResultCode(10 | (2 << 8));
    /// SQLITE_IOERR_WRITE
    pub const IOERR_WRITE: ResultCode = ResultCode(10 | (3 << 8));
    /// SQLITE_ABORT_ROLLBACK
    pub const ABORT_ROLLBACK: ResultCode = ResultCode(4 | (2 << 8));
    /// SQLITE_CONSTRAINT_CHECK
    pub const CONSTRAINT_CHECK: ResultCode = ResultCode(19 | (1 << 8));
    /// SQLITE_CONSTRAINT_NOTNULL
    pub const CONSTRAINT_NOTNULL: ResultCode = ResultCode(19 | (5 << 8));
    /// SQLITE_CONSTRAINT_UNIQUE
    pub const CONSTRAINT_UNIQUE: ResultCode = ResultCode(19 | (8 << 8));
    /// SQLITE_CANTOPEN_NOTEMPDIR
    pub const CANTOPEN_NOTEMPDIR: ResultCode = ResultCode(14 | (1 << 8));

    /// Wrap a raw (possibly extended) code
    pub const fn from_raw(code: i32) -> Self {
        ResultCode(code)
    }

    /// The raw integer value
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The primary code (low byte)
    pub fn primary(self) -> ErrorCode {
        ErrorCode::from_i32(self.0).unwrap_or(ErrorCode::Error)
    }

    /// Is this SQLITE_OK?
    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Apply a connection error mask
    pub fn masked(self, mask: i32) -> Self {
        ResultCode(self.0 & mask)
    }

    /// Symbolic name, e.g. `SQLITE_IOERR_READ`
    pub fn name(self) -> &'static str {
        CODE_NAMES.get(&self.0).copied().unwrap_or("SQLITE_UNKNOWN")
    }
}

impl From<ErrorCode> for ResultCode {
    fn from(code: ErrorCode) -> Self {
        ResultCode(code as i32)
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

lazy_static! {
    static ref CODE_NAMES: HashMap<i32, &'static str> = {
        let mut m = HashMap::new();
        m.insert(0, "SQLITE_OK");
        m.insert(1, "SQLITE_ERROR");
        m.insert(2, "SQLITE_INTERNAL");
        m.insert(3, "SQLITE_PERM");
        m.insert(4, "SQLITE_ABORT");
        m.insert(5, "SQLITE_BUSY");
        m.insert(6, "SQLITE_LOCKED");
        m.insert(7, "SQLITE_NOMEM");
        m.insert(8, "SQLITE_READONLY");
        m.insert(9, "SQLITE_INTERRUPT");
        m.insert(10, "SQLITE_IOERR");
        m.insert(11, "SQLITE_CORRUPT");
        m.insert(12, "SQLITE_NOTFOUND");
        m.insert(13, "SQLITE_FULL");
        m.insert(14, "SQLITE_CANTOPEN");
        m.insert(15, "SQLITE_PROTOCOL");
        m.insert(16, "SQLITE_EMPTY");
        m.insert(17, "SQLITE_SCHEMA");
        m.insert(18, "SQLITE_TOOBIG");
        m.insert(19, "SQLITE_CONSTRAINT");
        m.insert(20, "SQLITE_MISMATCH");
        m.insert(21, "SQLITE_MISUSE");
        m.insert(22, "SQLITE_NOLFS");
        m.insert(23, "SQLITE_AUTH");
        m.insert(24, "SQLITE_FORMAT");
        m.insert(25, "SQLITE_RANGE");
        m.insert(26, "SQLITE_NOTADB");
        m.insert(27, "SQLITE_NOTICE");
        m.insert(28, "SQLITE_WARNING");
        m.insert(100, "SQLITE_ROW");
        m.insert(101, "SQLITE_DONE");
        m.insert(ResultCode::IOERR_READ.0, "SQLITE_IOERR_READ");
        m.insert(ResultCode::IOERR_SHORT_READ.0, "SQLITE_IOERR_SHORT_READ");
        m.insert(ResultCode::IOERR_WRITE.0, "SQLITE_IOERR_WRITE");
        m.insert(ResultCode::ABORT_ROLLBACK.0, "SQLITE_ABORT_ROLLBACK");
        m.insert(ResultCode::CONSTRAINT_CHECK.0, "SQLITE_CONSTRAINT_CHECK");
        m.insert(ResultCode::CONSTRAINT_NOTNULL.0, "SQLITE_CONSTRAINT_NOTNULL");
        m.insert(ResultCode::CONSTRAINT_UNIQUE.0, "SQLITE_CONSTRAINT_UNIQUE");
        m.insert(ResultCode::CANTOPEN_NOTEMPDIR.0, "SQLITE_CANTOPEN_NOTEMPDIR");
        m
    };
}

// ============================================================================
// Error
// ============================================================================

/// Error returned by engine and API calls
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.code, .message.as_deref()))]
pub struct Error {
    code: ResultCode,
    message: Option<String>,
}

fn describe(code: &ResultCode, message: Option<&str>) -> String {
    match message {
        Some(msg) => msg.to_string(),
        None => code.primary().errstr().to_string(),
    }
}

impl Error {
    /// Error with only a code; the display text is the code's errstr
    pub fn new(code: impl Into<ResultCode>) -> Self {
        Self {
            code: code.into(),
            message: None,
        }
    }

    /// Error with an explicit message
    pub fn with_message(code: impl Into<ResultCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
        }
    }

    /// Primary code
    pub fn code(&self) -> ErrorCode {
        self.code.primary()
    }

    /// Full (possibly extended) code
    pub fn extended_code(&self) -> ResultCode {
        self.code
    }

    /// Message attached to the error, if any
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Split into code and message
    pub fn into_parts(self) -> (ResultCode, Option<String>) {
        (self.code, self.message)
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Tests
// ============================================================================
