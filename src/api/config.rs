//! Per-connection configuration
//!
//! Settings fixed when a connection is opened. The error mask and trace
//! settings can also be changed later through `sqlite3_extended_result_codes`
//! and `sqlite3_trace_v2`.

use crate::types::Encoding;
use crate::vdbe::trace::TraceFlags;

/// Mask applied to result codes when extended codes are disabled
pub const PRIMARY_CODE_MASK: i32 = 0xff;

/// Mask applied to result codes when extended codes are enabled
pub const EXTENDED_CODE_MASK: i32 = -1;

/// Options for opening a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionConfig {
    /// Report extended result codes (off by default, as in SQLite)
    pub extended_result_codes: bool,
    /// Text encoding of register values
    pub encoding: Encoding,
    /// Trace events enabled once a callback is installed
    pub trace_flags: TraceFlags,
}

impl ConnectionConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable extended result codes
    pub fn extended_result_codes(mut self, on: bool) -> Self {
        self.extended_result_codes = on;
        self
    }

    /// Set the database text encoding
    pub fn encoding(mut self, enc: Encoding) -> Self {
        self.encoding = enc;
        self
    }

    /// Set the initial trace mask
    pub fn trace_flags(mut self, flags: TraceFlags) -> Self {
        self.trace_flags = flags;
        self
    }

    /// Error mask implied by `extended_result_codes`
    pub fn err_mask(&self) -> i32 {
        if self.extended_result_codes {
            EXTENDED_CODE_MASK
        } else {
            PRIMARY_CODE_MASK
        }
    }
}
