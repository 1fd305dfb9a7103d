//! Main API entry points
//!
//! Connection handle and the `sqlite3_*` style free functions over
//! connections and programs.

mod config;
mod connection;
mod stmt;

pub use config::*;
pub use connection::*;
pub use stmt::*;
