//! Error handling module for graphprobe
//!
//! One error enum for every subsystem, plus a flat [`ErrorKind`] for reports.

mod error;

// Re-export the main error types
pub use error::{AuditError, ErrorKind, Result};
