//! Command implementations behind the `graphprobe` binary
//!
//! Each submodule drives the library components for one CLI mode and reports back
//! results the binary can print.

pub mod audit;
pub mod batch;
pub mod execute;
pub mod schema;

pub use audit::{resolve_targets, AuditRunner, AuditSummary, EndpointReport, EndpointStatus};
pub use batch::{run_batch, split_operations, BatchResult, Operation};
pub use execute::{execute, load_query, load_variables};
pub use schema::{list_operations, print_operations, ListSelector, Selection};
