//! graphprobe - GraphQL security auditing
//!
//! Discovers GraphQL endpoints on a host, checks whether introspection is exposed,
//! fingerprints the serving engine, synthesizes operations from a captured schema and
//! opens subscriptions over WebSocket.

pub mod commands;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod introspection;
pub mod logging;
pub mod network;
pub mod output;
pub mod schema;
pub mod subscription;

pub use config::Config;
pub use error::{AuditError, ErrorKind, Result};
pub use network::{Deadline, GraphQLClient, GraphQLResponse, Headers};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "graphprobe.yaml";
