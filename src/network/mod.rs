//! GraphQL network layer
//!
//! This module contains the HTTP transport, the shared deadline used by every
//! concurrent fan-out, and endpoint discovery built on top of both.

pub mod client;
pub mod deadline;
pub mod discovery;
pub mod types;

// Re-export main types
pub use client::{GraphQLClient, DEFAULT_TIMEOUT};
pub use deadline::Deadline;
pub use discovery::{
    looks_like_graphql, DiscoveryEngine, DiscoveryMode, DiscoveryReport, EndpointProber,
    ProbeResult, CANDIDATE_PATHS,
};
pub use types::{GraphQLRequest, GraphQLResponse, Headers};
