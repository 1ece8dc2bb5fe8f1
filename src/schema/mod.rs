//! Schema model and operation generation
//!
//! Loads a captured introspection result and synthesizes example queries, mutations
//! and subscriptions for its root fields.

pub mod generator;
pub mod model;
pub mod types;

pub use generator::{
    OperationGenerator, OperationKind, DEFAULT_MAX_DEPTH, DEFAULT_REPEAT_VISIT_LIMIT,
};
pub use model::Schema;
pub use types::{unwrap_type, EnumValue, Field, FullType, InputValue, TypeKind, TypeRef};
