//! GraphQL-over-HTTP wire types

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Caller-supplied request headers (e.g. `Authorization`)
pub type Headers = HashMap<String, String>;

/// Body of a GraphQL-over-HTTP POST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    pub fn with_variables(mut self, variables: Option<Map<String, Value>>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name<S: Into<String>>(mut self, name: S) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// The parsed top-level JSON object of a GraphQL response, kept unchanged.
///
/// Accessors interpret the standard envelope (`data`, `errors`) without validating it;
/// callers decide what a given shape means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphQLResponse(Map<String, Value>);

impl GraphQLResponse {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wrap an arbitrary JSON value; anything other than an object is a parse error
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AuditError::parse(format!(
                "expected a JSON object at the top level, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// `data` when it is an object
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.0.get("data").and_then(Value::as_object)
    }

    /// `errors` entries, empty when absent or not an array
    pub fn errors(&self) -> &[Value] {
        self.0
            .get("errors")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    /// `message` of every error entry that has a string message
    pub fn error_messages(&self) -> impl Iterator<Item = &str> {
        self.errors()
            .iter()
            .filter_map(|error| error.get("message").and_then(Value::as_str))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
