//! Schema model built from introspection JSON
//!
//! Once loaded the model is read-only and can be shared between concurrent generators.

use crate::error::{AuditError, Result};
use crate::network::GraphQLResponse;
use crate::schema::types::FullType;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct NamedRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    #[serde(default)]
    query_type: Option<NamedRef>,
    #[serde(default)]
    mutation_type: Option<NamedRef>,
    #[serde(default)]
    subscription_type: Option<NamedRef>,
    types: Vec<FullType>,
}

/// Types keyed by name plus the resolved operation roots
#[derive(Debug, Clone)]
pub struct Schema {
    types: HashMap<String, FullType>,
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl Schema {
    /// Load from an introspection result file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading schema from file: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuditError::schema_load(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| AuditError::schema_load(format!("failed to parse JSON: {}", e)))?;
        Self::from_introspection(&value)
    }

    pub fn from_response(response: &GraphQLResponse) -> Result<Self> {
        Self::from_introspection(&Value::Object(response.as_map().clone()))
    }

    /// Build from introspection JSON, either `{"data": {"__schema": ..}}` or `{"__schema": ..}`
    pub fn from_introspection(introspection: &Value) -> Result<Self> {
        let raw_schema = introspection
            .get("data")
            .and_then(|data| data.get("__schema"))
            .or_else(|| introspection.get("__schema"))
            .ok_or_else(|| {
                AuditError::schema_load("unable to locate __schema in introspection data")
            })?;

        let raw: RawSchema = RawSchema::deserialize(raw_schema)
            .map_err(|e| AuditError::schema_load(format!("malformed __schema: {}", e)))?;

        let mut types = HashMap::with_capacity(raw.types.len());
        for full_type in raw.types {
            full_type.validate().map_err(|e| match e {
                AuditError::SchemaLoad { message } => {
                    AuditError::schema_load(format!("type {}: {}", full_type.name(), message))
                }
                other => other,
            })?;
            match full_type.name.clone() {
                Some(name) if !name.is_empty() => {
                    types.insert(name, full_type);
                }
                _ => debug!("Skipping unnamed {:?} type", full_type.kind),
            }
        }

        let query_type = match root_name(raw.query_type) {
            Some(name) if types.contains_key(&name) => Some(name),
            Some(name) => {
                return Err(AuditError::schema_load(format!(
                    "query type '{}' not found in schema",
                    name
                )))
            }
            None => {
                warn!("Schema declares no query type");
                None
            }
        };
        let mutation_type = optional_root(&types, root_name(raw.mutation_type), "Mutation");
        let subscription_type =
            optional_root(&types, root_name(raw.subscription_type), "Subscription");

        info!("Schema loaded successfully ({} types)", types.len());
        Ok(Self {
            types,
            query_type,
            mutation_type,
            subscription_type,
        })
    }

    pub fn type_by_name(&self, name: &str) -> Option<&FullType> {
        self.types.get(name)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn query_root(&self) -> Option<&FullType> {
        self.query_type.as_deref().and_then(|name| self.types.get(name))
    }

    pub fn mutation_root(&self) -> Option<&FullType> {
        self.mutation_type.as_deref().and_then(|name| self.types.get(name))
    }

    pub fn subscription_root(&self) -> Option<&FullType> {
        self.subscription_type
            .as_deref()
            .and_then(|name| self.types.get(name))
    }

    /// Query field names in schema order
    pub fn list_queries(&self) -> Vec<String> {
        field_names(self.query_root())
    }

    /// Mutation field names in schema order, empty without a mutation root
    pub fn list_mutations(&self) -> Vec<String> {
        field_names(self.mutation_root())
    }

    /// Subscription field names in schema order, empty without a subscription root
    pub fn list_subscriptions(&self) -> Vec<String> {
        field_names(self.subscription_root())
    }
}

fn root_name(named: Option<NamedRef>) -> Option<String> {
    named.and_then(|n| n.name).filter(|name| !name.is_empty())
}

/// Mutation and subscription roots that cannot be resolved are treated as absent
fn optional_root(
    types: &HashMap<String, FullType>,
    name: Option<String>,
    label: &str,
) -> Option<String> {
    match name {
        Some(name) if types.contains_key(&name) => Some(name),
        Some(name) => {
            warn!("{} type '{}' not found in schema, ignoring it", label, name);
            None
        }
        None => None,
    }
}

fn field_names(root: Option<&FullType>) -> Vec<String> {
    root.map(|t| t.fields().iter().map(|f| f.name.clone()).collect())
        .unwrap_or_default()
}
