//! Introspection auditing
//!
//! Sends the standard introspection document and decides whether the endpoint exposes
//! its schema.

use crate::error::Result;
use crate::network::{Deadline, GraphQLClient, GraphQLResponse, Headers};
use serde_json::Value;
use tracing::{debug, error, info};

/// The full introspection document. `TypeRef` unwraps `ofType` seven levels deep.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      ...FullType
    }
    directives {
      name
      description
      locations
      args {
        ...InputValue
      }
    }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args {
      ...InputValue
    }
    type {
      ...TypeRef
    }
    isDeprecated
    deprecationReason
  }
  inputFields {
    ...InputValue
  }
  interfaces {
    ...TypeRef
  }
  enumValues(includeDeprecated: true) {
    name
    description
    isDeprecated
    deprecationReason
  }
  possibleTypes {
    ...TypeRef
  }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType {
                kind
                name
              }
            }
          }
        }
      }
    }
  }
}
"#;

/// True iff `data.__schema.types` is a non-empty array
pub fn is_introspection_enabled(response: &GraphQLResponse) -> bool {
    response
        .data()
        .and_then(|data| data.get("__schema"))
        .and_then(|schema| schema.get("types"))
        .and_then(Value::as_array)
        .map(|types| !types.is_empty())
        .unwrap_or(false)
}

/// What an audit of one endpoint found
#[derive(Debug, Clone)]
pub enum AuditOutcome {
    /// The schema is exposed; the response holds it
    Enabled(GraphQLResponse),
    /// The endpoint answered but did not hand over a schema
    Disabled(GraphQLResponse),
    /// The endpoint did not answer like a GraphQL service (HTML, non-JSON, ...)
    NotGraphQL { reason: String },
}

impl AuditOutcome {
    pub fn is_enabled(&self) -> bool {
        matches!(self, AuditOutcome::Enabled(_))
    }
}

/// Runs the introspection query against one endpoint
#[derive(Debug, Clone)]
pub struct IntrospectionAuditor {
    client: GraphQLClient,
}

impl IntrospectionAuditor {
    pub fn new(client: GraphQLClient) -> Self {
        Self { client }
    }

    /// Send the introspection query and return the raw response
    pub async fn audit(
        &self,
        endpoint: &str,
        headers: &Headers,
        deadline: &Deadline,
    ) -> Result<GraphQLResponse> {
        info!("Checking introspection at {}", endpoint);
        match self
            .client
            .send_query(endpoint, INTROSPECTION_QUERY, None, headers, deadline)
            .await
        {
            Ok(response) => {
                debug!("Received introspection response");
                Ok(response)
            }
            Err(e) if e.is_not_graphql() => {
                debug!("Introspection target {} is not GraphQL: {}", endpoint, e);
                Err(e)
            }
            Err(e) => {
                error!("Introspection query failed: {}", e);
                Err(e)
            }
        }
    }

    /// Audit `endpoint` and fold soft "not GraphQL" signals into the outcome.
    ///
    /// Hard failures (network, timeout, parse) are still returned as errors.
    pub async fn assess(
        &self,
        endpoint: &str,
        headers: &Headers,
        deadline: &Deadline,
    ) -> Result<AuditOutcome> {
        match self.audit(endpoint, headers, deadline).await {
            Ok(response) if is_introspection_enabled(&response) => {
                info!("Introspection is enabled at {}", endpoint);
                Ok(AuditOutcome::Enabled(response))
            }
            Ok(response) => {
                info!("Introspection appears to be disabled at {}", endpoint);
                Ok(AuditOutcome::Disabled(response))
            }
            Err(e) if e.is_not_graphql() => Ok(AuditOutcome::NotGraphQL {
                reason: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}
