//! Schema file handling: list root operations or print generated documents

use crate::error::{AuditError, Result};
use crate::schema::{OperationGenerator, OperationKind, Schema};
use std::io::Write;
use std::str::FromStr;
use tracing::error;

/// Which root operations `--list` prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSelector {
    Queries,
    Mutations,
    Subscriptions,
    All,
}

impl FromStr for ListSelector {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queries" => Ok(ListSelector::Queries),
            "mutations" => Ok(ListSelector::Mutations),
            "subscriptions" => Ok(ListSelector::Subscriptions),
            "all" => Ok(ListSelector::All),
            other => Err(AuditError::validation(format!(
                "Invalid list option '{}', expected queries, mutations, subscriptions or all",
                other
            ))),
        }
    }
}

/// Operations to generate. With no selector at all, every query and mutation is generated.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub queries: Vec<String>,
    pub mutations: Vec<String>,
    pub subscriptions: Vec<String>,
    pub all_queries: bool,
    pub all_mutations: bool,
}

impl Selection {
    /// Split comma-separated name lists, dropping blanks
    pub fn split_names(raw: Option<&str>) -> Vec<String> {
        raw.map(|names| {
            names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
    }

    /// `(kind, field)` pairs to generate, in print order
    pub fn resolve(&self, schema: &Schema) -> Vec<(OperationKind, String)> {
        let named = !self.queries.is_empty() || !self.mutations.is_empty() || !self.subscriptions.is_empty();
        let (all_queries, all_mutations) = if named {
            (false, false)
        } else if !self.all_queries && !self.all_mutations {
            (true, true)
        } else {
            (self.all_queries, self.all_mutations)
        };

        let queries = if all_queries { schema.list_queries() } else { self.queries.clone() };
        let mutations = if all_mutations { schema.list_mutations() } else { self.mutations.clone() };

        queries
            .into_iter()
            .map(|name| (OperationKind::Query, name))
            .chain(mutations.into_iter().map(|name| (OperationKind::Mutation, name)))
            .chain(
                self.subscriptions
                    .iter()
                    .map(|name| (OperationKind::Subscription, name.clone())),
            )
            .collect()
    }
}

/// Print `query name` / `mutation name` / `subscription name` lines
pub fn list_operations<W: Write>(schema: &Schema, selector: ListSelector, out: &mut W) -> Result<()> {
    let wants = |kind: ListSelector| selector == kind || selector == ListSelector::All;
    if wants(ListSelector::Queries) {
        for name in schema.list_queries() {
            writeln!(out, "query {}", name)?;
        }
    }
    if wants(ListSelector::Mutations) {
        for name in schema.list_mutations() {
            writeln!(out, "mutation {}", name)?;
        }
    }
    if wants(ListSelector::Subscriptions) {
        for name in schema.list_subscriptions() {
            writeln!(out, "subscription {}", name)?;
        }
    }
    Ok(())
}

/// Print every selected operation; a field that fails is logged and skipped.
///
/// Returns the number of documents printed.
pub fn print_operations<W: Write>(
    generator: &OperationGenerator<'_>,
    operations: &[(OperationKind, String)],
    out: &mut W,
) -> Result<usize> {
    let mut printed = 0;
    for (kind, name) in operations {
        match generator.generate(*kind, name) {
            Ok(document) => {
                writeln!(out, "{}\n", document)?;
                printed += 1;
            }
            Err(e) => error!("Failed to generate {} for {}: {}", kind, name, e),
        }
    }
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        let scalar = json!({ "kind": "SCALAR", "name": "String", "ofType": null });
        Schema::from_introspection(&json!({ "__schema": {
            "queryType": { "name": "Query" },
            "mutationType": { "name": "Mutation" },
            "subscriptionType": { "name": "Subscription" },
            "types": [
                { "kind": "OBJECT", "name": "Query", "fields": [
                    { "name": "a", "args": [], "type": scalar.clone() },
                    { "name": "b", "args": [], "type": scalar.clone() }
                ] },
                { "kind": "OBJECT", "name": "Mutation", "fields": [
                    { "name": "m", "args": [], "type": scalar.clone() }
                ] },
                { "kind": "OBJECT", "name": "Subscription", "fields": [
                    { "name": "s", "args": [], "type": scalar }
                ] },
                { "kind": "SCALAR", "name": "String" }
            ]
        } }))
        .unwrap()
    }

    #[test]
    fn test_list_operations() {
        let schema = schema();
        let mut out = Vec::new();
        list_operations(&schema, ListSelector::All, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "query a\nquery b\nmutation m\nsubscription s\n"
        );

        let mut out = Vec::new();
        list_operations(&schema, "mutations".parse().unwrap(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "mutation m\n");
        assert!("everything".parse::<ListSelector>().is_err());
    }

    #[test]
    fn test_default_selection_is_all_queries_and_mutations() {
        let schema = schema();
        let operations = Selection::default().resolve(&schema);
        assert_eq!(
            operations,
            vec![
                (OperationKind::Query, "a".to_string()),
                (OperationKind::Query, "b".to_string()),
                (OperationKind::Mutation, "m".to_string()),
            ]
        );
    }

    #[test]
    fn test_named_selection_disables_all_flags() {
        let schema = schema();
        let selection = Selection {
            queries: Selection::split_names(Some("b, ,missing")),
            all_mutations: true,
            ..Default::default()
        };
        let operations = selection.resolve(&schema);
        assert_eq!(
            operations,
            vec![
                (OperationKind::Query, "b".to_string()),
                (OperationKind::Query, "missing".to_string()),
            ]
        );

        let generator = OperationGenerator::new(&schema);
        let mut out = Vec::new();
        let printed = print_operations(&generator, &operations, &mut out).unwrap();
        assert_eq!(printed, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "query b {\n  b\n}\n\n");
    }
}
