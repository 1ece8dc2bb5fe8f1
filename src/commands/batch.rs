//! Batch execution of `*.graphql` files
//!
//! Every file in the directory is split into its named operations; each operation is
//! sent on its own, with `<file>.json` as variables when that file exists.

use crate::error::{AuditError, Result};
use crate::network::{Deadline, GraphQLClient, GraphQLResponse, Headers};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Start of a named query or mutation definition
static OPERATION_HEADER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:query|mutation)\s+([A-Za-z0-9_]+)").expect("Invalid regex pattern")
});

/// One named operation cut out of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub document: String,
}

/// Split `content` at every operation header; text before the first header is dropped
pub fn split_operations(content: &str) -> Vec<Operation> {
    let headers: Vec<(usize, String)> = OPERATION_HEADER_REGEX
        .captures_iter(content)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let name = caps.get(1)?.as_str().to_string();
            Some((start, name))
        })
        .collect();

    headers
        .iter()
        .enumerate()
        .map(|(i, (start, name))| {
            let end = headers.get(i + 1).map(|(next, _)| *next).unwrap_or(content.len());
            Operation {
                name: name.clone(),
                document: content[*start..end].to_string(),
            }
        })
        .collect()
}

/// `*.graphql` files in `dir`, sorted
pub fn discover_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.graphql");
    let pattern = pattern.to_string_lossy();
    let mut files = Vec::new();

    for entry in glob::glob(&pattern)
        .map_err(|e| AuditError::validation(format!("Invalid glob pattern {}: {}", pattern, e)))?
    {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Glob error: {}", e),
        }
    }

    files.sort();
    Ok(files)
}

/// Variables stored next to a query file; unreadable or malformed files are ignored with a warning
pub fn variables_for(query_file: &Path) -> Option<Map<String, Value>> {
    let vars_file = query_file.with_extension("json");
    let content = std::fs::read_to_string(&vars_file).ok()?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!("Ignoring {}: variables must be a JSON object", vars_file.display());
            None
        }
        Err(e) => {
            warn!("Ignoring {}: {}", vars_file.display(), e);
            None
        }
    }
}

/// Outcome of one operation in a batch
#[derive(Debug)]
pub struct BatchResult {
    pub file: String,
    pub operation: String,
    pub response: Result<GraphQLResponse>,
}

/// Run every operation of every `*.graphql` file in `dir` against `url`
pub async fn run_batch(
    client: &GraphQLClient,
    url: &str,
    dir: &Path,
    headers: &Headers,
    deadline: &Deadline,
) -> Result<Vec<BatchResult>> {
    info!("Batch mode: scanning directory {}", dir.display());
    let mut results = Vec::new();

    for path in discover_files(dir)? {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                error!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let operations = split_operations(&content);
        if operations.is_empty() {
            error!("No operations found in {}", path.display());
            continue;
        }

        let variables = variables_for(&path);
        for operation in operations {
            let response = client
                .send_query(url, &operation.document, variables.clone(), headers, deadline)
                .await;
            if let Err(e) = &response {
                error!("{} (in {}) failed: {}", operation.name, file, e);
            }
            results.push(BatchResult {
                file: file.clone(),
                operation: operation.name,
                response,
            });
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DEFAULT_TIMEOUT;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCUMENT: &str = "# users\nquery ListUsers {\n  users { id }\n}\n\nmutation AddUser($name: String!) {\n  addUser(name: $name) { id }\n}\n";

    #[test]
    fn test_split_operations() {
        let operations = split_operations(DOCUMENT);
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[0].name, "ListUsers");
        assert!(operations[0].document.starts_with("query ListUsers {"));
        assert!(!operations[0].document.contains("mutation"));
        assert_eq!(operations[1].name, "AddUser");
        assert!(operations[1].document.ends_with("}\n"));

        assert!(split_operations("{ anonymous }").is_empty());
    }

    #[tokio::test]
    async fn test_run_batch_pairs_variables_and_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("users.graphql"), DOCUMENT).unwrap();
        std::fs::write(dir.path().join("users.json"), r#"{"name": "ada"}"#).unwrap();
        std::fs::write(dir.path().join("empty.graphql"), "# nothing here\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "query Ignored { a }").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "name": "ada" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "ok": true } })))
            .expect(2)
            .mount(&server)
            .await;

        let client = GraphQLClient::new(DEFAULT_TIMEOUT).unwrap();
        let results = run_batch(
            &client,
            &server.uri(),
            dir.path(),
            &Headers::new(),
            &Deadline::after(Duration::from_secs(10)),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].operation, "ListUsers");
        assert_eq!(results[1].operation, "AddUser");
        assert!(results.iter().all(|r| r.file == "users.graphql" && r.response.is_ok()));
    }

    #[test]
    fn test_malformed_variables_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let query = dir.path().join("q.graphql");
        std::fs::write(dir.path().join("q.json"), "[1]").unwrap();
        assert!(variables_for(&query).is_none());
        assert!(variables_for(&dir.path().join("none.graphql")).is_none());
    }
}
