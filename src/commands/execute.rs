//! Ad-hoc query execution

use crate::error::{AuditError, Result};
use crate::network::{Deadline, GraphQLClient, GraphQLResponse, Headers};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Query text from `--query-string` or `--query-file`; the string wins when both are given
pub fn load_query(query_string: Option<&str>, query_file: Option<&Path>) -> Result<String> {
    match (query_string, query_file) {
        (Some(query), _) => Ok(query.to_string()),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
            AuditError::validation(format!("Error reading query file {}: {}", path.display(), e))
        }),
        (None, None) => Err(AuditError::validation(
            "No query provided: use --query-string or --query-file",
        )),
    }
}

/// Variables from `--vars` or `--vars-file`; they must be a JSON object
pub fn load_variables(vars: Option<&str>, vars_file: Option<&Path>) -> Result<Option<Map<String, Value>>> {
    let raw = match (vars, vars_file) {
        (Some(vars), _) => vars.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
            AuditError::validation(format!("Error reading variables file {}: {}", path.display(), e))
        })?,
        (None, None) => return Ok(None),
    };
    parse_variables(&raw).map(Some)
}

pub fn parse_variables(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AuditError::validation("Variables must be a JSON object")),
        Err(e) => Err(AuditError::validation(format!("Error parsing variables JSON: {}", e))),
    }
}

/// Send one operation and return the raw response
pub async fn execute(
    client: &GraphQLClient,
    url: &str,
    query: &str,
    variables: Option<Map<String, Value>>,
    headers: &Headers,
    deadline: &Deadline,
) -> Result<GraphQLResponse> {
    info!("Executing operation against {}", url);
    let response = client.send_query(url, query, variables, headers, deadline).await?;
    if response.has_errors() {
        info!("Server returned {} error(s)", response.errors().len());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DEFAULT_TIMEOUT;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_load_query_sources() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("q.graphql");
        std::fs::write(&file, "query { me { id } }").unwrap();

        assert_eq!(load_query(Some("{ a }"), Some(&file)).unwrap(), "{ a }");
        assert_eq!(load_query(None, Some(&file)).unwrap(), "query { me { id } }");
        assert!(load_query(None, None).is_err());
    }

    #[test]
    fn test_variables_must_be_an_object() {
        assert_eq!(
            load_variables(Some(r#"{"id": 1}"#), None).unwrap().unwrap()["id"],
            1
        );
        assert!(load_variables(None, None).unwrap().is_none());
        assert!(parse_variables("[1, 2]").is_err());
        assert!(parse_variables("{").is_err());
    }

    #[tokio::test]
    async fn test_execute_sends_variables() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "query": "query($id: ID!) { user(id: $id) { id } }", "variables": { "id": "7" } })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "user": { "id": "7" } } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphQLClient::new(DEFAULT_TIMEOUT).unwrap();
        let variables = parse_variables(r#"{"id": "7"}"#).unwrap();
        let response = execute(
            &client,
            &server.uri(),
            "query($id: ID!) { user(id: $id) { id } }",
            Some(variables),
            &Headers::new(),
            &Deadline::after(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert_eq!(response.data().unwrap()["user"]["id"], "7");
    }
}
