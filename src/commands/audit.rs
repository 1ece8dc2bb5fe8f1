//! Multi-endpoint introspection audit
//!
//! Audits each target in turn. "Not GraphQL" answers are skipped with a warning and
//! hard failures are recorded; neither stops the remaining targets.

use crate::error::{ErrorKind, Result};
use crate::introspection::{AuditOutcome, IntrospectionAuditor};
use crate::network::{Deadline, DiscoveryEngine, DiscoveryMode, Headers};
use crate::output::{output_file_for, unique_file_name, ResultWriter};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened at one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EndpointStatus {
    /// Introspection enabled; the schema was saved to `file`
    Enabled { file: String },
    Disabled,
    /// Did not answer like GraphQL
    Skipped { reason: String },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    pub endpoint: String,
    #[serde(flatten)]
    pub status: EndpointStatus,
}

/// Per-endpoint results of one audit run, in audit order
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditSummary {
    pub endpoints: Vec<EndpointReport>,
}

impl AuditSummary {
    fn record(&mut self, endpoint: &str, status: EndpointStatus) {
        self.endpoints.push(EndpointReport {
            endpoint: endpoint.to_string(),
            status,
        });
    }

    fn matching<F>(&self, predicate: F) -> Vec<&str>
    where
        F: Fn(&EndpointStatus) -> bool,
    {
        self.endpoints
            .iter()
            .filter(|report| predicate(&report.status))
            .map(|report| report.endpoint.as_str())
            .collect()
    }

    pub fn enabled(&self) -> Vec<&str> {
        self.matching(|s| matches!(s, EndpointStatus::Enabled { .. }))
    }

    pub fn disabled(&self) -> Vec<&str> {
        self.matching(|s| matches!(s, EndpointStatus::Disabled))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.matching(|s| matches!(s, EndpointStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.matching(|s| matches!(s, EndpointStatus::Failed { .. }))
    }

    /// Log the closing verdict
    pub fn log(&self) {
        if !self.enabled().is_empty() {
            warn!("WARNING: Introspection is ENABLED on at least one endpoint!");
        } else if !self.disabled().is_empty() {
            info!("Introspection appears to be disabled on all checked endpoints");
        }
        info!(
            enabled = self.enabled().len(),
            disabled = self.disabled().len(),
            skipped = self.skipped().len(),
            failed = self.failed().len(),
            "Audit completed"
        );
    }
}

/// Targets for an audit: every discovered endpoint, or `base_url` itself
pub async fn resolve_targets(
    engine: &DiscoveryEngine,
    base_url: &str,
    detect: bool,
    deadline: &Deadline,
) -> Result<Vec<String>> {
    if !detect {
        return Ok(vec![base_url.to_string()]);
    }
    let endpoints = engine
        .discover(base_url, DiscoveryMode::CollectAll, deadline)
        .await?;
    info!("Detected {} GraphQL endpoint(s)", endpoints.len());
    for endpoint in &endpoints {
        info!("  - {}", endpoint);
    }
    Ok(endpoints)
}

/// Audits targets and saves every exposed schema
pub struct AuditRunner {
    auditor: IntrospectionAuditor,
    writer: Arc<dyn ResultWriter>,
    output: String,
}

impl AuditRunner {
    pub fn new(auditor: IntrospectionAuditor, writer: Arc<dyn ResultWriter>, output: impl Into<String>) -> Self {
        Self {
            auditor,
            writer,
            output: output.into(),
        }
    }

    pub async fn run(&self, targets: &[String], headers: &Headers, deadline: &Deadline) -> AuditSummary {
        let mut summary = AuditSummary::default();
        let mut written = HashSet::new();

        for target in targets {
            info!("Checking if introspection is enabled on {}...", target);
            match self.auditor.assess(target, headers, deadline).await {
                Ok(AuditOutcome::Enabled(response)) => {
                    warn!("WARNING: Introspection is ENABLED on {}!", target);
                    let file = unique_file_name(&output_file_for(&self.output, target), &written);
                    match self.writer.write(&response, Path::new(&file)) {
                        Ok(()) => {
                            written.insert(file.clone());
                            summary.record(target, EndpointStatus::Enabled { file })
                        }
                        Err(e) => {
                            error!("Error writing introspection result to file: {}", e);
                            summary.record(
                                target,
                                EndpointStatus::Failed {
                                    kind: e.kind(),
                                    message: e.to_string(),
                                },
                            );
                        }
                    }
                }
                Ok(AuditOutcome::Disabled(_)) => summary.record(target, EndpointStatus::Disabled),
                Ok(AuditOutcome::NotGraphQL { reason }) => {
                    warn!(
                        "The endpoint {} doesn't appear to be a valid GraphQL endpoint: {}",
                        target, reason
                    );
                    info!("This may be a false positive or the endpoint requires special headers/authentication");
                    summary.record(target, EndpointStatus::Skipped { reason });
                }
                Err(e) => {
                    error!("Error checking introspection on {}: {}", target, e);
                    summary.record(
                        target,
                        EndpointStatus::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    );
                    if deadline.is_cancelled() {
                        warn!("Audit interrupted, remaining targets not checked");
                        break;
                    }
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{GraphQLClient, DEFAULT_TIMEOUT};
    use crate::output::JsonFileWriter;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_run_classifies_each_target() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/open/graphql",
            ResponseTemplate::new(200).set_body_json(json!({
                "data": { "__schema": { "types": [{ "kind": "OBJECT", "name": "Query" }] } }
            })),
        )
        .await;
        mount(
            &server,
            "/closed",
            ResponseTemplate::new(200).set_body_json(json!({ "errors": [{ "message": "disabled" }] })),
        )
        .await;
        mount(
            &server,
            "/web",
            ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("introspection.json");
        let client = GraphQLClient::new(DEFAULT_TIMEOUT).unwrap();
        let runner = AuditRunner::new(
            IntrospectionAuditor::new(client),
            Arc::new(JsonFileWriter),
            output.to_string_lossy(),
        );

        let targets = vec![
            format!("{}/open/graphql", server.uri()),
            format!("{}/closed", server.uri()),
            format!("{}/web", server.uri()),
            "http://127.0.0.1:1/graphql".to_string(),
        ];
        let summary = runner
            .run(&targets, &Headers::new(), &Deadline::after(Duration::from_secs(10)))
            .await;

        assert_eq!(summary.enabled(), vec![targets[0].as_str()]);
        assert_eq!(summary.disabled(), vec![targets[1].as_str()]);
        assert_eq!(summary.skipped(), vec![targets[2].as_str()]);
        assert_eq!(summary.failed(), vec![targets[3].as_str()]);

        let saved = dir.path().join("introspection_open_graphql.json");
        let content: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(saved).unwrap()).unwrap();
        assert_eq!(content["data"]["__schema"]["types"][0]["name"], "Query");
    }

    #[tokio::test]
    async fn test_sibling_endpoints_keep_their_own_files() {
        let server = MockServer::start().await;
        for (route, root) in [("/graphql", "Root"), ("/v1/graphql", "V1Root")] {
            mount(
                &server,
                route,
                ResponseTemplate::new(200).set_body_json(json!({
                    "data": { "__schema": { "types": [{ "kind": "OBJECT", "name": root }] } }
                })),
            )
            .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let runner = AuditRunner::new(
            IntrospectionAuditor::new(GraphQLClient::new(DEFAULT_TIMEOUT).unwrap()),
            Arc::new(JsonFileWriter),
            dir.path().join("introspection.json").to_string_lossy(),
        );
        let targets = vec![
            format!("{}/graphql", server.uri()),
            format!("{}/v1/graphql", server.uri()),
            format!("{}/graphql", server.uri()),
        ];
        let summary = runner
            .run(&targets, &Headers::new(), &Deadline::after(Duration::from_secs(10)))
            .await;

        let files: Vec<String> = summary
            .endpoints
            .iter()
            .map(|report| match &report.status {
                EndpointStatus::Enabled { file } => file.clone(),
                other => panic!("unexpected status {:?}", other),
            })
            .collect();
        let unique: HashSet<&String> = files.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(files[0].ends_with("introspection_graphql.json"));
        assert!(files[1].ends_with("introspection_v1_graphql.json"));
        assert!(files[2].ends_with("introspection_graphql_2.json"));

        let v1: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files[1]).unwrap()).unwrap();
        assert_eq!(v1["data"]["__schema"]["types"][0]["name"], "V1Root");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_resolve_targets_without_detection() {
        let engine = DiscoveryEngine::new(crate::network::EndpointProber::new(
            GraphQLClient::new(DEFAULT_TIMEOUT).unwrap(),
            Headers::new(),
        ));
        let targets = resolve_targets(&engine, "http://x/graphql", false, &Deadline::unbounded())
            .await
            .unwrap();
        assert_eq!(targets, vec!["http://x/graphql".to_string()]);
    }
}
