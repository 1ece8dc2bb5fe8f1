//! GraphQL endpoint discovery
//!
//! Every candidate path is probed by its own task. All tasks share one child of the
//! caller's [`Deadline`]; in stop-on-first mode the collector cancels that child as soon
//! as a positive result arrives. Each worker sends exactly one [`ProbeResult`] into a
//! channel sized to the candidate count, so no worker ever blocks on the collector and
//! the collector never has to choose between "cancelled" and "result pending".
//!
//! Which endpoint wins a stop-on-first race is intentionally unspecified.

use crate::error::{AuditError, ErrorKind, Result};
use crate::network::client::GraphQLClient;
use crate::network::deadline::Deadline;
use crate::network::types::{GraphQLResponse, Headers};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Paths commonly used to serve GraphQL
pub const CANDIDATE_PATHS: &[&str] = &[
    "/",
    "/graphql",
    "/graphiql",
    "/v1/graphql",
    "/v2/graphql",
    "/v3/graphql",
    "/api/graphql",
    "/console",
    "/playground",
    "/gql",
    "/query",
    "/api",
    "/graphql/v1",
    "/graphql/v2",
    "/api/v1/graphql",
    "/api/v2/graphql",
    "/graph",
    "/graphql-api",
    "/graphql/console",
    "/graphql/playground",
    "/service-name/graphql",
    "/hasura/v1/graphql",
    "/altair",
    "/explorer",
];

/// Conventional names of the query root type
pub const ROOT_TYPENAMES: &[&str] = &["Query", "QueryRoot", "query_root"];

/// Query sent to every candidate
pub const PROBE_QUERY: &str = "query { __typename }";

/// Collection policy for [`DiscoveryEngine::discover`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Cancel the remaining probes after the first positive; return exactly one endpoint
    StopOnFirst,
    /// Probe every candidate; return all positives in no particular order
    CollectAll,
}

/// Outcome of probing one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub endpoint: String,
    /// An HTTP response came back, whatever it contained
    pub reachable: bool,
    pub is_graphql: bool,
    pub error: Option<ErrorKind>,
}

impl ProbeResult {
    fn positive(endpoint: String) -> Self {
        Self {
            endpoint,
            reachable: true,
            is_graphql: true,
            error: None,
        }
    }

    fn negative(endpoint: String) -> Self {
        Self {
            endpoint,
            reachable: true,
            is_graphql: false,
            error: None,
        }
    }

    fn failed(endpoint: String, error: &AuditError) -> Self {
        Self {
            endpoint,
            reachable: error.is_after_response(),
            is_graphql: false,
            error: Some(error.kind()),
        }
    }
}

/// Whether a response to [`PROBE_QUERY`] is evidence of a GraphQL endpoint.
///
/// Either `data.__typename` names a conventional query root, or the body is a
/// non-empty GraphQL `errors` envelope.
pub fn looks_like_graphql(response: &GraphQLResponse) -> bool {
    let root_typename = response
        .data()
        .and_then(|data| data.get("__typename"))
        .and_then(|typename| typename.as_str())
        .map(|typename| ROOT_TYPENAMES.contains(&typename))
        .unwrap_or(false);

    root_typename || response.has_errors()
}

/// Tests a single URL for "looks like GraphQL"
#[derive(Debug, Clone)]
pub struct EndpointProber {
    client: GraphQLClient,
    headers: Headers,
}

impl EndpointProber {
    pub fn new(client: GraphQLClient, headers: Headers) -> Self {
        Self { client, headers }
    }

    /// Probe `endpoint`. Never fails: every outcome is folded into the result.
    pub async fn probe(&self, endpoint: &str, deadline: &Deadline) -> ProbeResult {
        debug!("Checking endpoint: {}", endpoint);
        match self
            .client
            .send_query(endpoint, PROBE_QUERY, None, &self.headers, deadline)
            .await
        {
            Ok(response) if looks_like_graphql(&response) => {
                info!("Found GraphQL endpoint at: {}", endpoint);
                ProbeResult::positive(endpoint.to_string())
            }
            Ok(_) => ProbeResult::negative(endpoint.to_string()),
            Err(e) if e.is_soft() => {
                debug!("Endpoint {} is not a GraphQL endpoint: {}", endpoint, e);
                ProbeResult::failed(endpoint.to_string(), &e)
            }
            Err(e) => {
                debug!("Error checking {}: {}", endpoint, e);
                ProbeResult::failed(endpoint.to_string(), &e)
            }
        }
    }
}

/// Every probe result from one discovery run
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub base_url: String,
    pub mode_stop_on_first: bool,
    pub results: Vec<ProbeResult>,
    /// Set when the caller's deadline was cancelled or had expired by the end of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<ErrorKind>,
}

impl DiscoveryReport {
    /// Positive endpoints in arrival order (capped at one in stop-on-first mode)
    pub fn endpoints(&self) -> Vec<String> {
        let positives = self
            .results
            .iter()
            .filter(|r| r.is_graphql)
            .map(|r| r.endpoint.clone());
        if self.mode_stop_on_first {
            positives.take(1).collect()
        } else {
            positives.collect()
        }
    }

    pub fn checked_count(&self) -> usize {
        self.results.iter().filter(|r| r.reachable).count()
    }

    /// Turn the report into the discovery verdict
    pub fn into_endpoints(self) -> Result<Vec<String>> {
        let endpoints = self.endpoints();
        if !endpoints.is_empty() {
            return Ok(endpoints);
        }
        if self.checked_count() == 0 {
            match self.interrupted {
                Some(ErrorKind::Canceled) => {
                    return Err(AuditError::canceled(format!(
                        "discovery under {} canceled before any candidate answered",
                        self.base_url
                    )))
                }
                Some(_) => {
                    return Err(AuditError::timed_out(format!(
                        "discovery under {} timed out before any candidate answered",
                        self.base_url
                    )))
                }
                None => {}
            }
            return Err(AuditError::ProbeInfrastructureFailure {
                base_url: self.base_url,
            });
        }
        Err(AuditError::NoEndpointsDetected {
            base_url: self.base_url,
        })
    }
}

/// Fans candidate paths out to the prober concurrently
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    prober: Arc<EndpointProber>,
    paths: Vec<String>,
}

impl DiscoveryEngine {
    pub fn new(prober: EndpointProber) -> Self {
        Self {
            prober: Arc::new(prober),
            paths: CANDIDATE_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Append extra candidate paths to the catalog (duplicates are dropped)
    pub fn with_extra_paths<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: HashSet<String> = self.paths.iter().cloned().collect();
        for path in extra {
            let path = path.as_ref().trim();
            if path.is_empty() {
                continue;
            }
            let normalized = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
            if seen.insert(normalized.clone()) {
                self.paths.push(normalized);
            }
        }
        self
    }

    /// Full probe targets for `base_url` (trailing slashes stripped before joining)
    pub fn candidates(&self, base_url: &str) -> Vec<String> {
        let base = base_url.trim_end_matches('/');
        self.paths.iter().map(|path| format!("{}{}", base, path)).collect()
    }

    /// Discover GraphQL endpoints under `base_url`
    pub async fn discover(
        &self,
        base_url: &str,
        mode: DiscoveryMode,
        deadline: &Deadline,
    ) -> Result<Vec<String>> {
        self.probe_all(base_url, mode, deadline).await.into_endpoints()
    }

    /// Probe every candidate and return the raw results
    pub async fn probe_all(
        &self,
        base_url: &str,
        mode: DiscoveryMode,
        deadline: &Deadline,
    ) -> DiscoveryReport {
        info!("Starting endpoint detection for {}", base_url);
        let candidates = self.candidates(base_url);
        let race = deadline.child();
        let (result_tx, mut result_rx) = mpsc::channel(candidates.len().max(1));
        let mut workers = JoinSet::new();

        for endpoint in candidates {
            let prober = Arc::clone(&self.prober);
            let race = race.clone();
            let result_tx = result_tx.clone();
            workers.spawn(async move {
                let result = prober.probe(&endpoint, &race).await;
                // Capacity equals the candidate count, so this never waits.
                let _ = result_tx.send(result).await;
            });
        }
        drop(result_tx);

        let mut results = Vec::new();
        while let Some(result) = result_rx.recv().await {
            let positive = result.is_graphql;
            results.push(result);
            if positive && mode == DiscoveryMode::StopOnFirst {
                debug!("First endpoint found, cancelling remaining probes");
                race.cancel();
                break;
            }
        }

        // Stragglers observe the cancelled race and finish promptly; nothing is left behind.
        workers.shutdown().await;

        let report = DiscoveryReport {
            base_url: base_url.to_string(),
            mode_stop_on_first: mode == DiscoveryMode::StopOnFirst,
            results,
            interrupted: if deadline.is_cancelled() {
                Some(ErrorKind::Canceled)
            } else if deadline.is_expired() {
                Some(ErrorKind::TimedOut)
            } else {
                None
            },
        };
        if report.checked_count() == 0 {
            warn!("No candidate under {} could be checked", base_url);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::client::DEFAULT_TIMEOUT;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine() -> DiscoveryEngine {
        let client = GraphQLClient::new(DEFAULT_TIMEOUT).unwrap();
        DiscoveryEngine::new(EndpointProber::new(client, Headers::new()))
    }

    async fn mount_graphql(server: &MockServer, route: &str) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "__typename": "Query" } })),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_looks_like_graphql() {
        let typename = GraphQLResponse::from_value(json!({ "data": { "__typename": "query_root" } })).unwrap();
        assert!(looks_like_graphql(&typename));

        let errors = GraphQLResponse::from_value(json!({ "errors": [{ "message": "Syntax Error" }] })).unwrap();
        assert!(looks_like_graphql(&errors));

        let other = GraphQLResponse::from_value(json!({ "data": { "__typename": "Banana" } })).unwrap();
        assert!(!looks_like_graphql(&other));

        let empty_errors = GraphQLResponse::from_value(json!({ "errors": [] })).unwrap();
        assert!(!looks_like_graphql(&empty_errors));

        let rest = GraphQLResponse::from_value(json!({ "status": "ok" })).unwrap();
        assert!(!looks_like_graphql(&rest));
    }

    #[test]
    fn test_candidates_normalize_base_url() {
        let candidates = engine().candidates("http://x/");
        assert_eq!(candidates.len(), CANDIDATE_PATHS.len());
        assert!(candidates.contains(&"http://x/graphql".to_string()));
        assert!(candidates.contains(&"http://x/".to_string()));
        assert!(!candidates.iter().any(|c| c.contains("x//")));
    }

    #[test]
    fn test_extra_paths_are_normalized_and_deduplicated() {
        let engine = engine().with_extra_paths(["internal/graphql", "/graphql", " ", "/internal/graphql"]);
        let candidates = engine.candidates("http://x");
        assert_eq!(candidates.len(), CANDIDATE_PATHS.len() + 1);
        assert!(candidates.contains(&"http://x/internal/graphql".to_string()));
    }

    #[tokio::test]
    async fn test_stop_on_first_single_positive() {
        let server = MockServer::start().await;
        mount_graphql(&server, "/graphql").await;

        let found = engine()
            .discover(&server.uri(), DiscoveryMode::StopOnFirst, &Deadline::after(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(found, vec![format!("{}/graphql", server.uri())]);
    }

    #[tokio::test]
    async fn test_cardinality_of_both_modes() {
        let server = MockServer::start().await;
        let positives = ["/graphql", "/api/graphql", "/v1/graphql"];
        for route in positives {
            mount_graphql(&server, route).await;
        }

        let engine = engine();
        let deadline = Deadline::after(Duration::from_secs(10));

        let first = engine
            .discover(&server.uri(), DiscoveryMode::StopOnFirst, &deadline)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let all = engine
            .discover(&server.uri(), DiscoveryMode::CollectAll, &deadline)
            .await
            .unwrap();
        let found: HashSet<String> = all.into_iter().collect();
        let expected: HashSet<String> = positives
            .iter()
            .map(|route| format!("{}{}", server.uri(), route))
            .collect();
        assert_eq!(found, expected);
        assert!(expected.contains(&first[0]));
    }

    #[tokio::test]
    async fn test_no_endpoints_detected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_raw("<html>Not Found</html>", "text/html"))
            .mount(&server)
            .await;

        let result = engine()
            .discover(&server.uri(), DiscoveryMode::CollectAll, &Deadline::after(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(AuditError::NoEndpointsDetected { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_infrastructure_failure() {
        let result = engine()
            .discover("http://127.0.0.1:1", DiscoveryMode::CollectAll, &Deadline::after(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(AuditError::ProbeInfrastructureFailure { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_parent_stops_every_probe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(json!({ "data": { "__typename": "Query" } })),
            )
            .mount(&server)
            .await;

        let deadline = Deadline::after(Duration::from_secs(30));
        let canceller = deadline.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let report = engine()
            .probe_all(&server.uri(), DiscoveryMode::CollectAll, &deadline)
            .await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(report.results.len(), CANDIDATE_PATHS.len());
        assert!(report
            .results
            .iter()
            .all(|r| r.error == Some(ErrorKind::Canceled)));
        assert_eq!(report.interrupted, Some(ErrorKind::Canceled));
        assert!(matches!(report.into_endpoints(), Err(AuditError::Canceled { .. })));
    }

    #[tokio::test]
    async fn test_elapsed_deadline_is_timed_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(json!({ "data": { "__typename": "Query" } })),
            )
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let result = engine()
            .discover(&server.uri(), DiscoveryMode::CollectAll, &Deadline::after(Duration::from_millis(200)))
            .await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(result, Err(AuditError::TimedOut { .. })), "{:?}", result);
    }

    #[tokio::test]
    async fn test_stop_on_first_cancels_slow_candidates() {
        let server = MockServer::start().await;
        mount_graphql(&server, "/graphql").await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(json!({ "data": { "__typename": "Query" } })),
            )
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let found = engine()
            .discover(&server.uri(), DiscoveryMode::StopOnFirst, &Deadline::after(Duration::from_secs(30)))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(found, vec![format!("{}/graphql", server.uri())]);
    }
}
