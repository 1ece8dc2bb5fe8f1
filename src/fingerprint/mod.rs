//! GraphQL engine fingerprinting
//!
//! Each known engine gets an [`EngineDetector`] that sends one deliberately odd query
//! and recognises the engine's characteristic answer. Detectors race; the first match
//! cancels the others.

use crate::error::{AuditError, Result};
use crate::network::{Deadline, GraphQLClient, GraphQLResponse, Headers};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Apollo's diagnostic for `@skip` without its mandatory `if` argument
pub const APOLLO_SKIP_SIGNATURE: &str =
    r#"Directive "@skip" argument "if" of type "Boolean!" is required"#;

/// A probe for one GraphQL engine
#[async_trait]
pub trait EngineDetector: Send + Sync {
    /// Engine name reported on a match
    fn engine(&self) -> &'static str;

    /// Query whose answer betrays the engine
    fn probe_query(&self) -> &'static str;

    /// Whether `response` carries the engine's signature
    fn matches(&self, response: &GraphQLResponse) -> bool;

    async fn detect(
        &self,
        client: &GraphQLClient,
        endpoint: &str,
        headers: &Headers,
        deadline: &Deadline,
    ) -> Result<bool> {
        debug!("Testing for {} GraphQL engine at {}", self.engine(), endpoint);
        let response = client
            .send_query(endpoint, self.probe_query(), None, headers, deadline)
            .await?;
        Ok(self.matches(&response))
    }
}

/// Apollo Server rejects `@skip` without `if` with a recognisable message
#[derive(Debug, Default, Clone, Copy)]
pub struct ApolloDetector;

#[async_trait]
impl EngineDetector for ApolloDetector {
    fn engine(&self) -> &'static str {
        "Apollo"
    }

    fn probe_query(&self) -> &'static str {
        "query @skip { __typename }"
    }

    fn matches(&self, response: &GraphQLResponse) -> bool {
        response
            .error_messages()
            .any(|message| message.contains(APOLLO_SKIP_SIGNATURE))
    }
}

/// Hasura accepts its own `@cached` directive on operations and names its root `query_root`
#[derive(Debug, Default, Clone, Copy)]
pub struct HasuraDetector;

#[async_trait]
impl EngineDetector for HasuraDetector {
    fn engine(&self) -> &'static str {
        "Hasura"
    }

    fn probe_query(&self) -> &'static str {
        "query @cached { __typename }"
    }

    fn matches(&self, response: &GraphQLResponse) -> bool {
        response
            .data()
            .and_then(|data| data.get("__typename"))
            .and_then(|typename| typename.as_str())
            == Some("query_root")
    }
}

/// Runs every registered detector concurrently and reports the first match
#[derive(Clone)]
pub struct EngineFingerprinter {
    client: GraphQLClient,
    detectors: Vec<Arc<dyn EngineDetector>>,
}

impl EngineFingerprinter {
    /// Fingerprinter with the built-in detectors
    pub fn new(client: GraphQLClient) -> Self {
        Self {
            client,
            detectors: vec![Arc::new(ApolloDetector), Arc::new(HasuraDetector)],
        }
    }

    /// Fingerprinter with no detectors; add them with [`EngineFingerprinter::with_detector`]
    pub fn empty(client: GraphQLClient) -> Self {
        Self {
            client,
            detectors: Vec::new(),
        }
    }

    pub fn with_detector<D: EngineDetector + 'static>(mut self, detector: D) -> Self {
        self.detectors.push(Arc::new(detector));
        self
    }

    pub fn engines(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.engine()).collect()
    }

    /// Name the engine behind `endpoint`, or fail with [`AuditError::NoEngineDetected`]
    pub async fn fingerprint(
        &self,
        endpoint: &str,
        headers: &Headers,
        deadline: &Deadline,
    ) -> Result<String> {
        info!("Starting GraphQL engine fingerprinting for {}", endpoint);
        let race = deadline.child();
        let (match_tx, mut match_rx) = mpsc::channel(self.detectors.len().max(1));
        let mut workers = JoinSet::new();

        for detector in &self.detectors {
            let detector = Arc::clone(detector);
            let client = self.client.clone();
            let endpoint = endpoint.to_string();
            let headers = headers.clone();
            let race = race.clone();
            let match_tx = match_tx.clone();
            workers.spawn(async move {
                let found = match detector.detect(&client, &endpoint, &headers, &race).await {
                    Ok(found) => found,
                    Err(e) => {
                        debug!("{} detection error: {}", detector.engine(), e);
                        false
                    }
                };
                let _ = match_tx.send(found.then(|| detector.engine())).await;
            });
        }
        drop(match_tx);

        let mut detected = None;
        while let Some(result) = match_rx.recv().await {
            if let Some(engine) = result {
                info!("Detected {} GraphQL engine", engine);
                detected = Some(engine);
                race.cancel();
                break;
            }
        }
        workers.shutdown().await;

        detected
            .map(str::to_string)
            .ok_or(AuditError::NoEngineDetected)
    }
}
