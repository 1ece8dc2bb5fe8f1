//! GraphQL-over-HTTP transport
//!
//! Issues one request/response cycle and classifies the outcome. No retries happen here;
//! callers layer their own policy on top.

use crate::error::{AuditError, Result};
use crate::network::deadline::Deadline;
use crate::network::types::{GraphQLRequest, GraphQLResponse, Headers};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Per-call timeout applied by the HTTP client itself
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport for GraphQL requests
#[derive(Debug, Clone)]
pub struct GraphQLClient {
    http_client: Client,
}

impl GraphQLClient {
    /// Create a client whose individual HTTP calls give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("graphprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuditError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Send `request` to `url` and return the parsed top-level JSON object.
    ///
    /// Failures are classified in this order: cancellation or deadline expiry, transport
    /// failure, non-JSON `Content-Type`, HTML body, any other malformed body.
    pub async fn send(
        &self,
        url: &str,
        request: &GraphQLRequest,
        headers: &Headers,
        deadline: &Deadline,
    ) -> Result<GraphQLResponse> {
        let header_map = build_headers(headers)?;
        let body = serde_json::to_vec(request)?;

        debug!("Sending GraphQL request to {}", url);
        let exchange = async {
            let response = self
                .http_client
                .post(url)
                .headers(header_map)
                .body(body)
                .send()
                .await
                .map_err(|e| classify_transport_error(url, e))?;

            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = response
                .bytes()
                .await
                .map_err(|e| classify_transport_error(url, e))?;

            debug!("Received response from {}, status: {}", url, status.as_u16());
            Ok((content_type, bytes))
        };

        let (content_type, bytes) = deadline.run(&format!("request to {}", url), exchange).await?;
        classify_body(content_type.as_deref(), &bytes)
    }

    /// Convenience wrapper for a bare query string
    pub async fn send_query(
        &self,
        url: &str,
        query: &str,
        variables: Option<Map<String, Value>>,
        headers: &Headers,
        deadline: &Deadline,
    ) -> Result<GraphQLResponse> {
        let request = GraphQLRequest::new(query).with_variables(variables);
        self.send(url, &request, headers, deadline).await
    }
}

/// `Content-Type: application/json` overlaid with the caller's headers
fn build_headers(headers: &Headers) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();
    header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| AuditError::validation(format!("Invalid header name {}: {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AuditError::validation(format!("Invalid header value for {}: {}", key, e)))?;
        header_map.insert(name, value);
    }

    Ok(header_map)
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> AuditError {
    if error.is_timeout() {
        debug!("Request to {} timed out", url);
        AuditError::timed_out(format!("request to {} timed out, consider increasing timeout", url))
    } else {
        debug!("Error sending request to {}: {}", url, error);
        AuditError::network(format!("error sending request to {}: {}", url, error))
    }
}

/// Classify a received body. HTML wins over the generic non-JSON verdict so that callers
/// see the more specific "this is a web page" signal.
pub(crate) fn classify_body(content_type: Option<&str>, body: &[u8]) -> Result<GraphQLResponse> {
    let starts_like_html = body
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'<')
        .unwrap_or(false);

    if let Some(content_type) = content_type {
        if !content_type.to_ascii_lowercase().contains("json") {
            if starts_like_html || content_type.to_ascii_lowercase().contains("html") {
                debug!("HTML response detected (Content-Type: {})", content_type);
                return Err(AuditError::HtmlResponse);
            }
            debug!("Non-JSON response detected (Content-Type: {})", content_type);
            return Err(AuditError::non_json(content_type));
        }
    }

    match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(map) => Ok(GraphQLResponse::from_map(map)),
        Err(_) if starts_like_html => {
            debug!("HTML response detected instead of JSON");
            Err(AuditError::HtmlResponse)
        }
        Err(e) => Err(AuditError::parse(e.to_string())),
    }
}
