//! Error types and handling for graphprobe

use serde::Serialize;
use thiserror::Error;

/// Result type alias for graphprobe operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Main error type for graphprobe
#[derive(Error, Debug)]
pub enum AuditError {
    /// Connection-level failure (refused, DNS, TLS, reset)
    #[error("Network error: {message}")]
    Network { message: String },

    /// The operation's deadline elapsed
    #[error("Request timed out: {message}")]
    TimedOut { message: String },

    /// The operation was canceled by a competing success or a user interrupt
    #[error("Request canceled: {message}")]
    Canceled { message: String },

    /// Response carried a Content-Type that is not JSON
    #[error("Non-JSON response received (Content-Type: {content_type})")]
    NonJsonResponse { content_type: String },

    /// Response body is HTML rather than JSON
    #[error("HTML response received instead of expected JSON")]
    HtmlResponse,

    /// Response body is malformed JSON that is not recognizably HTML
    #[error("Error parsing response: {message}")]
    Parse { message: String },

    /// Root field lookup failed during operation synthesis
    #[error("Field '{field}' not found in {root} type")]
    FieldNotFound { field: String, root: String },

    /// Missing or malformed introspection structure
    #[error("Schema load error: {message}")]
    SchemaLoad { message: String },

    /// Every candidate was checked and none looked like GraphQL
    #[error("No GraphQL endpoints detected at {base_url}")]
    NoEndpointsDetected { base_url: String },

    /// Not a single candidate produced an HTTP response
    #[error("Unable to check any GraphQL endpoints at {base_url}, possible network or server issue")]
    ProbeInfrastructureFailure { base_url: String },

    /// No engine detector matched before the deadline
    #[error("No known GraphQL engine detected")]
    NoEngineDetected,

    /// Every subscription dialect failed its handshake
    #[error("Subscription handshake failed: {message}")]
    HandshakeFailure { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Flat classification of [`AuditError`], cheap to copy into probe results and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    TimedOut,
    Canceled,
    NonJsonResponse,
    HtmlResponse,
    Parse,
    FieldNotFound,
    SchemaLoad,
    NoEndpointsDetected,
    ProbeInfrastructureFailure,
    NoEngineDetected,
    HandshakeFailure,
    Config,
    Validation,
    Io,
    Internal,
}

impl AuditError {
    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timed_out<S: Into<String>>(message: S) -> Self {
        Self::TimedOut {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self::Canceled {
            message: message.into(),
        }
    }

    /// Create a non-JSON response error
    pub fn non_json<S: Into<String>>(content_type: S) -> Self {
        Self::NonJsonResponse {
            content_type: content_type.into(),
        }
    }

    /// Create a response parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a field-not-found error
    pub fn field_not_found<S: Into<String>>(field: S, root: S) -> Self {
        Self::FieldNotFound {
            field: field.into(),
            root: root.into(),
        }
    }

    /// Create a schema load error
    pub fn schema_load<S: Into<String>>(message: S) -> Self {
        Self::SchemaLoad {
            message: message.into(),
        }
    }

    /// Create a handshake failure
    pub fn handshake<S: Into<String>>(message: S) -> Self {
        Self::HandshakeFailure {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::Network { .. } => ErrorKind::Network,
            AuditError::TimedOut { .. } => ErrorKind::TimedOut,
            AuditError::Canceled { .. } => ErrorKind::Canceled,
            AuditError::NonJsonResponse { .. } => ErrorKind::NonJsonResponse,
            AuditError::HtmlResponse => ErrorKind::HtmlResponse,
            AuditError::Parse { .. } | AuditError::Serde(_) => ErrorKind::Parse,
            AuditError::FieldNotFound { .. } => ErrorKind::FieldNotFound,
            AuditError::SchemaLoad { .. } => ErrorKind::SchemaLoad,
            AuditError::NoEndpointsDetected { .. } => ErrorKind::NoEndpointsDetected,
            AuditError::ProbeInfrastructureFailure { .. } => ErrorKind::ProbeInfrastructureFailure,
            AuditError::NoEngineDetected => ErrorKind::NoEngineDetected,
            AuditError::HandshakeFailure { .. } => ErrorKind::HandshakeFailure,
            AuditError::Config { .. } | AuditError::Yaml(_) => ErrorKind::Config,
            AuditError::Validation { .. } => ErrorKind::Validation,
            AuditError::Io(_) => ErrorKind::Io,
            AuditError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The target answered, but not with GraphQL
    pub fn is_not_graphql(&self) -> bool {
        matches!(self, AuditError::HtmlResponse | AuditError::NonJsonResponse { .. })
    }

    /// The operation was abandoned because of its deadline or a cancellation
    pub fn is_interrupted(&self) -> bool {
        matches!(self, AuditError::TimedOut { .. } | AuditError::Canceled { .. })
    }

    /// Soft signals are absorbed by multi-endpoint runs instead of aborting them
    pub fn is_soft(&self) -> bool {
        self.is_not_graphql() || self.is_interrupted()
    }

    /// Whether an HTTP response was received before this error occurred
    pub fn is_after_response(&self) -> bool {
        matches!(
            self,
            AuditError::HtmlResponse | AuditError::NonJsonResponse { .. } | AuditError::Parse { .. }
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Network => "network",
            ErrorKind::TimedOut => "timeout",
            ErrorKind::Canceled => "canceled",
            ErrorKind::NonJsonResponse | ErrorKind::HtmlResponse => "not_graphql",
            ErrorKind::Parse => "parse",
            ErrorKind::FieldNotFound | ErrorKind::SchemaLoad => "schema",
            ErrorKind::NoEndpointsDetected | ErrorKind::ProbeInfrastructureFailure => "discovery",
            ErrorKind::NoEngineDetected => "fingerprint",
            ErrorKind::HandshakeFailure => "subscription",
            ErrorKind::Config | ErrorKind::Validation => "config",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_signals() {
        assert!(AuditError::HtmlResponse.is_soft());
        assert!(AuditError::non_json("text/plain").is_soft());
        assert!(AuditError::canceled("probe").is_soft());
        assert!(AuditError::timed_out("probe").is_soft());
        assert!(!AuditError::parse("eof").is_soft());
        assert!(!AuditError::schema_load("missing __schema").is_soft());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AuditError::HtmlResponse.kind(), ErrorKind::HtmlResponse);
        assert_eq!(
            AuditError::field_not_found("user", "query").kind(),
            ErrorKind::FieldNotFound
        );
        assert_eq!(AuditError::network("refused").category(), "network");
    }

    #[test]
    fn test_display_messages() {
        let err = AuditError::field_not_found("users", "query");
        assert_eq!(err.to_string(), "Field 'users' not found in query type");

        let err = AuditError::non_json("text/plain");
        assert!(err.to_string().contains("text/plain"));
    }
}
