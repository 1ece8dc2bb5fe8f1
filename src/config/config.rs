//! Configuration management for graphprobe

use crate::error::{AuditError, Result};
use crate::network::Headers;
use crate::schema::{DEFAULT_MAX_DEPTH, DEFAULT_REPEAT_VISIT_LIMIT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What to probe
    pub target: TargetConfig,
    /// Timeouts
    pub network: NetworkConfig,
    /// Schema file handling and operation synthesis
    pub schema: SchemaConfig,
    /// Where results go
    pub output: OutputConfig,
    /// WebSocket subscriptions
    pub subscription: SubscriptionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Target configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL (or direct endpoint URL when `detect` is off)
    pub base_url: Option<String>,
    /// Run endpoint discovery under `base_url` first
    pub detect: bool,
    /// Extra candidate paths appended to the built-in catalog
    pub paths: Vec<String>,
    /// Headers sent with every request
    pub headers: HashMap<String, String>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Deadline for a whole run
    pub timeout_seconds: u64,
    /// Timeout of a single HTTP call
    pub request_timeout_seconds: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            request_timeout_seconds: 10,
        }
    }
}

/// Schema configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Introspection result file to load
    pub file: Option<String>,
    /// Depth budget for generated selection sets
    pub max_depth: usize,
    /// How often a type may repeat on one selection path
    pub repeat_visit_limit: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_depth: DEFAULT_MAX_DEPTH,
            repeat_visit_limit: DEFAULT_REPEAT_VISIT_LIMIT,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Introspection results file; one file per endpoint is derived from it
    pub file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: "introspection.json".to_string(),
        }
    }
}

/// Subscription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// WebSocket endpoint
    pub ws_url: Option<String>,
    /// Time allowed per dialect handshake
    pub handshake_timeout_seconds: u64,
    /// Advertise each dialect's conventional subprotocol
    pub negotiate_subprotocol: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            handshake_timeout_seconds: 30,
            negotiate_subprotocol: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json, text)
    pub format: String,
    /// Log file path (optional)
    pub file: Option<String>,
    /// Disable ANSI colours on stderr
    pub no_color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
            no_color: false,
        }
    }
}

/// Values given on the command line; they beat every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub detect: bool,
    pub timeout_seconds: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
    pub max_depth: Option<usize>,
    pub schema_file: Option<String>,
    pub output: Option<String>,
    pub ws_url: Option<String>,
    pub headers: HashMap<String, String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_file: Option<String>,
    pub no_color: bool,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Load .env files in order of precedence
    fn load_env_files() {
        for env_file in [".env", ".env.local"] {
            match dotenvy::from_filename(env_file) {
                Ok(_) => {
                    tracing::debug!("Loaded environment variables from {}", env_file);
                }
                Err(e) if e.not_found() => {
                    tracing::debug!("No {} file found, skipping", env_file);
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}", env_file, e);
                }
            }
        }
    }

    /// Load configuration: defaults < file < environment < CLI overrides
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        Self::load_env_files();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_environment_overrides()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML (`.yaml`/`.yml`) or JSON (`.json`) file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuditError::config(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| AuditError::config(format!("Failed to parse YAML config: {}", e))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| AuditError::config(format!("Failed to parse JSON config: {}", e))),
            other => Err(AuditError::config(format!(
                "Unsupported config file format: {}",
                other.unwrap_or("(none)")
            ))),
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_environment_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source; empty values are ignored
    pub fn apply_environment_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(base_url) = var("GRAPHPROBE_BASE_URL") {
            self.target.base_url = Some(base_url);
        }
        if let Some(timeout) = var("GRAPHPROBE_TIMEOUT") {
            self.network.timeout_seconds = parse_env("GRAPHPROBE_TIMEOUT", &timeout)?;
        }
        if let Some(timeout) = var("GRAPHPROBE_REQUEST_TIMEOUT") {
            self.network.request_timeout_seconds = parse_env("GRAPHPROBE_REQUEST_TIMEOUT", &timeout)?;
        }
        if let Some(depth) = var("GRAPHPROBE_MAX_DEPTH") {
            self.schema.max_depth = parse_env("GRAPHPROBE_MAX_DEPTH", &depth)?;
        }
        if let Some(output) = var("GRAPHPROBE_OUTPUT") {
            self.output.file = output;
        }
        if let Some(ws_url) = var("GRAPHPROBE_WS_URL") {
            self.subscription.ws_url = Some(ws_url);
        }
        if let Some(level) = var("GRAPHPROBE_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Apply CLI overrides (highest precedence)
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(base_url) = &overrides.base_url {
            self.target.base_url = Some(base_url.clone());
        }
        if overrides.detect {
            self.target.detect = true;
        }
        if let Some(timeout) = overrides.timeout_seconds {
            self.network.timeout_seconds = timeout;
        }
        if let Some(timeout) = overrides.request_timeout_seconds {
            self.network.request_timeout_seconds = timeout;
        }
        if let Some(depth) = overrides.max_depth {
            self.schema.max_depth = depth;
        }
        if let Some(file) = &overrides.schema_file {
            self.schema.file = Some(file.clone());
        }
        if let Some(output) = &overrides.output {
            self.output.file = output.clone();
        }
        if let Some(ws_url) = &overrides.ws_url {
            self.subscription.ws_url = Some(ws_url.clone());
        }
        self.target
            .headers
            .extend(overrides.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &overrides.log_format {
            self.logging.format = format.clone();
        }
        if let Some(file) = &overrides.log_file {
            self.logging.file = Some(file.clone());
        }
        if overrides.no_color {
            self.logging.no_color = true;
        }
    }

    /// Configured headers plus `Authorization: Bearer $AUTH_TOKEN` when the token is set
    pub fn request_headers(&self) -> Headers {
        self.request_headers_with_token(std::env::var("AUTH_TOKEN").ok())
    }

    pub fn request_headers_with_token(&self, token: Option<String>) -> Headers {
        let mut headers = self.target.headers.clone();
        let has_authorization = headers
            .keys()
            .any(|key| key.eq_ignore_ascii_case("authorization"));
        match token.filter(|t| !t.is_empty()) {
            Some(token) if !has_authorization => {
                headers.insert("Authorization".to_string(), format!("Bearer {}", token));
            }
            _ => {}
        }
        headers
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_seconds)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.subscription.handshake_timeout_seconds)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.target.base_url {
            validate_url(base_url, &["http", "https"], "target.base_url")?;
        }
        if let Some(ws_url) = &self.subscription.ws_url {
            validate_url(ws_url, &["ws", "wss"], "subscription.ws_url")?;
        }
        if self.network.timeout_seconds == 0 || self.network.request_timeout_seconds == 0 {
            return Err(AuditError::validation("Timeouts must be greater than 0"));
        }
        if self.subscription.handshake_timeout_seconds == 0 {
            return Err(AuditError::validation(
                "subscription.handshake_timeout_seconds must be greater than 0",
            ));
        }
        if self.schema.max_depth == 0 {
            return Err(AuditError::validation("schema.max_depth must be at least 1"));
        }
        if self.schema.repeat_visit_limit == 0 {
            return Err(AuditError::validation(
                "schema.repeat_visit_limit must be at least 1",
            ));
        }
        if self.output.file.trim().is_empty() {
            return Err(AuditError::validation("output.file cannot be empty"));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AuditError::validation(format!(
                "Invalid log level '{}', expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(AuditError::validation(format!(
                "Invalid log format '{}', expected text or json",
                self.logging.format
            )));
        }
        Ok(())
    }
}

/// Parse a `Name: value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| AuditError::validation(format!("Invalid header '{}', expected 'Name: value'", raw)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AuditError::validation(format!("Invalid header '{}': empty name", raw)));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AuditError::config(format!("Invalid {} environment variable: {}", key, e)))
}

fn validate_url(raw: &str, schemes: &[&str], field: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| AuditError::validation(format!("Invalid {} '{}': {}", field, raw, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(AuditError::validation(format!(
            "Invalid {} '{}': scheme must be one of {}",
            field,
            raw,
            schemes.join(", ")
        )));
    }
    Ok(())
}
