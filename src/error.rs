//! Error types for the Grok X MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.
//! [`QueryError`] is the closed taxonomy every upstream failure is folded into.

use std::time::Duration;

use thiserror::Error;

/// Main error type for the Grok X MCP Server
#[derive(Error, Debug)]
pub enum GrokMcpError {
    /// Upstream query errors
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a call to the upstream Grok API.
///
/// Exactly one kind is attached to any failure. The kind decides how the
/// failure is logged and whether the circuit breaker hears about it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The API key was rejected. Terminal, never retried.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The upstream is throttling this key.
    #[error("{}", rate_limit_message(.retry_after))]
    RateLimit { retry_after: Option<Duration> },

    /// Raised locally while the circuit is open; upstream was not contacted.
    #[error("{}", circuit_open_message(.retry_in))]
    CircuitOpen { retry_in: Duration },

    /// Malformed responses, network failures, schema violations.
    #[error("{message}")]
    Generic { message: String },
}

/// Tag for [`QueryError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Auth,
    RateLimit,
    CircuitOpen,
    Generic,
}

fn rate_limit_message(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!("Rate limited by Grok API, retry after {}s", delay.as_secs()),
        None => "Rate limited by Grok API".to_string(),
    }
}

fn circuit_open_message(retry_in: &Duration) -> String {
    let secs = retry_in.as_millis().div_ceil(1000);
    format!("Grok API temporarily unavailable (circuit open), retry in {secs}s")
}

impl QueryError {
    pub fn generic(message: impl Into<String>) -> Self {
        QueryError::Generic {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> QueryErrorKind {
        match self {
            QueryError::Auth { .. } => QueryErrorKind::Auth,
            QueryError::RateLimit { .. } => QueryErrorKind::RateLimit,
            QueryError::CircuitOpen { .. } => QueryErrorKind::CircuitOpen,
            QueryError::Generic { .. } => QueryErrorKind::Generic,
        }
    }

    /// Whether this failure says something about upstream health.
    ///
    /// Only transient failures are reported to the circuit breaker.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueryError::Generic { .. })
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found: {path}")]
    DirNotFound { path: String },

    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {var}: {message}")]
    InvalidEnvVar { var: String, message: String },
}

/// Tool input validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid tweet reference: {input}")]
    InvalidTweetRef { input: String },

    #[error("Invalid username: {input}")]
    InvalidUsername { input: String },

    #[error("Invalid date (expected YYYY-MM-DD): {input}")]
    InvalidDate { input: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },

    #[error("{0}")]
    Constraints(#[from] validator::ValidationErrors),
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Transport error: {message}")]
    TransportError { message: String },
}

/// Result type alias for Grok MCP operations
pub type Result<T> = std::result::Result<T, GrokMcpError>;
