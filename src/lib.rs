//! Grok X MCP Server Library
//!
//! A Model Context Protocol (MCP) server exposing X (Twitter) lookups answered
//! by the Grok API's live search, with structured-output validation, a
//! circuit breaker and TTL caching around the upstream.

pub mod config;
pub mod error;
pub mod grok;
pub mod mcp;

pub use config::Config;
pub use error::{GrokMcpError, QueryError, Result};
