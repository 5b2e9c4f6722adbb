//! Grok API module
//!
//! Contains the resilience layer (circuit breaker, caches, typed errors), the
//! upstream transport and the query client used by every tool.

pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod clock;
pub mod prompts;
pub mod schema;
pub mod transport;
pub mod types;
pub mod utils;
