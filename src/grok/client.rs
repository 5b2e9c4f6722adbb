//! Grok query client
//!
//! Every tool goes through [`GrokClient::query`]: circuit check, upstream
//! call, classification, JSON parsing and schema validation.

use std::sync::Arc;

use reqwest::Url;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::config::grok::MEDIA_HOSTS;
use crate::error::{QueryError, QueryErrorKind};
use crate::grok::circuit_breaker::CircuitBreaker;
use crate::grok::schema::ResponseSchema;
use crate::grok::transport::{CompletionRequest, Upstream, VisionRequest};
use crate::grok::types::SearchFilters;

/// Characters of raw output kept in parse-failure messages
const EXCERPT_CHARS: usize = 200;

const MEDIA_PROMPT: &str = "Describe this image from a post on X in two or three sentences. \
Mention any visible text verbatim. Do not speculate about who posted it.";

/// A structured query
#[derive(Debug, Clone)]
pub struct Query {
    pub prompt: String,
    pub schema_name: Option<String>,
    pub filters: Option<SearchFilters>,
}

impl Query {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema_name: None,
            filters: None,
        }
    }

    pub fn named(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = if filters.is_empty() { None } else { Some(filters) };
        self
    }
}

/// Client for the Grok API, shared by all tools
pub struct GrokClient {
    upstream: Arc<dyn Upstream>,
    breaker: Arc<CircuitBreaker>,
}

impl GrokClient {
    pub fn new(upstream: Arc<dyn Upstream>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { upstream, breaker }
    }

    /// Run a structured query and return a validated `T`.
    pub async fn query<T>(&self, query: Query) -> Result<T, QueryError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = ResponseSchema::for_type::<T>(query.schema_name.as_deref())?;
        let schema_name = schema.name.clone();

        let admission = match self.breaker.check() {
            Ok(admission) => admission,
            Err(e) => {
                log_failure(&schema_name, &e);
                return Err(e);
            }
        };

        let outcome = self
            .upstream
            .complete(CompletionRequest {
                prompt: query.prompt,
                schema: schema.clone(),
                filters: query.filters,
            })
            .await;

        let text = match outcome {
            Ok(text) => {
                self.breaker.on_success(admission);
                text
            }
            Err(failure) => {
                let error = QueryError::from(failure);
                if error.is_transient() {
                    self.breaker.on_failure(admission);
                } else {
                    self.breaker.release_probe(admission);
                }
                log_failure(&schema_name, &error);
                return Err(error);
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(QueryError::generic(format!(
                "Empty response from Grok API for `{}`",
                schema_name
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
            QueryError::generic(format!(
                "Failed to parse Grok API response for `{}` as JSON ({}); output may be truncated. Response ends with: {}",
                schema_name,
                e,
                tail(trimmed, EXCERPT_CHARS)
            ))
        })?;

        schema.validate(value).map_err(|e| {
            tracing::warn!(schema = %schema_name, "{}", e);
            e
        })
    }

    /// Describe an image attached to a post.
    ///
    /// Best effort: returns `Ok(None)` for URLs outside the media allow-list
    /// and for any failure except an authentication error.
    pub async fn describe_media(&self, url: &str) -> Result<Option<String>, QueryError> {
        if !is_allowed_media_url(url) {
            tracing::debug!("Skipping media description for disallowed URL {}", url);
            return Ok(None);
        }

        let outcome = self
            .upstream
            .describe_image(VisionRequest {
                prompt: MEDIA_PROMPT.to_string(),
                image_url: url.to_string(),
            })
            .await;

        match outcome.map_err(QueryError::from) {
            Ok(text) => {
                let text = text.trim();
                Ok(if text.is_empty() { None } else { Some(text.to_string()) })
            }
            Err(e @ QueryError::Auth { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("Media description failed for {}: {}", url, e);
                Ok(None)
            }
        }
    }
}

/// Only https URLs on known X media hosts are sent to the vision model.
pub fn is_allowed_media_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            parsed.scheme() == "https"
                && parsed
                    .host_str()
                    .map_or(false, |host| MEDIA_HOSTS.contains(&host))
        }
        Err(_) => false,
    }
}

fn log_failure(schema: &str, error: &QueryError) {
    match error.kind() {
        QueryErrorKind::Auth => tracing::error!(schema, "Grok API rejected credentials: {}", error),
        QueryErrorKind::RateLimit => tracing::warn!(schema, "{}", error),
        QueryErrorKind::CircuitOpen => tracing::warn!(schema, "Query rejected locally: {}", error),
        QueryErrorKind::Generic => tracing::warn!(schema, "Grok API query failed: {}", error),
    }
}

/// Last `max` characters of `text`, on a char boundary.
fn tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max)
        .map_or(0, |(idx, _)| idx);
    &text[start..]
}
