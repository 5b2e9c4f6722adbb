//! Upstream transport for the xAI chat completions API
//!
//! [`Upstream`] is the boundary the query client talks to. [`XaiTransport`]
//! implements it over reqwest with per-call timeouts and retry with
//! exponential backoff for transport-level failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::QueryError;
use crate::grok::schema::ResponseSchema;
use crate::grok::types::SearchFilters;

/// Structured query sent to the upstream
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub schema: ResponseSchema,
    pub filters: Option<SearchFilters>,
}

/// Image description request
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    pub image_url: String,
}

/// Raw outcome of a failed upstream call, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// Non-success HTTP status
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    /// The call exceeded its deadline
    Timeout,

    /// Connection or protocol failure
    Network(String),

    /// 2xx response whose envelope could not be read
    Malformed(String),
}

/// Classify a raw failure into the query error taxonomy.
impl From<UpstreamFailure> for QueryError {
    fn from(failure: UpstreamFailure) -> Self {
        match failure {
            UpstreamFailure::Status {
                status: 401 | 403,
                body,
                ..
            } => QueryError::Auth {
                message: upstream_message(&body)
                    .unwrap_or_else(|| "API key rejected by Grok API".to_string()),
            },
            UpstreamFailure::Status {
                status: 429,
                retry_after,
                ..
            } => QueryError::RateLimit { retry_after },
            UpstreamFailure::Status { status, body, .. } => QueryError::generic(format!(
                "Grok API request failed ({}): {}",
                status,
                upstream_message(&body).unwrap_or(body)
            )),
            UpstreamFailure::Timeout => QueryError::generic("Grok API request timed out"),
            UpstreamFailure::Network(message) => {
                QueryError::generic(format!("Grok API request failed: {}", message))
            }
            UpstreamFailure::Malformed(message) => {
                QueryError::generic(format!("Malformed Grok API response: {}", message))
            }
        }
    }
}

/// Pull `error.message` (or a string `error`) out of an upstream error body.
fn upstream_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// The single upstream dependency
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Run a structured query and return the raw text payload.
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamFailure>;

    /// Describe an image and return free text.
    async fn describe_image(&self, request: VisionRequest) -> Result<String, UpstreamFailure>;
}

/// Exponential backoff between retries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(8),
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let seconds = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        Duration::from_secs_f64(seconds.min(self.max.as_secs_f64()))
    }
}

/// Transport-level retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, failure: &UpstreamFailure) -> bool {
        match failure {
            UpstreamFailure::Status { status, .. } => self.retry_on_status.contains(status),
            UpstreamFailure::Timeout | UpstreamFailure::Network(_) => true,
            UpstreamFailure::Malformed(_) => false,
        }
    }

    /// Delay before retry `attempt`, honouring a server-provided `Retry-After`.
    pub fn delay_for(&self, attempt: u32, failure: &UpstreamFailure) -> Duration {
        match failure {
            UpstreamFailure::Status {
                retry_after: Some(after),
                ..
            } => (*after).min(self.backoff.max),
            _ => self.backoff.delay(attempt),
        }
    }
}

/// Settings for [`XaiTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub vision_model: String,
    pub max_tokens: u32,
    pub query_timeout: Duration,
    pub vision_timeout: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// reqwest-backed xAI transport
pub struct XaiTransport {
    http_client: reqwest::Client,
    config: TransportConfig,
}

impl XaiTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Request body for a structured query with live X search enabled.
    pub fn completion_body(&self, request: &CompletionRequest) -> Value {
        let mut source = json!({ "type": "x" });
        let mut search = json!({
            "mode": "on",
            "return_citations": true,
        });

        if let Some(filters) = &request.filters {
            if !filters.included_handles.is_empty() {
                source["included_x_handles"] = json!(filters.included_handles);
            }
            if !filters.excluded_handles.is_empty() {
                source["excluded_x_handles"] = json!(filters.excluded_handles);
            }
            if let Some(from) = &filters.from_date {
                search["from_date"] = json!(from);
            }
            if let Some(to) = &filters.to_date {
                search["to_date"] = json!(to);
            }
            if let Some(max) = filters.max_search_results {
                search["max_search_results"] = json!(max);
            }
        }
        search["sources"] = json!([source]);

        json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": self.config.max_tokens,
            "search_parameters": search,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema.name,
                    "schema": request.schema.schema,
                },
            },
        })
    }

    /// Request body for an image description.
    pub fn vision_body(&self, request: &VisionRequest) -> Value {
        json!({
            "model": self.config.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": request.image_url, "detail": "high" } },
                    { "type": "text", "text": request.prompt },
                ],
            }],
        })
    }

    /// POST with retries; returns the first choice's message content.
    async fn send(&self, body: &Value, timeout: Duration) -> Result<String, UpstreamFailure> {
        let mut attempt = 0;
        loop {
            let failure = match self.send_once(body, timeout).await {
                Ok(content) => return Ok(content),
                Err(failure) => failure,
            };

            if attempt >= self.config.retry.max_retries || !self.config.retry.should_retry(&failure) {
                return Err(failure);
            }

            let delay = self.config.retry.delay_for(attempt, &failure);
            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying Grok API request after {:?}",
                failure
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once(&self, body: &Value, timeout: Duration) -> Result<String, UpstreamFailure> {
        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(request_failure)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamFailure::Status {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let text = response.text().await.map_err(request_failure)?;
        extract_content(status, &text)
    }
}

fn request_failure(err: reqwest::Error) -> UpstreamFailure {
    if err.is_timeout() {
        UpstreamFailure::Timeout
    } else {
        UpstreamFailure::Network(err.to_string())
    }
}

fn extract_content(status: StatusCode, text: &str) -> Result<String, UpstreamFailure> {
    let parsed: ChatCompletionResponse = serde_json::from_str(text)
        .map_err(|e| UpstreamFailure::Malformed(format!("{} ({})", e, status)))?;

    let Some(choice) = parsed.choices.into_iter().next() else {
        return Ok(String::new());
    };
    if choice.finish_reason.as_deref() == Some("length") {
        tracing::warn!("Grok API output hit the max_tokens limit and may be truncated");
    }
    Ok(choice.message.content.unwrap_or_default())
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

#[async_trait]
impl Upstream for XaiTransport {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamFailure> {
        let body = self.completion_body(&request);
        self.send(&body, self.config.query_timeout).await
    }

    async fn describe_image(&self, request: VisionRequest) -> Result<String, UpstreamFailure> {
        let body = self.vision_body(&request);
        self.send(&body, self.config.vision_timeout).await
    }
}
