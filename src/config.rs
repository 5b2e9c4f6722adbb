//! Configuration management for the Grok X MCP Server
//!
//! Handles the API key, model selection, resilience settings and the cache path.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::grok::circuit_breaker::CircuitBreakerConfig;
use crate::grok::transport::{RetryPolicy, TransportConfig};

/// Configuration for the Grok X MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// xAI API key
    pub api_key: String,

    /// API base URL
    pub base_url: String,

    /// Model used for structured queries
    pub model: String,

    /// Model used for media descriptions
    pub vision_model: String,

    /// Upper bound on generated tokens per query
    pub max_tokens: u32,

    /// Transport-level retries per request
    pub max_retries: u32,

    /// Circuit breaker settings
    pub circuit_breaker: CircuitBreakerConfig,

    /// Persistent cache file
    pub cache_path: PathBuf,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("XAI_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                var: "XAI_API_KEY".to_string(),
            })?;
        validate_api_key(&api_key)?;

        let cache_path = match lookup("GROK_CACHE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_cache_path()?,
        };

        let failure_threshold: u32 =
            parse_var(&lookup, "GROK_FAILURE_THRESHOLD", grok::DEFAULT_FAILURE_THRESHOLD)?;
        if failure_threshold == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: "GROK_FAILURE_THRESHOLD".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        let retry_timeout_secs: u64 =
            parse_var(&lookup, "GROK_RETRY_TIMEOUT_SECS", grok::DEFAULT_RETRY_TIMEOUT_SECS)?;
        if retry_timeout_secs == 0 || retry_timeout_secs > grok::MAX_RETRY_TIMEOUT_SECS {
            return Err(ConfigError::InvalidEnvVar {
                var: "GROK_RETRY_TIMEOUT_SECS".to_string(),
                message: format!("must be between 1 and {}", grok::MAX_RETRY_TIMEOUT_SECS),
            }
            .into());
        }

        Ok(Self {
            api_key,
            base_url: lookup("XAI_API_BASE_URL").unwrap_or_else(|| grok::API_BASE_URL.to_string()),
            model: lookup("GROK_MODEL").unwrap_or_else(|| grok::DEFAULT_MODEL.to_string()),
            vision_model: lookup("GROK_VISION_MODEL")
                .unwrap_or_else(|| grok::DEFAULT_VISION_MODEL.to_string()),
            max_tokens: parse_var(&lookup, "GROK_MAX_TOKENS", grok::DEFAULT_MAX_TOKENS)?,
            max_retries: parse_var(&lookup, "GROK_MAX_RETRIES", grok::DEFAULT_MAX_RETRIES)?,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                retry_timeout: Duration::from_secs(retry_timeout_secs),
            },
            cache_path,
        })
    }

    /// Settings for the HTTP transport
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            vision_model: self.vision_model.clone(),
            max_tokens: self.max_tokens,
            query_timeout: grok::QUERY_TIMEOUT,
            vision_timeout: grok::VISION_TIMEOUT,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
        }
    }

    /// API key with everything but the prefix and last four characters hidden
    pub fn redacted_api_key(&self) -> String {
        let tail: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("xai-…{}", tail)
    }
}

/// Check the key looks like an xAI key before any request is made.
fn validate_api_key(key: &str) -> Result<()> {
    let valid = key
        .strip_prefix("xai-")
        .map_or(false, |rest| {
            rest.len() >= 20 && rest.chars().all(|c| c.is_ascii_alphanumeric())
        });

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvVar {
            var: "XAI_API_KEY".to_string(),
            message: "expected 'xai-' followed by at least 20 alphanumeric characters".to_string(),
        }
        .into())
    }
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            ConfigError::InvalidEnvVar {
                var: var.to_string(),
                message: e.to_string(),
            }
            .into()
        }),
        None => Ok(default),
    }
}

fn default_cache_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| ConfigError::DirNotFound {
        path: "~".to_string(),
    })?;
    Ok(home.join(grok::CONFIG_DIR_NAME).join("cache.json"))
}

/// Grok API constants
pub mod grok {
    use std::time::Duration;

    /// Base URL for the xAI API
    pub const API_BASE_URL: &str = "https://api.x.ai/v1";

    pub const DEFAULT_MODEL: &str = "grok-4-fast";
    pub const DEFAULT_VISION_MODEL: &str = "grok-2-vision-1212";
    pub const DEFAULT_MAX_TOKENS: u32 = 16384;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_RETRY_TIMEOUT_SECS: u64 = 30;
    pub const MAX_RETRY_TIMEOUT_SECS: u64 = 24 * 60 * 60;

    pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);
    pub const VISION_TIMEOUT: Duration = Duration::from_secs(30);

    pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
    pub const TRENDS_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

    /// Directory under $HOME holding the cache file
    pub const CONFIG_DIR_NAME: &str = ".grok-x-mcp";

    /// Hosts whose images may be sent to the vision model
    pub const MEDIA_HOSTS: &[&str] = &[
        "pbs.twimg.com",
        "video.twimg.com",
        "abs.twimg.com",
        "ton.twimg.com",
    ];
}
