//! Integration tests for Grok X MCP Server
//!
//! These tests drive the query pipeline, tools and protocol handling against a
//! scripted upstream - they don't make real API calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use grok_x_mcp::error::QueryError;
use grok_x_mcp::grok::cache::{PersistentCache, TtlCache};
use grok_x_mcp::grok::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use grok_x_mcp::grok::client::{GrokClient, Query};
use grok_x_mcp::grok::clock::ManualClock;
use grok_x_mcp::grok::transport::{CompletionRequest, UpstreamFailure, Upstream, VisionRequest};
use grok_x_mcp::grok::types::{SearchFilters, TweetList, UserProfile};
use grok_x_mcp::mcp::server::McpServer;
use grok_x_mcp::mcp::tools::ToolHandler;

type Scripted = Result<String, UpstreamFailure>;

/// Upstream that replays canned outcomes and records what it was asked
#[derive(Default)]
struct MockUpstream {
    completions: Mutex<VecDeque<Scripted>>,
    images: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    image_calls: Mutex<Vec<String>>,
}

impl MockUpstream {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, outcome: Scripted) {
        self.completions.lock().unwrap().push_back(outcome);
    }

    fn push_json(&self, value: Value) {
        self.push(Ok(value.to_string()));
    }

    fn push_image(&self, outcome: Scripted) {
        self.images.lock().unwrap().push_back(outcome);
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamFailure> {
        self.requests.lock().unwrap().push(request);
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamFailure::Network("no scripted response".into())))
    }

    async fn describe_image(&self, request: VisionRequest) -> Result<String, UpstreamFailure> {
        self.image_calls.lock().unwrap().push(request.image_url);
        self.images
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

fn status(code: u16) -> UpstreamFailure {
    UpstreamFailure::Status {
        status: code,
        body: String::new(),
        retry_after: None,
    }
}

fn client_with(
    upstream: Arc<MockUpstream>,
    threshold: u32,
    timeout: Duration,
) -> (GrokClient, Arc<CircuitBreaker>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let breaker = Arc::new(CircuitBreaker::with_clock(
        CircuitBreakerConfig {
            failure_threshold: threshold,
            retry_timeout: timeout,
        },
        clock.clone(),
    ));
    (GrokClient::new(upstream, breaker.clone()), breaker, clock)
}

fn tweet_json(id: &str) -> Value {
    json!({
        "id": id,
        "author_username": "rustlang",
        "author_name": "Rust Language",
        "text": "Rust 1.80 is out!",
        "created_at": "2024-07-25T15:00:00Z",
        "url": null,
        "metrics": { "likes": 1200, "reposts": 300, "replies": 40, "quotes": null, "views": null },
        "media": [],
        "in_reply_to_id": null,
        "quoted_tweet_id": null
    })
}

mod query_pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_response_is_typed() {
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "tweets": [tweet_json("1"), tweet_json("2")] }));
        let (client, breaker, _) = client_with(upstream.clone(), 5, Duration::from_secs(30));

        let list: TweetList = client.query(Query::new("find posts")).await.unwrap();
        assert_eq!(list.tweets.len(), 2);
        assert_eq!(list.tweets[0].metrics.as_ref().unwrap().likes, Some(1200));
        assert_eq!(breaker.state(), CircuitState::Closed);

        let request = upstream.last_request();
        assert_eq!(request.prompt, "find posts");
        assert_eq!(request.schema.name, "TweetList");
        assert!(request.filters.is_none());
    }

    #[tokio::test]
    async fn test_schema_name_and_filters_forwarded() {
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "tweets": [] }));
        let (client, _, _) = client_with(upstream.clone(), 5, Duration::from_secs(30));

        let filters = SearchFilters {
            excluded_handles: vec!["spam".to_string()],
            ..Default::default()
        };
        let _: TweetList = client
            .query(Query::new("p").named("tweet_search").with_filters(filters.clone()))
            .await
            .unwrap();

        let request = upstream.last_request();
        assert_eq!(request.schema.name, "tweet_search");
        assert_eq!(request.filters, Some(filters));
        assert!(!request.schema.schema.to_string().contains("$ref"));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_schema_error() {
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "tweets": "none found" }));
        let (client, breaker, _) = client_with(upstream, 5, Duration::from_secs(30));

        let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
        assert!(matches!(err, QueryError::Generic { .. }));
        assert!(err.to_string().contains("schema validation"));
        // The upstream answered; this is not an availability problem
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_object_is_not_coerced() {
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "display_name": "No handle" }));
        let (client, _, _) = client_with(upstream, 5, Duration::from_secs(30));

        let err = client.query::<UserProfile>(Query::new("p")).await.unwrap_err();
        assert!(err.to_string().contains("username"));
    }

    #[tokio::test]
    async fn test_empty_response() {
        let upstream = MockUpstream::new();
        upstream.push(Ok("   ".to_string()));
        let (client, _, _) = client_with(upstream, 5, Duration::from_secs(30));

        let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
        assert!(err.to_string().contains("Empty response"));
    }

    #[tokio::test]
    async fn test_truncated_json_includes_excerpt() {
        let upstream = MockUpstream::new();
        upstream.push(Ok(r#"{"tweets":[{"id":"1","text":"cut off mid-sent"#.to_string()));
        let (client, _, _) = client_with(upstream, 5, Duration::from_secs(30));

        let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("truncated"));
        assert!(message.contains("cut off mid-sent"));
    }

    #[tokio::test]
    async fn test_transient_failures_open_circuit() {
        let upstream = MockUpstream::new();
        for _ in 0..3 {
            upstream.push(Err(status(503)));
        }
        let (client, breaker, _) = client_with(upstream.clone(), 3, Duration::from_secs(30));

        for _ in 0..3 {
            let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
            assert!(matches!(err, QueryError::Generic { .. }));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(upstream.calls(), 3);

        let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
        match err {
            QueryError::CircuitOpen { retry_in } => assert_eq!(retry_in, Duration::from_secs(30)),
            other => panic!("expected circuit open, got {:?}", other),
        }
        // Rejected locally
        assert_eq!(upstream.calls(), 3);
    }

    #[tokio::test]
    async fn test_timeouts_count_as_transient() {
        let upstream = MockUpstream::new();
        upstream.push(Err(UpstreamFailure::Timeout));
        upstream.push(Err(UpstreamFailure::Network("connection reset".into())));
        let (client, breaker, _) = client_with(upstream, 2, Duration::from_secs(30));

        let _ = client.query::<TweetList>(Query::new("p")).await;
        let _ = client.query::<TweetList>(Query::new("p")).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_rate_limits_never_open_circuit() {
        let upstream = MockUpstream::new();
        for _ in 0..10 {
            upstream.push(Err(UpstreamFailure::Status {
                status: 429,
                body: String::new(),
                retry_after: Some(Duration::from_secs(5)),
            }));
        }
        let (client, breaker, _) = client_with(upstream, 3, Duration::from_secs(30));

        for _ in 0..10 {
            let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
            assert_eq!(
                err,
                QueryError::RateLimit {
                    retry_after: Some(Duration::from_secs(5))
                }
            );
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_failures_never_open_circuit() {
        let upstream = MockUpstream::new();
        for _ in 0..10 {
            upstream.push(Err(status(401)));
        }
        let (client, breaker, _) = client_with(upstream, 3, Duration::from_secs(30));

        for _ in 0..10 {
            let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
            assert!(matches!(err, QueryError::Auth { .. }));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_recovers_circuit() {
        let upstream = MockUpstream::new();
        upstream.push(Err(status(500)));
        upstream.push_json(json!({ "tweets": [] }));
        let (client, breaker, clock) = client_with(upstream.clone(), 1, Duration::from_secs(1));

        assert!(client.query::<TweetList>(Query::new("p")).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(999));
        assert!(matches!(
            client.query::<TweetList>(Query::new("p")).await,
            Err(QueryError::CircuitOpen { .. })
        ));

        clock.advance(Duration::from_millis(2));
        let list: TweetList = client.query(Query::new("p")).await.unwrap();
        assert!(list.tweets.is_empty());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_probe_reopens_circuit() {
        let upstream = MockUpstream::new();
        upstream.push(Err(status(500)));
        upstream.push(Err(status(502)));
        let (client, breaker, clock) = client_with(upstream, 1, Duration::from_secs(1));

        let _ = client.query::<TweetList>(Query::new("p")).await;
        clock.advance(Duration::from_secs(1));
        let _ = client.query::<TweetList>(Query::new("p")).await;

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            client.query::<TweetList>(Query::new("p")).await,
            Err(QueryError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_probe_releases_slot() {
        let upstream = MockUpstream::new();
        upstream.push(Err(status(500)));
        upstream.push(Err(status(429)));
        upstream.push_json(json!({ "tweets": [] }));
        let (client, breaker, clock) = client_with(upstream, 1, Duration::from_secs(1));

        let _ = client.query::<TweetList>(Query::new("p")).await;
        clock.advance(Duration::from_secs(1));

        let err = client.query::<TweetList>(Query::new("p")).await.unwrap_err();
        assert!(matches!(err, QueryError::RateLimit { .. }));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // The next caller may probe immediately
        assert!(client.query::<TweetList>(Query::new("p")).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

mod media_tests {
    use super::*;

    #[tokio::test]
    async fn test_disallowed_host_skips_upstream() {
        let upstream = MockUpstream::new();
        let (client, _, _) = client_with(upstream.clone(), 5, Duration::from_secs(30));

        let result = client.describe_media("https://example.com/cat.jpg").await;
        assert_eq!(result, Ok(None));
        let result = client.describe_media("::not a url::").await;
        assert_eq!(result, Ok(None));
        assert!(upstream.image_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_description_returned() {
        let upstream = MockUpstream::new();
        upstream.push_image(Ok(" A crab holding a gear. ".to_string()));
        let (client, _, _) = client_with(upstream, 5, Duration::from_secs(30));

        let result = client
            .describe_media("https://pbs.twimg.com/media/crab.jpg")
            .await
            .unwrap();
        assert_eq!(result.as_deref(), Some("A crab holding a gear."));
    }

    #[tokio::test]
    async fn test_failures_degrade_to_none() {
        let upstream = MockUpstream::new();
        upstream.push_image(Err(status(500)));
        upstream.push_image(Err(UpstreamFailure::Timeout));
        upstream.push_image(Err(status(429)));
        let (client, breaker, _) = client_with(upstream, 1, Duration::from_secs(30));

        for _ in 0..3 {
            let result = client.describe_media("https://pbs.twimg.com/media/a.jpg").await;
            assert_eq!(result, Ok(None));
        }
        // Media failures are not breaker input
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_auth_failure_propagates() {
        let upstream = MockUpstream::new();
        upstream.push_image(Err(status(401)));
        let (client, _, _) = client_with(upstream, 5, Duration::from_secs(30));

        let result = client.describe_media("https://pbs.twimg.com/media/a.jpg").await;
        assert!(matches!(result, Err(QueryError::Auth { .. })));
    }
}

mod tool_tests {
    use super::*;

    fn handler(upstream: Arc<MockUpstream>, cache_path: &std::path::Path) -> ToolHandler {
        let (client, _, _) = client_with(upstream, 5, Duration::from_secs(30));
        ToolHandler::new(
            Arc::new(client),
            TtlCache::new(Duration::from_secs(3600)),
            PersistentCache::open(cache_path, Duration::from_secs(900)),
        )
    }

    fn text(result: &grok_x_mcp::mcp::types::CallToolResult) -> Value {
        serde_json::from_str(result.first_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_get_tweet_by_url() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        upstream.push_json(tweet_json("1790000000000000000"));
        let handler = handler(upstream.clone(), &dir.path().join("cache.json"));

        let result = handler
            .call_tool(
                "get_tweet",
                json!({ "tweet": "https://x.com/rustlang/status/1790000000000000000" }),
            )
            .await;

        assert!(!result.is_error);
        assert_eq!(text(&result)["id"], "1790000000000000000");
        assert!(upstream.last_request().prompt.contains("1790000000000000000"));
        assert_eq!(upstream.last_request().schema.name, "tweet");
    }

    #[tokio::test]
    async fn test_get_tweet_describes_photos() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        let mut tweet = tweet_json("5");
        tweet["media"] = json!([
            { "url": "https://pbs.twimg.com/media/a.jpg", "media_type": "photo", "alt_text": null },
            { "url": "https://video.twimg.com/v.mp4", "media_type": "video", "alt_text": null },
            { "url": "https://evil.example/b.jpg", "media_type": "photo", "alt_text": null }
        ]);
        upstream.push_json(tweet);
        upstream.push_image(Ok("A chart of compile times.".to_string()));
        let handler = handler(upstream.clone(), &dir.path().join("cache.json"));

        let result = handler
            .call_tool("get_tweet", json!({ "tweet": "5", "describeMedia": true }))
            .await;

        assert!(!result.is_error);
        let value = text(&result);
        assert_eq!(value["media"][0]["description"], "A chart of compile times.");
        assert!(value["media"][1].get("description").is_none());
        assert!(value["media"][2].get("description").is_none());
        assert_eq!(upstream.image_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_tweet_media_failure_keeps_result() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        let mut tweet = tweet_json("6");
        tweet["media"] = json!([
            { "url": "https://pbs.twimg.com/media/a.jpg", "media_type": "photo", "alt_text": null }
        ]);
        upstream.push_json(tweet);
        upstream.push_image(Err(status(503)));
        let handler = handler(upstream, &dir.path().join("cache.json"));

        let result = handler
            .call_tool("get_tweet", json!({ "tweet": "6", "describeMedia": true }))
            .await;

        assert!(!result.is_error);
        assert_eq!(text(&result)["id"], "6");
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        let handler = handler(upstream.clone(), &dir.path().join("cache.json"));

        let result = handler.call_tool("get_tweet", json!({ "tweet": "not-a-tweet" })).await;
        assert!(result.is_error);

        let result = handler
            .call_tool("get_user_profile", json!({ "username": "has spaces" }))
            .await;
        assert!(result.is_error);

        let result = handler
            .call_tool(
                "search_tweets",
                json!({ "query": "rust", "fromUsers": ["a"], "excludeUsers": ["b"] }),
            )
            .await;
        assert!(result.is_error);

        let result = handler
            .call_tool("search_tweets", json!({ "query": "rust", "fromDate": "2024-02-30" }))
            .await;
        assert!(result.is_error);

        let result = handler.call_tool("search_users", json!({ "query": "" })).await;
        assert!(result.is_error);

        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(MockUpstream::new(), &dir.path().join("cache.json"));

        let result = handler.call_tool("delete_everything", json!({})).await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_user_profile_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "username": "rustlang", "followers_count": 100000 }));
        let handler = handler(upstream.clone(), &dir.path().join("cache.json"));

        let first = handler
            .call_tool("get_user_profile", json!({ "username": "@rustlang" }))
            .await;
        let second = handler
            .call_tool("get_user_profile", json!({ "username": "RustLang" }))
            .await;

        assert!(!first.is_error);
        assert!(!second.is_error);
        assert_eq!(text(&second)["followers_count"], 100000);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        upstream.push(Err(status(500)));
        upstream.push_json(json!({ "username": "rustlang" }));
        let handler = handler(upstream.clone(), &dir.path().join("cache.json"));

        let first = handler
            .call_tool("get_user_profile", json!({ "username": "rustlang" }))
            .await;
        assert!(first.is_error);
        assert!(first.first_text().unwrap().starts_with("Error: "));

        let second = handler
            .call_tool("get_user_profile", json!({ "username": "rustlang" }))
            .await;
        assert!(!second.is_error);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_trends_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let upstream = MockUpstream::new();
        upstream.push_json(json!({
            "category": "technology",
            "region": "Japan",
            "trends": [{ "name": "#RustConf", "post_count": 5400, "description": null }]
        }));

        let first = handler(upstream.clone(), &path);
        let result = first
            .call_tool("get_trends", json!({ "category": "Technology", "region": "Japan" }))
            .await;
        assert!(!result.is_error);
        assert_eq!(upstream.calls(), 1);
        drop(first);

        let second = handler(upstream.clone(), &path);
        let result = second
            .call_tool("get_trends", json!({ "category": "technology", "region": " japan " }))
            .await;
        assert!(!result.is_error);
        assert_eq!(text(&result)["trends"][0]["name"], "#RustConf");
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_tweets_filters() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "tweets": [tweet_json("1"), tweet_json("2"), tweet_json("3")] }));
        let handler = handler(upstream.clone(), &dir.path().join("cache.json"));

        let result = handler
            .call_tool(
                "search_tweets",
                json!({
                    "query": "borrow checker",
                    "maxResults": 2,
                    "fromDate": "2024-01-01",
                    "toDate": "2024-06-30",
                    "fromUsers": ["@rustlang", "https://x.com/ferris"]
                }),
            )
            .await;

        assert!(!result.is_error);
        assert_eq!(text(&result)["tweets"].as_array().unwrap().len(), 2);

        let filters = upstream.last_request().filters.unwrap();
        assert_eq!(filters.from_date.as_deref(), Some("2024-01-01"));
        assert_eq!(filters.to_date.as_deref(), Some("2024-06-30"));
        assert_eq!(filters.included_handles, vec!["rustlang", "ferris"]);
        assert!(filters.excluded_handles.is_empty());
    }

    #[tokio::test]
    async fn test_user_tweets_restricted_to_author() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "tweets": [] }));
        let handler = handler(upstream.clone(), &dir.path().join("cache.json"));

        let result = handler
            .call_tool("get_user_tweets", json!({ "username": "@rustlang" }))
            .await;

        assert!(!result.is_error);
        let filters = upstream.last_request().filters.unwrap();
        assert_eq!(filters.included_handles, vec!["rustlang"]);
    }
}

mod mcp_protocol_tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn server(upstream: Arc<MockUpstream>, dir: &tempfile::TempDir) -> Arc<McpServer> {
        let (client, _, _) = client_with(upstream, 5, Duration::from_secs(30));
        let handler = ToolHandler::new(
            Arc::new(client),
            TtlCache::new(Duration::from_secs(3600)),
            PersistentCache::open(dir.path().join("cache.json"), Duration::from_secs(900)),
        );
        Arc::new(McpServer::new(Arc::new(handler)))
    }

    #[tokio::test]
    async fn test_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(MockUpstream::new(), &dir);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let value = serde_json::to_value(response).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(value["result"]["serverInfo"]["name"], "grok-x");
        assert!(value["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_initialized_notification() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(MockUpstream::new(), &dir);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_list_tools() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(MockUpstream::new(), &dir);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await
            .unwrap();
        let value = serde_json::to_value(response).unwrap();

        let tools = value["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names.len(), 8);
        for expected in ["get_tweet", "search_tweets", "get_user_profile", "get_trends"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(MockUpstream::new(), &dir);

        let response = server.handle_message("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, -32700);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_call_tool_error_is_result() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        upstream.push(Err(status(401)));
        let server = server(upstream, &dir);

        let response = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_thread","arguments":{"tweet":"42"}}}"#,
            )
            .await
            .unwrap();
        let value = serde_json::to_value(response).unwrap();

        assert!(value.get("error").is_none());
        assert_eq!(value["result"]["isError"], true);
        assert!(value["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Authentication failed"));
    }

    #[tokio::test]
    async fn test_stdio_loop() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = MockUpstream::new();
        upstream.push_json(json!({ "username": "rustlang" }));
        let server = server(upstream, &dir);

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_user_profile","arguments":{"username":"rustlang"}}}"#,
            "\n"
        );
        let (writer, mut reader) = tokio::io::duplex(64 * 1024);

        server.clone().run(input.as_bytes(), writer).await.unwrap();

        let mut output = String::new();
        reader.read_to_string(&mut output).await.unwrap();
        let mut ids: Vec<i64> = output
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert!(server.is_initialized());
    }
}
