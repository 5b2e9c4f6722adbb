//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations. Every handler
//! normalises its input, builds a prompt and goes through [`GrokClient::query`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::error::{GrokMcpError, McpError, Result, ValidationError};
use crate::grok::cache::{PersistentCache, TtlCache};
use crate::grok::client::{GrokClient, Query};
use crate::grok::prompts;
use crate::grok::types::{SearchFilters, Tweet, TweetList, TrendsReport, UserList, UserProfile};
use crate::grok::utils::{
    extract_tweet_id, normalize_handles, normalize_username, profile_cache_key, trends_cache_key,
    validate_date,
};
use crate::mcp::types::{CallToolResult, Tool};

const DEFAULT_MAX_RESULTS: u32 = 10;
const DEFAULT_TREND_CATEGORY: &str = "all";
const DEFAULT_TREND_REGION: &str = "worldwide";

/// Tool handler
pub struct ToolHandler {
    client: Arc<GrokClient>,
    profile_cache: TtlCache<UserProfile>,
    trends_cache: PersistentCache<TrendsReport>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(
        client: Arc<GrokClient>,
        profile_cache: TtlCache<UserProfile>,
        trends_cache: PersistentCache<TrendsReport>,
    ) -> Self {
        Self {
            client,
            profile_cache,
            trends_cache,
        }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def("get_tweet", "Fetches a single post on X by ID or URL, optionally describing attached images", get_tweet_schema()),
            tool_def("get_tweet_replies", "Fetches replies to a post on X", tweet_list_schema()),
            tool_def("get_thread", "Reconstructs the author's thread containing a post, in order", tweet_ref_schema()),
            tool_def("get_user_profile", "Retrieves the public profile of an X account", username_schema()),
            tool_def("get_user_tweets", "Retrieves recent posts by an X account", user_tweets_schema()),
            tool_def("search_tweets", "Searches posts on X", search_tweets_schema()),
            tool_def("search_users", "Searches accounts on X", search_users_schema()),
            tool_def("get_trends", "Lists trending topics on X for a category and region", get_trends_schema()),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        let outcome = match name {
            "get_tweet" => self.handle_get_tweet(args).await,
            "get_tweet_replies" => self.handle_get_tweet_replies(args).await,
            "get_thread" => self.handle_get_thread(args).await,
            "get_user_profile" => self.handle_get_user_profile(args).await,
            "get_user_tweets" => self.handle_get_user_tweets(args).await,
            "search_tweets" => self.handle_search_tweets(args).await,
            "search_users" => self.handle_search_users(args).await,
            "get_trends" => self.handle_get_trends(args).await,
            _ => Err(McpError::UnknownTool {
                name: name.to_string(),
            }
            .into()),
        };

        match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                if !matches!(e, GrokMcpError::Query(_)) {
                    tracing::debug!(tool = name, "Tool call rejected: {}", e);
                }
                CallToolResult::error(e.to_string())
            }
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_get_tweet(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            #[validate(length(min = 1, max = 512))]
            tweet: String,
            #[serde(default)]
            describe_media: bool,
        }

        let args: Args = parse_args(args)?;
        let tweet_id = extract_tweet_id(&args.tweet)?;

        let mut tweet: Tweet = self
            .client
            .query(Query::new(prompts::tweet(&tweet_id)).named("tweet"))
            .await?;

        if args.describe_media {
            for media in tweet.media.iter_mut().filter(|m| m.is_photo()) {
                media.description = self.client.describe_media(&media.url).await?;
            }
        }

        render(&tweet)
    }

    async fn handle_get_tweet_replies(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            #[validate(length(min = 1, max = 512))]
            tweet: String,
            #[validate(range(min = 1, max = 50))]
            max_results: Option<u32>,
        }

        let args: Args = parse_args(args)?;
        let tweet_id = extract_tweet_id(&args.tweet)?;
        let max = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let replies: TweetList = self
            .client
            .query(Query::new(prompts::tweet_replies(&tweet_id, max)).named("tweet_replies"))
            .await?;

        render(&truncate(replies, max))
    }

    async fn handle_get_thread(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        struct Args {
            #[validate(length(min = 1, max = 512))]
            tweet: String,
        }

        let args: Args = parse_args(args)?;
        let tweet_id = extract_tweet_id(&args.tweet)?;

        let thread: TweetList = self
            .client
            .query(Query::new(prompts::thread(&tweet_id)).named("thread"))
            .await?;

        render(&thread)
    }

    async fn handle_get_user_profile(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        struct Args {
            #[validate(length(min = 1, max = 256))]
            username: String,
        }

        let args: Args = parse_args(args)?;
        let username = normalize_username(&args.username)?;
        let key = profile_cache_key(&username);

        if let Some(profile) = self.profile_cache.get(&key) {
            tracing::debug!("Profile cache hit for {}", key);
            return render(&profile);
        }

        let profile: UserProfile = self
            .client
            .query(Query::new(prompts::user_profile(&username)).named("user_profile"))
            .await?;

        self.profile_cache.set(key, profile.clone());
        render(&profile)
    }

    async fn handle_get_user_tweets(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            #[validate(length(min = 1, max = 256))]
            username: String,
            #[validate(range(min = 1, max = 50))]
            max_results: Option<u32>,
            from_date: Option<String>,
            to_date: Option<String>,
        }

        let args: Args = parse_args(args)?;
        let username = normalize_username(&args.username)?;
        let max = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let filters = SearchFilters {
            from_date: args.from_date.as_deref().map(validate_date).transpose()?,
            to_date: args.to_date.as_deref().map(validate_date).transpose()?,
            included_handles: vec![username.clone()],
            ..Default::default()
        };
        check_date_order(&filters)?;

        let tweets: TweetList = self
            .client
            .query(
                Query::new(prompts::user_tweets(&username, max))
                    .named("user_tweets")
                    .with_filters(filters),
            )
            .await?;

        render(&truncate(tweets, max))
    }

    async fn handle_search_tweets(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            #[validate(length(min = 1, max = 512))]
            query: String,
            #[validate(range(min = 1, max = 50))]
            max_results: Option<u32>,
            from_date: Option<String>,
            to_date: Option<String>,
            #[serde(default)]
            from_users: Vec<String>,
            #[serde(default)]
            exclude_users: Vec<String>,
        }

        let args: Args = parse_args(args)?;
        if !args.from_users.is_empty() && !args.exclude_users.is_empty() {
            return Err(ValidationError::InvalidParameter {
                name: "fromUsers".to_string(),
                message: "cannot be combined with excludeUsers".to_string(),
            }
            .into());
        }
        let max = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let filters = SearchFilters {
            from_date: args.from_date.as_deref().map(validate_date).transpose()?,
            to_date: args.to_date.as_deref().map(validate_date).transpose()?,
            included_handles: normalize_handles("fromUsers", &args.from_users)?,
            excluded_handles: normalize_handles("excludeUsers", &args.exclude_users)?,
            max_search_results: Some(max.max(DEFAULT_MAX_RESULTS) * 2),
        };
        check_date_order(&filters)?;

        let tweets: TweetList = self
            .client
            .query(
                Query::new(prompts::search_tweets(args.query.trim(), max))
                    .named("tweet_search")
                    .with_filters(filters),
            )
            .await?;

        render(&truncate(tweets, max))
    }

    async fn handle_search_users(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            #[validate(length(min = 1, max = 256))]
            query: String,
            #[validate(range(min = 1, max = 20))]
            max_results: Option<u32>,
        }

        let args: Args = parse_args(args)?;
        let max = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let mut users: UserList = self
            .client
            .query(Query::new(prompts::search_users(args.query.trim(), max)).named("user_search"))
            .await?;
        users.users.truncate(max as usize);

        render(&users)
    }

    async fn handle_get_trends(&self, args: Value) -> Result<String> {
        #[derive(Deserialize, Validate)]
        struct Args {
            #[validate(length(min = 1, max = 64))]
            category: Option<String>,
            #[validate(length(min = 1, max = 64))]
            region: Option<String>,
        }

        let args: Args = parse_args(args)?;
        let category = args
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_TREND_CATEGORY)
            .to_lowercase();
        let region = args
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_TREND_REGION)
            .to_string();
        let key = trends_cache_key(&category, &region);

        if let Some(report) = self.trends_cache.get(&key) {
            tracing::debug!("Trends cache hit for {}", key);
            return render(&report);
        }

        let report: TrendsReport = self
            .client
            .query(Query::new(prompts::trends(&category, &region)).named("trends"))
            .await?;

        self.trends_cache.set(key, report.clone());
        render(&report)
    }
}

/// Deserialize and validate tool arguments
fn parse_args<T: DeserializeOwned + Validate>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    let parsed: T = serde_json::from_value(args).map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;
    parsed.validate().map_err(ValidationError::from)?;
    Ok(parsed)
}

fn check_date_order(filters: &SearchFilters) -> Result<()> {
    if let (Some(from), Some(to)) = (&filters.from_date, &filters.to_date) {
        // Zero-padded ISO dates compare correctly as strings
        if from > to {
            return Err(ValidationError::InvalidParameter {
                name: "fromDate".to_string(),
                message: format!("{} is after toDate {}", from, to),
            }
            .into());
        }
    }
    Ok(())
}

fn truncate(mut list: TweetList, max: u32) -> TweetList {
    list.tweets.truncate(max as usize);
    list
}

fn render<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

// ==================== Tool Schemas ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn tweet_property() -> Value {
    json!({
        "type": "string",
        "description": "Numeric post ID or a post URL (x.com or twitter.com)"
    })
}

fn max_results_property(max: u32) -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "maximum": max,
        "description": format!("Maximum number of results (default {})", DEFAULT_MAX_RESULTS)
    })
}

fn date_property(description: &str) -> Value {
    json!({
        "type": "string",
        "pattern": "^\\d{4}-\\d{2}-\\d{2}$",
        "description": description
    })
}

fn get_tweet_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tweet": tweet_property(),
            "describeMedia": {
                "type": "boolean",
                "description": "Describe attached images with the vision model"
            }
        },
        "required": ["tweet"]
    })
}

fn tweet_ref_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tweet": tweet_property()
        },
        "required": ["tweet"]
    })
}

fn tweet_list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tweet": tweet_property(),
            "maxResults": max_results_property(50)
        },
        "required": ["tweet"]
    })
}

fn username_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "username": {
                "type": "string",
                "description": "Handle, with or without @, or a profile URL"
            }
        },
        "required": ["username"]
    })
}

fn user_tweets_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "username": {
                "type": "string",
                "description": "Handle, with or without @, or a profile URL"
            },
            "maxResults": max_results_property(50),
            "fromDate": date_property("Earliest post date, YYYY-MM-DD"),
            "toDate": date_property("Latest post date, YYYY-MM-DD")
        },
        "required": ["username"]
    })
}

fn search_tweets_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to search for"
            },
            "maxResults": max_results_property(50),
            "fromDate": date_property("Earliest post date, YYYY-MM-DD"),
            "toDate": date_property("Latest post date, YYYY-MM-DD"),
            "fromUsers": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": 10,
                "description": "Only posts from these handles"
            },
            "excludeUsers": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": 10,
                "description": "Never posts from these handles (not with fromUsers)"
            }
        },
        "required": ["query"]
    })
}

fn search_users_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Name, topic or keyword"
            },
            "maxResults": max_results_property(20)
        },
        "required": ["query"]
    })
}

fn get_trends_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "description": "Topic category such as technology, sports or politics (default all)"
            },
            "region": {
                "type": "string",
                "description": "Country or city (default worldwide)"
            }
        }
    })
}
