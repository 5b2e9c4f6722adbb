//! Grok query type definitions
//!
//! Response shapes requested from Grok (each derives `JsonSchema` so it can be
//! sent as a structured-output schema) and the upstream search filters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Engagement counts for a post
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct TweetMetrics {
    /// Number of likes
    pub likes: Option<u64>,

    /// Number of reposts
    pub reposts: Option<u64>,

    /// Number of replies
    pub replies: Option<u64>,

    /// Number of quote posts
    pub quotes: Option<u64>,

    /// Number of views
    pub views: Option<u64>,
}

/// A media attachment on a post
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MediaItem {
    /// Direct URL of the media file
    pub url: String,

    /// One of "photo", "video", "gif"
    pub media_type: String,

    /// Author-provided alt text
    pub alt_text: Option<String>,

    /// Vision-model description, filled in locally on request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub description: Option<String>,
}

impl MediaItem {
    pub fn is_photo(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("photo") || self.media_type.eq_ignore_ascii_case("image")
    }
}

/// A single post on X
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Tweet {
    /// Numeric post ID
    pub id: String,

    /// Author handle without the leading @
    pub author_username: String,

    /// Author display name
    pub author_name: Option<String>,

    /// Full post text
    pub text: String,

    /// Creation time, ISO 8601
    pub created_at: Option<String>,

    /// Canonical URL of the post
    pub url: Option<String>,

    pub metrics: Option<TweetMetrics>,

    #[serde(default)]
    pub media: Vec<MediaItem>,

    /// ID of the post this one replies to
    pub in_reply_to_id: Option<String>,

    /// ID of the quoted post
    pub quoted_tweet_id: Option<String>,
}

/// A list of posts
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TweetList {
    pub tweets: Vec<Tweet>,
}

/// Public profile of an X account
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct UserProfile {
    /// Handle without the leading @
    pub username: String,

    pub display_name: Option<String>,

    pub bio: Option<String>,

    pub location: Option<String>,

    pub website: Option<String>,

    /// Account creation date, ISO 8601
    pub joined: Option<String>,

    pub followers_count: Option<u64>,

    pub following_count: Option<u64>,

    pub posts_count: Option<u64>,

    pub verified: Option<bool>,
}

/// A list of accounts
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct UserList {
    pub users: Vec<UserProfile>,
}

/// One trending topic
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Trend {
    /// Topic or hashtag as shown on X
    pub name: String,

    /// Approximate number of posts
    pub post_count: Option<u64>,

    /// One-sentence summary of why it is trending
    pub description: Option<String>,
}

/// Trending topics for a category and region
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TrendsReport {
    pub category: String,
    pub region: String,
    pub trends: Vec<Trend>,
}

/// Upstream-side search restrictions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Earliest date, YYYY-MM-DD
    pub from_date: Option<String>,

    /// Latest date, YYYY-MM-DD
    pub to_date: Option<String>,

    /// Only search posts from these handles
    pub included_handles: Vec<String>,

    /// Never search posts from these handles
    pub excluded_handles: Vec<String>,

    /// Cap on the number of sources the upstream retrieves
    pub max_search_results: Option<u32>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
