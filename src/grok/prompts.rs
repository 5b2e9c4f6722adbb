//! Prompt text for each tool

const JSON_ONLY: &str = "Use live X search to answer. Respond only with JSON matching the provided schema. \
If a field is unknown, use null rather than guessing. Never invent posts, handles or numbers.";

pub fn tweet(tweet_id: &str) -> String {
    format!(
        "Fetch the post on X with ID {id} (https://x.com/i/status/{id}). Return its full text, author handle \
and display name, creation time, engagement metrics, direct media URLs with their type and alt text, \
and the IDs of any post it replies to or quotes. {rules}",
        id = tweet_id,
        rules = JSON_ONLY
    )
}

pub fn tweet_replies(tweet_id: &str, max_results: u32) -> String {
    format!(
        "Find up to {max} replies to the post on X with ID {id} (https://x.com/i/status/{id}), most engaged first. \
For each reply return its ID, author, full text, creation time and metrics. {rules}",
        max = max_results,
        id = tweet_id,
        rules = JSON_ONLY
    )
}

pub fn thread(tweet_id: &str) -> String {
    format!(
        "Reconstruct the full thread containing the post on X with ID {id} (https://x.com/i/status/{id}): \
every post by the original author in the same reply chain, in chronological order, starting from the \
first post. {rules}",
        id = tweet_id,
        rules = JSON_ONLY
    )
}

pub fn user_profile(username: &str) -> String {
    format!(
        "Look up the public profile of the X account @{user}. Return the handle, display name, bio, location, \
website, join date, follower, following and post counts, and whether the account is verified. {rules}",
        user = username,
        rules = JSON_ONLY
    )
}

pub fn user_tweets(username: &str, max_results: u32) -> String {
    format!(
        "Find the {max} most recent posts by the X account @{user}, newest first, excluding reposts. \
For each post return its ID, full text, creation time, metrics and media. {rules}",
        max = max_results,
        user = username,
        rules = JSON_ONLY
    )
}

pub fn search_tweets(query: &str, max_results: u32) -> String {
    format!(
        "Search X for posts matching: \"{query}\". Return up to {max} of the most relevant posts with their ID, \
author, full text, creation time and metrics. {rules}",
        query = query.replace('"', "'"),
        max = max_results,
        rules = JSON_ONLY
    )
}

pub fn search_users(query: &str, max_results: u32) -> String {
    format!(
        "Search X for accounts matching: \"{query}\". Return up to {max} accounts, most relevant first, with \
their handle, display name, bio and follower count. {rules}",
        query = query.replace('"', "'"),
        max = max_results,
        rules = JSON_ONLY
    )
}

pub fn trends(category: &str, region: &str) -> String {
    let scope = if category == "all" {
        "across all topics".to_string()
    } else {
        format!("in the {} category", category)
    };
    format!(
        "List what is trending on X right now {scope} for the region \"{region}\". Return up to 20 topics with \
an approximate post count and a one-sentence explanation of why each is trending. Echo the category \
\"{category}\" and region \"{region}\" in the response. {rules}",
        scope = scope,
        region = region.replace('"', "'"),
        category = category.replace('"', "'"),
        rules = JSON_ONLY
    )
}
