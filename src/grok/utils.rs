//! Input normalisation for tool arguments
//!
//! Tweet references, usernames, dates and cache keys.

use crate::error::{Result, ValidationError};

const X_HOSTS: &[&str] = &[
    "x.com",
    "www.x.com",
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
    "mobile.x.com",
];

/// Maximum handles accepted in an include/exclude filter
pub const MAX_FILTER_HANDLES: usize = 10;

/// Extract a numeric post ID from an ID or a post URL.
pub fn extract_tweet_id(input: &str) -> Result<String> {
    let input = input.trim();
    if is_tweet_id(input) {
        return Ok(input.to_string());
    }

    let invalid = || ValidationError::InvalidTweetRef {
        input: input.to_string(),
    };

    let url = reqwest::Url::parse(input).map_err(|_| invalid())?;
    if !url.host_str().map_or(false, |h| X_HOSTS.contains(&h)) {
        return Err(invalid().into());
    }

    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    segments
        .iter()
        .position(|s| *s == "status" || *s == "statuses")
        .and_then(|i| segments.get(i + 1))
        .filter(|id| is_tweet_id(id))
        .map(|id| id.to_string())
        .ok_or_else(|| invalid().into())
}

fn is_tweet_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= 20 && s.chars().all(|c| c.is_ascii_digit())
}

/// Normalise a username: strip `@` or a profile URL, then check X's handle rules.
pub fn normalize_username(input: &str) -> Result<String> {
    let trimmed = input.trim();

    let candidate = match reqwest::Url::parse(trimmed) {
        Ok(url) if url.host_str().map_or(false, |h| X_HOSTS.contains(&h)) => url
            .path_segments()
            .and_then(|mut s| s.next())
            .unwrap_or_default()
            .to_string(),
        _ => trimmed.trim_start_matches('@').to_string(),
    };

    let valid = !candidate.is_empty()
        && candidate.len() <= 15
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(candidate)
    } else {
        Err(ValidationError::InvalidUsername {
            input: input.to_string(),
        }
        .into())
    }
}

/// Normalise a list of handles for a search filter.
pub fn normalize_handles(name: &str, handles: &[String]) -> Result<Vec<String>> {
    if handles.len() > MAX_FILTER_HANDLES {
        return Err(ValidationError::InvalidParameter {
            name: name.to_string(),
            message: format!("at most {} handles allowed", MAX_FILTER_HANDLES),
        }
        .into());
    }
    handles.iter().map(|h| normalize_username(h)).collect()
}

/// Check a `YYYY-MM-DD` date.
pub fn validate_date(input: &str) -> Result<String> {
    let invalid = || ValidationError::InvalidDate {
        input: input.to_string(),
    };

    let parts: Vec<&str> = input.trim().split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return Err(invalid().into());
    };
    let digits = |part: &str, len: usize| part.len() == len && part.chars().all(|c| c.is_ascii_digit());
    if !digits(*year, 4) || !digits(*month, 2) || !digits(*day, 2) {
        return Err(invalid().into());
    }

    let year: u32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;

    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return Err(invalid().into());
    }
    Ok(format!("{:04}-{:02}-{:02}", year, month, day))
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Cache key for a user profile
pub fn profile_cache_key(username: &str) -> String {
    format!("profile:{}", username.to_lowercase())
}

/// Cache key for a trends lookup
pub fn trends_cache_key(category: &str, region: &str) -> String {
    format!(
        "trends:{}:{}",
        normalize_key_part(category),
        normalize_key_part(region)
    )
}

fn normalize_key_part(part: &str) -> String {
    part.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
