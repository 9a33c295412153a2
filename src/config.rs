//! Configuration helpers for the school matching client

use std::env;
use std::time::Duration;

/// Environment variable holding the match service base URL
pub const BASE_URL_ENV: &str = "SCHOOL_MATCH_BASE_URL";

/// Legacy environment variable the backend deployment uses for the same URL
pub const LEGACY_BASE_URL_ENV: &str = "BACKEND_API_URL";

/// Environment variable holding the inactivity window in seconds
pub const INACTIVITY_ENV: &str = "SCHOOL_MATCH_INACTIVITY_SECS";

/// Base URL used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Get the base URL from environment variables or fallback
///
/// Priority:
/// 1. SCHOOL_MATCH_BASE_URL environment variable
/// 2. BACKEND_API_URL environment variable
/// 3. fallback parameter
/// 4. `http://localhost:3000`
///
/// # Examples
///
/// ```rust,no_run
/// use school_match::get_base_url;
///
/// // Read from environment
/// let url = get_base_url(None);
///
/// // With fallback
/// let url = get_base_url(Some("https://advisor.example.com"));
/// ```
pub fn get_base_url(fallback: Option<&str>) -> String {
    base_url_from(|key| env::var(key).ok(), fallback)
}

/// Get the inactivity window from the environment or fallback
///
/// Values that are not a positive integer number of seconds are ignored.
pub fn get_inactivity_timeout(fallback: Duration) -> Duration {
    inactivity_from(|key| env::var(key).ok(), fallback)
}

fn base_url_from(lookup: impl Fn(&str) -> Option<String>, fallback: Option<&str>) -> String {
    [BASE_URL_ENV, LEGACY_BASE_URL_ENV]
        .iter()
        .filter_map(|key| lookup(key))
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .find(|url| !url.is_empty())
        .unwrap_or_else(|| fallback.unwrap_or(DEFAULT_BASE_URL).to_string())
}

fn inactivity_from(lookup: impl Fn(&str) -> Option<String>, fallback: Duration) -> Duration {
    lookup(INACTIVITY_ENV)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}
