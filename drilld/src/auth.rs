//! Presence-only API key check.
//!
//! The current deployment only requires the header to be present and
//! non-empty; key validation against a known set is a follow-on concern.

use axum::http::HeaderMap;

pub const API_KEY_HEADER: &str = "x-api-key";

pub fn has_api_key(headers: &HeaderMap) -> bool {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}
