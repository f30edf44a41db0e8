//! API key gate

use std::collections::HashMap;

use axum::extract::{Query, Request};
use tracing::warn;

use super::RoutePolicy;
use crate::api::AppState;
use crate::error::ApiError;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";
/// Query parameter accepted instead of the header
pub const API_KEY_QUERY: &str = "apiKey";
/// Paths that are always public
pub const PUBLIC_PREFIXES: &[&str] = &["/cdn/", "/download/"];
/// Paths below this prefix need a key
pub const PROTECTED_PREFIX: &str = "/api";

/// Rejects protected requests whose key is missing (401) or wrong (403).
pub fn authenticate(state: &AppState, _policy: &RoutePolicy, req: &Request) -> Result<(), ApiError> {
    let path = req.uri().path();
    if !requires_key(path) {
        return Ok(());
    }

    let Some(supplied) = supplied_key(req) else {
        warn!("Rejected {}: missing API key", path);
        return Err(ApiError::Unauthorized);
    };

    match state.config.api_key.as_deref() {
        Some(expected) if expected == supplied => Ok(()),
        _ => {
            warn!("Rejected {}: invalid API key", path);
            Err(ApiError::Forbidden)
        }
    }
}

/// True for paths under the protected prefix that are not on the public list.
pub fn requires_key(path: &str) -> bool {
    if PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return false;
    }
    path == PROTECTED_PREFIX || path.starts_with(&format!("{PROTECTED_PREFIX}/"))
}

/// The key from the header, else from the query string. Empty values count
/// as missing.
fn supplied_key(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    from_header
        .or_else(|| {
            Query::<HashMap<String, String>>::try_from_uri(req.uri())
                .ok()
                .and_then(|Query(mut params)| params.remove(API_KEY_QUERY))
        })
        .filter(|key| !key.is_empty())
}
