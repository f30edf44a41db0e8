//! Cache stage
//!
//! Wraps the handler call for cacheable GET routes. A hit is answered from
//! the store without touching the handler; a miss runs the handler and keeps
//! its successful response for the route's TTL.
//!
//! Keys are the request path plus query string, and invalidation matches by
//! substring. Clearing by file id can therefore also drop unrelated entries
//! that happen to contain the id.

use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use super::PipelineContext;
use crate::cache::CachedResponse;
use crate::error::ApiError;

/// Response header reporting the cache outcome
pub const X_CACHE: &str = "x-cache";

/// Builds the cache key for a request URI: path plus query.
pub fn cache_key(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Serves from cache when possible, otherwise runs the handler and stores
/// its response.
pub async fn serve(ctx: &PipelineContext, req: Request, next: Next) -> Response {
    let ttl = match ctx.policy.cache_ttl {
        Some(ttl) if req.method() == Method::GET => ttl,
        _ => return next.run(req).await,
    };

    let key = cache_key(req.uri());
    let hit = ctx.state.cache.write().await.get(&key);
    if let Some(cached) = hit {
        debug!("Cache HIT: {}", key);
        return replay(cached, ttl);
    }

    debug!("Cache MISS: {}", key);
    let response = next.run(req).await;
    capture(ctx, key, ttl, response).await
}

/// Rebuilds a response from a stored entry.
fn replay(cached: CachedResponse, ttl: u64) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = cached.status;
    *response.headers_mut() = cached.headers;

    let headers = response.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={ttl}")) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    response
}

/// Stores a successful handler response whose size is known and small
/// enough, then sends it on. Everything else passes through.
async fn capture(ctx: &PipelineContext, key: String, ttl: u64, response: Response) -> Response {
    let (mut parts, body) = response.into_parts();
    parts
        .headers
        .insert(X_CACHE, HeaderValue::from_static("MISS"));

    if !parts.status.is_success() {
        return Response::from_parts(parts, body);
    }

    let max_body = ctx.state.config.cache_max_body_bytes;
    let size = body
        .size_hint()
        .exact()
        .or_else(|| content_length(&parts.headers));
    match size {
        Some(size) if size <= max_body as u64 => {}
        _ => {
            debug!("Cache bypass for {}: body size {:?} not cacheable", key, size);
            return Response::from_parts(parts, body);
        }
    }

    let bytes = match to_bytes(body, max_body).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to buffer response for {}: {}", key, err);
            return ApiError::Internal.into_response();
        }
    };

    let mut stored_headers = parts.headers.clone();
    stored_headers.remove(X_CACHE);
    let cached = CachedResponse::new(parts.status, stored_headers, bytes.clone());

    let stored = ctx.state.cache.write().await.set(key.clone(), cached, Some(ttl));
    match stored {
        Ok(()) => debug!("Cache STORE: {} ({} bytes, ttl {}s)", key, bytes.len(), ttl),
        Err(err) => warn!("Not caching {}: {}", key, err),
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use bytes::Bytes;

    #[test]
    fn test_cache_key_includes_query() {
        let uri: Uri = "/api/files?pageSize=10&pageToken=abc".parse().unwrap();
        assert_eq!(cache_key(&uri), "/api/files?pageSize=10&pageToken=abc");

        let uri: Uri = "/api/file/xyz".parse().unwrap();
        assert_eq!(cache_key(&uri), "/api/file/xyz");
    }

    #[test]
    fn test_cache_key_distinguishes_queries() {
        let a: Uri = "/api/files?pageSize=1".parse().unwrap();
        let b: Uri = "/api/files?pageSize=10".parse().unwrap();
        assert_ne!(cache_key(&a), cache_key(&b));
    }

    #[tokio::test]
    async fn test_replay_marks_hit() {
        let cached = CachedResponse::bytes(Bytes::from_static(b"abc"), "image/png");
        let response = replay(cached, 300);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CACHE], "HIT");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=300");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abc");
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(42u64));
        assert_eq!(content_length(&headers), Some(42));
    }
}
