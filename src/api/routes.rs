//! API Routes
//!
//! Configures the Axum router with all CDN endpoints. Every route except
//! `/health` runs through the request pipeline with its own policy.

use std::any::Any;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::error;

use super::handlers::{
    cache_stats_handler, clear_cache_handler, delete_handler, download_handler, get_info_handler,
    health_handler, list_handler, not_found_handler, search_handler, serve_handler, stats_handler,
    upload_handler, upload_multiple_handler, MAX_FILES_PER_UPLOAD,
};
use super::AppState;
use crate::error::ApiError;
use crate::pipeline::{
    run_pipeline, PipelineContext, RoutePolicy, CDN_CACHE_TTL, LISTING_CACHE_TTL,
    METADATA_CACHE_TTL,
};

/// Lets other origins embed served files
const CROSS_ORIGIN_RESOURCE_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-resource-policy");

/// Room for multipart framing and text fields on top of the file bytes
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Wraps a route with the pipeline configured for `policy`.
fn guarded(state: &AppState, policy: RoutePolicy, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.layer(middleware::from_fn_with_state(
        PipelineContext::new(state.clone(), policy),
        run_pipeline,
    ))
}

/// Last line of defence: a panicking handler still answers with the envelope.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);
    ApiError::Internal.into_response()
}

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check, no pipeline
/// - `GET /cdn/:fileId[/:filename]` - Inline file stream, cached 24h
/// - `GET /download/:fileId` - Attachment file stream
/// - `POST /api/upload`, `POST /api/upload/multiple` - Uploads
/// - `GET|DELETE /api/file/:fileId` - Metadata (cached 5min) and deletion
/// - `GET /api/files` - Paginated listing, cached 1min
/// - `GET /api/files/search` - Name search
/// - `GET /api/stats` - Storage usage, cached 5min
/// - `POST /api/cache/clear`, `GET /api/cache/stats` - Cache administration
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
/// - Catch panic: Turns handler panics into a 500 envelope
/// - Security headers: `nosniff`, cross-origin resource policy
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    let max_file = state.config.max_file_size_bytes();
    let single_limit = max_file.saturating_add(MULTIPART_OVERHEAD);
    let batch_limit = max_file
        .saturating_mul(MAX_FILES_PER_UPLOAD)
        .saturating_add(MULTIPART_OVERHEAD);

    let cdn = RoutePolicy::download().cached(CDN_CACHE_TTL);
    let s = &state;

    Router::new()
        .route("/health", get(health_handler))
        // == Public file serving ==
        .route("/cdn/:fileId", guarded(s, cdn, get(serve_handler)))
        .route("/cdn/:fileId/:filename", guarded(s, cdn, get(serve_handler)))
        .route(
            "/download/:fileId",
            guarded(s, RoutePolicy::download(), get(download_handler)),
        )
        // == Uploads ==
        .route(
            "/api/upload",
            guarded(
                s,
                RoutePolicy::upload(),
                post(upload_handler).layer(DefaultBodyLimit::max(single_limit)),
            ),
        )
        .route(
            "/api/upload/multiple",
            guarded(
                s,
                RoutePolicy::upload(),
                post(upload_multiple_handler).layer(DefaultBodyLimit::max(batch_limit)),
            ),
        )
        // == File management ==
        .route(
            "/api/file/:fileId",
            guarded(
                s,
                RoutePolicy::api().cached(METADATA_CACHE_TTL),
                get(get_info_handler).delete(delete_handler),
            ),
        )
        .route(
            "/api/files",
            guarded(
                s,
                RoutePolicy::api().cached(LISTING_CACHE_TTL),
                get(list_handler),
            ),
        )
        .route(
            "/api/files/search",
            guarded(s, RoutePolicy::api(), get(search_handler)),
        )
        .route(
            "/api/stats",
            guarded(
                s,
                RoutePolicy::api().cached(METADATA_CACHE_TTL),
                get(stats_handler),
            ),
        )
        // == Cache administration ==
        .route(
            "/api/cache/clear",
            guarded(s, RoutePolicy::api(), post(clear_cache_handler)),
        )
        .route(
            "/api/cache/stats",
            guarded(s, RoutePolicy::api(), get(cache_stats_handler)),
        )
        .fallback(not_found_handler)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            CROSS_ORIGIN_RESOURCE_POLICY,
            HeaderValue::from_static("cross-origin"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStorage;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let config = Config {
            api_key: Some("secret".into()),
            ..Config::default()
        };
        create_router(AppState::new(config, Arc::new(MemoryStorage::new())))
    }

    async fn status_of(uri: &str, key: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        create_test_app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(status_of("/health", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        assert_eq!(status_of("/nope", None).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_requires_key() {
        assert_eq!(status_of("/api/files", None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_of("/api/files", Some("wrong")).await, StatusCode::FORBIDDEN);
        assert_eq!(status_of("/api/files", Some("secret")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cdn_is_public() {
        assert_eq!(status_of("/cdn/missing", None).await, StatusCode::NOT_FOUND);
        assert_eq!(status_of("/download/missing", None).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cache_stats_endpoint() {
        assert_eq!(
            status_of("/api/cache/stats", Some("secret")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_security_headers() {
        for uri in ["/health", "/nope", "/cdn/missing"] {
            let response = create_test_app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.headers()["x-content-type-options"], "nosniff");
            assert_eq!(
                response.headers()["cross-origin-resource-policy"],
                "cross-origin"
            );
        }
    }

    #[test]
    fn test_handle_panic_is_internal_error() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
