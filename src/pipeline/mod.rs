//! Request Pipeline
//!
//! Every guarded route runs the same ordered stages:
//! auth gate → rate-limit gate → cache stage → handler.
//!
//! Gates are plain functions that either let the request continue or end it
//! with an `ApiError`. The cache stage wraps the handler call and inspects the
//! response it returns.

pub mod auth;
pub mod rate_limit;
pub mod response_cache;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::AppState;
use crate::error::ApiError;

pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimiters, RouteClass};

/// Cache lifetime of CDN responses (24h)
pub const CDN_CACHE_TTL: u64 = 24 * 60 * 60;
/// Cache lifetime of file metadata and stats (5min)
pub const METADATA_CACHE_TTL: u64 = 5 * 60;
/// Cache lifetime of listings (1min)
pub const LISTING_CACHE_TTL: u64 = 60;

// == Route Policy ==
/// What the pipeline does for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Rate-limit classes the route is charged against, in order
    pub rate_classes: &'static [RouteClass],
    /// Cache TTL in seconds for GET requests; `None` disables caching
    pub cache_ttl: Option<u64>,
}

impl RoutePolicy {
    /// Public file-serving routes.
    pub const fn download() -> Self {
        Self {
            rate_classes: &[RouteClass::Download],
            cache_ttl: None,
        }
    }

    /// Upload routes count against both the general and the upload limit.
    pub const fn upload() -> Self {
        Self {
            rate_classes: &[RouteClass::Api, RouteClass::Upload],
            cache_ttl: None,
        }
    }

    /// Any other `/api` route.
    pub const fn api() -> Self {
        Self {
            rate_classes: &[RouteClass::Api],
            cache_ttl: None,
        }
    }

    pub const fn cached(self, ttl_seconds: u64) -> Self {
        Self {
            cache_ttl: Some(ttl_seconds),
            ..self
        }
    }
}

/// A stage that runs before the handler.
pub type Gate = fn(&AppState, &RoutePolicy, &Request) -> Result<(), ApiError>;

/// Gates in execution order.
pub const GATES: &[Gate] = &[auth::authenticate, rate_limit::enforce];

/// Middleware state: the shared app state plus the route's policy.
#[derive(Clone)]
pub struct PipelineContext {
    pub state: AppState,
    pub policy: RoutePolicy,
}

impl PipelineContext {
    pub fn new(state: AppState, policy: RoutePolicy) -> Self {
        Self { state, policy }
    }
}

/// Runs the gates, then hands over to the cache stage and the handler.
pub async fn run_pipeline(
    State(ctx): State<PipelineContext>,
    req: Request,
    next: Next,
) -> Response {
    for gate in GATES {
        if let Err(err) = gate(&ctx.state, &ctx.policy, &req) {
            return err.into_response();
        }
    }

    response_cache::serve(&ctx, req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        assert_eq!(RoutePolicy::download().rate_classes, &[RouteClass::Download]);
        assert_eq!(
            RoutePolicy::upload().rate_classes,
            &[RouteClass::Api, RouteClass::Upload]
        );
        assert_eq!(RoutePolicy::api().cache_ttl, None);
        assert_eq!(RoutePolicy::api().cached(60).cache_ttl, Some(60));
    }
}
