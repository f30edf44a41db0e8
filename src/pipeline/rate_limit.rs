//! Fixed-window rate limiting
//!
//! Each route class keeps its own counter per client. A window starts on the
//! client's first request and resets once it has fully elapsed. Counters are
//! process-local.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use tracing::warn;

use super::RoutePolicy;
use crate::api::AppState;
use crate::config::{Config, RateLimitRule};
use crate::error::ApiError;

// == Route Class ==
/// Groups of routes sharing a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Upload,
    Download,
    Api,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Upload => "upload",
            RouteClass::Download => "download",
            RouteClass::Api => "api",
        }
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

// == Fixed Window Limiter ==
/// Per-client request counter for one route class.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    rule: RateLimitRule,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(rule: RateLimitRule) -> Self {
        Self {
            rule,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn rule(&self) -> RateLimitRule {
        self.rule
    }

    /// Counts a request from `client` now.
    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Counts a request from `client` at `now`.
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        let window = windows.entry(client.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now.duration_since(window.started_at) >= self.rule.window {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.rule.max_requests {
            let elapsed = now.duration_since(window.started_at);
            return RateDecision::Limited {
                retry_after: self.rule.window.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.rule.max_requests - window.count,
        }
    }

    /// Drops windows that have fully elapsed. Returns how many were dropped.
    pub fn purge_stale(&self) -> usize {
        self.purge_stale_at(Instant::now())
    }

    pub fn purge_stale_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started_at) < self.rule.window);
        before - windows.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// == Rate Limiters ==
/// One limiter per route class.
#[derive(Debug)]
pub struct RateLimiters {
    upload: FixedWindowLimiter,
    download: FixedWindowLimiter,
    api: FixedWindowLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload: FixedWindowLimiter::new(config.upload_limit),
            download: FixedWindowLimiter::new(config.download_limit),
            api: FixedWindowLimiter::new(config.api_limit),
        }
    }

    pub fn for_class(&self, class: RouteClass) -> &FixedWindowLimiter {
        match class {
            RouteClass::Upload => &self.upload,
            RouteClass::Download => &self.download,
            RouteClass::Api => &self.api,
        }
    }

    /// Purges stale windows across all classes.
    pub fn purge_stale(&self) -> usize {
        [&self.upload, &self.download, &self.api]
            .iter()
            .map(|limiter| limiter.purge_stale())
            .sum()
    }
}

/// Counts the request against each of the route's classes, stopping at the
/// first exhausted one.
pub fn enforce(state: &AppState, policy: &RoutePolicy, req: &Request) -> Result<(), ApiError> {
    if policy.rate_classes.is_empty() {
        return Ok(());
    }

    let client = client_identity(req);
    for class in policy.rate_classes {
        let limiter = state.limiters.for_class(*class);
        if let RateDecision::Limited { retry_after } = limiter.check(&client) {
            warn!(
                "Rate limit exceeded: class={} client={} path={}",
                class.as_str(),
                client,
                req.uri().path()
            );
            return Err(ApiError::RateLimited {
                limit: limiter.rule().max_requests,
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }
    }

    Ok(())
}

/// Peer address when known, else the first `x-forwarded-for` hop.
pub fn client_identity(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_allows_up_to_max() {
        let limiter = FixedWindowLimiter::new(RateLimitRule::new(60, 3));
        let now = Instant::now();

        assert_eq!(limiter.check_at("c", now), RateDecision::Allowed { remaining: 2 });
        assert_eq!(limiter.check_at("c", now), RateDecision::Allowed { remaining: 1 });
        assert_eq!(limiter.check_at("c", now), RateDecision::Allowed { remaining: 0 });
        assert!(matches!(
            limiter.check_at("c", now),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = FixedWindowLimiter::new(RateLimitRule::new(60, 1));
        let now = Instant::now();

        assert!(matches!(limiter.check_at("a", now), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("b", now), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at("a", now), RateDecision::Limited { .. }));
    }

    #[test]
    fn test_window_resets() {
        let limiter = FixedWindowLimiter::new(RateLimitRule::new(60, 1));
        let start = Instant::now();

        limiter.check_at("c", start);
        match limiter.check_at("c", start + Duration::from_secs(20)) {
            RateDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(40))
            }
            other => panic!("expected limit, got {:?}", other),
        }

        assert!(matches!(
            limiter.check_at("c", start + Duration::from_secs(60)),
            RateDecision::Allowed { remaining: 0 }
        ));
    }

    #[test]
    fn test_purge_stale() {
        let limiter = FixedWindowLimiter::new(RateLimitRule::new(60, 5));
        let start = Instant::now();

        limiter.check_at("old", start);
        limiter.check_at("new", start + Duration::from_secs(50));

        assert_eq!(limiter.purge_stale_at(start + Duration::from_secs(70)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_client_identity_sources() {
        let forwarded = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_identity(&forwarded), "203.0.113.9");

        let mut connected = Request::builder().body(Body::empty()).unwrap();
        connected
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5000))));
        assert_eq!(client_identity(&connected), "127.0.0.1");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_identity(&bare), "anonymous");
    }
}
