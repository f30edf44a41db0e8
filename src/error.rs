//! Error types for the CDN server
//!
//! Provides unified error handling using thiserror. Every variant maps onto
//! the JSON envelope `{success: false, error, message?}`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiResponse;

// == API Error Enum ==
/// Unified error type returned by the pipeline and the route handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bad input shape, size or type
    #[error("{0}")]
    Validation(String),

    /// No API key supplied
    #[error("API key is required")]
    Unauthorized,

    /// API key supplied but wrong
    #[error("Invalid API key")]
    Forbidden,

    /// Backend reports the object is missing
    #[error("{0}")]
    NotFound(String),

    /// Fixed window exhausted for this client
    #[error("Too many requests, please try again later.")]
    RateLimited {
        limit: u32,
        retry_after_secs: u64,
    },

    /// Backend call failed; `detail` is only set when error exposure is enabled
    #[error("{error}")]
    Upstream {
        error: String,
        detail: Option<String>,
    },

    /// Anything else that went wrong inside the server
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream { .. } | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::Upstream { error, detail } => {
                ApiResponse::<()>::failure(error.clone()).with_optional_message(detail.clone())
            }
            other => ApiResponse::<()>::failure(other.to_string()),
        };

        let mut response = (status, Json(body)).into_response();

        if let ApiError::RateLimited {
            limit,
            retry_after_secs,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("ratelimit-limit", HeaderValue::from(limit));
            headers.insert("ratelimit-remaining", HeaderValue::from(0u32));
            headers.insert("ratelimit-reset", HeaderValue::from(retry_after_secs));
        }

        response
    }
}

// == Result Type Alias ==
/// Convenience Result type for the CDN server.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_maps_to_bad_request() {
        let response = ApiError::Validation("No file provided".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No file provided");
    }

    #[tokio::test]
    async fn test_upstream_hides_detail_when_absent() {
        let response = ApiError::Upstream {
            error: "Failed to list files".into(),
            detail: None,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Failed to list files");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_headers() {
        let response = ApiError::RateLimited {
            limit: 20,
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(response.headers()["ratelimit-limit"], "20");
    }

    #[test]
    fn test_auth_statuses() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
    }
}
