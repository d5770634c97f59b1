//! API error type with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.
//! Storage failures and internal details are logged, never sent to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::StoreError;
use crate::models::ValidationError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Request body or parameter failed validation (400)
    Validation(ValidationError),

    /// Store rejected an argument (400)
    InvalidArgument { reason: String },

    /// Post or parent comment missing (404)
    NotFound { message: String },

    /// Post is locked for comments (403)
    Forbidden { reason: String },

    /// Database unreachable or failing (503, logged)
    Unavailable(StoreError),

    /// Storage deadline exceeded (504)
    Timeout { operation: &'static str, millis: u128 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": e.to_string()
                }),
            ),
            Self::InvalidArgument { reason } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "invalid_argument",
                    "message": reason
                }),
            ),
            Self::NotFound { message } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": message
                }),
            ),
            Self::Forbidden { reason } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "forbidden",
                    "message": reason
                }),
            ),
            Self::Unavailable(e) => {
                tracing::error!(error = %e, "Storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error": "unavailable",
                        "message": "storage is temporarily unavailable"
                    }),
                )
            }
            Self::Timeout { operation, millis } => {
                tracing::error!(operation, millis = *millis as u64, "Storage timeout");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    json!({
                        "error": "timeout",
                        "message": format!("operation timed out after {} ms", millis)
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PostNotFound { .. } | StoreError::ParentCommentNotFound { .. } => {
                Self::NotFound {
                    message: e.to_string(),
                }
            }
            StoreError::CommentsNotAllowed { .. } => Self::Forbidden {
                reason: e.to_string(),
            },
            StoreError::InvalidArgument { reason } => Self::InvalidArgument { reason },
            StoreError::Timeout { operation, after } => Self::Timeout {
                operation,
                millis: after.as_millis(),
            },
            StoreError::ResourceUnavailable(_) => Self::Unavailable(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentId, PostId};
    use std::time::Duration;

    fn status(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn validation_error_is_400() {
        assert_eq!(
            status(ValidationError::Empty { field: "title" }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(StoreError::invalid_argument("limit")),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_resources_are_404() {
        assert_eq!(
            status(StoreError::PostNotFound { id: PostId(1) }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(StoreError::ParentCommentNotFound { id: CommentId(2) }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn locked_post_is_403() {
        assert_eq!(
            status(StoreError::CommentsNotAllowed { post_id: PostId(1) }),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn storage_failures_are_5xx() {
        assert_eq!(
            status(StoreError::ResourceUnavailable(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(StoreError::Timeout {
                operation: "get_posts",
                after: Duration::from_millis(5),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
