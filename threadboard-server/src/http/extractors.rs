//! Custom Axum extractors

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use super::error::ApiError;
use crate::models::{validation::positive_id, PostId, ValidationError};

/// Extract and validate a post id from the `{id}` path segment
pub struct ValidPostId(pub PostId);

impl<S> FromRequestParts<S> for ValidPostId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "post id" }))?;

        let id = raw.parse::<i64>().map_err(|_| {
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "post id",
                reason: "must be an integer",
            })
        })?;

        Ok(Self(PostId(positive_id("post id", id)?)))
    }
}
