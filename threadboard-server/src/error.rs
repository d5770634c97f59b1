//! Storage error type shared by both engines

use std::time::Duration;

use thiserror::Error;

use crate::models::{CommentId, PostId};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by `Storage` implementations.
///
/// Nothing here is retried inside the stores; a failed `create_comment` is
/// reported once and the caller decides what to do.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("post not found: {id}")]
    PostNotFound { id: PostId },

    #[error("comments are not allowed for post {post_id}")]
    CommentsNotAllowed { post_id: PostId },

    #[error("parent comment not found: {id}")]
    ParentCommentNotFound { id: CommentId },

    #[error("storage unavailable: {0}")]
    ResourceUnavailable(#[from] sqlx::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl StoreError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// True for the "does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PostNotFound { .. } | Self::ParentCommentNotFound { .. }
        )
    }
}
