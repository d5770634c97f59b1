//! Domain models
//!
//! Entities are assigned identifiers and timestamps by the store; callers only
//! ever construct the `New*` inputs. Request-level validation lives in
//! `validation` and runs before anything reaches a store.

pub mod validation;
pub mod post;
pub mod comment;
pub mod pagination;

pub use validation::ValidationError;
pub use post::{NewPost, Post, PostId};
pub use comment::{Comment, CommentId, NewComment};
pub use pagination::{CommentQuery, CommentQueryParams};
