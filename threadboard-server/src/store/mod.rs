//! Storage contract and its two engines
//!
//! ```text
//!             ┌──────────────────────┐
//!             │   Storage (trait)    │
//!             └──────────────────────┘
//!                ↑                ↑
//!     ┌──────────┴─────┐   ┌──────┴──────────┐
//!     │  MemoryStore   │   │  PostgresStore  │
//!     │ (RwLock maps)  │   │ (sqlx, tx'd)    │
//!     └────────────────┘   └─────────────────┘
//! ```
//!
//! Both engines must be observably identical: same ordering, same cursor
//! rules, same errors. The memory engine is the reference.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BoardConfig, StorageKind};
use crate::error::{StoreError, StoreResult};
use crate::models::{Comment, CommentId, CommentQuery, NewComment, NewPost, Post, PostId};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Capability interface every storage engine implements.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Which engine this is.
    fn kind(&self) -> StorageKind;

    /// Persist a post, assigning its id and creation time.
    async fn create_post(&self, post: NewPost) -> StoreResult<Post>;

    /// Persist a comment under `comment.post_id`, optionally as a reply.
    ///
    /// Fails with `PostNotFound`, `CommentsNotAllowed`, or
    /// `ParentCommentNotFound` (parent must live under the same post). On a
    /// reply, the parent's `has_replies` flips to true atomically with the
    /// insert.
    async fn create_comment(
        &self,
        comment: NewComment,
        parent_id: Option<CommentId>,
    ) -> StoreResult<Comment>;

    async fn get_post(&self, id: PostId) -> StoreResult<Post>;

    /// All posts, newest first.
    async fn get_posts(&self) -> StoreResult<Vec<Post>>;

    /// One page of a post's root comments or of a comment's replies, oldest
    /// first.
    async fn get_comments(&self, post_id: PostId, query: CommentQuery)
        -> StoreResult<Vec<Comment>>;

    /// Release underlying resources.
    async fn close(&self) -> StoreResult<()>;
}

/// Build the engine selected by configuration.
///
/// The Postgres engine runs migrations before it is handed out.
pub async fn open_storage(config: &BoardConfig) -> StoreResult<Arc<dyn Storage>> {
    match config.storage {
        StorageKind::InMemory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    StoreError::invalid_argument("DATABASE_URL is required for postgres storage")
                })?;
            tracing::info!(max_connections = config.max_connections, "Using postgres storage");
            let store = PostgresStore::connect(url, config.max_connections, config.timeouts).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}
