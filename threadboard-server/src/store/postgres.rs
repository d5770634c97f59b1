//! Postgres storage engine
//!
//! # Schema
//!
//! ```text
//! posts              (id, title, author, content, allow_comments, created_at)
//! comments           (id, post_id, author, text, has_replies, created_at)
//! comment_hierarchy  (parent_id, child_id)   -- one row per reply
//! ```
//!
//! A comment is a root comment exactly when it has no `comment_hierarchy` row
//! as child. Comment creation runs in one transaction: the post row is locked
//! `FOR SHARE`, the parent row `FOR UPDATE`, and the insert, edge and
//! `has_replies` flip commit or roll back together.
//!
//! Every operation runs under the configured read or write deadline.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::Storage;
use crate::config::{StorageKind, Timeouts};
use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::models::{Comment, CommentId, CommentQuery, NewComment, NewPost, Post, PostId};

const POST_COLUMNS: &str = "id, title, author, content, allow_comments, created_at";

/// Locate the cursor row inside the selected set ($1 post, $2 parent or NULL, $3 cursor id).
const CURSOR_SQL: &str = r#"
    SELECT c.created_at, c.id
    FROM comments c
    LEFT JOIN comment_hierarchy h ON h.child_id = c.id
    WHERE c.post_id = $1
      AND h.parent_id IS NOT DISTINCT FROM $2
      AND c.id = $3
"#;

/// One page of the selected set, strictly after the cursor position when given.
const PAGE_SQL: &str = r#"
    SELECT c.id, c.post_id, h.parent_id, c.author, c.text, c.created_at, c.has_replies
    FROM comments c
    LEFT JOIN comment_hierarchy h ON h.child_id = c.id
    WHERE c.post_id = $1
      AND h.parent_id IS NOT DISTINCT FROM $2
      AND ($3::TIMESTAMPTZ IS NULL OR (c.created_at, c.id) > ($3::TIMESTAMPTZ, $4::BIGINT))
    ORDER BY c.created_at ASC, c.id ASC
    LIMIT $5
"#;

#[derive(Debug, FromRow)]
struct PostRow {
    id: i64,
    title: String,
    author: String,
    content: String,
    allow_comments: bool,
    created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: PostId(row.id),
            title: row.title,
            author: row.author,
            content: row.content,
            allow_comments: row.allow_comments,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    parent_id: Option<i64>,
    author: String,
    text: String,
    created_at: DateTime<Utc>,
    has_replies: bool,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: CommentId(row.id),
            post_id: PostId(row.post_id),
            parent_id: row.parent_id.map(CommentId),
            author: row.author,
            text: row.text,
            created_at: row.created_at,
            has_replies: row.has_replies,
        }
    }
}

/// Run `fut`, turning an expired deadline into `StoreError::Timeout`.
async fn with_deadline<T, F>(operation: &'static str, limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Storage deadline exceeded");
            Err(StoreError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}

/// Transactional relational implementation of [`Storage`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    timeouts: Timeouts,
}

impl PostgresStore {
    /// Connect a new pool.
    ///
    /// Connection setup is bounded by the read timeout.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeouts: Timeouts,
    ) -> StoreResult<Self> {
        let pool = with_deadline(
            "connect",
            timeouts.read,
            open_pool(database_url, max_connections, timeouts),
        )
        .await?;

        Ok(Self::from_pool(pool, timeouts))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, timeouts: Timeouts) -> Self {
        Self { pool, timeouts }
    }

    /// Create tables and indexes if they are missing.
    pub async fn migrate(&self) -> StoreResult<()> {
        with_deadline("migrate", self.timeouts.write, self.run_migrations()).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        db::migrations::run(&self.pool).await?;
        Ok(())
    }

    async fn insert_post(&self, post: NewPost) -> StoreResult<Post> {
        let row: PostRow = sqlx::query_as(&format!(
            "INSERT INTO posts (title, author, content, allow_comments) \
             VALUES ($1, $2, $3, $4) RETURNING {POST_COLUMNS}"
        ))
        .bind(&post.title)
        .bind(&post.author)
        .bind(&post.content)
        .bind(post.allow_comments)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(post_id = row.id, "Created post");
        Ok(row.into())
    }

    async fn insert_comment(
        &self,
        comment: NewComment,
        parent_id: Option<CommentId>,
    ) -> StoreResult<Comment> {
        let post_id = comment.post_id;
        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let allow: Option<(bool,)> =
            sqlx::query_as("SELECT allow_comments FROM posts WHERE id = $1 FOR SHARE")
                .bind(post_id.get())
                .fetch_optional(&mut *tx)
                .await?;

        match allow {
            None => return Err(StoreError::PostNotFound { id: post_id }),
            Some((false,)) => return Err(StoreError::CommentsNotAllowed { post_id }),
            Some((true,)) => {}
        }

        if let Some(parent) = parent_id {
            let found: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM comments WHERE id = $1 AND post_id = $2 FOR UPDATE")
                    .bind(parent.get())
                    .bind(post_id.get())
                    .fetch_optional(&mut *tx)
                    .await?;

            if found.is_none() {
                return Err(StoreError::ParentCommentNotFound { id: parent });
            }
        }

        let mut row: CommentRow = sqlx::query_as(
            r#"
            INSERT INTO comments (post_id, author, text, created_at)
            VALUES ($1, $2, $3, clock_timestamp())
            RETURNING id, post_id, NULL::BIGINT AS parent_id, author, text, created_at, has_replies
            "#,
        )
        .bind(post_id.get())
        .bind(&comment.author)
        .bind(&comment.text)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(parent) = parent_id {
            sqlx::query("INSERT INTO comment_hierarchy (parent_id, child_id) VALUES ($1, $2)")
                .bind(parent.get())
                .bind(row.id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("UPDATE comments SET has_replies = TRUE WHERE id = $1")
                .bind(parent.get())
                .execute(&mut *tx)
                .await?;

            row.parent_id = Some(parent.get());
        }

        tx.commit().await?;

        tracing::debug!(post_id = %post_id, comment_id = row.id, parent_id = ?parent_id, "Created comment");
        Ok(row.into())
    }

    async fn select_post(&self, id: PostId) -> StoreResult<Post> {
        let row: Option<PostRow> =
            sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Post::from).ok_or(StoreError::PostNotFound { id })
    }

    async fn select_posts(&self) -> StoreResult<Vec<Post>> {
        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn select_comments(
        &self,
        post_id: PostId,
        query: CommentQuery,
    ) -> StoreResult<Vec<Comment>> {
        // One snapshot for the existence checks, cursor lookup and page.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let (post_exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
                .bind(post_id.get())
                .fetch_one(&mut *tx)
                .await?;
        if !post_exists {
            return Err(StoreError::PostNotFound { id: post_id });
        }

        let parent = query.parent_id.map(CommentId::get);
        if let Some(parent_id) = query.parent_id {
            let (parent_exists,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1 AND post_id = $2)",
            )
            .bind(parent_id.get())
            .bind(post_id.get())
            .fetch_one(&mut *tx)
            .await?;
            if !parent_exists {
                return Err(StoreError::ParentCommentNotFound { id: parent_id });
            }
        }

        if query.limit <= 0 {
            return Ok(Vec::new());
        }

        let cursor: Option<(DateTime<Utc>, i64)> = if query.has_cursor() {
            let found: Option<(DateTime<Utc>, i64)> = sqlx::query_as(CURSOR_SQL)
                .bind(post_id.get())
                .bind(parent)
                .bind(query.after_id)
                .fetch_optional(&mut *tx)
                .await?;
            match found {
                Some(position) => Some(position),
                // Stale or foreign cursor: nothing comes after it.
                None => return Ok(Vec::new()),
            }
        } else {
            None
        };

        let rows: Vec<CommentRow> = sqlx::query_as(PAGE_SQL)
            .bind(post_id.get())
            .bind(parent)
            .bind(cursor.map(|(at, _)| at))
            .bind(cursor.map(|(_, id)| id))
            .bind(query.limit)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }
}

async fn open_pool(
    database_url: &str,
    max_connections: u32,
    timeouts: Timeouts,
) -> StoreResult<PgPool> {
    Ok(db::create_pool_with_options(database_url, max_connections, timeouts.read).await?)
}

#[async_trait]
impl Storage for PostgresStore {
    fn kind(&self) -> StorageKind {
        StorageKind::Postgres
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        with_deadline("create_post", self.timeouts.write, self.insert_post(post)).await
    }

    async fn create_comment(
        &self,
        comment: NewComment,
        parent_id: Option<CommentId>,
    ) -> StoreResult<Comment> {
        with_deadline(
            "create_comment",
            self.timeouts.write,
            self.insert_comment(comment, parent_id),
        )
        .await
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Post> {
        with_deadline("get_post", self.timeouts.read, self.select_post(id)).await
    }

    async fn get_posts(&self) -> StoreResult<Vec<Post>> {
        with_deadline("get_posts", self.timeouts.read, self.select_posts()).await
    }

    async fn get_comments(
        &self,
        post_id: PostId,
        query: CommentQuery,
    ) -> StoreResult<Vec<Comment>> {
        with_deadline(
            "get_comments",
            self.timeouts.read,
            self.select_comments(post_id, query),
        )
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close().await;
        tracing::info!("Closed postgres pool");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_timeout() {
        let result: StoreResult<()> = with_deadline("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(StoreError::Timeout { operation: "slow", .. })
        ));
    }

    #[tokio::test]
    async fn deadline_passes_results_through() {
        let result = with_deadline("fast", Duration::from_secs(1), async {
            Err::<(), _>(StoreError::PostNotFound { id: PostId(4) })
        })
        .await;

        assert!(matches!(result, Err(StoreError::PostNotFound { .. })));
    }

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p threadboard-server -- --ignored

    async fn test_store() -> PostgresStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let store = PostgresStore::connect(&url, 5, Timeouts::default())
            .await
            .expect("connect failed");
        store.migrate().await.expect("migrations failed");
        store
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn comment_lifecycle() {
        let store = test_store().await;
        let post = store
            .create_post(NewPost::new("pg", "ann", "body", true))
            .await
            .unwrap();

        let root = store
            .create_comment(NewComment::new(post.id, "bob", "root"), None)
            .await
            .unwrap();
        let reply = store
            .create_comment(NewComment::new(post.id, "cat", "reply"), Some(root.id))
            .await
            .unwrap();
        assert_eq!(reply.parent_id, Some(root.id));

        let roots = store.get_comments(post.id, CommentQuery::roots(10)).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].has_replies);

        let replies = store
            .get_comments(post.id, CommentQuery::replies(root.id, 10))
            .await
            .unwrap();
        assert_eq!(replies.iter().map(|c| c.id).collect::<Vec<_>>(), vec![reply.id]);

        store.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn cross_post_parent_rolls_back() {
        let store = test_store().await;
        let a = store.create_post(NewPost::new("a", "x", "", true)).await.unwrap();
        let b = store.create_post(NewPost::new("b", "x", "", true)).await.unwrap();
        let foreign = store
            .create_comment(NewComment::new(a.id, "x", "in a"), None)
            .await
            .unwrap();

        let err = store
            .create_comment(NewComment::new(b.id, "x", "in b"), Some(foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ParentCommentNotFound { .. }));

        let a_roots = store.get_comments(a.id, CommentQuery::roots(10)).await.unwrap();
        assert!(!a_roots[0].has_replies);
        assert!(store
            .get_comments(b.id, CommentQuery::roots(10))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn keyset_pagination_matches_memory_engine() {
        let store = test_store().await;
        let post = store.create_post(NewPost::new("p", "x", "", true)).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..5 {
            let c = store
                .create_comment(NewComment::new(post.id, "x", format!("c{i}")), None)
                .await
                .unwrap();
            ids.push(c.id);
        }

        let page = |after: i64| {
            let store = store.clone();
            async move {
                store
                    .get_comments(post.id, CommentQuery::roots(2).after(after))
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|c| c.id)
                    .collect::<Vec<_>>()
            }
        };

        assert_eq!(page(0).await, ids[0..2]);
        assert_eq!(page(ids[1].get()).await, ids[2..4]);
        assert_eq!(page(ids[3].get()).await, ids[4..5]);
        assert!(page(i64::MAX).await.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn locked_post_rejects_comments() {
        let store = test_store().await;
        let post = store.create_post(NewPost::new("p", "x", "", false)).await.unwrap();

        let err = store
            .create_comment(NewComment::new(post.id, "x", "nope"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CommentsNotAllowed { .. }));
    }
}
