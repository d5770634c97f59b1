//! In-memory storage engine
//!
//! Reference semantics for ordering, pagination and hierarchy.
//!
//! # Locking
//!
//! Three independent `RwLock`s guard posts, root-comment sets ("threads") and
//! the reply hierarchy. Whenever more than one is held they are acquired in
//! this order, and released in reverse:
//!
//! ```text
//! posts  ->  threads  ->  hierarchy
//! ```
//!
//! `create_comment` holds `posts` (read) plus `threads` and `hierarchy`
//! (write) across the whole check-then-insert sequence, so id order, insertion
//! order and visibility always agree. Readers copy records out before sorting;
//! stored vectors are never reordered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::Storage;
use crate::config::StorageKind;
use crate::error::{StoreError, StoreResult};
use crate::models::{Comment, CommentId, CommentQuery, NewComment, NewPost, Post, PostId};

/// Posts plus their id counter, guarded together.
#[derive(Debug, Default)]
struct PostTable {
    last_id: i64,
    rows: HashMap<PostId, Post>,
}

/// Every comment record, indexed by id, and the parent -> replies edges.
#[derive(Debug, Default)]
struct Hierarchy {
    records: HashMap<CommentId, Comment>,
    replies: HashMap<CommentId, Vec<CommentId>>,
}

impl Hierarchy {
    /// Look up a comment that belongs to `post_id`.
    fn find(&self, post_id: PostId, id: CommentId) -> Option<&Comment> {
        self.records.get(&id).filter(|c| c.post_id == post_id)
    }

    fn collect(&self, ids: &[CommentId]) -> Vec<Comment> {
        ids.iter()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }
}

/// Concurrent in-process implementation of [`Storage`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    posts: RwLock<PostTable>,
    threads: RwLock<HashMap<PostId, Vec<CommentId>>>,
    hierarchy: RwLock<Hierarchy>,
    last_comment_id: AtomicI64,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post_count(&self) -> usize {
        self.posts.read().await.rows.len()
    }

    pub async fn comment_count(&self) -> usize {
        self.hierarchy.read().await.records.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Storage for MemoryStore {
    fn kind(&self) -> StorageKind {
        StorageKind::InMemory
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut posts = self.posts.write().await;

        posts.last_id += 1;
        let id = PostId(posts.last_id);
        let post = post.into_post(id, Utc::now());
        posts.rows.insert(id, post.clone());

        tracing::debug!(post_id = %id, "Created post");
        Ok(post)
    }

    async fn create_comment(
        &self,
        comment: NewComment,
        parent_id: Option<CommentId>,
    ) -> StoreResult<Comment> {
        let posts = self.posts.read().await;
        let mut threads = self.threads.write().await;
        let mut hierarchy = self.hierarchy.write().await;

        let post_id = comment.post_id;
        let post = posts
            .rows
            .get(&post_id)
            .ok_or(StoreError::PostNotFound { id: post_id })?;

        if !post.allow_comments {
            return Err(StoreError::CommentsNotAllowed { post_id });
        }

        if let Some(parent) = parent_id {
            if hierarchy.find(post_id, parent).is_none() {
                return Err(StoreError::ParentCommentNotFound { id: parent });
            }
        }

        // Nothing can fail past this point.
        let id = CommentId(self.last_comment_id.fetch_add(1, Ordering::AcqRel) + 1);
        let created = comment.into_comment(id, parent_id, Utc::now());

        match parent_id {
            Some(parent) => {
                if let Some(record) = hierarchy.records.get_mut(&parent) {
                    record.has_replies = true;
                }
                hierarchy.replies.entry(parent).or_default().push(id);
            }
            None => threads.entry(post_id).or_default().push(id),
        }
        hierarchy.records.insert(id, created.clone());

        tracing::debug!(post_id = %post_id, comment_id = %id, parent_id = ?parent_id, "Created comment");
        Ok(created)
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Post> {
        self.posts
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::PostNotFound { id })
    }

    async fn get_posts(&self) -> StoreResult<Vec<Post>> {
        let mut posts: Vec<Post> = self.posts.read().await.rows.values().cloned().collect();
        posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(posts)
    }

    async fn get_comments(
        &self,
        post_id: PostId,
        query: CommentQuery,
    ) -> StoreResult<Vec<Comment>> {
        let posts = self.posts.read().await;
        let threads = self.threads.read().await;
        let hierarchy = self.hierarchy.read().await;

        if !posts.rows.contains_key(&post_id) {
            return Err(StoreError::PostNotFound { id: post_id });
        }

        let mut selected = match query.parent_id {
            None => threads
                .get(&post_id)
                .map(|ids| hierarchy.collect(ids))
                .unwrap_or_default(),
            Some(parent) => {
                if hierarchy.find(post_id, parent).is_none() {
                    return Err(StoreError::ParentCommentNotFound { id: parent });
                }
                hierarchy
                    .replies
                    .get(&parent)
                    .map(|ids| hierarchy.collect(ids))
                    .unwrap_or_default()
            }
        };
        drop(hierarchy);
        drop(threads);
        drop(posts);

        selected.sort_by_key(Comment::order_key);
        Ok(query.paginate(selected))
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Closed in-memory store");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn store_with_post(allow_comments: bool) -> (MemoryStore, Post) {
        let store = MemoryStore::new();
        let post = store
            .create_post(NewPost::new("Title", "ann", "content", allow_comments))
            .await
            .unwrap();
        (store, post)
    }

    #[tokio::test]
    async fn assigns_sequential_post_ids() {
        let store = MemoryStore::new();
        let first = store.create_post(NewPost::new("a", "x", "", true)).await.unwrap();
        let second = store.create_post(NewPost::new("b", "x", "", true)).await.unwrap();

        assert_eq!(first.id, PostId(1));
        assert_eq!(second.id, PostId(2));
        assert!((Utc::now() - first.created_at).num_seconds() < 1);
    }

    #[tokio::test]
    async fn comment_ids_are_independent_of_post_ids() {
        let (store, post) = store_with_post(true).await;
        store.create_post(NewPost::new("b", "x", "", true)).await.unwrap();

        let comment = store
            .create_comment(NewComment::new(post.id, "bob", "hi"), None)
            .await
            .unwrap();
        assert_eq!(comment.id, CommentId(1));
    }

    #[tokio::test]
    async fn rejects_comment_on_locked_post() {
        let (store, post) = store_with_post(false).await;

        let err = store
            .create_comment(NewComment::new(post.id, "bob", "hi"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::CommentsNotAllowed { .. }));
        assert_eq!(store.comment_count().await, 0);
    }

    #[tokio::test]
    async fn rejects_parent_from_another_post() {
        let (store, post) = store_with_post(true).await;
        let other = store.create_post(NewPost::new("o", "x", "", true)).await.unwrap();
        let foreign = store
            .create_comment(NewComment::new(other.id, "bob", "elsewhere"), None)
            .await
            .unwrap();

        let err = store
            .create_comment(NewComment::new(post.id, "bob", "reply"), Some(foreign.id))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::ParentCommentNotFound { id } if id == foreign.id));
        let foreign_after = store
            .get_comments(other.id, CommentQuery::roots(10))
            .await
            .unwrap();
        assert!(!foreign_after[0].has_replies);
    }

    #[tokio::test]
    async fn failed_create_does_not_consume_an_id() {
        let (store, post) = store_with_post(true).await;
        let _ = store
            .create_comment(NewComment::new(post.id, "bob", "x"), Some(CommentId(99)))
            .await;

        let comment = store
            .create_comment(NewComment::new(post.id, "bob", "y"), None)
            .await
            .unwrap();
        assert_eq!(comment.id, CommentId(1));
    }

    #[tokio::test]
    async fn reply_marks_parent_and_nested_reply_marks_reply() {
        let (store, post) = store_with_post(true).await;
        let root = store
            .create_comment(NewComment::new(post.id, "a", "root"), None)
            .await
            .unwrap();
        let reply = store
            .create_comment(NewComment::new(post.id, "b", "reply"), Some(root.id))
            .await
            .unwrap();
        store
            .create_comment(NewComment::new(post.id, "c", "nested"), Some(reply.id))
            .await
            .unwrap();

        let roots = store.get_comments(post.id, CommentQuery::roots(10)).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].has_replies);

        let replies = store
            .get_comments(post.id, CommentQuery::replies(root.id, 10))
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parent_id, Some(root.id));
        assert!(replies[0].has_replies);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_comments_get_unique_ids() {
        let (store, post) = store_with_post(true).await;
        let store = Arc::new(store);
        let post_id = post.id;

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create_comment(NewComment::new(post_id, "w", format!("#{i}")), None)
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().get());
        }
        ids.sort_unstable();

        assert_eq!(ids, (1..=50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn close_is_harmless_on_unused_store() {
        let store = MemoryStore::new();
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_closed());
    }
}
