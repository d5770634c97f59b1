//! Board service: storage plus live fan-out.
//!
//! The only caller of `CommentBroadcaster::notify`. A comment is announced
//! after its `create_comment` has succeeded, never before and never on
//! failure.
//!
//! Creating a comment and notifying observers is one step per post: a
//! per-post sequencer is held across both, and `subscribe` takes the same
//! sequencer. Observers therefore see comments in creation order, and a new
//! observer never receives a comment committed before it registered.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::broadcast::{BroadcastStats, CommentBroadcaster, Subscription};
use crate::config::StorageKind;
use crate::error::StoreResult;
use crate::models::{Comment, CommentId, CommentQuery, NewComment, NewPost, Post, PostId};
use crate::store::Storage;

type Sequencer = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone)]
pub struct BoardService {
    store: Arc<dyn Storage>,
    broadcaster: CommentBroadcaster,
    sequencers: Arc<Mutex<HashMap<PostId, Sequencer>>>,
}

impl BoardService {
    pub fn new(store: Arc<dyn Storage>, broadcaster: CommentBroadcaster) -> Self {
        Self {
            store,
            broadcaster,
            sequencers: Arc::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    pub fn broadcaster(&self) -> &CommentBroadcaster {
        &self.broadcaster
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.store.kind()
    }

    fn sequencer(&self, post_id: PostId) -> Sequencer {
        self.sequencers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(post_id)
            .or_default()
            .clone()
    }

    pub async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let post = self.store.create_post(post).await?;
        tracing::info!(post_id = %post.id, author = %post.author, "Post created");
        Ok(post)
    }

    /// Persist a comment, then deliver it to the post's current observers.
    pub async fn create_comment(
        &self,
        comment: NewComment,
        parent_id: Option<CommentId>,
    ) -> StoreResult<Comment> {
        let sequencer = self.sequencer(comment.post_id);
        let _turn = sequencer.lock().await;

        let comment = self.store.create_comment(comment, parent_id).await?;
        let delivered = self.broadcaster.notify(comment.post_id, &comment);

        tracing::info!(
            post_id = %comment.post_id,
            comment_id = %comment.id,
            delivered,
            "Comment created"
        );
        Ok(comment)
    }

    pub async fn get_post(&self, id: PostId) -> StoreResult<Post> {
        self.store.get_post(id).await
    }

    pub async fn get_posts(&self) -> StoreResult<Vec<Post>> {
        self.store.get_posts().await
    }

    pub async fn get_comments(
        &self,
        post_id: PostId,
        query: CommentQuery,
    ) -> StoreResult<Vec<Comment>> {
        self.store.get_comments(post_id, query).await
    }

    /// Subscribe to new comments on an existing post.
    pub async fn subscribe(&self, post_id: PostId) -> StoreResult<Subscription> {
        let sequencer = self.sequencer(post_id);
        let _turn = sequencer.lock().await;

        self.store.get_post(post_id).await?;
        Ok(self.broadcaster.subscribe(post_id))
    }

    /// Like [`subscribe`](Self::subscribe), ending when `cancel` resolves.
    pub async fn subscribe_until<F>(&self, post_id: PostId, cancel: F) -> StoreResult<Subscription>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sequencer = self.sequencer(post_id);
        let _turn = sequencer.lock().await;

        self.store.get_post(post_id).await?;
        Ok(self.broadcaster.subscribe_until(post_id, cancel))
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.broadcaster.stats()
    }

    pub async fn close(&self) -> StoreResult<()> {
        self.store.close().await
    }
}
