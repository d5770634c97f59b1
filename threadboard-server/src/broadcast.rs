//! Per-post fan-out of newly created comments.
//!
//! Each observer owns a bounded channel. The sending half lives only in the
//! registry, so removing an observer under the registry lock closes its
//! channel exactly once and nothing can be sent to it afterwards.
//!
//! Delivery never blocks the comment creator: `notify` uses `try_send`, a
//! full buffer drops that comment for that observer only, and an observer
//! whose receiver is gone is pruned.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;

use crate::models::{Comment, PostId};

/// Default per-observer buffer.
pub const DEFAULT_BUFFER: usize = 64;

/// Snapshot of broadcaster counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub delivered: u64,
    pub dropped: u64,
    pub observers: usize,
}

#[derive(Debug)]
struct Observer {
    id: u64,
    tx: mpsc::Sender<Comment>,
}

#[derive(Debug)]
struct Registry {
    observers: Mutex<HashMap<PostId, Vec<Observer>>>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    buffer: usize,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<PostId, Vec<Observer>>> {
        // Registry state stays consistent across a panicking holder.
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove one registration. Returns false when it was already gone.
    fn remove(&self, post_id: PostId, observer_id: u64) -> bool {
        let mut observers = self.lock();
        let Some(list) = observers.get_mut(&post_id) else {
            return false;
        };
        let Some(position) = list.iter().position(|o| o.id == observer_id) else {
            return false;
        };
        list.remove(position);
        if list.is_empty() {
            observers.remove(&post_id);
        }
        tracing::debug!(post_id = %post_id, observer_id, "Observer unsubscribed");
        true
    }
}

/// Registry of live observers keyed by post.
///
/// Cheap to clone; clones share one registry.
#[derive(Debug, Clone)]
pub struct CommentBroadcaster {
    inner: Arc<Registry>,
}

impl Default for CommentBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl CommentBroadcaster {
    /// `buffer` is the per-observer channel capacity (at least 1).
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                observers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register an observer for `post_id`.
    ///
    /// Only comments notified after this call are delivered.
    pub fn subscribe(&self, post_id: PostId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .lock()
            .entry(post_id)
            .or_default()
            .push(Observer { id, tx });

        tracing::debug!(post_id = %post_id, observer_id = id, "Observer subscribed");
        Subscription {
            post_id,
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
            release: None,
        }
    }

    /// Register an observer that is removed once `cancel` resolves.
    ///
    /// Must be called from within a tokio runtime. The watcher task also
    /// ends when the returned handle is dropped first.
    pub fn subscribe_until<F>(&self, post_id: PostId, cancel: F) -> Subscription
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe(post_id);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        subscription.release = Some(release_tx);

        let registry = Arc::downgrade(&self.inner);
        let observer_id = subscription.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel => {
                    if let Some(registry) = registry.upgrade() {
                        registry.remove(post_id, observer_id);
                    }
                }
                _ = release_rx => {}
            }
        });

        subscription
    }

    /// Offer `comment` to every observer of `post_id` without blocking.
    ///
    /// Returns how many observers accepted it.
    pub fn notify(&self, post_id: PostId, comment: &Comment) -> usize {
        let mut observers = self.inner.lock();
        let Some(list) = observers.get_mut(&post_id) else {
            return 0;
        };

        let mut accepted = 0;
        list.retain(|observer| match observer.tx.try_send(comment.clone()) {
            Ok(()) => {
                accepted += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    post_id = %post_id,
                    observer_id = observer.id,
                    comment_id = %comment.id,
                    "Observer buffer full, dropping comment"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(post_id = %post_id, observer_id = observer.id, "Pruning closed observer");
                false
            }
        });
        if list.is_empty() {
            observers.remove(&post_id);
        }

        self.inner
            .delivered
            .fetch_add(accepted as u64, Ordering::Relaxed);
        accepted
    }

    /// Remove exactly this registration. Returns false if already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner.remove(subscription.post_id, subscription.id)
    }

    pub fn observer_count(&self, post_id: PostId) -> usize {
        self.inner.lock().get(&post_id).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> BroadcastStats {
        let observers = self.inner.lock().values().map(Vec::len).sum();
        BroadcastStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            observers,
        }
    }
}

/// Observer handle. Yields comments until it is unsubscribed.
///
/// Dropping the handle unregisters it.
#[derive(Debug)]
pub struct Subscription {
    post_id: PostId,
    id: u64,
    rx: mpsc::Receiver<Comment>,
    registry: Weak<Registry>,
    release: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    /// Next comment, or `None` once the subscription is closed and drained.
    pub async fn recv(&mut self) -> Option<Comment> {
        self.rx.recv().await
    }

    /// Unregister now. Comments already buffered can still be received.
    pub fn close(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.post_id, self.id);
        }
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = Comment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Stops a pending `subscribe_until` watcher.
        self.release.take();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.post_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentId, NewComment};
    use chrono::Utc;

    fn comment(post: i64, id: i64) -> Comment {
        NewComment::new(PostId(post), "ann", format!("c{id}")).into_comment(
            CommentId(id),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn delivers_only_to_observers_of_the_post() {
        let broadcaster = CommentBroadcaster::new(4);
        let mut mine = broadcaster.subscribe(PostId(1));
        let mut other = broadcaster.subscribe(PostId(2));

        assert_eq!(broadcaster.notify(PostId(1), &comment(1, 7)), 1);

        assert_eq!(mine.recv().await.unwrap().id, CommentId(7));
        assert!(other.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_buffer_drops_for_that_observer_only() {
        let broadcaster = CommentBroadcaster::new(1);
        let mut slow = broadcaster.subscribe(PostId(1));
        let mut fast = broadcaster.subscribe(PostId(1));

        assert_eq!(broadcaster.notify(PostId(1), &comment(1, 1)), 2);
        fast.recv().await.unwrap();
        assert_eq!(broadcaster.notify(PostId(1), &comment(1, 2)), 1);

        assert_eq!(slow.recv().await.unwrap().id, CommentId(1));
        assert_eq!(fast.recv().await.unwrap().id, CommentId(2));

        let stats = broadcaster.stats();
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.observers, 2);
    }

    #[test]
    fn drop_unregisters() {
        let broadcaster = CommentBroadcaster::default();
        let sub = broadcaster.subscribe(PostId(3));
        assert_eq!(broadcaster.observer_count(PostId(3)), 1);

        drop(sub);
        assert_eq!(broadcaster.observer_count(PostId(3)), 0);
        assert_eq!(broadcaster.notify(PostId(3), &comment(3, 1)), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let broadcaster = CommentBroadcaster::default();
        let a = broadcaster.subscribe(PostId(1));
        let _b = broadcaster.subscribe(PostId(1));

        assert!(broadcaster.unsubscribe(&a));
        assert!(!broadcaster.unsubscribe(&a));
        assert_eq!(broadcaster.observer_count(PostId(1)), 1);
    }

    #[tokio::test]
    async fn close_ends_the_stream_after_buffered_items() {
        let broadcaster = CommentBroadcaster::new(4);
        let mut sub = broadcaster.subscribe(PostId(1));
        broadcaster.notify(PostId(1), &comment(1, 1));

        sub.close();
        assert_eq!(broadcaster.notify(PostId(1), &comment(1, 2)), 0);

        assert_eq!(sub.recv().await.unwrap().id, CommentId(1));
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn zero_buffer_is_raised_to_one() {
        let broadcaster = CommentBroadcaster::new(0);
        let _sub = broadcaster.subscribe(PostId(1));
        assert_eq!(broadcaster.notify(PostId(1), &comment(1, 1)), 1);
    }
}
