use std::sync::Arc;

use proptest::prelude::*;
use threadboard_server::models::{CommentId, CommentQuery, NewComment, NewPost};
use threadboard_server::{MemoryStore, Storage};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Create `count` root comments on a fresh post, then page through them.
async fn walk(count: usize, page_size: i64) -> (Vec<CommentId>, Vec<CommentId>) {
    let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let post = store
        .create_post(NewPost::new("p", "ann", "", true))
        .await
        .unwrap();

    let mut created = Vec::with_capacity(count);
    for i in 0..count {
        let comment = store
            .create_comment(NewComment::new(post.id, "bob", format!("#{i}")), None)
            .await
            .unwrap();
        created.push(comment.id);
    }

    let mut seen = Vec::new();
    let mut after = 0;
    loop {
        let page = store
            .get_comments(post.id, CommentQuery::roots(page_size).after(after))
            .await
            .unwrap();
        assert!(page.len() as i64 <= page_size);
        match page.last() {
            Some(last) => after = last.id.get(),
            None => break,
        }
        seen.extend(page.iter().map(|c| c.id));
    }

    (created, seen)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: paging yields every comment exactly once, in creation order
    #[test]
    fn prop_paging_visits_everything_once(count in 0usize..60, page_size in 1i64..12) {
        let (created, seen) = runtime().block_on(walk(count, page_size));
        prop_assert_eq!(seen, created);
    }

    /// Property: a non-positive limit never returns anything
    #[test]
    fn prop_non_positive_limit_is_empty(count in 0usize..10, limit in -5i64..=0) {
        let rt = runtime();
        let empty = rt.block_on(async {
            let store = MemoryStore::new();
            let post = store.create_post(NewPost::new("p", "a", "", true)).await.unwrap();
            for _ in 0..count {
                store
                    .create_comment(NewComment::new(post.id, "a", "t"), None)
                    .await
                    .unwrap();
            }
            store
                .get_comments(post.id, CommentQuery::roots(limit))
                .await
                .unwrap()
                .is_empty()
        });
        prop_assert!(empty);
    }
}
