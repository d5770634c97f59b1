//! Comment entity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PostId;

/// Store-assigned comment identifier. Independent sequence from `PostId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

impl CommentId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CommentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A comment as stored.
///
/// `parent_id` is `None` for root comments. `has_replies` only ever goes from
/// `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub has_replies: bool,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Sort key shared by both engines: creation time, then id.
    pub(crate) fn order_key(&self) -> (DateTime<Utc>, CommentId) {
        (self.created_at, self.id)
    }
}

/// Input for `Storage::create_comment`. The parent is passed separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: PostId,
    pub author: String,
    pub text: String,
}

impl NewComment {
    pub fn new(post_id: PostId, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            post_id,
            author: author.into(),
            text: text.into(),
        }
    }

    pub fn into_comment(
        self,
        id: CommentId,
        parent_id: Option<CommentId>,
        created_at: DateTime<Utc>,
    ) -> Comment {
        Comment {
            id,
            post_id: self.post_id,
            parent_id,
            author: self.author,
            text: self.text,
            created_at,
            has_replies: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_comment_starts_without_replies() {
        let comment = NewComment::new(PostId(1), "bob", "first")
            .into_comment(CommentId(3), Some(CommentId(2)), Utc::now());

        assert!(!comment.has_replies);
        assert!(!comment.is_root());
        assert_eq!(comment.parent_id, Some(CommentId(2)));
    }

    #[test]
    fn parent_serializes_as_null_for_roots() {
        let comment =
            NewComment::new(PostId(1), "bob", "hi").into_comment(CommentId(1), None, Utc::now());
        let json = serde_json::to_value(&comment).unwrap();

        assert!(json["parentId"].is_null());
        assert_eq!(json["postId"], 1);
        assert_eq!(json["hasReplies"], false);
    }
}
