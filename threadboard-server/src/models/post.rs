//! Post entity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned post identifier (positive, monotonically increasing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl PostId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PostId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A post as stored. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub author: String,
    pub content: String,
    pub allow_comments: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for `Storage::create_post`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub author: String,
    pub content: String,
    #[serde(default = "default_allow_comments")]
    pub allow_comments: bool,
}

fn default_allow_comments() -> bool {
    true
}

impl NewPost {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
        allow_comments: bool,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            content: content.into(),
            allow_comments,
        }
    }

    /// Materialize the stored record once the store has picked id and timestamp.
    pub fn into_post(self, id: PostId, created_at: DateTime<Utc>) -> Post {
        Post {
            id,
            title: self.title,
            author: self.author,
            content: self.content,
            allow_comments: self.allow_comments,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let post = NewPost::new("Hello", "ann", "body", false).into_post(PostId(7), Utc::now());
        let json = serde_json::to_value(&post).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["allowComments"], false);
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn allow_comments_defaults_to_true() {
        let post: NewPost =
            serde_json::from_str(r#"{"title":"t","author":"a","content":"c"}"#).unwrap();
        assert!(post.allow_comments);
    }
}
