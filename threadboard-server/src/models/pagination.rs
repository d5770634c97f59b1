//! Keyset pagination over comment threads

use serde::Deserialize;

use super::{Comment, CommentId};

/// Maximum page size accepted from HTTP clients
const MAX_LIMIT: i64 = 100;

/// Default page size for HTTP clients
const DEFAULT_LIMIT: i64 = 20;

/// Selection and cursor for `Storage::get_comments`.
///
/// `parent_id: None` selects the post's root comments, `Some(id)` the direct
/// replies of that comment. `after_id <= 0` means "from the start".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentQuery {
    pub parent_id: Option<CommentId>,
    pub limit: i64,
    pub after_id: i64,
}

impl CommentQuery {
    /// First page of root comments.
    pub fn roots(limit: i64) -> Self {
        Self {
            parent_id: None,
            limit,
            after_id: 0,
        }
    }

    /// First page of direct replies to `parent`.
    pub fn replies(parent: CommentId, limit: i64) -> Self {
        Self {
            parent_id: Some(parent),
            limit,
            after_id: 0,
        }
    }

    /// Continue after the comment with this id.
    pub fn after(mut self, after_id: impl Into<i64>) -> Self {
        self.after_id = after_id.into();
        self
    }

    pub fn has_cursor(&self) -> bool {
        self.after_id > 0
    }

    /// Apply cursor and limit to an already ordered selection.
    ///
    /// A cursor that is not part of the selection yields an empty page.
    pub fn paginate(&self, ordered: Vec<Comment>) -> Vec<Comment> {
        if self.limit <= 0 {
            return Vec::new();
        }

        let start = if self.has_cursor() {
            match ordered.iter().position(|c| c.id.get() == self.after_id) {
                Some(pos) => pos + 1,
                None => return Vec::new(),
            }
        } else {
            0
        };

        ordered
            .into_iter()
            .skip(start)
            .take(self.limit as usize)
            .collect()
    }
}

impl From<CommentId> for i64 {
    fn from(id: CommentId) -> Self {
        id.0
    }
}

/// Query parameters for comment listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentQueryParams {
    pub parent_id: Option<i64>,
    pub limit: Option<i64>,
    pub after_id: Option<i64>,
}

impl From<CommentQueryParams> for CommentQuery {
    fn from(params: CommentQueryParams) -> Self {
        Self {
            parent_id: params.parent_id.map(CommentId),
            limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            after_id: params.after_id.unwrap_or(0),
        }
    }
}
