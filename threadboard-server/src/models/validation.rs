//! Request validation
//!
//! The stores accept any structurally present input. The HTTP layer runs these
//! checks first so obviously broken requests never reach a store.

use std::fmt;

use super::{NewComment, NewPost};

/// Maximum length for post titles
pub const MAX_TITLE_LEN: usize = 256;

/// Maximum length for author names
pub const MAX_AUTHOR_LEN: usize = 64;

/// Maximum length for post content and comment text (64KB)
pub const MAX_BODY_LEN: usize = 65536;

/// Validation error for incoming requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// Value doesn't have the expected shape (e.g. non-positive id)
    InvalidFormat { field: &'static str, reason: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::InvalidFormat { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

impl std::error::Error for ValidationError {}

fn required(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Identifiers handed out by the stores are always positive.
pub fn positive_id(field: &'static str, id: i64) -> Result<i64, ValidationError> {
    if id <= 0 {
        return Err(ValidationError::InvalidFormat {
            field,
            reason: "must be a positive integer",
        });
    }
    Ok(id)
}

impl NewPost {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("title", &self.title, MAX_TITLE_LEN)?;
        required("author", &self.author, MAX_AUTHOR_LEN)?;
        if self.content.len() > MAX_BODY_LEN {
            return Err(ValidationError::TooLong {
                field: "content",
                max: MAX_BODY_LEN,
            });
        }
        Ok(())
    }
}

impl NewComment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("author", &self.author, MAX_AUTHOR_LEN)?;
        required("text", &self.text, MAX_BODY_LEN)
    }
}
