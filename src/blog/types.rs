//! Blog types and error definitions

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::database::DatabaseError;

/// Column limits of the `blogs` table
pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_AUTHOR_LEN: usize = 100;

/// Blog-specific error type
#[derive(Debug, Error)]
pub enum BlogError {
    #[error("Missing required fields: title, content, author")]
    MissingFields,

    #[error("Invalid blog: {0}")]
    Invalid(String),

    #[error("Invalid blog ID: {0}")]
    InvalidId(String),

    #[error("Blog not found: {0}")]
    NotFound(i32),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result type for blog operations
pub type BlogResult<T> = Result<T, BlogError>;

/// A stored blog post
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Blog {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Request body for creating a blog. Every field is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBlog {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// A blog that passed validation and can be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct BlogDraft {
    pub title: String,
    pub content: String,
    pub author: String,
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

impl NewBlog {
    /// Validate the request
    pub fn validate(self) -> BlogResult<BlogDraft> {
        let (Some(title), Some(content), Some(author)) = (
            present(self.title),
            present(self.content),
            present(self.author),
        ) else {
            return Err(BlogError::MissingFields);
        };

        if title.chars().count() > MAX_TITLE_LEN {
            return Err(BlogError::Invalid(format!(
                "title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }

        if author.chars().count() > MAX_AUTHOR_LEN {
            return Err(BlogError::Invalid(format!(
                "author must be at most {} characters",
                MAX_AUTHOR_LEN
            )));
        }

        Ok(BlogDraft {
            title,
            content,
            author,
        })
    }
}

/// Parse a blog ID from a path segment. Only positive integers are valid.
pub fn parse_blog_id(raw: &str) -> BlogResult<i32> {
    match raw.trim().parse::<i32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(BlogError::InvalidId(raw.to_string())),
    }
}
