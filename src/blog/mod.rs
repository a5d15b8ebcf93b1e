//! Blog posts stored in the `blogs` table.

mod repository;
mod types;

pub use repository::BlogRepository;
pub use types::{
    parse_blog_id, Blog, BlogDraft, BlogError, BlogResult, NewBlog, MAX_AUTHOR_LEN, MAX_TITLE_LEN,
};
