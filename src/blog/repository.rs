//! Blog persistence on top of the query executor.

use sqlx::FromRow;

use crate::database::{QueryExecutor, SqlParam};

use super::types::{Blog, BlogDraft, BlogError, BlogResult};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS blogs (
        id SERIAL PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        content TEXT NOT NULL,
        author VARCHAR(100) NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_blogs_created_at ON blogs(created_at);
    CREATE INDEX IF NOT EXISTS idx_blogs_author ON blogs(author);
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO blogs (title, content, author)
    VALUES ($1, $2, $3)
    RETURNING id, title, content, author, created_at, updated_at
"#;

const LIST_SQL: &str = r#"
    SELECT id, title, content, author, created_at, updated_at
    FROM blogs
    ORDER BY created_at DESC
"#;

const GET_SQL: &str = r#"
    SELECT id, title, content, author, created_at, updated_at
    FROM blogs
    WHERE id = $1
"#;

const DELETE_SQL: &str = "DELETE FROM blogs WHERE id = $1 RETURNING id";

#[derive(FromRow)]
struct DeletedId {
    id: i32,
}

/// Blog table operations.
#[derive(Clone)]
pub struct BlogRepository {
    executor: QueryExecutor,
}

impl BlogRepository {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    /// Create the `blogs` table and its indexes if they do not exist yet.
    pub async fn create_table(&self) -> BlogResult<()> {
        self.executor.execute_batch(CREATE_TABLE_SQL).await?;
        tracing::info!("blogs table is ready");
        Ok(())
    }

    pub async fn create(&self, draft: BlogDraft) -> BlogResult<Blog> {
        let params = [
            SqlParam::from(draft.title),
            SqlParam::from(draft.content),
            SqlParam::from(draft.author),
        ];
        let rows = self.executor.query(INSERT_SQL, &params).await?;

        let blog: Blog = rows
            .first()?
            .ok_or_else(|| BlogError::Invalid("insert returned no row".to_string()))?;
        tracing::info!(blog_id = blog.id, author = %blog.author, "Blog created");
        Ok(blog)
    }

    /// All blogs, newest first.
    pub async fn list(&self) -> BlogResult<Vec<Blog>> {
        let rows = self.executor.query(LIST_SQL, &[]).await?;
        Ok(rows.decode()?)
    }

    pub async fn get(&self, id: i32) -> BlogResult<Blog> {
        let rows = self.executor.query(GET_SQL, &[SqlParam::from(id)]).await?;
        rows.first()?.ok_or(BlogError::NotFound(id))
    }

    /// Delete one blog and return its id.
    pub async fn delete(&self, id: i32) -> BlogResult<i32> {
        let rows = self
            .executor
            .query(DELETE_SQL, &[SqlParam::from(id)])
            .await?;

        let deleted: DeletedId = rows.first()?.ok_or(BlogError::NotFound(id))?;
        tracing::info!(blog_id = deleted.id, "Blog deleted");
        Ok(deleted.id)
    }
}
