//! Blog CRUD endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::blog::{parse_blog_id, Blog, NewBlog};
use crate::error::{AppError, Result};
use crate::server::AppState;

use super::response::ApiResponse;

#[derive(Debug, Serialize)]
pub struct DeletedBlog {
    pub id: i32,
}

/// GET /hello
pub async fn hello() -> Json<serde_json::Value> {
    Json(json!({ "message": "hello world" }))
}

/// POST /createBlogTable - Create the blogs table and its indexes
#[tracing::instrument(name = "http.create_blog_table", skip(state))]
pub async fn create_blog_table(State(state): State<AppState>) -> Result<Json<ApiResponse<()>>> {
    state.blogs.create_table().await?;
    Ok(Json(ApiResponse::message("blogs table created")))
}

/// POST /createBlog - Create a new blog
#[tracing::instrument(name = "http.create_blog", skip(state, body))]
pub async fn create_blog(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewBlog>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Blog>>)> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let draft = request.validate()?;

    let blog = state.blogs.create(draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("blog created", blog)),
    ))
}

/// GET /blogs - List all blogs, newest first
#[tracing::instrument(name = "http.list_blogs", skip(state))]
pub async fn list_blogs(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Blog>>>> {
    let blogs = state.blogs.list().await?;
    let total = blogs.len();
    Ok(Json(ApiResponse::ok("blogs fetched", blogs).with_total(total)))
}

/// GET /blog/{id} - Get one blog
#[tracing::instrument(name = "http.get_blog", skip(state))]
pub async fn get_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Blog>>> {
    let id = parse_blog_id(&id)?;
    let blog = state.blogs.get(id).await?;
    Ok(Json(ApiResponse::ok("blog fetched", blog)))
}

/// POST /delete/{id} - Delete one blog
#[tracing::instrument(name = "http.delete_blog", skip(state))]
pub async fn delete_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedBlog>>> {
    let id = parse_blog_id(&id)?;
    let id = state.blogs.delete(id).await?;
    Ok(Json(ApiResponse::ok("blog deleted", DeletedBlog { id })))
}
