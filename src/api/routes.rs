use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::blogs::{create_blog, create_blog_table, delete_blog, get_blog, hello, list_blogs};
use super::database::{heartbeat, network_diagnose};
use super::health::health;
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Observability
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/heartbeat", get(heartbeat))
        .route("/diagnose", get(network_diagnose))
        .route("/hello", get(hello))
        // Blog endpoints
        .route("/createBlogTable", post(create_blog_table))
        .route("/createBlog", post(create_blog))
        .route("/blogs", get(list_blogs))
        .route("/blog/{id}", get(get_blog))
        .route("/delete/{id}", post(delete_blog))
}
