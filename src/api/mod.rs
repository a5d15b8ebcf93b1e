//! API layer - HTTP endpoint handlers organized by domain.

mod blogs;
mod database;
mod health;
mod metrics;
mod response;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use blogs::{create_blog, create_blog_table, delete_blog, get_blog, hello, list_blogs};
pub use database::{heartbeat, network_diagnose};
pub use health::health;
pub use metrics::prometheus_metrics;
pub use response::ApiResponse;
pub use routes::api_routes;
