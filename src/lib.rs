// Core: database connection layer
pub mod database;

// Shared components
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain
pub mod blog;

// Application layer
pub mod api;
pub mod server;
pub mod tasks;
