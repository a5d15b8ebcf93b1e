use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::blog::BlogError;
use crate::database::{DatabaseError, ErrorKind};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<BlogError> for AppError {
    fn from(err: BlogError) -> Self {
        match err {
            BlogError::MissingFields | BlogError::Invalid(_) | BlogError::InvalidId(_) => {
                AppError::Validation(err.to_string())
            }
            BlogError::NotFound(_) => AppError::NotFound(err.to_string()),
            BlogError::Database(e) => AppError::Database(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn database_status(err: &DatabaseError) -> StatusCode {
    match err.kind() {
        ErrorKind::Query | ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::NetworkTimeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, kind, client_message, log_message) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                None,
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                None,
                msg.clone(),
                msg.clone(),
            ),
            AppError::Database(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Database temporarily unavailable".to_string()
                } else {
                    log_msg.clone()
                };
                (database_status(e), "DATABASE_ERROR", Some(e.kind()), client_msg, log_msg)
            }
        };

        // Always log the detailed error server-side
        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::warn!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API request rejected"
            );
        }

        let body = ErrorResponse {
            success: false,
            message: client_message,
            error: ErrorBody {
                code: code.to_string(),
                kind,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blog_error_mapping() {
        let err: AppError = BlogError::MissingFields.into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: AppError = BlogError::InvalidId("abc".to_string()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err: AppError = BlogError::NotFound(7).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status() {
        let err = AppError::Database(DatabaseError::query(sqlx::Error::RowNotFound));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AppError::Database(DatabaseError::ConnectionRefused {
            addr: "db:5432".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::Database(DatabaseError::NetworkTimeout {
            addr: "db:5432".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
