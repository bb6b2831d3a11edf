use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Validation(String),

    #[error("Session is full: {0}")]
    Capacity(String),

    #[error("Signup is closed")]
    Closed,

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// User-fixable errors. The form goes back to editing with its values intact.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::Capacity(_))
    }

    /// Store or network failures. Nothing was written, the caller may retry.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Unavailable(_))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Capacity(name) => (
                StatusCode::CONFLICT,
                format!("Session is full: {}", name),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Closed => (StatusCode::FORBIDDEN, "Signup is closed".to_string()),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Store unavailable, please retry".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                error!("store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Store unavailable, please retry".to_string(),
                )
            }
            AppError::Notification(msg) => {
                error!("notification error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Notification failed".to_string())
            }
            AppError::Config(msg) => {
                error!("configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
