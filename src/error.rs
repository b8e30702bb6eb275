/// Error types for the academy service
///
/// `AppError` is what domain operations return; it implements `IntoResponse`
/// so handlers can use `?` directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing input, surfaced verbatim
    #[error("{0}")]
    Validation(String),

    /// Missing, unknown or expired bearer session
    #[error("Authentication required")]
    Unauthenticated,

    /// Role or ownership check failed
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Unknown id
    #[error("{0} not found")]
    NotFound(String),

    /// Unknown, expired, redeemed or closed payment token
    #[error("Invalid or expired payment link")]
    InvalidToken,

    /// Illegal transition or lost a concurrent update
    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::InvalidToken => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "❌ Database error");
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "❌ Internal error");
                "Internal server error".to_string()
            }
            AppError::Forbidden(reason) => {
                tracing::warn!("🚫 Access denied: {}", reason);
                "Access denied".to_string()
            }
            AppError::Conflict(msg) => format!("{msg}; please refresh and retry"),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
