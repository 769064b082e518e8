use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Message shown to visitors for any rejected token.
///
/// Inactive, expired and unknown tokens all produce this same text.
pub const INVALID_TOKEN_MESSAGE: &str = "invalid token";

/// Standard error type for the perimeter gate.
#[derive(Debug, Error)]
pub enum PerimeterError {
    #[error("Access token already exists: {0}")]
    DuplicateToken(String),

    #[error("{}", INVALID_TOKEN_MESSAGE)]
    InvalidToken,

    #[error("Failed to record token use: {0}")]
    Recording(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl PerimeterError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PerimeterError::DuplicateToken(_) => StatusCode::CONFLICT,
            PerimeterError::InvalidToken => StatusCode::FORBIDDEN,
            PerimeterError::NotFound(_) => StatusCode::NOT_FOUND,
            PerimeterError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PerimeterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            PerimeterError::Recording(_)
            | PerimeterError::Config(_)
            | PerimeterError::Cache(_)
            | PerimeterError::Internal(_)
            | PerimeterError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            PerimeterError::DuplicateToken(_) => "DUPLICATE_TOKEN",
            PerimeterError::InvalidToken => "INVALID_TOKEN",
            PerimeterError::Recording(_) => "RECORDING_FAILED",
            PerimeterError::NotFound(_) => "NOT_FOUND",
            PerimeterError::Validation(_) => "VALIDATION_ERROR",
            PerimeterError::BadRequest(_) => "BAD_REQUEST",
            PerimeterError::Config(_) => "CONFIG_ERROR",
            PerimeterError::Cache(_) => "CACHE_ERROR",
            PerimeterError::Internal(_) => "INTERNAL_ERROR",
            PerimeterError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Whether the failure came from the store or cache backend.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            PerimeterError::Database(_) | PerimeterError::Cache(_) | PerimeterError::Recording(_)
        )
    }
}

/// Error detail for API responses.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

impl axum::response::IntoResponse for PerimeterError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        // Backend details stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "perimeter request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
            },
        };

        (status, axum::Json(body)).into_response()
    }
}
