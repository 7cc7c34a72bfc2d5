//! Application error handling
//!
//! Services return [`ApiError`]. HTTP handlers turn it into a JSON response,
//! Discord handlers turn it into a message with [`ApiError::user_message`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use health_butler_shared::ServiceError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// API error type that can be converted to HTTP responses
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The user has to run /onboard first
    #[error("Profile required: {0}")]
    ProfileRequired(String),
}

impl ApiError {
    /// Text safe to show to a Discord user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::ProfileRequired(msg) => msg.clone(),
            ApiError::Unauthorized(_) => "You are not allowed to do that.".to_string(),
            ApiError::Internal(_) | ApiError::Database(_) => {
                "Something went wrong on my side. Please try again in a moment.".to_string()
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::Validation(msg),
            ServiceError::NotFound(msg) => ApiError::NotFound(msg),
            ServiceError::ProfileRequired(msg) => ApiError::ProfileRequired(msg),
            ServiceError::Database(msg) | ServiceError::External(msg) => {
                ApiError::Internal(anyhow::anyhow!(msg))
            }
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::ProfileRequired(msg) => {
                (StatusCode::PRECONDITION_REQUIRED, "PROFILE_REQUIRED", msg.clone())
            }
            ApiError::Internal(err) => {
                error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Database(err) => {
                error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field: None,
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status() {
        let error = ApiError::Validation("Invalid input".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status() {
        let error = ApiError::NotFound("User not found".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unauthorized_error_status() {
        let error = ApiError::Unauthorized("invalid request signature".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_service_error_conversion() {
        let err: ApiError = ServiceError::ProfileRequired("Run /onboard first".to_string()).into();
        assert!(matches!(err, ApiError::ProfileRequired(_)));
        assert_eq!(err.user_message(), "Run /onboard first");

        let err: ApiError = ServiceError::External("gemini down".to_string()).into();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(!err.user_message().contains("gemini"));
    }
}
