//! Error types shared across Health Butler crates

use thiserror::Error;

/// Service layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External service error: {0}")]
    External(String),

    /// The user must finish onboarding before this action
    #[error("Profile required: {0}")]
    ProfileRequired(String),
}

impl From<Vec<crate::validation::ValidationError>> for ServiceError {
    fn from(errors: Vec<crate::validation::ValidationError>) -> Self {
        let joined = errors
            .iter()
            .map(|e| e.user_message())
            .collect::<Vec<_>>()
            .join("; ");
        ServiceError::Validation(joined)
    }
}
