//! Application error types
//!
//! Unified error handling across the binaries and shared services.

use beacon_core::DomainError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors (listener binding, shutdown signals)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Check if this is an authentication failure
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        match self {
            Self::InvalidToken | Self::TokenExpired => true,
            Self::Domain(e) => e.is_authentication(),
            _ => false,
        }
    }
}

impl From<AppError> for DomainError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidToken => Self::InvalidCredential,
            AppError::TokenExpired => Self::CredentialExpired,
            AppError::Domain(e) => e,
            other => Self::InternalError(other.to_string()),
        }
    }
}

/// Application result type
pub type AppResult<T> = Result<T, AppError>;
