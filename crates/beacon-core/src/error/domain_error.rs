//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Authentication Errors
    // =========================================================================
    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Credential expired")]
    CredentialExpired,

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Check if this is an authentication failure
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::InvalidCredential | Self::CredentialExpired)
    }
}
