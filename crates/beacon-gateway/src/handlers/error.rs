//! Handler error types

use beacon_core::DomainError;
use thiserror::Error;

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Credential missing, invalid, or expired
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Global connection capacity reached
    #[error("Capacity exceeded: {0} connections")]
    CapacityExceeded(usize),

    /// The peer is gone; nothing can be delivered
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Domain error (from collaborators)
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Whether the socket must be closed after this error
    ///
    /// Protocol-level noise keeps the connection open; authentication,
    /// capacity, and transport failures end it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AuthenticationFailed(_) | Self::CapacityExceeded(_) | Self::SendFailed(_) => true,
            Self::Domain(e) => e.is_authentication(),
            Self::Internal(_) => false,
        }
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
