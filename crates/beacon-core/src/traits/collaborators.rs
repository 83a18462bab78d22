//! Collaborator interfaces consumed by the realtime core

use crate::entities::Notification;
use crate::error::DomainError;
use crate::value_objects::{Role, UserId};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Result type for collaborator operations
pub type CollabResult<T> = Result<T, DomainError>;

/// Identity resolved from a bearer credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

/// Verifies bearer credentials
///
/// The token-issuing flow (login, signup, 2FA) lives outside the realtime
/// core; this port only answers "who is this credential, and what role".
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer credential to a user identity
    async fn resolve_identity(&self, credential: &str) -> CollabResult<Identity>;
}

/// Read access to the notification record store
///
/// Create/mark-read/delete belong to the HTTP handlers; the realtime core
/// only reads the authoritative state when the change signal fires.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// List the most recent notifications for a user, newest first
    async fn list_recent(&self, user_id: UserId, limit: usize) -> CollabResult<Vec<Notification>>;

    /// Count the user's unread notifications
    async fn count_unread(&self, user_id: UserId) -> CollabResult<u64>;
}

/// Per-user change signal
///
/// A lightweight marker decoupled from notification payloads: every store
/// mutation for a user bumps that user's marker.
pub trait ChangeSignal: Send + Sync {
    /// Watch a user's change marker.
    ///
    /// The stream's first item reflects the state already present at watch
    /// registration; consumers swallow it and react only to later items.
    /// The stream ends when the signal hub shuts down.
    fn watch(&self, user_id: UserId) -> BoxStream<'static, u64>;
}
