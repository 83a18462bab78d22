//! Connection directory port
//!
//! The registry sits behind this trait so a broker-backed implementation
//! (for multi-instance deployments) is a substitution, not a rewrite. The
//! push fan-out is defined here once, in terms of the directory reads.

use super::Connection;
use beacon_core::{Channel, ConnectionId, Role, ServerMessage, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Registration failures
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The global connection cap is reached; new connections are rejected
    /// outright, never admitted by eviction
    #[error("Global connection capacity reached ({0})")]
    AtCapacity(usize),
}

/// Result of a successful registration
#[derive(Debug, Default)]
pub struct RegisterOutcome {
    /// The connection evicted to make room under the per-user cap, if any
    pub evicted: Option<Arc<Connection>>,
}

/// Directory of live connections
#[async_trait]
pub trait ConnectionDirectory: Send + Sync {
    /// Admit a connection, applying the per-user eviction policy
    fn register(&self, connection: Arc<Connection>) -> Result<RegisterOutcome, RegisterError>;

    /// Remove a connection; returns whether it was present
    fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool;

    /// Look up a connection by id
    fn get(&self, connection_id: ConnectionId) -> Option<Arc<Connection>>;

    /// Check presence by id
    fn contains(&self, connection_id: ConnectionId) -> bool {
        self.get(connection_id).is_some()
    }

    /// All connections of one user
    fn connections_for_user(&self, user_id: UserId) -> Vec<Arc<Connection>>;

    /// Number of connections one user holds
    fn count_for(&self, user_id: UserId) -> usize;

    /// Total number of registered connections
    fn total_count(&self) -> usize;

    /// Consistent snapshot of every registered connection
    ///
    /// Fan-out iterates this, never a live structure that a concurrent
    /// mutation could change mid-iteration.
    fn snapshot(&self) -> Vec<Arc<Connection>>;

    /// Push a message to every connection of one user
    async fn push_to_user(&self, user_id: UserId, message: ServerMessage) -> usize {
        let mut sent = 0;
        for conn in self.connections_for_user(user_id) {
            if conn.send(message.clone()).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Push a message to one connection; returns whether it was delivered
    async fn push_to_connection(
        &self,
        connection_id: ConnectionId,
        message: ServerMessage,
    ) -> bool {
        match self.get(connection_id) {
            Some(conn) => conn.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Push a message to every connection holding the given role
    async fn broadcast_to_role(&self, role: Role, message: ServerMessage) -> usize {
        let mut sent = 0;
        for conn in self.snapshot() {
            if conn.role() != role {
                continue;
            }
            if conn.send(message.clone()).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Deliver a domain event to the subscribers of one channel
    ///
    /// Delivery requires both channel membership and, for privileged
    /// channels, the privileged role — a standard connection may hold a
    /// membership that never receives traffic.
    async fn publish_to_channel(&self, channel: Channel, message: ServerMessage) -> usize {
        let mut sent = 0;
        for conn in self.snapshot() {
            if !conn.is_subscribed(channel) {
                continue;
            }
            if channel.requires_privilege() && !conn.role().is_privileged() {
                continue;
            }
            if conn.send(message.clone()).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }
}
