//! Auth handshake handler
//!
//! The server trusts nothing implied by the upgrade request itself: every
//! socket starts unauthenticated, receives `auth_required`, and must answer
//! with a verifiable bearer credential before anything else happens.

use super::{HandlerError, HandlerResult};
use crate::registry::{spawn_heartbeat, Connection, ConnectionDirectory, RegisterError};
use crate::server::GatewayState;
use beacon_core::{ConnectionId, Identity, ServerMessage};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Handles the post-upgrade authentication exchange
pub struct AuthHandler;

impl AuthHandler {
    /// Verify the credential carried by an `auth` message
    ///
    /// An empty in-band token falls back to the query-parameter credential
    /// captured at connection establishment, when one was provided.
    pub async fn authenticate(
        state: &GatewayState,
        token: &str,
        fallback: Option<&str>,
    ) -> HandlerResult<Identity> {
        let credential = if token.is_empty() {
            fallback.unwrap_or_default()
        } else {
            token
        };

        if credential.is_empty() {
            return Err(HandlerError::AuthenticationFailed(
                "no credential provided".to_string(),
            ));
        }

        let identity = state
            .identity()
            .resolve_identity(credential)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Credential verification failed");
                HandlerError::AuthenticationFailed(e.to_string())
            })?;

        Ok(identity)
    }

    /// Admit a verified identity into the registry
    ///
    /// Mints the connection id, registers (applying the per-user eviction
    /// policy), starts the heartbeat, then replies `connected` followed by
    /// the current unread-count snapshot.
    pub async fn admit(
        state: &GatewayState,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    ) -> HandlerResult<Arc<Connection>> {
        let connection = Connection::new(
            ConnectionId::generate(),
            identity.user_id,
            identity.role,
            sender,
        );

        state
            .registry()
            .register(Arc::clone(&connection))
            .map_err(|RegisterError::AtCapacity(cap)| HandlerError::CapacityExceeded(cap))?;

        let heartbeat = spawn_heartbeat(
            Arc::clone(&connection),
            Arc::clone(state.registry()),
            Duration::from_secs(state.config().liveness.heartbeat_interval_secs),
        );
        connection.set_heartbeat(heartbeat);

        if let Err(e) = Self::send_admission_replies(state, &connection).await {
            // The peer vanished mid-handshake; undo the registration so no
            // partial state leaks
            connection.close();
            state
                .registry()
                .unregister(connection.user_id(), connection.id());
            return Err(e);
        }

        tracing::info!(
            connection_id = %connection.id(),
            user_id = %identity.user_id,
            role = %identity.role,
            total = state.registry().total_count(),
            "Client authenticated"
        );

        Ok(connection)
    }

    /// Reply `connected`, then push the current unread-count snapshot
    async fn send_admission_replies(
        state: &GatewayState,
        connection: &Arc<Connection>,
    ) -> HandlerResult<()> {
        connection
            .send(ServerMessage::Connected {
                connection_id: connection.id(),
                timestamp: Utc::now(),
            })
            .await
            .map_err(|e| HandlerError::SendFailed(e.to_string()))?;

        // A store hiccup here is logged, not fatal — the change watch
        // re-syncs on the next signal
        match state.store().count_unread(connection.user_id()).await {
            Ok(unread_count) => {
                connection
                    .send(ServerMessage::UnreadCount { unread_count })
                    .await
                    .map_err(|e| HandlerError::SendFailed(e.to_string()))?;
            }
            Err(e) => {
                tracing::error!(
                    user_id = %connection.user_id(),
                    error = %e,
                    "Failed to read unread count at admission"
                );
            }
        }

        Ok(())
    }

    /// Handle an `auth` message arriving after authentication
    ///
    /// Idempotent by contract: logged and ignored, never reprocessed.
    pub fn handle_duplicate(connection: &Arc<Connection>) {
        tracing::warn!(
            connection_id = %connection.id(),
            user_id = %connection.user_id(),
            "Client sent auth while already authenticated, ignoring"
        );
    }
}
