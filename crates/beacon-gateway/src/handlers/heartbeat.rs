//! Ping/pong handling for authenticated connections

use super::{HandlerError, HandlerResult};
use crate::registry::Connection;
use beacon_core::ServerMessage;
use std::sync::Arc;

/// Handles heartbeat traffic from the client
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Handle a client-originated `ping` by answering `pong`
    pub async fn handle_ping(connection: &Arc<Connection>) -> HandlerResult<()> {
        tracing::trace!(connection_id = %connection.id(), "Ping received");

        connection
            .send(ServerMessage::Pong)
            .await
            .map_err(|e| HandlerError::SendFailed(e.to_string()))
    }

    /// Handle a `pong` answering one of our pings
    ///
    /// A coalesced pong is acceptable: it does not have to answer the most
    /// recent ping to count.
    pub fn handle_pong(connection: &Arc<Connection>) {
        connection.mark_alive();
        tracing::trace!(connection_id = %connection.id(), "Pong received");
    }
}
