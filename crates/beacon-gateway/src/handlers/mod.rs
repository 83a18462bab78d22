//! Inbound message handlers
//!
//! Routes decoded client messages for an authenticated connection. Anything
//! the dispatch table does not recognize is logged and dropped; the
//! connection stays open.

mod auth;
mod error;
mod heartbeat;
mod subscribe;

pub use auth::AuthHandler;
pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use subscribe::SubscribeHandler;

use crate::registry::Connection;
use beacon_core::ClientMessage;
use std::sync::Arc;

/// Dispatch incoming client messages to the appropriate handlers
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Handle one message from an authenticated connection
    pub async fn dispatch(
        connection: &Arc<Connection>,
        message: ClientMessage,
    ) -> HandlerResult<()> {
        match message {
            ClientMessage::Auth { .. } => {
                AuthHandler::handle_duplicate(connection);
                Ok(())
            }
            ClientMessage::Ping => HeartbeatHandler::handle_ping(connection).await,
            ClientMessage::Pong => {
                HeartbeatHandler::handle_pong(connection);
                Ok(())
            }
            ClientMessage::Subscribe(channel) => {
                SubscribeHandler::subscribe(connection, channel).await
            }
            ClientMessage::Unsubscribe(channel) => {
                SubscribeHandler::unsubscribe(connection, channel);
                Ok(())
            }
            ClientMessage::Unknown(tag) => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    tag = %tag,
                    "Unknown message type, ignoring"
                );
                Ok(())
            }
        }
    }
}
