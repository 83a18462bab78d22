//! Channel subscription handling (server half of the multiplexer)
//!
//! Membership is recorded on the connection; role gating happens at
//! delivery time, so a standard connection may hold a `jobs` subscription
//! that never receives traffic.

use super::{HandlerError, HandlerResult};
use crate::registry::Connection;
use beacon_core::{Channel, ServerMessage};
use std::sync::Arc;

/// Handles subscribe/unsubscribe control messages
pub struct SubscribeHandler;

impl SubscribeHandler {
    /// Handle a `subscribe_<channel>` message
    pub async fn subscribe(connection: &Arc<Connection>, channel: Channel) -> HandlerResult<()> {
        let added = connection.subscribe(channel);

        tracing::debug!(
            connection_id = %connection.id(),
            channel = %channel,
            added = added,
            "Channel subscription"
        );

        let ack = match channel {
            Channel::Jobs => ServerMessage::JobsSubscribed,
            Channel::Stats => ServerMessage::StatsSubscribed,
        };

        connection
            .send(ack)
            .await
            .map_err(|e| HandlerError::SendFailed(e.to_string()))
    }

    /// Handle an `unsubscribe_<channel>` message
    pub fn unsubscribe(connection: &Arc<Connection>, channel: Channel) {
        let removed = connection.unsubscribe(channel);

        tracing::debug!(
            connection_id = %connection.id(),
            channel = %channel,
            removed = removed,
            "Channel unsubscription"
        );
    }
}
