//! Change notifier
//!
//! One background watch per authenticated connection: each time the user's
//! change signal fires, re-read the authoritative unread count and recent
//! slice from the store and push a `notification_update`.

use crate::registry::{Connection, ConnectionDirectory};
use beacon_core::{ChangeSignal, NotificationStore, ServerMessage};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Spawn the watch loop for an authenticated connection
///
/// The task exits when the connection leaves the registry, the socket
/// closes, the signal stream ends, or a store read fails. Errors are
/// logged and end the loop silently; the client's reconnect resync is the
/// recovery path.
pub fn spawn_watch(
    registry: Arc<dyn ConnectionDirectory>,
    store: Arc<dyn NotificationStore>,
    signal: Arc<dyn ChangeSignal>,
    connection: Arc<Connection>,
    recent_limit: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        watch_loop(registry, store, signal, connection, recent_limit).await;
    })
}

async fn watch_loop(
    registry: Arc<dyn ConnectionDirectory>,
    store: Arc<dyn NotificationStore>,
    signal: Arc<dyn ChangeSignal>,
    connection: Arc<Connection>,
    recent_limit: usize,
) {
    let user_id = connection.user_id();
    let mut stream = signal.watch(user_id);
    let mut first = true;

    tracing::debug!(
        connection_id = %connection.id(),
        user_id = %user_id,
        "Change watch started"
    );

    while let Some(marker) = stream.next().await {
        // Never push once the connection is gone from the registry or the
        // socket is no longer open
        if !registry.contains(connection.id()) || connection.is_closed() {
            break;
        }

        // The first event reflects state already present at watch
        // registration, not a new mutation
        if first {
            first = false;
            continue;
        }

        let unread_count = match store.count_unread(user_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(
                    connection_id = %connection.id(),
                    user_id = %user_id,
                    error = %e,
                    "Change watch store read failed, stopping watch"
                );
                break;
            }
        };

        let latest_notifications = match store.list_recent(user_id, recent_limit).await {
            Ok(notifications) => notifications,
            Err(e) => {
                tracing::error!(
                    connection_id = %connection.id(),
                    user_id = %user_id,
                    error = %e,
                    "Change watch store read failed, stopping watch"
                );
                break;
            }
        };

        // Re-check after the store reads; the connection may have closed
        // while we were suspended
        if !registry.contains(connection.id()) || connection.is_closed() {
            break;
        }

        tracing::trace!(
            connection_id = %connection.id(),
            user_id = %user_id,
            marker = marker,
            unread = unread_count,
            "Pushing notification update"
        );

        if connection
            .send(ServerMessage::NotificationUpdate {
                unread_count,
                latest_notifications,
            })
            .await
            .is_err()
        {
            break;
        }
    }

    tracing::debug!(
        connection_id = %connection.id(),
        user_id = %user_id,
        "Change watch ended"
    );
}
