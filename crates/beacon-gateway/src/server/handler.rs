//! WebSocket handler
//!
//! Owns the lifecycle of one socket: capacity gate at upgrade, the
//! post-upgrade auth handshake, the per-connection message loop, and the
//! single cleanup path every exit routes through.

use crate::handlers::{AuthHandler, HandlerError, MessageDispatcher};
use crate::notifier::spawn_watch;
use crate::registry::{Connection, ConnectionDirectory};
use crate::server::GatewayState;
use axum::{
    extract::{ws::Message, ws::WebSocket, Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use beacon_core::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Channel buffer size for outgoing messages
const MESSAGE_BUFFER_SIZE: usize = 100;

/// Connection-establishment query parameters
///
/// The query-string token is the out-of-band fallback credential, used only
/// when the in-band `auth` message carries no token.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: Option<String>,
}

/// WebSocket gateway handler
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket, query.token))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, mut socket: WebSocket, fallback_token: Option<String>) {
    // Global capacity gate, before auth_required is even sent
    if state.registry().at_capacity() {
        tracing::warn!(
            total = state.registry().total_count(),
            "Connection rejected, global capacity reached"
        );
        let error = ServerMessage::Error {
            message: "connection capacity reached".to_string(),
        };
        if let Ok(json) = error.to_json() {
            let _ = socket.send(Message::Text(json)).await;
        }
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(MESSAGE_BUFFER_SIZE);

    // Pump outgoing messages; per-connection send order is the channel order
    let send_task: JoinHandle<()> = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg.to_json() {
                Ok(json) => {
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode outgoing message");
                }
            }
        }
        let _ = ws_sink.close().await;
    });

    // Prompt through the same channel so ordering against later replies holds
    if tx.send(ServerMessage::AuthRequired).await.is_err() {
        return;
    }

    let auth_window = Duration::from_secs(state.config().liveness.auth_timeout_secs);
    let Some(connection) =
        await_auth(&state, &mut ws_stream, &tx, fallback_token.as_deref(), auth_window).await
    else {
        // Flush whatever the handshake queued (auth_failed, error), then stop
        drop(tx);
        let _ = send_task.await;
        return;
    };

    tracing::info!(
        connection_id = %connection.id(),
        user_id = %connection.user_id(),
        "WebSocket connection established"
    );

    // Background watch converting store mutations into pushes
    let notifier = spawn_watch(
        state.directory(),
        Arc::clone(state.store()),
        Arc::clone(state.signal()),
        Arc::clone(&connection),
        state.config().notifications.recent_limit,
    );

    let mut closed = connection.closed_signal();

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        connection.touch();
                        match ClientMessage::from_json(&text) {
                            Ok(message) => {
                                if let Err(e) = MessageDispatcher::dispatch(&connection, message).await {
                                    tracing::warn!(
                                        connection_id = %connection.id(),
                                        error = %e,
                                        "Handler error"
                                    );
                                    if e.is_fatal() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                // Protocol noise: log and drop the single
                                // message, the connection stays open
                                tracing::debug!(
                                    connection_id = %connection.id(),
                                    error = %e,
                                    "Malformed message ignored"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        connection.touch();
                        connection.mark_alive();
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Transport-level pong is handled by axum
                        connection.touch();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        connection.touch();
                        tracing::debug!(
                            connection_id = %connection.id(),
                            "Binary messages not supported, ignoring"
                        );
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(
                            connection_id = %connection.id(),
                            "Client closed connection"
                        );
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            connection_id = %connection.id(),
                            error = %e,
                            "WebSocket error"
                        );
                        break;
                    }
                    None => break,
                }
            }
            // wait_for also observes a close that landed before this
            // receiver subscribed
            _ = async { let _ = closed.wait_for(|closed| *closed).await; } => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    "Connection closed by server side"
                );
                break;
            }
        }
    }

    // Every exit, whatever the cause, routes through the same cleanup
    connection.close();
    notifier.abort();
    state
        .registry()
        .unregister(connection.user_id(), connection.id());
    send_task.abort();

    tracing::info!(
        connection_id = %connection.id(),
        user_id = %connection.user_id(),
        total = state.registry().total_count(),
        "Connection cleaned up"
    );
}

/// Drive the handshake until an `auth` message verifies or the window ends
///
/// Returns the admitted connection, or `None` when the socket must close
/// (failed credential, capacity at registration, timeout, transport error).
async fn await_auth(
    state: &GatewayState,
    ws_stream: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    tx: &mpsc::Sender<ServerMessage>,
    fallback_token: Option<&str>,
    window: Duration,
) -> Option<Arc<Connection>> {
    let handshake = async {
        while let Some(frame) = ws_stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            };

            let message = match ClientMessage::from_json(&text) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(error = %e, "Malformed message during handshake ignored");
                    continue;
                }
            };

            let token = match message {
                ClientMessage::Auth { token } => token,
                other => {
                    tracing::debug!(tag = %other.tag(), "Message before auth ignored");
                    continue;
                }
            };

            let identity = match AuthHandler::authenticate(state, &token, fallback_token).await {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::info!(error = %e, "Authentication failed, closing socket");
                    let _ = tx.send(ServerMessage::AuthFailed).await;
                    return None;
                }
            };

            match AuthHandler::admit(state, identity, tx.clone()).await {
                Ok(connection) => return Some(connection),
                Err(HandlerError::CapacityExceeded(cap)) => {
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: format!("connection capacity reached ({cap})"),
                        })
                        .await;
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Admission failed");
                    return None;
                }
            }
        }
        None
    };

    match tokio::time::timeout(window, handshake).await {
        Ok(connection) => connection,
        Err(_) => {
            tracing::info!("Auth handshake window expired, closing socket");
            None
        }
    }
}
