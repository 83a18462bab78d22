//! Individual WebSocket connection
//!
//! A `Connection` exists only for an authenticated socket: the id is minted
//! when the auth handshake succeeds, and the registry entry owns the
//! connection from then until any close path runs.

use super::{ConnectionDirectory, ConnectionRegistry};
use beacon_core::{Channel, ConnectionId, Role, ServerMessage, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A single authenticated WebSocket connection
pub struct Connection {
    /// Connection id, minted at authentication
    id: ConnectionId,

    /// Owning user
    user_id: UserId,

    /// Role resolved at authentication
    role: Role,

    /// Channel to send messages to the WebSocket
    sender: mpsc::Sender<ServerMessage>,

    /// Heartbeat state: cleared when a ping is sent, set by any pong
    alive: AtomicBool,

    /// Wall-clock admission time (also sent in the `connected` reply)
    connected_at: DateTime<Utc>,

    /// Monotonic admission time, for idle bookkeeping
    opened_at: Instant,

    /// Last inbound activity of any kind
    last_activity: Mutex<Instant>,

    /// Channels this connection is subscribed to
    channels: Mutex<HashSet<Channel>>,

    /// Heartbeat task, cancelled exactly once on any close path
    heartbeat: Mutex<Option<JoinHandle<()>>>,

    /// Set once by `close()`, on whichever close path runs first
    closed: AtomicBool,

    /// Signals the socket task to shut the connection down
    close_tx: watch::Sender<bool>,
}

impl Connection {
    /// Create a new connection for an authenticated user
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        role: Role,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Arc<Self> {
        let (close_tx, _) = watch::channel(false);

        Arc::new(Self {
            id,
            user_id,
            role,
            sender,
            alive: AtomicBool::new(true),
            connected_at: Utc::now(),
            opened_at: Instant::now(),
            last_activity: Mutex::new(Instant::now()),
            channels: Mutex::new(HashSet::new()),
            heartbeat: Mutex::new(None),
            closed: AtomicBool::new(false),
            close_tx,
        })
    }

    /// Get the connection id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the owning user id
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Get the role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Get the admission timestamp
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Record inbound activity of any kind
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Mark the connection alive (any pong counts, coalesced or not)
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Clear the alive flag, returning whether it was set
    ///
    /// Called once per heartbeat tick: a `false` return means no pong
    /// arrived since the previous ping.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    /// Add a channel subscription, returning whether it was new
    pub fn subscribe(&self, channel: Channel) -> bool {
        self.channels.lock().insert(channel)
    }

    /// Remove a channel subscription, returning whether it existed
    pub fn unsubscribe(&self, channel: Channel) -> bool {
        self.channels.lock().remove(&channel)
    }

    /// Check channel membership
    pub fn is_subscribed(&self, channel: Channel) -> bool {
        self.channels.lock().contains(&channel)
    }

    /// Get all subscribed channels
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.lock().iter().copied().collect()
    }

    /// Attach the heartbeat task handle
    pub fn set_heartbeat(&self, handle: JoinHandle<()>) {
        *self.heartbeat.lock() = Some(handle);
    }

    /// Cancel the heartbeat task; safe to call from any close path
    pub fn cancel_heartbeat(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }

    /// Send a message to this connection
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.sender.send(message).await
    }

    /// Try to send a message (non-blocking)
    pub fn try_send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::TrySendError<ServerMessage>> {
        self.sender.try_send(message)
    }

    /// Close the connection
    ///
    /// Idempotent: the first caller cancels the heartbeat and signals the
    /// socket task; later callers are no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cancel_heartbeat();
            let _ = self.close_tx.send(true);
        }
    }

    /// Whether any close path has run, or the socket task is gone
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.sender.is_closed()
    }

    /// Subscribe to the close signal
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Spawn the repeating heartbeat task for a connection
///
/// On each tick: a connection that never ponged since the previous ping is
/// force-closed and unregistered; otherwise the alive flag is cleared and a
/// `ping` goes out.
pub fn spawn_heartbeat(
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick of a tokio interval fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if connection.is_closed() {
                break;
            }

            if !connection.take_alive() {
                tracing::warn!(
                    connection_id = %connection.id(),
                    user_id = %connection.user_id(),
                    "Connection missed heartbeat, closing"
                );
                // close() aborts this task's own handle; we return right after
                connection.close();
                registry.unregister(connection.user_id(), connection.id());
                break;
            }

            if connection.send(ServerMessage::Ping).await.is_err() {
                tracing::debug!(
                    connection_id = %connection.id(),
                    "Heartbeat send failed, closing"
                );
                connection.close();
                registry.unregister(connection.user_id(), connection.id());
                break;
            }
        }
    })
}
