//! Client reconnection controller
//!
//! A state machine around one long-lived socket: it opens the connection,
//! answers the server's auth prompt, keeps the connection warm by answering
//! pings, and on any drop reconnects with full channel resubscription. The
//! connected/reconnecting indicator is driven purely by handshake state,
//! never by individual message failures.

use crate::channels::{ChannelMultiplexer, ChannelSubscription};
use crate::config::{ClientConfig, Credential};
use beacon_core::{Channel, ClientMessage, ServerMessage};
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Buffer for the notification event feed
const EVENT_BUFFER: usize = 64;

/// Connection state surfaced to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// No usable credential; the client holds here until one arrives
    Idle,
    /// Opening the transport
    Connecting,
    /// Transport open, waiting for the server's `auth_required`
    AwaitingAuthPrompt,
    /// Credential sent, waiting for the verdict
    SendingAuth,
    /// Authenticated and live
    Connected,
    /// The socket dropped with a credential still present
    Disconnected,
    /// A reconnect attempt is pending its fixed delay
    ReconnectScheduled,
}

/// What ended one connection attempt
enum ConnectionOutcome {
    /// The socket dropped; reconnect if a credential remains
    Dropped,
    /// The server rejected the credential; do not retry with it
    AuthRejected,
    /// Shutdown was requested
    Shutdown,
}

/// Realtime gateway client
pub struct RealtimeClient {
    config: ClientConfig,
    credential: Mutex<Option<Credential>>,
    credential_notify: Notify,
    status_tx: watch::Sender<ClientStatus>,
    events_tx: broadcast::Sender<ServerMessage>,
    multiplexer: Arc<ChannelMultiplexer>,
    commands: tokio::sync::Mutex<mpsc::UnboundedReceiver<ClientMessage>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Create a client; call [`start`](Self::start) to begin connecting
    #[must_use]
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ClientStatus::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (shutdown_tx, _) = watch::channel(false);
        let (multiplexer, commands) = ChannelMultiplexer::new();

        Arc::new(Self {
            config,
            credential: Mutex::new(None),
            credential_notify: Notify::new(),
            status_tx,
            events_tx,
            multiplexer,
            commands: tokio::sync::Mutex::new(commands),
            shutdown_tx,
            task: Mutex::new(None),
        })
    }

    /// Start the controller task
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            tracing::warn!("Realtime client already started");
            return;
        }

        let client = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            client.run().await;
        }));
    }

    /// Stop the controller and close the socket
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Install a credential, waking the client if it is idle
    pub fn set_credential(&self, credential: Credential) {
        *self.credential.lock() = Some(credential);
        self.credential_notify.notify_one();
    }

    /// Drop the credential; the client stops reconnecting
    pub fn clear_credential(&self) {
        *self.credential.lock() = None;
    }

    /// Watch the connection status
    pub fn status(&self) -> watch::Receiver<ClientStatus> {
        self.status_tx.subscribe()
    }

    /// Current status snapshot
    pub fn current_status(&self) -> ClientStatus {
        *self.status_tx.borrow()
    }

    /// Subscribe to the notification event feed
    pub fn events(&self) -> broadcast::Receiver<ServerMessage> {
        self.events_tx.subscribe()
    }

    /// Subscribe to a channel (reference-counted; see [`ChannelMultiplexer`])
    pub fn subscribe(&self, channel: Channel) -> ChannelSubscription {
        self.multiplexer.subscribe(channel)
    }

    fn set_status(&self, status: ClientStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                tracing::debug!(from = ?current, to = ?status, "Client status");
                *current = status;
                true
            }
        });
    }

    fn usable_token(&self) -> Option<String> {
        self.credential
            .lock()
            .as_ref()
            .filter(|c| !c.is_expired())
            .map(|c| c.token.clone())
    }

    async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Idle holds until a usable credential exists
            let Some(token) = self.usable_token() else {
                self.set_status(ClientStatus::Idle);
                tokio::select! {
                    () = self.credential_notify.notified() => continue,
                    _ = shutdown.changed() => break,
                }
            };

            self.set_status(ClientStatus::Connecting);

            let outcome = match connect_async(self.config.url.as_str()).await {
                Ok((socket, _response)) => {
                    self.drive_connection(socket, &token, &mut shutdown).await
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %self.config.url, "Connection attempt failed");
                    ConnectionOutcome::Dropped
                }
            };

            self.multiplexer.set_connected(false);

            match outcome {
                ConnectionOutcome::Shutdown => break,
                ConnectionOutcome::AuthRejected => {
                    // Credential-related, not transient: clear and hold Idle
                    self.clear_credential();
                    continue;
                }
                ConnectionOutcome::Dropped => {}
            }

            // A drop without a credential stops permanently (back to Idle);
            // with one, a fixed-delay reconnect is scheduled
            if self.usable_token().is_none() {
                continue;
            }

            self.set_status(ClientStatus::Disconnected);
            self.set_status(ClientStatus::ReconnectScheduled);

            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_status(ClientStatus::Idle);
    }

    /// Drive one connection attempt until it ends
    async fn drive_connection(
        &self,
        socket: Socket,
        token: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ConnectionOutcome {
        let (mut sink, mut stream) = socket.split();
        let mut commands = self.commands.lock().await;
        let mut auth_sent = false;

        self.set_status(ClientStatus::AwaitingAuthPrompt);

        loop {
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match ServerMessage::from_json(&text) {
                                Ok(message) => {
                                    if let Some(outcome) = self
                                        .handle_server_message(&mut sink, message, &mut auth_sent, token)
                                        .await
                                    {
                                        return outcome;
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "Unparseable server message ignored");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = sink.send(WsMessage::Pong(data)).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            tracing::info!("Server closed the connection");
                            return ConnectionOutcome::Dropped;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Socket error");
                            return ConnectionOutcome::Dropped;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                command = commands.recv() => {
                    if let Some(command) = command {
                        if self.send_client_message(&mut sink, &command).await.is_err() {
                            return ConnectionOutcome::Dropped;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return ConnectionOutcome::Shutdown;
                }
            }
        }
    }

    /// React to one server message; `Some` ends the connection attempt
    async fn handle_server_message(
        &self,
        sink: &mut (impl Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
        message: ServerMessage,
        auth_sent: &mut bool,
        token: &str,
    ) -> Option<ConnectionOutcome> {
        match message {
            ServerMessage::AuthRequired => {
                // Exactly once per connection attempt; duplicate prompts
                // are ignored
                if *auth_sent {
                    tracing::debug!("Duplicate auth prompt ignored");
                    return None;
                }
                *auth_sent = true;
                self.set_status(ClientStatus::SendingAuth);

                let auth = ClientMessage::Auth {
                    token: token.to_string(),
                };
                if self.send_client_message(sink, &auth).await.is_err() {
                    return Some(ConnectionOutcome::Dropped);
                }
                None
            }
            ServerMessage::AuthFailed => {
                tracing::warn!("Authentication rejected by the gateway");
                Some(ConnectionOutcome::AuthRejected)
            }
            ServerMessage::Connected { connection_id, .. } => {
                tracing::info!(connection_id = %connection_id, "Connected to gateway");
                self.set_status(ClientStatus::Connected);
                self.multiplexer.set_connected(true);

                // Re-issue every held channel membership before any other
                // client-originated traffic
                for channel in self.multiplexer.active_channels() {
                    let subscribe = ClientMessage::Subscribe(channel);
                    if self.send_client_message(sink, &subscribe).await.is_err() {
                        return Some(ConnectionOutcome::Dropped);
                    }
                }
                None
            }
            ServerMessage::Ping => {
                // Local keepalive responder
                let pong = ClientMessage::Pong;
                if self.send_client_message(sink, &pong).await.is_err() {
                    return Some(ConnectionOutcome::Dropped);
                }
                None
            }
            ServerMessage::Pong => None,
            ServerMessage::Error { ref message } => {
                tracing::warn!(message = %message, "Gateway error");
                None
            }
            channel_message @ (ServerMessage::JobsSubscribed
            | ServerMessage::StatsSubscribed
            | ServerMessage::JobUpdate { .. }
            | ServerMessage::JobStatsUpdate { .. }) => {
                self.multiplexer.route(&channel_message);
                None
            }
            notification => {
                // Notification-feed traffic goes to the event subscribers
                let _ = self.events_tx.send(notification);
                None
            }
        }
    }

    async fn send_client_message(
        &self,
        sink: &mut (impl Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
        message: &ClientMessage,
    ) -> Result<(), ()> {
        let json = message.to_json().map_err(|e| {
            tracing::error!(error = %e, "Failed to encode client message");
        })?;

        sink.send(WsMessage::Text(json)).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to send client message");
        })
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.config.url)
            .field("status", &*self.status_tx.borrow())
            .finish()
    }
}
