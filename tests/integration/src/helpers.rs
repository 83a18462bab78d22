//! Test helpers for integration tests
//!
//! Spawns a real gateway on an ephemeral port, wired to the in-memory
//! notification store and a JWT identity provider, and provides a raw
//! WebSocket driver for protocol-level assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use beacon_common::{
    AppConfig, AppSettings, Environment, JwtConfig, JwtIdentityProvider, JwtService, LimitsConfig,
    LivenessConfig, NotificationsConfig, ServerConfig,
};
use beacon_core::{ClientMessage, ConnectionId, Role, ServerMessage, UserId};
use beacon_gateway::registry::ConnectionRegistry;
use beacon_gateway::store::MemoryNotificationStore;
use beacon_gateway::{create_app, GatewayState};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Signing secret shared by the test server and `token_for`
const TEST_JWT_SECRET: &str = "integration-test-secret-not-for-production";

/// How long `WsClient::recv` waits for a frame
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Test gateway instance
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: GatewayState,
    pub store: Arc<MemoryNotificationStore>,
    jwt: JwtService,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a gateway with default quotas and timings
    pub async fn start() -> Result<Self> {
        Self::start_with(LimitsConfig::default(), LivenessConfig::default()).await
    }

    /// Start a gateway with custom quotas and timings
    pub async fn start_with(limits: LimitsConfig, liveness: LivenessConfig) -> Result<Self> {
        let config = AppConfig {
            app: AppSettings {
                name: "beacon-test".to_string(),
                env: Environment::Development,
            },
            gateway: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            limits,
            liveness,
            notifications: NotificationsConfig::default(),
            jwt: JwtConfig {
                secret: TEST_JWT_SECRET.to_string(),
                access_token_expiry: 900,
            },
        };

        let jwt = JwtService::new(&config.jwt.secret, config.jwt.access_token_expiry);
        let registry = ConnectionRegistry::new_shared(config.limits, config.liveness);
        let store = Arc::new(MemoryNotificationStore::new());

        let state = GatewayState::new(
            Arc::clone(&registry),
            Arc::new(JwtIdentityProvider::new(jwt.clone())),
            store.clone(),
            store.clone(),
            Arc::new(config),
        );
        registry.start();

        let app = create_app(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            store,
            jwt,
            _handle: handle,
        })
    }

    /// Base URL for HTTP requests
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Gateway WebSocket URL
    pub fn ws_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Issue a valid access token for a user
    pub fn token_for(&self, user_id: UserId, role: Role) -> String {
        self.jwt
            .issue_access_token(user_id, role)
            .expect("token issuance")
    }

    /// Open a raw WebSocket to the gateway
    pub async fn connect(&self) -> Result<WsClient> {
        WsClient::connect(&self.ws_url()).await
    }

    /// Open a socket and complete the auth handshake
    ///
    /// Consumes the `auth_required`/`connected`/`unread_count` exchange and
    /// returns the driver plus the assigned connection id.
    pub async fn authenticate(&self, user_id: UserId, role: Role) -> Result<(WsClient, ConnectionId)> {
        let mut client = self.connect().await?;

        client.expect_auth_required().await?;
        client
            .send(&ClientMessage::Auth {
                token: self.token_for(user_id, role),
            })
            .await?;

        let connection_id = client.expect_connected().await?;
        client.expect_unread_count().await?;

        Ok((client, connection_id))
    }
}

/// Raw WebSocket driver speaking the gateway protocol
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connect to a gateway URL
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Send a protocol message
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        self.stream.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    /// Send a raw text frame (for malformed-input tests)
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Receive the next protocol message
    ///
    /// Fails on timeout or if the socket closes first.
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for a message"))?;

            match frame {
                Some(Ok(Message::Text(text))) => return Ok(ServerMessage::from_json(&text)?),
                Some(Ok(Message::Close(_))) | None => bail!("socket closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Wait until the server closes the socket
    ///
    /// Returns the protocol messages observed on the way; fails on timeout.
    pub async fn wait_for_close(&mut self, limit: Duration) -> Result<Vec<ServerMessage>> {
        let mut seen = Vec::new();

        let result = tokio::time::timeout(limit, async {
            while let Some(frame) = self.stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Ok(msg) = ServerMessage::from_json(&text) {
                            seen.push(msg);
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        })
        .await;

        result.map_err(|_| anyhow!("socket did not close within {limit:?}"))?;
        Ok(seen)
    }

    /// Assert that no protocol message arrives within the window
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.stream.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => bail!("expected silence, got {text}"),
            Ok(_) => Ok(()),
        }
    }

    /// Expect the `auth_required` prompt
    pub async fn expect_auth_required(&mut self) -> Result<()> {
        match self.recv().await? {
            ServerMessage::AuthRequired => Ok(()),
            other => bail!("expected auth_required, got {other}"),
        }
    }

    /// Expect the `connected` reply, returning the assigned id
    pub async fn expect_connected(&mut self) -> Result<ConnectionId> {
        match self.recv().await? {
            ServerMessage::Connected { connection_id, .. } => Ok(connection_id),
            other => bail!("expected connected, got {other}"),
        }
    }

    /// Expect the `unread_count` snapshot, returning the count
    pub async fn expect_unread_count(&mut self) -> Result<u64> {
        match self.recv().await? {
            ServerMessage::UnreadCount { unread_count } => Ok(unread_count),
            other => bail!("expected unread_count, got {other}"),
        }
    }

    /// Expect a `notification_update`, returning count and slice size
    pub async fn expect_notification_update(&mut self) -> Result<(u64, usize)> {
        match self.recv().await? {
            ServerMessage::NotificationUpdate {
                unread_count,
                latest_notifications,
            } => Ok((unread_count, latest_notifications.len())),
            other => bail!("expected notification_update, got {other}"),
        }
    }
}
