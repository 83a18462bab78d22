//! Client reconnection controller tests
//!
//! Half of these run against a scripted mock gateway to pin down the exact
//! wire behavior (auth once per attempt, resubscription ordering); the rest
//! drive the real gateway end to end.

use std::time::Duration;

use anyhow::Result;
use beacon_client::{ClientConfig, ClientStatus, Credential, RealtimeClient};
use beacon_core::{Channel, ClientMessage, NotificationKind, Role, ServerMessage, UserId};
use beacon_gateway::registry::ConnectionDirectory;
use futures_util::{SinkExt, StreamExt};
use integration_tests::helpers::TestServer;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type MockSocket = WebSocketStream<TcpStream>;

async fn accept_socket(listener: &TcpListener) -> MockSocket {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("no connection arrived")
        .expect("accept failed");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("websocket handshake failed")
}

async fn send_server(socket: &mut MockSocket, message: &ServerMessage) {
    socket
        .send(Message::Text(message.to_json().expect("encode")))
        .await
        .expect("send failed");
}

async fn recv_client(socket: &mut MockSocket) -> ClientMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a client frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return ClientMessage::from_json(&text).expect("decode");
        }
    }
}

async fn wait_for_status(client: &Arc<RealtimeClient>, wanted: ClientStatus) {
    let mut status = client.status();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *status.borrow() == wanted {
                break;
            }
            status.changed().await.expect("status channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("status never reached {wanted:?}"));
}

fn connected_message() -> ServerMessage {
    ServerMessage::Connected {
        connection_id: beacon_core::ConnectionId::generate(),
        timestamp: chrono::Utc::now(),
    }
}

/// Drive the scripted handshake up to `connected`
async fn complete_handshake(socket: &mut MockSocket, expected_token: &str) {
    send_server(socket, &ServerMessage::AuthRequired).await;
    match recv_client(socket).await {
        ClientMessage::Auth { token } => assert_eq!(token, expected_token),
        other => panic!("expected auth, got {other}"),
    }
    send_server(socket, &connected_message()).await;
}

#[tokio::test]
async fn test_reconnect_reissues_all_subscriptions_first() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/gateway", listener.local_addr()?);

    let client = RealtimeClient::new(
        ClientConfig::new(url).with_reconnect_delay(Duration::from_millis(100)),
    );

    // Two channel subscriptions held before any connection exists
    let _jobs = client.subscribe(Channel::Jobs);
    let _stats = client.subscribe(Channel::Stats);

    client.set_credential(Credential::new("mock-token"));
    client.start();

    // First connection: after `connected`, the first two client frames are
    // exactly the two subscribes
    let mut socket = accept_socket(&listener).await;
    complete_handshake(&mut socket, "mock-token").await;

    let first = recv_client(&mut socket).await;
    let second = recv_client(&mut socket).await;
    let mut channels: Vec<_> = [first, second]
        .into_iter()
        .map(|msg| match msg {
            ClientMessage::Subscribe(channel) => channel,
            other => panic!("expected subscribe before any other traffic, got {other}"),
        })
        .collect();
    channels.sort_by_key(|c| c.as_str());
    assert_eq!(channels, vec![Channel::Jobs, Channel::Stats]);

    // Drop the socket; the client must reconnect and resubscribe again
    drop(socket);

    let mut socket = accept_socket(&listener).await;
    complete_handshake(&mut socket, "mock-token").await;

    let first = recv_client(&mut socket).await;
    let second = recv_client(&mut socket).await;
    let mut channels: Vec<_> = [first, second]
        .into_iter()
        .map(|msg| match msg {
            ClientMessage::Subscribe(channel) => channel,
            other => panic!("expected subscribe before any other traffic, got {other}"),
        })
        .collect();
    channels.sort_by_key(|c| c.as_str());
    assert_eq!(channels, vec![Channel::Jobs, Channel::Stats]);

    wait_for_status(&client, ClientStatus::Connected).await;
    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_auth_sent_once_per_attempt() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/gateway", listener.local_addr()?);

    let client = RealtimeClient::new(ClientConfig::new(url));
    client.set_credential(Credential::new("mock-token"));
    client.start();

    let mut socket = accept_socket(&listener).await;
    send_server(&mut socket, &ServerMessage::AuthRequired).await;
    match recv_client(&mut socket).await {
        ClientMessage::Auth { .. } => {}
        other => panic!("expected auth, got {other}"),
    }

    // A duplicate prompt must not trigger a second auth
    send_server(&mut socket, &ServerMessage::AuthRequired).await;
    send_server(&mut socket, &connected_message()).await;

    // Probe: a ping is answered with a pong, with no auth in between
    send_server(&mut socket, &ServerMessage::Ping).await;
    match recv_client(&mut socket).await {
        ClientMessage::Pong => {}
        other => panic!("expected pong (and no duplicate auth), got {other}"),
    }

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_auth_failure_clears_credential_and_stops() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/gateway", listener.local_addr()?);

    let client = RealtimeClient::new(
        ClientConfig::new(url).with_reconnect_delay(Duration::from_millis(50)),
    );
    client.set_credential(Credential::new("rejected-token"));
    client.start();

    let mut socket = accept_socket(&listener).await;
    send_server(&mut socket, &ServerMessage::AuthRequired).await;
    let _ = recv_client(&mut socket).await;
    send_server(&mut socket, &ServerMessage::AuthFailed).await;
    drop(socket);

    // Credential-related failure: no automatic retry
    wait_for_status(&client, ClientStatus::Idle).await;
    let retry = tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(retry.is_err(), "client must not reconnect after auth_failed");

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_server_pings_are_answered() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}/gateway", listener.local_addr()?);

    let client = RealtimeClient::new(ClientConfig::new(url));
    client.set_credential(Credential::new("mock-token"));
    client.start();

    let mut socket = accept_socket(&listener).await;
    complete_handshake(&mut socket, "mock-token").await;

    for _ in 0..3 {
        send_server(&mut socket, &ServerMessage::Ping).await;
        match recv_client(&mut socket).await {
            ClientMessage::Pong => {}
            other => panic!("expected pong, got {other}"),
        }
    }

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_client_against_real_gateway() -> Result<()> {
    let server = TestServer::start().await?;
    let user = UserId::new(21);

    let client = RealtimeClient::new(
        ClientConfig::new(server.ws_url()).with_reconnect_delay(Duration::from_millis(100)),
    );
    let mut events = client.events();

    client.set_credential(Credential::new(server.token_for(user, Role::Admin)));
    client.start();
    wait_for_status(&client, ClientStatus::Connected).await;

    // The unread snapshot arrives on the event feed
    let snapshot = tokio::time::timeout(Duration::from_secs(5), events.recv()).await??;
    assert_eq!(snapshot, ServerMessage::UnreadCount { unread_count: 0 });

    // Store mutation surfaces as a notification_update
    server
        .store
        .create(user, NotificationKind::JobCompleted, "Export done", "ready");
    let update = tokio::time::timeout(Duration::from_secs(5), events.recv()).await??;
    match update {
        ServerMessage::NotificationUpdate { unread_count, .. } => assert_eq!(unread_count, 1),
        other => panic!("expected notification_update, got {other}"),
    }

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_client_recovers_subscriptions_after_server_drop() -> Result<()> {
    let server = TestServer::start().await?;
    let user = UserId::new(22);

    let client = RealtimeClient::new(
        ClientConfig::new(server.ws_url()).with_reconnect_delay(Duration::from_millis(100)),
    );
    let mut jobs = client.subscribe(Channel::Jobs);

    client.set_credential(Credential::new(server.token_for(user, Role::Admin)));
    client.start();
    wait_for_status(&client, ClientStatus::Connected).await;

    // The held subscription reaches the server side
    let ack = tokio::time::timeout(Duration::from_secs(5), jobs.recv()).await?;
    assert_eq!(ack, Some(ServerMessage::JobsSubscribed));

    // Force a server-side drop of every connection
    for conn in server.state.registry().snapshot() {
        conn.close();
    }

    // Resubscribed automatically after the reconnect: the ack arrives again
    // and the membership is visible server-side
    let ack = tokio::time::timeout(Duration::from_secs(10), jobs.recv()).await?;
    assert_eq!(ack, Some(ServerMessage::JobsSubscribed));

    let restored = server
        .state
        .registry()
        .snapshot()
        .iter()
        .any(|c| c.user_id() == user && c.is_subscribed(Channel::Jobs));
    assert!(restored, "jobs membership must survive the reconnect");

    // Deliveries flow on the restored membership
    let sent = server
        .state
        .registry()
        .publish_to_channel(
            Channel::Jobs,
            ServerMessage::JobUpdate {
                job: serde_json::json!({"id": 3, "status": "queued"}),
            },
        )
        .await;
    assert_eq!(sent, 1);
    let update = tokio::time::timeout(Duration::from_secs(5), jobs.recv()).await?;
    assert!(matches!(update, Some(ServerMessage::JobUpdate { .. })));

    client.shutdown().await;
    Ok(())
}
