//! End-to-end gateway tests over real WebSockets

use std::time::Duration;

use anyhow::Result;
use beacon_common::{LimitsConfig, LivenessConfig};
use beacon_core::{Channel, ClientMessage, NotificationKind, Role, ServerMessage, UserId};
use beacon_gateway::registry::ConnectionDirectory;
use integration_tests::helpers::TestServer;

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let server = TestServer::start().await?;

    let body = reqwest::get(format!("{}/health", server.base_url()))
        .await?
        .text()
        .await?;

    assert_eq!(body, "OK");
    Ok(())
}

#[tokio::test]
async fn test_full_notification_scenario() -> Result<()> {
    let server = TestServer::start().await?;
    let user = UserId::new(1);

    // Valid token: connected, then unread_count: 0
    let mut client = server.connect().await?;
    client.expect_auth_required().await?;
    client
        .send(&ClientMessage::Auth {
            token: server.token_for(user, Role::User),
        })
        .await?;
    client.expect_connected().await?;
    assert_eq!(client.expect_unread_count().await?, 0);

    // A notification is created: notification_update with one entry
    let n = server
        .store
        .create(user, NotificationKind::System, "Welcome", "First login");
    let (unread, latest) = client.expect_notification_update().await?;
    assert_eq!(unread, 1);
    assert_eq!(latest, 1);

    // Marked read: the next update shows zero unread
    server.store.mark_read(user, n.id);
    let (unread, _) = client.expect_notification_update().await?;
    assert_eq!(unread, 0);

    Ok(())
}

#[tokio::test]
async fn test_invalid_token_rejected() -> Result<()> {
    let server = TestServer::start().await?;

    let mut client = server.connect().await?;
    client.expect_auth_required().await?;
    client
        .send(&ClientMessage::Auth {
            token: "not-a-real-token".to_string(),
        })
        .await?;

    match client.recv().await? {
        ServerMessage::AuthFailed => {}
        other => panic!("expected auth_failed, got {other}"),
    }

    // No retry on the same socket; the server closes it
    client.wait_for_close(Duration::from_secs(5)).await?;
    assert_eq!(server.state.registry().total_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_credential_rejected() -> Result<()> {
    let server = TestServer::start().await?;

    let mut client = server.connect().await?;
    client.expect_auth_required().await?;
    client
        .send(&ClientMessage::Auth {
            token: String::new(),
        })
        .await?;

    match client.recv().await? {
        ServerMessage::AuthFailed => {}
        other => panic!("expected auth_failed, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_query_param_token_fallback() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.token_for(UserId::new(5), Role::User);

    let url = format!("{}?token={token}", server.ws_url());
    let mut client = integration_tests::helpers::WsClient::connect(&url).await?;

    client.expect_auth_required().await?;
    // Empty in-band token falls back to the query credential
    client
        .send(&ClientMessage::Auth {
            token: String::new(),
        })
        .await?;

    client.expect_connected().await?;
    client.expect_unread_count().await?;
    Ok(())
}

#[tokio::test]
async fn test_messages_before_auth_are_ignored() -> Result<()> {
    let server = TestServer::start().await?;

    let mut client = server.connect().await?;
    client.expect_auth_required().await?;

    // Noise before the credential: ignored, the handshake continues
    client.send(&ClientMessage::Ping).await?;
    client.send_raw("{\"type\":\"frobnicate\"}").await?;
    client.send_raw("{not json").await?;

    client
        .send(&ClientMessage::Auth {
            token: server.token_for(UserId::new(2), Role::User),
        })
        .await?;
    client.expect_connected().await?;
    Ok(())
}

#[tokio::test]
async fn test_protocol_noise_keeps_connection_open() -> Result<()> {
    let server = TestServer::start().await?;
    let (mut client, _id) = server.authenticate(UserId::new(3), Role::User).await?;

    client.send_raw("{broken").await?;
    client.send_raw("{\"type\":\"no_such_thing\"}").await?;
    client.send_raw("{\"no_type_at_all\":1}").await?;

    // Still alive: ping is answered
    client.send(&ClientMessage::Ping).await?;
    match client.recv().await? {
        ServerMessage::Pong => {}
        other => panic!("expected pong, got {other}"),
    }
    assert_eq!(server.state.registry().total_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_auth_is_ignored() -> Result<()> {
    let server = TestServer::start().await?;
    let user = UserId::new(4);
    let (mut client, id) = server.authenticate(user, Role::User).await?;

    // A second auth is logged and ignored, never reprocessed
    client
        .send(&ClientMessage::Auth {
            token: server.token_for(user, Role::User),
        })
        .await?;

    client.send(&ClientMessage::Ping).await?;
    match client.recv().await? {
        ServerMessage::Pong => {}
        other => panic!("expected pong, got {other}"),
    }

    // Same registration as before; no second connection appeared
    assert_eq!(server.state.registry().total_count(), 1);
    assert!(server.state.registry().contains(id));
    Ok(())
}

#[tokio::test]
async fn test_per_user_cap_evicts_oldest() -> Result<()> {
    let server = TestServer::start_with(
        LimitsConfig {
            max_connections_per_user: 2,
            max_total_connections: 100,
        },
        LivenessConfig::default(),
    )
    .await?;
    let user = UserId::new(7);

    let (mut first, first_id) = server.authenticate(user, Role::User).await?;
    let (_second, second_id) = server.authenticate(user, Role::User).await?;
    let (_third, third_id) = server.authenticate(user, Role::User).await?;

    // The oldest connection is closed and replaced
    first.wait_for_close(Duration::from_secs(5)).await?;

    let registry = server.state.registry();
    assert_eq!(registry.count_for(user), 2);
    assert!(!registry.contains(first_id));
    assert!(registry.contains(second_id));
    assert!(registry.contains(third_id));
    Ok(())
}

#[tokio::test]
async fn test_global_cap_rejects_before_prompt() -> Result<()> {
    let server = TestServer::start_with(
        LimitsConfig {
            max_connections_per_user: 5,
            max_total_connections: 1,
        },
        LivenessConfig::default(),
    )
    .await?;

    let (_first, _) = server.authenticate(UserId::new(1), Role::User).await?;

    // The second socket gets an error instead of auth_required, then closes
    let mut second = server.connect().await?;
    match second.recv().await? {
        ServerMessage::Error { message } => assert!(message.contains("capacity")),
        other => panic!("expected error, got {other}"),
    }
    second.wait_for_close(Duration::from_secs(5)).await?;
    assert_eq!(server.state.registry().total_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_silent_connection_is_reaped_by_heartbeat() -> Result<()> {
    let server = TestServer::start_with(
        LimitsConfig::default(),
        LivenessConfig {
            heartbeat_interval_secs: 1,
            ..LivenessConfig::default()
        },
    )
    .await?;

    let (mut client, _id) = server.authenticate(UserId::new(1), Role::User).await?;

    // Never answer the pings: two missed intervals force the close
    let seen = client.wait_for_close(Duration::from_secs(10)).await?;
    assert!(
        seen.iter().any(|m| matches!(m, ServerMessage::Ping)),
        "expected at least one ping before the close"
    );
    assert_eq!(server.state.registry().total_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pong_keeps_connection_alive() -> Result<()> {
    let server = TestServer::start_with(
        LimitsConfig::default(),
        LivenessConfig {
            heartbeat_interval_secs: 1,
            ..LivenessConfig::default()
        },
    )
    .await?;

    let (mut client, _id) = server.authenticate(UserId::new(1), Role::User).await?;

    // Answer pings across several heartbeat intervals
    let deadline = tokio::time::Instant::now() + Duration::from_millis(3500);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, client.recv()).await {
            Ok(Ok(ServerMessage::Ping)) => client.send(&ClientMessage::Pong).await?,
            Ok(Ok(other)) => panic!("unexpected message {other}"),
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    assert_eq!(server.state.registry().total_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_auth_window_expiry_closes_socket() -> Result<()> {
    let server = TestServer::start_with(
        LimitsConfig::default(),
        LivenessConfig {
            auth_timeout_secs: 1,
            ..LivenessConfig::default()
        },
    )
    .await?;

    let mut client = server.connect().await?;
    client.expect_auth_required().await?;

    // No auth message: the handshake window expires and the socket closes
    client.wait_for_close(Duration::from_secs(5)).await?;
    assert_eq!(server.state.registry().total_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_broadcast_to_role_reaches_only_that_role() -> Result<()> {
    let server = TestServer::start().await?;

    let mut admins = Vec::new();
    let mut users = Vec::new();
    for id in 1..=3 {
        let (client, _) = server.authenticate(UserId::new(id), Role::User).await?;
        users.push(client);
    }
    for id in 4..=5 {
        let (client, _) = server.authenticate(UserId::new(id), Role::Admin).await?;
        admins.push(client);
    }

    let sent = server
        .state
        .registry()
        .broadcast_to_role(Role::Admin, ServerMessage::NotificationsCleared)
        .await;
    assert_eq!(sent, 2);

    for admin in &mut admins {
        match admin.recv().await? {
            ServerMessage::NotificationsCleared => {}
            other => panic!("expected notifications_cleared, got {other}"),
        }
    }
    for user in &mut users {
        user.expect_silence(Duration::from_millis(200)).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_job_events_are_role_and_subscription_gated() -> Result<()> {
    let server = TestServer::start().await?;

    let (mut admin, _) = server.authenticate(UserId::new(1), Role::Admin).await?;
    let (mut user, _) = server.authenticate(UserId::new(2), Role::User).await?;
    let (mut idle_admin, _) = server.authenticate(UserId::new(3), Role::Admin).await?;

    // Both subscribe; the standard role holds a membership that never
    // receives traffic
    admin.send(&ClientMessage::Subscribe(Channel::Jobs)).await?;
    match admin.recv().await? {
        ServerMessage::JobsSubscribed => {}
        other => panic!("expected jobs_subscribed, got {other}"),
    }
    user.send(&ClientMessage::Subscribe(Channel::Jobs)).await?;
    match user.recv().await? {
        ServerMessage::JobsSubscribed => {}
        other => panic!("expected jobs_subscribed, got {other}"),
    }

    let sent = server
        .state
        .registry()
        .publish_to_channel(
            Channel::Jobs,
            ServerMessage::JobUpdate {
                job: serde_json::json!({"id": 12, "status": "completed"}),
            },
        )
        .await;
    assert_eq!(sent, 1);

    match admin.recv().await? {
        ServerMessage::JobUpdate { job } => assert_eq!(job["status"], "completed"),
        other => panic!("expected job_update, got {other}"),
    }
    user.expect_silence(Duration::from_millis(200)).await?;
    idle_admin.expect_silence(Duration::from_millis(200)).await?;
    Ok(())
}

#[tokio::test]
async fn test_push_to_user_and_connection() -> Result<()> {
    let server = TestServer::start().await?;
    let user = UserId::new(9);

    let (mut a, id_a) = server.authenticate(user, Role::User).await?;
    let (mut b, _id_b) = server.authenticate(user, Role::User).await?;

    // Per-user push reaches both connections
    let sent = server
        .state
        .registry()
        .push_to_user(user, ServerMessage::UnreadCount { unread_count: 3 })
        .await;
    assert_eq!(sent, 2);
    assert_eq!(a.expect_unread_count().await?, 3);
    assert_eq!(b.expect_unread_count().await?, 3);

    // Per-connection push reaches exactly one
    let delivered = server
        .state
        .registry()
        .push_to_connection(id_a, ServerMessage::NotificationRead { id: 1 })
        .await;
    assert!(delivered);
    match a.recv().await? {
        ServerMessage::NotificationRead { id } => assert_eq!(id, 1),
        other => panic!("expected notification_read, got {other}"),
    }
    b.expect_silence(Duration::from_millis(200)).await?;
    Ok(())
}

#[tokio::test]
async fn test_unread_snapshot_reflects_preexisting_state() -> Result<()> {
    let server = TestServer::start().await?;
    let user = UserId::new(11);

    server
        .store
        .create(user, NotificationKind::Account, "Old", "news");
    server
        .store
        .create(user, NotificationKind::System, "Older", "news");

    let mut client = server.connect().await?;
    client.expect_auth_required().await?;
    client
        .send(&ClientMessage::Auth {
            token: server.token_for(user, Role::User),
        })
        .await?;
    client.expect_connected().await?;

    // The snapshot counts what already existed, and the pre-existing state
    // produces no notification_update on its own
    assert_eq!(client.expect_unread_count().await?, 2);
    client.expect_silence(Duration::from_millis(300)).await?;
    Ok(())
}
