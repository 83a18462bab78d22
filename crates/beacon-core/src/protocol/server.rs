//! Server-to-client messages

use crate::entities::Notification;
use crate::value_objects::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Messages pushed from the server to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First frame after upgrade; the client must answer with `auth`
    AuthRequired,

    /// Handshake succeeded; the connection is registered
    Connected {
        connection_id: ConnectionId,
        timestamp: DateTime<Utc>,
    },

    /// Handshake failed; the socket closes after this frame
    AuthFailed,

    /// Unread-count snapshot pushed right after `connected`
    UnreadCount { unread_count: u64 },

    /// The notification state changed; carries the fresh authoritative view
    NotificationUpdate {
        unread_count: u64,
        latest_notifications: Vec<Notification>,
    },

    /// A single notification was created
    NewNotification { notification: Notification },

    /// A notification was marked read
    NotificationRead { id: i64 },

    /// A notification was deleted
    NotificationDeleted { id: i64 },

    /// All of the user's notifications were cleared
    NotificationsCleared,

    /// Acknowledges a `subscribe_jobs` request
    JobsSubscribed,

    /// Acknowledges a `subscribe_stats` request
    StatsSubscribed,

    /// A background job changed state
    JobUpdate { job: Value },

    /// Aggregate job-queue statistics changed
    JobStatsUpdate { stats: Value },

    /// Heartbeat probe; the client answers with `pong`
    Ping,

    /// Heartbeat answer to a client-originated `ping`
    Pong,

    /// Terminal error (capacity, protocol); the socket closes after this frame
    Error { message: String },
}

impl ServerMessage {
    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The wire tag of this message
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::Connected { .. } => "connected",
            Self::AuthFailed => "auth_failed",
            Self::UnreadCount { .. } => "unread_count",
            Self::NotificationUpdate { .. } => "notification_update",
            Self::NewNotification { .. } => "new_notification",
            Self::NotificationRead { .. } => "notification_read",
            Self::NotificationDeleted { .. } => "notification_deleted",
            Self::NotificationsCleared => "notifications_cleared",
            Self::JobsSubscribed => "jobs_subscribed",
            Self::StatsSubscribed => "stats_subscribed",
            Self::JobUpdate { .. } => "job_update",
            Self::JobStatsUpdate { .. } => "job_stats_update",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerMessage({})", self.tag())
    }
}
