//! Notification entity
//!
//! Owned by the notification store collaborator. The gateway only observes
//! mutations and renders records into push messages; it never persists one.

use crate::value_objects::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// System-originated notice
    System,
    /// Account or security event (login, password change)
    Account,
    /// A background job finished successfully
    JobCompleted,
    /// A background job failed
    JobFailed,
    /// Site-wide announcement
    Announcement,
}

impl NotificationKind {
    /// Get the string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Account => "account",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::Announcement => "announcement",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notification record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Record id
    pub id: i64,

    /// Owning user
    pub user_id: UserId,

    /// Notification kind
    pub kind: NotificationKind,

    /// Short title
    pub title: String,

    /// Body text
    pub message: String,

    /// Whether the owner has read it
    pub read: bool,

    /// Optional link target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Time the owner read it, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Create a new unread notification
    #[must_use]
    pub fn new(
        id: i64,
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            read: false,
            link: None,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    /// Attach a link target
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Mark the notification as read now
    pub fn mark_read(&mut self) {
        if !self.read {
            self.read = true;
            self.read_at = Some(Utc::now());
        }
    }
}
