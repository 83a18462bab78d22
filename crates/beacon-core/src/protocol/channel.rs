//! Subscription channels
//!
//! A channel is a named topic multiplexed over one socket. Subscribe and
//! unsubscribe travel as `subscribe_<channel>` / `unsubscribe_<channel>`
//! type tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named subscription channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Background-job status events (privileged connections only)
    Jobs,
    /// Aggregate job-queue statistics (privileged connections only)
    Stats,
}

impl Channel {
    /// Get the channel name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Stats => "stats",
        }
    }

    /// Parse a channel from its name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "jobs" => Some(Self::Jobs),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }

    /// Whether delivery on this channel is restricted to privileged roles
    #[must_use]
    pub const fn requires_privilege(self) -> bool {
        match self {
            Self::Jobs | Self::Stats => true,
        }
    }

    /// The wire tag that subscribes to this channel
    #[must_use]
    pub fn subscribe_tag(self) -> String {
        format!("subscribe_{}", self.as_str())
    }

    /// The wire tag that unsubscribes from this channel
    #[must_use]
    pub fn unsubscribe_tag(self) -> String {
        format!("unsubscribe_{}", self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
