//! Client configuration

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Realtime client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway URL, e.g. `ws://127.0.0.1:8090/gateway`
    pub url: String,

    /// Fixed delay between a drop and the next connection attempt
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Default reconnect delay
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(4);

    /// Create a configuration for the given gateway URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Override the reconnect delay
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// A bearer credential held by the client
#[derive(Debug, Clone)]
pub struct Credential {
    /// The bearer token sent in the `auth` message
    pub token: String,

    /// Expiry, when known; an expired credential holds the client in Idle
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a credential with no known expiry
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Create a credential with a known expiry
    #[must_use]
    pub fn with_expiry(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Whether the credential is past its known expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}
