//! User role flag

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role resolved for an authenticated connection
///
/// Routing decisions (e.g. the jobs channel) are made on the privileged
/// flag, not on any finer-grained permission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Standard account
    #[default]
    User,
    /// Privileged (admin) account
    Admin,
}

impl Role {
    /// Whether this role may receive privileged traffic
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Get the string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Parse a role from its claim string
    #[must_use]
    pub fn from_claim(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
