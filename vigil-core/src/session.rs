//! Session identification
//!
//! Sessions here are activity-tracking handles, not authentication tokens:
//! the auth middleware owns token issuance and lookup, and hands this crate a
//! [`SessionId`] to monitor for idleness. The core session types are:
//!
//! | Field           | Type        | Description                                   |
//! | --------------- | ----------- | --------------------------------------------- |
//! | `session_id`    | `SessionId` | The unique identifier for the session.        |
//! | `identity`      | `Identity`  | The principal the session belongs to.         |
//! | `last_activity` | `DateTime`  | The timestamp of the last recognized signal.  |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{generate_prefixed_id, validate_prefixed_id};
use crate::identity::Identity;

/// A unique identifier for a tracked session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: &str) -> Self {
        SessionId(id.to_string())
    }

    /// Create a new random session ID with at least 96 bits of entropy.
    pub fn new_random() -> Self {
        SessionId(generate_prefixed_id("ses"))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate that this ID has the correct format for a session ID
    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "ses")
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a session at the moment it expired, handed to
/// [`crate::services::SessionExpiryHandler`] implementations.
#[derive(Debug, Clone)]
pub struct ExpiredSession {
    pub session_id: SessionId,
    pub identity: Identity,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_session_id() {
        let id = SessionId::new_random();
        assert!(id.as_str().starts_with("ses_"));
        assert!(id.is_valid());
        assert_ne!(id, SessionId::new_random());
    }

    #[test]
    fn test_session_id_from_str() {
        let id = SessionId::new("my-session");
        assert_eq!(id.as_str(), "my-session");
        assert!(!id.is_valid());
    }
}
