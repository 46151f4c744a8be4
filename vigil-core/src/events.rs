use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    auth::LoginMethod,
    error::AuditError,
    identity::Identity,
    session::SessionId,
};

/// Severity attached to every audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Warning,
    Failure,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents security events emitted to the audit sink
///
/// This is a closed vocabulary: each variant corresponds to exactly one
/// event type, with a typed payload. Event payloads always describe the
/// state *after* the change they record.
///
/// Free-form maps are produced only at the sink boundary (see
/// [`SecurityEvent::payload`]), so the emitter and the sink cannot drift.
#[derive(Debug, Clone)]
pub enum SecurityEvent {
    /// Emitted when a login completes successfully.
    LoginSucceeded {
        identity: Identity,
        method: LoginMethod,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a login attempt fails without locking the account.
    LoginFailed {
        identity: Identity,
        /// Number of failed attempts in the current window, including this one.
        failed_attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when an account becomes locked due to too many failed attempts.
    AccountLocked {
        identity: Identity,
        /// Number of failed attempts that triggered the lockout.
        failed_attempts: u32,
        /// When the lockout will expire.
        locked_until: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a session is terminated by the idle timeout.
    SessionExpired {
        session_id: SessionId,
        identity: Identity,
        /// The last recognized activity signal before expiry.
        last_activity: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when MFA enrollment completes for an identity.
    MfaEnabled {
        identity: Identity,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when MFA is turned off for an identity.
    MfaDisabled {
        identity: Identity,
        timestamp: DateTime<Utc>,
    },

    /// Emitted for anomalous behavior that changes no state, such as a login
    /// attempt against an already-locked account.
    SuspiciousActivity {
        identity: Identity,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl SecurityEvent {
    /// The wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LoginSucceeded { .. } => "login.succeeded",
            Self::LoginFailed { .. } => "login.failed",
            Self::AccountLocked { .. } => "account.locked",
            Self::SessionExpired { .. } => "session.expired",
            Self::MfaEnabled { .. } => "mfa.enabled",
            Self::MfaDisabled { .. } => "mfa.disabled",
            Self::SuspiciousActivity { .. } => "security.suspicious_activity",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::LoginSucceeded { .. } => Severity::Success,
            Self::LoginFailed { .. } => Severity::Failure,
            Self::AccountLocked { .. } => Severity::Warning,
            Self::SessionExpired { .. } => Severity::Warning,
            Self::MfaEnabled { .. } => Severity::Success,
            Self::MfaDisabled { .. } => Severity::Warning,
            Self::SuspiciousActivity { .. } => Severity::Warning,
        }
    }

    /// The identity this event concerns.
    pub fn identity(&self) -> &Identity {
        match self {
            Self::LoginSucceeded { identity, .. }
            | Self::LoginFailed { identity, .. }
            | Self::AccountLocked { identity, .. }
            | Self::SessionExpired { identity, .. }
            | Self::MfaEnabled { identity, .. }
            | Self::MfaDisabled { identity, .. }
            | Self::SuspiciousActivity { identity, .. } => identity,
        }
    }

    /// Project the typed payload into the map form sinks record.
    pub fn payload(&self) -> Value {
        match self {
            Self::LoginSucceeded {
                identity,
                method,
                timestamp,
            } => json!({
                "identity": identity.as_str(),
                "method": method.as_str(),
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::LoginFailed {
                identity,
                failed_attempts,
                timestamp,
            } => json!({
                "identity": identity.as_str(),
                "attempt_count": failed_attempts,
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::AccountLocked {
                identity,
                failed_attempts,
                locked_until,
                timestamp,
            } => json!({
                "identity": identity.as_str(),
                "attempt_count": failed_attempts,
                "locked_until": locked_until.to_rfc3339(),
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::SessionExpired {
                session_id,
                identity,
                last_activity,
                timestamp,
            } => json!({
                "session_id": session_id.as_str(),
                "identity": identity.as_str(),
                "last_activity": last_activity.to_rfc3339(),
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::MfaEnabled {
                identity,
                timestamp,
            } => json!({
                "identity": identity.as_str(),
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::MfaDisabled {
                identity,
                timestamp,
            } => json!({
                "identity": identity.as_str(),
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::SuspiciousActivity {
                identity,
                reason,
                timestamp,
            } => json!({
                "identity": identity.as_str(),
                "reason": reason,
                "timestamp": timestamp.to_rfc3339(),
            }),
        }
    }
}

/// Durable, append-only destination for security events
///
/// Implementations must treat a returned `Ok` as an acknowledgment that the
/// event is recorded. The dispatcher retries a failed `record` once before
/// dropping the event with a local log entry, so sinks should not retry
/// internally.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn record(&self, event: &SecurityEvent) -> Result<(), AuditError>;
}
