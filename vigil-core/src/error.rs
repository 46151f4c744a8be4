use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Lockout error: {0}")]
    Lockout(#[from] LockoutError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Enrollment error: {0}")]
    Enrollment(#[from] EnrollmentError),

    #[error("MFA error: {0}")]
    Mfa(#[from] MfaError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Identity must not be empty")]
    MissingIdentity,

    #[error("Invalid code format: {0}")]
    MalformedCode(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No identity verifier configured")]
    VerifierNotConfigured,
}

#[derive(Debug, Error)]
pub enum LockoutError {
    #[error("Account is locked until {locked_until}")]
    Locked { locked_until: DateTime<Utc> },
}

impl LockoutError {
    /// Seconds until the lock lifts, clamped to zero.
    pub fn retry_after_seconds(&self) -> i64 {
        match self {
            LockoutError::Locked { locked_until } => {
                (*locked_until - Utc::now()).num_seconds().max(0)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("No enrollment in progress")]
    NotInProgress,

    #[error("Operation {operation} is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum MfaError {
    #[error("MFA is not enabled")]
    NotEnabled,

    #[error("MFA is already enabled")]
    AlreadyEnabled,

    #[error("Code rejected")]
    CodeRejected,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Audit dispatcher stopped")]
    DispatcherStopped,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Record not found")]
    NotFound,
}

impl Error {
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Error::Lockout(LockoutError::Locked { .. }))
    }

    pub fn is_enrollment_error(&self) -> bool {
        matches!(self, Error::Enrollment(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}
