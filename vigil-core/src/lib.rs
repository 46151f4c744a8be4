//! Core functionality for the vigil account-security project
//!
//! This crate contains the domain types, error taxonomy, typed audit events,
//! and services that make up the account-security core: failed-login lockout,
//! session-idle monitoring, and MFA enrollment/verification.
//!
//! The crate is designed to be composed by the `vigil` facade crate and is not
//! intended to be used directly by application code.
//!
//! See [`services::LockoutTracker`], [`services::SessionActivityMonitor`], and
//! [`services::MfaService`] for the three state machines, and
//! [`events::SecurityEvent`] for the closed audit-event vocabulary.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod id;
pub mod identity;
pub mod mfa;
pub mod repositories;
pub mod services;
pub mod session;
pub mod totp;
pub mod validation;

pub use auth::{IdentityVerifier, LoginMethod};
pub use config::{LockoutConfig, MfaConfig, SecurityConfig, SessionIdleConfig};
pub use error::Error;
pub use events::{AuditSink, SecurityEvent, Severity};
pub use identity::Identity;
pub use mfa::{EnrollmentSetup, EnrollmentState, MfaSettings};
pub use session::{ExpiredSession, SessionId};
pub use totp::TotpSecret;
