//! # Vigil
//!
//! Vigil is the account-security core of a larger application: the
//! failed-login lockout state machine, the session-idle monitor, the MFA
//! enrollment/verification flow, and the audit policy around them.
//!
//! The [`Vigil`] facade is the single entry point the rest of the
//! application calls. Login screens and settings screens never talk to the
//! individual services; they call the facade, which updates the lockout
//! tracker, session monitor, and MFA service, and forwards a typed event to
//! the audit sink for every state change.
//!
//! What Vigil deliberately does NOT do: the actual credential check. The
//! identity provider validates passwords and OAuth tokens; Vigil is told the
//! outcome (or drives the provider through [`IdentityVerifier`] when one is
//! configured) and enforces the security policy around it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil::{Identity, Vigil};
//! use vigil_storage_memory::{MemoryAuditSink, MemoryMfaRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vigil::Error> {
//!     let repository = Arc::new(MemoryMfaRepository::new());
//!     let sink = MemoryAuditSink::new();
//!     let vigil = Vigil::new(repository, sink);
//!
//!     let identity = Identity::new("user@example.com");
//!     if vigil.is_account_locked(&identity) {
//!         // refuse the login attempt before touching the identity provider
//!     }
//!     vigil.record_failed_login(&identity)?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use vigil_core::{
    services::{AuditDispatcher, LockoutTracker, MfaService, SessionActivityMonitor},
    validation::validate_identity,
};

/// Re-export core types from vigil_core
///
/// These types are commonly used when working with the Vigil API.
pub use vigil_core::{
    AuditSink, EnrollmentSetup, EnrollmentState, Error, Identity, IdentityVerifier, LoginMethod,
    MfaSettings, SecurityConfig, SecurityEvent, SessionId, Severity,
    error::{AuthError, LockoutError, MfaError},
    repositories::MfaRepository,
    services::{LockoutStatus, MfaVerification, SessionExpiryHandler},
    session::ExpiredSession,
};

/// Outcome of a facade-driven login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials accepted; the session may be established.
    Success,
    /// Credentials accepted, but MFA is enabled: the caller must collect a
    /// code and finish with [`Vigil::complete_mfa_login`].
    MfaRequired,
    /// Credentials rejected; the updated lockout status says how close the
    /// identity is to a lockout.
    Rejected(LockoutStatus),
}

/// Emits `session.expired` for every session the monitor terminates.
struct ExpiryAuditHandler {
    audit: Arc<AuditDispatcher>,
}

#[async_trait]
impl SessionExpiryHandler for ExpiryAuditHandler {
    async fn on_expire(&self, expired: &ExpiredSession) {
        self.audit.dispatch(SecurityEvent::SessionExpired {
            session_id: expired.session_id.clone(),
            identity: expired.identity.clone(),
            last_activity: expired.last_activity,
            timestamp: Utc::now(),
        });
    }
}

/// The account-security coordinator.
///
/// Composes the lockout tracker, session-idle monitor, and MFA service over
/// a storage backend `R`, and owns the audit dispatcher. Every
/// state-changing operation emits exactly one audit event, enqueued after
/// the state change commits, so an event always reflects the post-change
/// state and a slow sink never delays a security decision.
///
/// Must be constructed from within a tokio runtime (the audit dispatcher
/// and session watchers are spawned tasks).
pub struct Vigil<R: MfaRepository> {
    lockout: LockoutTracker,
    sessions: SessionActivityMonitor,
    mfa: MfaService<R>,
    audit: Arc<AuditDispatcher>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl<R: MfaRepository> Vigil<R> {
    /// Create a Vigil instance with the default policy: 5 failed attempts,
    /// 15-minute lockout, 30-minute idle timeout.
    pub fn new(repository: Arc<R>, sink: Arc<dyn AuditSink>) -> Self {
        Self::with_config(repository, sink, SecurityConfig::default())
    }

    /// Create a Vigil instance with explicit configuration.
    pub fn with_config(repository: Arc<R>, sink: Arc<dyn AuditSink>, config: SecurityConfig) -> Self {
        let audit = Arc::new(AuditDispatcher::new(sink));
        let expiry_handler: Arc<dyn SessionExpiryHandler> = Arc::new(ExpiryAuditHandler {
            audit: Arc::clone(&audit),
        });

        Self {
            lockout: LockoutTracker::new(config.lockout.clone()),
            sessions: SessionActivityMonitor::with_handlers(
                config.session.clone(),
                vec![expiry_handler],
            ),
            mfa: MfaService::new(repository, config.mfa.clone()),
            audit,
            verifier: None,
        }
    }

    /// Attach an identity provider so [`Vigil::login`] can drive the whole
    /// sequence instead of the caller wiring verifier and facade by hand.
    pub fn with_identity_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    // ------------------------------------------------------------------
    // Lockout
    // ------------------------------------------------------------------

    /// Record a failed login attempt for an identity.
    ///
    /// Emits `login.failed`, or `account.locked` on the attempt that crosses
    /// the threshold. An attempt against an already-locked identity is
    /// refused with [`LockoutError::Locked`] and audited as
    /// `security.suspicious_activity`; it does not touch the lock.
    pub fn record_failed_login(&self, identity: &Identity) -> Result<LockoutStatus, Error> {
        validate_identity(identity)?;

        match self.lockout.record_failure(identity) {
            Ok(status) => {
                if status.is_locked {
                    self.audit.dispatch(SecurityEvent::AccountLocked {
                        identity: identity.clone(),
                        failed_attempts: status.failed_attempts,
                        locked_until: status
                            .locked_until
                            .unwrap_or_else(Utc::now),
                        timestamp: Utc::now(),
                    });
                } else {
                    self.audit.dispatch(SecurityEvent::LoginFailed {
                        identity: identity.clone(),
                        failed_attempts: status.failed_attempts,
                        timestamp: Utc::now(),
                    });
                }
                Ok(status)
            }
            Err(err) => {
                if err.is_locked() {
                    self.audit.dispatch(SecurityEvent::SuspiciousActivity {
                        identity: identity.clone(),
                        reason: "login attempt against locked account".to_string(),
                        timestamp: Utc::now(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Record a successful login: resets the failure counter and emits
    /// `login.succeeded`.
    pub fn record_successful_login(
        &self,
        identity: &Identity,
        method: LoginMethod,
    ) -> Result<(), Error> {
        validate_identity(identity)?;

        self.lockout.record_success(identity);
        self.audit.dispatch(SecurityEvent::LoginSucceeded {
            identity: identity.clone(),
            method,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Whether the identity is currently locked out. Pure query apart from
    /// lazily lifting an elapsed lock.
    pub fn is_account_locked(&self, identity: &Identity) -> bool {
        self.lockout.is_locked(identity)
    }

    /// Full lockout status, including the unlock time while locked.
    pub fn lockout_status(&self, identity: &Identity) -> LockoutStatus {
        self.lockout.status(identity)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Begin idle-monitoring a session for an identity.
    pub fn register_session(&self, session_id: &SessionId, identity: &Identity) {
        self.sessions.register(session_id, identity);
    }

    /// Record a recognized user-interaction signal for a session, extending
    /// its idle deadline. Refused once the session has expired.
    pub fn record_activity(&self, session_id: &SessionId) -> Result<(), Error> {
        self.sessions.record_activity(session_id)
    }

    /// Whether the session has passed its idle deadline. Unknown sessions
    /// read as expired.
    pub async fn is_session_expired(&self, session_id: &SessionId) -> bool {
        self.sessions.is_expired(session_id).await
    }

    /// Stop monitoring a session (logout).
    ///
    /// Lockout state is keyed by identity, not session, and deliberately
    /// survives this: logging out must not reset a failure count.
    pub fn end_session(&self, session_id: &SessionId) {
        self.sessions.deregister(session_id);
    }

    /// Register a handler to run when a session expires. The auth middleware
    /// uses this to force re-authentication. The `session.expired` audit
    /// event is emitted regardless.
    pub async fn on_session_expire(&self, handler: Arc<dyn SessionExpiryHandler>) {
        self.sessions.on_expire(handler).await;
    }

    // ------------------------------------------------------------------
    // MFA
    // ------------------------------------------------------------------

    /// Begin MFA enrollment. Returns the `otpauth://` URI and the backup
    /// codes for the enrollment UI. No audit event yet — nothing durable has
    /// changed until the flow completes.
    pub async fn start_mfa_enrollment(&self, identity: &Identity) -> Result<EnrollmentSetup, Error> {
        self.mfa.start_enrollment(identity).await
    }

    /// The user confirmed they scanned the enrollment QR code.
    pub fn confirm_mfa_scanned(&self, identity: &Identity) -> Result<(), Error> {
        self.mfa.confirm_scanned(identity)
    }

    /// Submit the verification code during enrollment. On success the
    /// backup codes are returned for their one-time presentation.
    pub fn submit_mfa_code(&self, identity: &Identity, code: &str) -> Result<Vec<String>, Error> {
        self.mfa.submit_code(identity, code)
    }

    /// The user acknowledged the backup codes: persists the settings and
    /// emits `mfa.enabled`.
    pub async fn acknowledge_backup_codes(&self, identity: &Identity) -> Result<(), Error> {
        self.mfa.acknowledge_backup_codes(identity).await?;
        self.audit.dispatch(SecurityEvent::MfaEnabled {
            identity: identity.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Abandon a pending enrollment.
    pub fn cancel_mfa_enrollment(&self, identity: &Identity) {
        self.mfa.cancel_enrollment(identity);
    }

    /// Where a pending enrollment stands, if one exists.
    pub fn mfa_enrollment_state(&self, identity: &Identity) -> Option<EnrollmentState> {
        self.mfa.enrollment_state(identity)
    }

    /// Verify a second factor at login: a TOTP code, or a backup code
    /// consumed on use. Refused when MFA is not enabled.
    pub async fn verify_login_code(
        &self,
        identity: &Identity,
        code: &str,
    ) -> Result<MfaVerification, Error> {
        self.mfa.verify_login_code(identity, code).await
    }

    /// Whether MFA is enabled for an identity.
    pub async fn is_mfa_enabled(&self, identity: &Identity) -> Result<bool, Error> {
        self.mfa.is_enabled(identity).await
    }

    /// Turn MFA off for an identity. Idempotent: emits `mfa.disabled` only
    /// when MFA was actually on, so repeated calls cannot duplicate events.
    ///
    /// Note that no re-verification is demanded here: any caller holding a
    /// live session for the identity may strip its second factor. Embedders
    /// wanting a stricter posture should require a fresh
    /// [`Vigil::verify_login_code`] success before calling this.
    pub async fn disable_mfa(&self, identity: &Identity) -> Result<(), Error> {
        validate_identity(identity)?;
        if self.mfa.disable(identity).await? {
            self.audit.dispatch(SecurityEvent::MfaDisabled {
                identity: identity.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Login orchestration
    // ------------------------------------------------------------------

    /// Drive a full login attempt against the configured
    /// [`IdentityVerifier`]: lockout gate, credential check, MFA gate.
    ///
    /// Returns [`LoginOutcome::MfaRequired`] when the credential is good but
    /// a second factor is pending; finish with
    /// [`Vigil::complete_mfa_login`].
    pub async fn login(
        &self,
        identity: &Identity,
        credential: &str,
        method: LoginMethod,
    ) -> Result<LoginOutcome, Error> {
        validate_identity(identity)?;
        let verifier = self
            .verifier
            .as_ref()
            .ok_or(AuthError::VerifierNotConfigured)?;

        let status = self.lockout.status(identity);
        if status.is_locked {
            return Err(LockoutError::Locked {
                locked_until: status.locked_until.unwrap_or_else(Utc::now),
            }
            .into());
        }

        if verifier.verify(identity, credential).await? {
            if self.mfa.is_enabled(identity).await? {
                return Ok(LoginOutcome::MfaRequired);
            }
            self.record_successful_login(identity, method)?;
            Ok(LoginOutcome::Success)
        } else {
            let status = self.record_failed_login(identity)?;
            Ok(LoginOutcome::Rejected(status))
        }
    }

    /// Finish a login that required MFA. A rejected code counts as a failed
    /// login attempt, so second factors cannot be ground through without
    /// tripping the lockout.
    pub async fn complete_mfa_login(
        &self,
        identity: &Identity,
        code: &str,
        method: LoginMethod,
    ) -> Result<LoginOutcome, Error> {
        let status = self.lockout.status(identity);
        if status.is_locked {
            return Err(LockoutError::Locked {
                locked_until: status.locked_until.unwrap_or_else(Utc::now),
            }
            .into());
        }

        match self.verify_login_code(identity, code).await {
            Ok(_) => {
                self.record_successful_login(identity, method)?;
                Ok(LoginOutcome::Success)
            }
            Err(Error::Mfa(MfaError::CodeRejected)) => {
                let status = self.record_failed_login(identity)?;
                Ok(LoginOutcome::Rejected(status))
            }
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------

    /// Wait for every audit event enqueued so far to reach the sink (or be
    /// dropped after its retry). Shutdown and test support.
    pub async fn flush_audit(&self) -> Result<(), Error> {
        self.audit.flush().await
    }
}
