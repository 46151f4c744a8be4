//! MFA enrollment and login verification service
//!
//! Drives the enrollment state machine and performs post-enrollment login
//! verification against the durable [`MfaSettings`] record.
//!
//! Enrollment state is ephemeral and per-identity; an operation invoked
//! against the wrong state is an ordering bug in the caller, treated as
//! fatal to the flow: the pending enrollment is discarded and the user
//! starts over.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    Error,
    config::MfaConfig,
    error::{EnrollmentError, MfaError},
    identity::Identity,
    mfa::{EnrollmentSetup, EnrollmentState, MfaEnrollment, MfaSettings},
    repositories::MfaRepository,
    totp,
    validation::{looks_like_code, validate_code, validate_identity},
};

/// Which second factor satisfied a login verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaVerification {
    /// A time-based code from the authenticator app.
    Totp,
    /// A single-use backup code, now consumed.
    BackupCode,
}

/// Service for MFA enrollment and verification.
///
/// # Thread Safety
///
/// This service is thread-safe and can be shared across tasks. Pending
/// enrollments live in a [`DashMap`]; durable settings go through the
/// repository.
pub struct MfaService<R: MfaRepository> {
    repository: Arc<R>,
    config: MfaConfig,
    enrollments: DashMap<Identity, MfaEnrollment>,
}

impl<R: MfaRepository> MfaService<R> {
    pub fn new(repository: Arc<R>, config: MfaConfig) -> Self {
        Self {
            repository,
            config,
            enrollments: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MfaConfig {
        &self.config
    }

    /// Whether MFA is enabled for an identity.
    pub async fn is_enabled(&self, identity: &Identity) -> Result<bool, Error> {
        Ok(self
            .repository
            .get_settings(identity)
            .await?
            .is_some_and(|s| s.enabled))
    }

    /// Begin enrollment for an identity.
    ///
    /// Generates the secret and backup codes and returns the handoff for the
    /// enrollment UI. Starting over while an enrollment is pending replaces
    /// it. Refused if MFA is already enabled.
    pub async fn start_enrollment(&self, identity: &Identity) -> Result<EnrollmentSetup, Error> {
        validate_identity(identity)?;
        if self.is_enabled(identity).await? {
            return Err(MfaError::AlreadyEnabled.into());
        }

        let enrollment = MfaEnrollment::begin(identity.clone(), &self.config);
        let setup = enrollment.setup(&self.config);
        self.enrollments.insert(identity.clone(), enrollment);

        tracing::info!(identity = %identity, "MFA enrollment started");
        Ok(setup)
    }

    /// The user confirmed they scanned the enrollment QR code.
    pub fn confirm_scanned(&self, identity: &Identity) -> Result<(), Error> {
        let result = match self.enrollments.get_mut(identity) {
            None => return Err(EnrollmentError::NotInProgress.into()),
            Some(mut enrollment) => enrollment.confirm_scanned(),
        };
        self.reset_on_state_error(identity, result)
    }

    /// Submit the first authenticator code to prove the scan worked.
    ///
    /// The code's shape is validated before any cryptographic work. A wrong
    /// code leaves the enrollment in `AwaitingVerification` so the user can
    /// retry; only an out-of-order call discards the flow. On success the
    /// backup codes are returned for presentation.
    pub fn submit_code(&self, identity: &Identity, code: &str) -> Result<Vec<String>, Error> {
        validate_code(code)?;

        let result = match self.enrollments.get_mut(identity) {
            None => return Err(EnrollmentError::NotInProgress.into()),
            Some(mut enrollment) => {
                if enrollment.state() != EnrollmentState::AwaitingVerification {
                    Err(EnrollmentError::InvalidState {
                        operation: "submit_code",
                        state: enrollment.state().as_str(),
                    })
                } else if enrollment.code_matches(code, &self.config) {
                    enrollment.mark_verified()
                } else {
                    return Err(MfaError::CodeRejected.into());
                }
            }
        };
        self.reset_on_state_error(identity, result)
    }

    /// The user acknowledged the backup codes: persist and finish.
    ///
    /// The settings record (enabled, secret, code digests) is written in a
    /// single upsert; the enrollment is discarded once the write lands. On a
    /// storage failure the enrollment is kept so the user can retry the
    /// acknowledgment.
    pub async fn acknowledge_backup_codes(&self, identity: &Identity) -> Result<(), Error> {
        let Some((key, mut enrollment)) = self.enrollments.remove(identity) else {
            return Err(EnrollmentError::NotInProgress.into());
        };

        if let Err(err) = enrollment.acknowledge_codes() {
            // Out-of-order call: the flow is already discarded by the remove
            return Err(err.into());
        }

        let settings = enrollment.settings();
        if let Err(err) = self.repository.upsert_settings(identity, &settings).await {
            self.enrollments.insert(key, enrollment);
            return Err(err);
        }

        tracing::info!(identity = %identity, "MFA enrollment complete");
        Ok(())
    }

    /// Discard a pending enrollment, if any.
    pub fn cancel_enrollment(&self, identity: &Identity) {
        if self.enrollments.remove(identity).is_some() {
            tracing::info!(identity = %identity, "MFA enrollment cancelled");
        }
    }

    /// Where the identity's enrollment currently stands, if one is pending.
    pub fn enrollment_state(&self, identity: &Identity) -> Option<EnrollmentState> {
        self.enrollments.get(identity).map(|e| e.state())
    }

    /// Verify a second factor at login.
    ///
    /// A 6-digit submission is checked as a TOTP code against the stored
    /// secret, with replay protection: a time step is accepted at most once.
    /// Anything else is tried as a backup code and consumed on match. Both
    /// paths are refused when MFA is not enabled.
    pub async fn verify_login_code(
        &self,
        identity: &Identity,
        code: &str,
    ) -> Result<MfaVerification, Error> {
        validate_identity(identity)?;

        let Some(mut settings) = self.repository.get_settings(identity).await? else {
            return Err(MfaError::NotEnabled.into());
        };
        if !settings.enabled {
            return Err(MfaError::NotEnabled.into());
        }
        let Some(secret) = settings.secret.clone() else {
            return Err(MfaError::NotEnabled.into());
        };

        if looks_like_code(code) {
            let matched = totp::verify(
                &secret,
                code,
                self.config.period_seconds,
                self.config.skew_steps,
            );
            let Some(step) = matched else {
                return Err(MfaError::CodeRejected.into());
            };
            if settings.last_used_step.is_some_and(|last| step <= last) {
                tracing::warn!(identity = %identity, "replayed TOTP code refused");
                return Err(MfaError::CodeRejected.into());
            }
            settings.last_used_step = Some(step);
            self.repository.upsert_settings(identity, &settings).await?;
            return Ok(MfaVerification::Totp);
        }

        if settings.consume_backup_code(code) {
            self.repository.upsert_settings(identity, &settings).await?;
            tracing::info!(
                identity = %identity,
                remaining = settings.backup_codes.len(),
                "backup code consumed"
            );
            return Ok(MfaVerification::BackupCode);
        }

        Err(MfaError::CodeRejected.into())
    }

    /// Turn MFA off for an identity: clears the enabled flag, secret, and
    /// backup codes in one write. Idempotent; returns whether MFA had been
    /// enabled. Any pending enrollment is discarded too.
    pub async fn disable(&self, identity: &Identity) -> Result<bool, Error> {
        self.cancel_enrollment(identity);

        let was_enabled = self
            .repository
            .get_settings(identity)
            .await?
            .is_some_and(|s| s.enabled);
        if !was_enabled {
            return Ok(false);
        }

        self.repository
            .upsert_settings(identity, &MfaSettings::disabled())
            .await?;
        tracing::info!(identity = %identity, "MFA disabled");
        Ok(true)
    }

    /// Map a state-machine error to a flow reset: the pending enrollment is
    /// discarded so the next attempt starts from scratch.
    fn reset_on_state_error<T>(
        &self,
        identity: &Identity,
        result: Result<T, EnrollmentError>,
    ) -> Result<T, Error> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(
                    identity = %identity,
                    error = %err,
                    "enrollment operation out of order, flow reset"
                );
                self.enrollments.remove(identity);
                Err(err.into())
            }
        }
    }
}
