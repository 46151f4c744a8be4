//! Multi-factor authentication state
//!
//! Two kinds of state live here. [`MfaSettings`] is the durable per-identity
//! record persisted through [`crate::repositories::MfaRepository`]: whether
//! MFA is on, the shared secret, the unspent backup-code digests, and the
//! last accepted TOTP step. [`MfaEnrollment`] is the ephemeral state machine
//! for one enrollment attempt; it holds the plaintext backup codes only
//! until completion persists their digests.

use chrono::{DateTime, Utc};
use rand::{TryRngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::MfaConfig,
    error::EnrollmentError,
    identity::Identity,
    totp::{self, TotpSecret},
};

/// Durable MFA state for one identity.
///
/// Invariant: `enabled` implies `secret` is present. Backup codes are stored
/// as SHA-256 hex digests; consuming a code removes its digest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MfaSettings {
    pub enabled: bool,
    pub secret: Option<TotpSecret>,
    pub backup_codes: Vec<String>,
    /// Last TOTP step accepted at login; later submissions of the same step
    /// are replays and must be refused.
    pub last_used_step: Option<u64>,
}

impl MfaSettings {
    /// The cleared state written by a disable: no secret, no codes.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Remove the backup code matching `code`, if any. Returns whether a
    /// code was consumed.
    pub fn consume_backup_code(&mut self, code: &str) -> bool {
        let digest = hash_backup_code(code);
        match self.backup_codes.iter().position(|c| *c == digest) {
            Some(index) => {
                self.backup_codes.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Digest a backup code for storage or comparison.
///
/// Codes are normalized first (uppercased, separators stripped) so user
/// input survives re-formatting by password managers.
pub fn hash_backup_code(code: &str) -> String {
    let normalized: String = code
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .collect::<String>()
        .to_uppercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate `count` single-use backup codes in `XXXX-XXXX` form.
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            // 5 random bytes encode to exactly 8 base32 characters
            let mut bytes = [0u8; 5];
            OsRng.try_fill_bytes(&mut bytes).unwrap();
            let encoded = totp::base32::encode(&bytes);
            format!("{}-{}", &encoded[..4], &encoded[4..])
        })
        .collect()
}

/// Where an enrollment attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    /// Secret and codes generated; waiting for the user to scan the QR.
    AwaitingScan,
    /// Waiting for the first authenticator code to prove the scan worked.
    AwaitingVerification,
    /// Code accepted; waiting for the user to acknowledge the backup codes.
    BackupCodesIssued,
    /// Enrollment finished and persisted.
    Complete,
}

impl EnrollmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingScan => "awaiting_scan",
            Self::AwaitingVerification => "awaiting_verification",
            Self::BackupCodesIssued => "backup_codes_issued",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the enrollment UI needs to show the user: the URI to scan and the
/// backup codes, displayed exactly once.
#[derive(Debug, Clone)]
pub struct EnrollmentSetup {
    pub secret_enrollment_uri: String,
    pub backup_codes: Vec<String>,
}

/// One in-flight enrollment attempt.
///
/// Transitions are linear: `AwaitingScan` → `AwaitingVerification` →
/// `BackupCodesIssued` → `Complete`. An operation against the wrong state
/// returns [`EnrollmentError::InvalidState`]; the owning service treats that
/// as fatal to the flow and discards the enrollment.
#[derive(Debug)]
pub struct MfaEnrollment {
    identity: Identity,
    state: EnrollmentState,
    pending_secret: TotpSecret,
    backup_codes: Vec<String>,
    started_at: DateTime<Utc>,
}

impl MfaEnrollment {
    /// Start an enrollment: generates the secret and backup codes and enters
    /// `AwaitingScan`.
    pub fn begin(identity: Identity, config: &MfaConfig) -> Self {
        Self {
            identity,
            state: EnrollmentState::AwaitingScan,
            pending_secret: TotpSecret::generate(),
            backup_codes: generate_backup_codes(config.backup_code_count),
            started_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> EnrollmentState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Build the handoff for the enrollment UI.
    pub fn setup(&self, config: &MfaConfig) -> EnrollmentSetup {
        EnrollmentSetup {
            secret_enrollment_uri: totp::enrollment_uri(
                &self.pending_secret,
                &config.issuer,
                &self.identity,
                config.period_seconds,
            ),
            backup_codes: self.backup_codes.clone(),
        }
    }

    /// The user confirmed they scanned the QR code.
    pub fn confirm_scanned(&mut self) -> Result<(), EnrollmentError> {
        self.expect_state(EnrollmentState::AwaitingScan, "confirm_scanned")?;
        self.state = EnrollmentState::AwaitingVerification;
        Ok(())
    }

    /// Check a submitted code against the pending secret. Does not
    /// transition; a wrong code leaves the state untouched.
    pub fn code_matches(&self, code: &str, config: &MfaConfig) -> bool {
        totp::verify(&self.pending_secret, code, config.period_seconds, config.skew_steps).is_some()
    }

    /// A correct code was accepted: move to `BackupCodesIssued` and return
    /// the codes for presentation.
    pub fn mark_verified(&mut self) -> Result<Vec<String>, EnrollmentError> {
        self.expect_state(EnrollmentState::AwaitingVerification, "submit_code")?;
        self.state = EnrollmentState::BackupCodesIssued;
        Ok(self.backup_codes.clone())
    }

    /// The user acknowledged the backup codes: the flow is complete.
    ///
    /// Accepted again in `Complete` so that a failed persist can re-run the
    /// acknowledgment without losing the flow.
    pub fn acknowledge_codes(&mut self) -> Result<(), EnrollmentError> {
        match self.state {
            EnrollmentState::BackupCodesIssued | EnrollmentState::Complete => {
                self.state = EnrollmentState::Complete;
                Ok(())
            }
            _ => Err(EnrollmentError::InvalidState {
                operation: "acknowledge_backup_codes",
                state: self.state.as_str(),
            }),
        }
    }

    /// The durable settings a completed enrollment persists: enabled, with
    /// the secret and the digests of the issued codes.
    pub fn settings(&self) -> MfaSettings {
        MfaSettings {
            enabled: true,
            secret: Some(self.pending_secret.clone()),
            backup_codes: self.backup_codes.iter().map(|c| hash_backup_code(c)).collect(),
            last_used_step: None,
        }
    }

    fn expect_state(
        &self,
        expected: EnrollmentState,
        operation: &'static str,
    ) -> Result<(), EnrollmentError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EnrollmentError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }
}
