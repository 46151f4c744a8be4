//! Configuration for the account-security core
//!
//! All thresholds and windows are process-wide configuration. Defaults:
//! 5 failed attempts, 15-minute lockout, 30-minute idle timeout, RFC 6238
//! TOTP parameters.

use chrono::Duration;

/// Top-level configuration composed by the facade.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub lockout: LockoutConfig,
    pub session: SessionIdleConfig,
    pub mfa: MfaConfig,
}

/// Configuration for failed-login lockout behavior.
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    /// Number of consecutive failed attempts that triggers a lockout.
    pub max_failed_attempts: u32,
    /// How long an imposed lockout lasts.
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

/// Configuration for session-idle monitoring.
#[derive(Debug, Clone)]
pub struct SessionIdleConfig {
    /// Period of inactivity after which a session is terminated.
    pub idle_timeout: Duration,
}

impl Default for SessionIdleConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::minutes(30),
        }
    }
}

/// Configuration for TOTP-based multi-factor authentication.
///
/// Codes are always 6 digits; the submitted code is length-checked before any
/// cryptographic work happens.
#[derive(Debug, Clone)]
pub struct MfaConfig {
    /// Issuer label embedded in the `otpauth://` enrollment URI.
    pub issuer: String,
    /// TOTP time-step length in seconds.
    pub period_seconds: u64,
    /// How many adjacent time steps to accept (1 allows ±1 step of clock skew).
    pub skew_steps: u64,
    /// How many single-use backup codes to issue at enrollment.
    pub backup_code_count: usize,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            issuer: "Vigil".to_string(),
            period_seconds: 30,
            skew_steps: 1,
            backup_code_count: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let config = SecurityConfig::default();
        assert_eq!(config.lockout.max_failed_attempts, 5);
        assert_eq!(config.lockout.lockout_duration, Duration::minutes(15));
        assert_eq!(config.session.idle_timeout, Duration::minutes(30));
        assert_eq!(config.mfa.period_seconds, 30);
        assert_eq!(config.mfa.skew_steps, 1);
        assert_eq!(config.mfa.backup_code_count, 10);
    }
}
