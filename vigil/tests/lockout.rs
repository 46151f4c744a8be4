use std::sync::Arc;

use chrono::Duration;
use vigil::{Error, Identity, LoginMethod, SecurityConfig, Vigil};
use vigil_core::config::LockoutConfig;
use vigil_storage_memory::{MemoryAuditSink, MemoryMfaRepository};

fn vigil_with_lockout(
    max_failed_attempts: u32,
    lockout_duration: Duration,
) -> (Vigil<MemoryMfaRepository>, Arc<MemoryAuditSink>) {
    let sink = MemoryAuditSink::new();
    let config = SecurityConfig {
        lockout: LockoutConfig {
            max_failed_attempts,
            lockout_duration,
        },
        ..SecurityConfig::default()
    };
    let vigil = Vigil::with_config(Arc::new(MemoryMfaRepository::new()), sink.clone(), config);
    (vigil, sink)
}

#[tokio::test]
async fn test_lockout_after_five_failures() {
    let (vigil, sink) = vigil_with_lockout(5, Duration::minutes(15));
    let identity = Identity::new("u1");

    for _ in 0..4 {
        let status = vigil.record_failed_login(&identity).unwrap();
        assert!(!status.is_locked);
        assert!(!vigil.is_account_locked(&identity));
    }

    let status = vigil.record_failed_login(&identity).unwrap();
    assert!(status.is_locked);
    assert_eq!(status.failed_attempts, 5);
    assert!(vigil.is_account_locked(&identity));

    vigil.flush_audit().await.unwrap();
    assert_eq!(
        sink.recorded_types().await,
        [
            "login.failed",
            "login.failed",
            "login.failed",
            "login.failed",
            "account.locked",
        ]
    );
}

#[tokio::test]
async fn test_failure_while_locked_is_refused_without_extending() {
    let (vigil, sink) = vigil_with_lockout(2, Duration::minutes(15));
    let identity = Identity::new("u1");

    vigil.record_failed_login(&identity).unwrap();
    let status = vigil.record_failed_login(&identity).unwrap();
    let locked_until = status.locked_until.unwrap();

    let err = vigil.record_failed_login(&identity).unwrap_err();
    assert!(err.is_locked());
    assert_eq!(vigil.lockout_status(&identity).locked_until, Some(locked_until));

    vigil.flush_audit().await.unwrap();
    assert_eq!(
        sink.recorded_types().await,
        ["login.failed", "account.locked", "security.suspicious_activity"]
    );
}

#[tokio::test]
async fn test_success_resets_counter() {
    let (vigil, _) = vigil_with_lockout(5, Duration::minutes(15));
    let identity = Identity::new("u1");

    for _ in 0..4 {
        vigil.record_failed_login(&identity).unwrap();
    }
    vigil
        .record_successful_login(&identity, LoginMethod::Password)
        .unwrap();

    for _ in 0..4 {
        let status = vigil.record_failed_login(&identity).unwrap();
        assert!(!status.is_locked);
    }
    assert!(!vigil.is_account_locked(&identity));
}

#[tokio::test]
async fn test_lock_expires_and_counting_restarts() {
    let (vigil, _) = vigil_with_lockout(2, Duration::milliseconds(50));
    let identity = Identity::new("u1");

    vigil.record_failed_login(&identity).unwrap();
    vigil.record_failed_login(&identity).unwrap();
    assert!(vigil.is_account_locked(&identity));

    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    // Lock lifted lazily; the next failure starts a fresh count
    assert!(!vigil.is_account_locked(&identity));
    let status = vigil.record_failed_login(&identity).unwrap();
    assert!(!status.is_locked);
    assert_eq!(status.failed_attempts, 1);
}

#[tokio::test]
async fn test_identities_are_independent() {
    let (vigil, _) = vigil_with_lockout(2, Duration::minutes(15));

    vigil.record_failed_login(&Identity::new("u1")).unwrap();
    vigil.record_failed_login(&Identity::new("u1")).unwrap();

    assert!(vigil.is_account_locked(&Identity::new("u1")));
    assert!(!vigil.is_account_locked(&Identity::new("u2")));
}

#[tokio::test]
async fn test_empty_identity_rejected() {
    let (vigil, sink) = vigil_with_lockout(5, Duration::minutes(15));

    let err = vigil.record_failed_login(&Identity::new("")).unwrap_err();
    assert!(err.is_validation_error());
    assert!(matches!(
        vigil
            .record_successful_login(&Identity::new("  "), LoginMethod::Password)
            .unwrap_err(),
        Error::Validation(_)
    ));

    vigil.flush_audit().await.unwrap();
    assert!(sink.recorded().await.is_empty());
}
