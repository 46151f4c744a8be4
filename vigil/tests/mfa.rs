use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use vigil::{EnrollmentState, Error, Identity, MfaError, MfaVerification, Vigil};
use vigil_core::totp::{self, TotpSecret};
use vigil_storage_memory::{MemoryAuditSink, MemoryMfaRepository};

fn vigil() -> (Vigil<MemoryMfaRepository>, Arc<MemoryAuditSink>) {
    let sink = MemoryAuditSink::new();
    let vigil = Vigil::new(Arc::new(MemoryMfaRepository::new()), sink.clone());
    (vigil, sink)
}

fn secret_from_uri(uri: &str) -> TotpSecret {
    let encoded = uri
        .split("secret=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .expect("enrollment URI carries the secret");
    TotpSecret::from_base32(encoded).expect("secret is valid base32")
}

fn current_code(secret: &TotpSecret) -> String {
    let step = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        / 30;
    totp::code_at(secret, step).unwrap()
}

/// Drive a full enrollment and return the backup codes.
async fn enroll(vigil: &Vigil<MemoryMfaRepository>, identity: &Identity) -> Vec<String> {
    let setup = vigil.start_mfa_enrollment(identity).await.unwrap();
    vigil.confirm_mfa_scanned(identity).unwrap();

    let secret = secret_from_uri(&setup.secret_enrollment_uri);
    let codes = vigil
        .submit_mfa_code(identity, &current_code(&secret))
        .unwrap();
    vigil.acknowledge_backup_codes(identity).await.unwrap();
    codes
}

#[tokio::test]
async fn test_enrollment_round_trip() {
    let (vigil, sink) = vigil();
    let identity = Identity::new("u1");

    let setup = vigil.start_mfa_enrollment(&identity).await.unwrap();
    assert!(setup.secret_enrollment_uri.starts_with("otpauth://totp/"));
    assert_eq!(setup.backup_codes.len(), 10);
    assert_eq!(
        vigil.mfa_enrollment_state(&identity),
        Some(EnrollmentState::AwaitingScan)
    );
    assert!(!vigil.is_mfa_enabled(&identity).await.unwrap());

    vigil.confirm_mfa_scanned(&identity).unwrap();
    let secret = secret_from_uri(&setup.secret_enrollment_uri);
    let presented = vigil
        .submit_mfa_code(&identity, &current_code(&secret))
        .unwrap();
    assert_eq!(presented, setup.backup_codes);
    assert_eq!(
        vigil.mfa_enrollment_state(&identity),
        Some(EnrollmentState::BackupCodesIssued)
    );

    vigil.acknowledge_backup_codes(&identity).await.unwrap();
    assert!(vigil.is_mfa_enabled(&identity).await.unwrap());
    assert!(vigil.mfa_enrollment_state(&identity).is_none());

    vigil.flush_audit().await.unwrap();
    assert_eq!(sink.recorded_types().await, ["mfa.enabled"]);
}

#[tokio::test]
async fn test_wrong_code_leaves_enrollment_pending() {
    let (vigil, sink) = vigil();
    let identity = Identity::new("u1");

    let setup = vigil.start_mfa_enrollment(&identity).await.unwrap();
    vigil.confirm_mfa_scanned(&identity).unwrap();

    let secret = secret_from_uri(&setup.secret_enrollment_uri);
    let real = current_code(&secret);
    let wrong = if real == "000000" { "000001" } else { "000000" };

    let err = vigil.submit_mfa_code(&identity, wrong).unwrap_err();
    assert!(matches!(err, Error::Mfa(MfaError::CodeRejected)));
    assert_eq!(
        vigil.mfa_enrollment_state(&identity),
        Some(EnrollmentState::AwaitingVerification)
    );
    assert!(!vigil.is_mfa_enabled(&identity).await.unwrap());

    vigil.flush_audit().await.unwrap();
    assert!(sink.recorded().await.is_empty());
}

#[tokio::test]
async fn test_out_of_order_enrollment_resets_flow() {
    let (vigil, _) = vigil();
    let identity = Identity::new("u1");

    vigil.start_mfa_enrollment(&identity).await.unwrap();
    let err = vigil.submit_mfa_code(&identity, "123456").unwrap_err();
    assert!(err.is_enrollment_error());
    assert!(vigil.mfa_enrollment_state(&identity).is_none());
}

#[tokio::test]
async fn test_login_verification_with_totp() {
    let (vigil, _) = vigil();
    let identity = Identity::new("u1");

    let setup = vigil.start_mfa_enrollment(&identity).await.unwrap();
    let secret = secret_from_uri(&setup.secret_enrollment_uri);
    vigil.confirm_mfa_scanned(&identity).unwrap();
    vigil
        .submit_mfa_code(&identity, &current_code(&secret))
        .unwrap();
    vigil.acknowledge_backup_codes(&identity).await.unwrap();

    let verification = vigil
        .verify_login_code(&identity, &current_code(&secret))
        .await
        .unwrap();
    assert_eq!(verification, MfaVerification::Totp);
}

#[tokio::test]
async fn test_backup_code_is_single_use() {
    let (vigil, _) = vigil();
    let identity = Identity::new("u1");
    let codes = enroll(&vigil, &identity).await;

    let verification = vigil.verify_login_code(&identity, &codes[0]).await.unwrap();
    assert_eq!(verification, MfaVerification::BackupCode);

    let err = vigil
        .verify_login_code(&identity, &codes[0])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Mfa(MfaError::CodeRejected)));
}

#[tokio::test]
async fn test_verification_requires_enabled_mfa() {
    let (vigil, _) = vigil();
    let identity = Identity::new("u1");

    let err = vigil
        .verify_login_code(&identity, "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Mfa(MfaError::NotEnabled)));
}

#[tokio::test]
async fn test_disable_is_idempotent_with_single_audit_event() {
    let (vigil, sink) = vigil();
    let identity = Identity::new("u1");
    enroll(&vigil, &identity).await;

    vigil.disable_mfa(&identity).await.unwrap();
    vigil.disable_mfa(&identity).await.unwrap();
    vigil.disable_mfa(&identity).await.unwrap();

    assert!(!vigil.is_mfa_enabled(&identity).await.unwrap());

    vigil.flush_audit().await.unwrap();
    assert_eq!(sink.recorded_types().await, ["mfa.enabled", "mfa.disabled"]);
}

#[tokio::test]
async fn test_enrollment_refused_while_enabled() {
    let (vigil, _) = vigil();
    let identity = Identity::new("u1");
    enroll(&vigil, &identity).await;

    let err = vigil.start_mfa_enrollment(&identity).await.unwrap_err();
    assert!(matches!(err, Error::Mfa(MfaError::AlreadyEnabled)));

    // After a disable, enrollment opens up again
    vigil.disable_mfa(&identity).await.unwrap();
    vigil.start_mfa_enrollment(&identity).await.unwrap();
}
