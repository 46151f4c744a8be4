use crate::error::ValidationError;
use crate::identity::Identity;
use regex::Regex;
use std::sync::LazyLock;

/// Centralized validation utilities for the vigil security core
///
/// This module provides a single source of truth for input validation,
/// ensuring malformed input is rejected before it touches any state.
/// Lazy-loaded MFA code regex
///
/// A submitted authenticator code must be exactly 6 ASCII digits. Anything
/// else is rejected here, before the code-matching algorithm runs.
static CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("Invalid code regex pattern"));

/// Validates a principal identity
///
/// # Arguments
///
/// * `identity` - The identity to validate
///
/// # Returns
///
/// Returns `Ok(())` if the identity is non-empty, or
/// `ValidationError::MissingIdentity` otherwise.
pub fn validate_identity(identity: &Identity) -> Result<(), ValidationError> {
    if identity.is_empty() {
        return Err(ValidationError::MissingIdentity);
    }
    Ok(())
}

/// Validates an authenticator code's shape
///
/// # Arguments
///
/// * `code` - The submitted code
///
/// # Returns
///
/// Returns `Ok(())` if the code is exactly 6 ASCII digits, or
/// `ValidationError::MalformedCode` otherwise.
///
/// # Examples
///
/// ```rust
/// use vigil_core::validation::validate_code;
///
/// assert!(validate_code("123456").is_ok());
/// assert!(validate_code("12345").is_err());
/// assert!(validate_code("12345a").is_err());
/// ```
pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    if CODE_REGEX.is_match(code) {
        Ok(())
    } else {
        Err(ValidationError::MalformedCode(code.to_string()))
    }
}

/// Whether a submitted string has the shape of an authenticator code.
///
/// Used to decide between the TOTP path and the backup-code path at login
/// verification time.
pub fn looks_like_code(code: &str) -> bool {
    CODE_REGEX.is_match(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identity() {
        assert!(validate_identity(&Identity::new("u1")).is_ok());
        assert!(matches!(
            validate_identity(&Identity::new("")),
            Err(ValidationError::MissingIdentity)
        ));
        assert!(validate_identity(&Identity::new("  ")).is_err());
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("000000").is_ok());
        assert!(validate_code("123456").is_ok());

        assert!(validate_code("").is_err());
        assert!(validate_code("12345").is_err());
        assert!(validate_code("1234567").is_err());
        assert!(validate_code("12345a").is_err());
        assert!(validate_code("12 456").is_err());
        assert!(validate_code("۱۲۳۴۵۶").is_err()); // non-ASCII digits
    }

    #[test]
    fn test_looks_like_code() {
        assert!(looks_like_code("654321"));
        assert!(!looks_like_code("ABCD-EFGH"));
    }
}
