//! Time-based one-time passwords (RFC 6238)
//!
//! Shared-secret TOTP with HMAC-SHA1 dynamic truncation, a configurable
//! clock-skew window, and constant-time code comparison. Verification
//! returns the matched time step so callers can enforce replay protection
//! (a step, once accepted, must never be accepted again).

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::{TryRngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::identity::Identity;

type HmacSha1 = Hmac<Sha1>;

/// Codes are always 6 digits, the authenticator-app default.
pub const TOTP_DIGITS: u32 = 6;

/// Secret length in bytes (160 bits, the RFC 4226 recommendation for SHA-1).
const SECRET_LEN: usize = 20;

/// A shared TOTP secret, held base32-encoded.
///
/// The encoded form is what authenticator apps consume via the enrollment
/// URI. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TotpSecret(String);

impl TotpSecret {
    /// Generate a new random 160-bit secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.try_fill_bytes(&mut bytes).unwrap();
        TotpSecret(base32::encode(&bytes))
    }

    /// Wrap an existing base32-encoded secret.
    ///
    /// Returns `None` if the input is not valid base32.
    pub fn from_base32(encoded: &str) -> Option<Self> {
        base32::decode(encoded).map(|_| TotpSecret(encoded.to_uppercase()))
    }

    /// The base32-encoded form, for enrollment URIs and storage.
    pub fn as_base32(&self) -> &str {
        &self.0
    }

    fn bytes(&self) -> Option<Vec<u8>> {
        base32::decode(&self.0)
    }
}

impl std::fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TotpSecret").field(&"[REDACTED]").finish()
    }
}

/// Generate the code for a given time step.
///
/// Returns `None` if the secret does not decode.
pub fn code_at(secret: &TotpSecret, time_step: u64) -> Option<String> {
    let key = secret.bytes()?;
    let counter_bytes = time_step.to_be_bytes();

    let mut mac = HmacSha1::new_from_slice(&key).ok()?;
    mac.update(&counter_bytes);
    let result = mac.finalize().into_bytes();

    // Dynamic truncation (RFC 4226 §5.3)
    let offset = (result[result.len() - 1] & 0x0f) as usize;
    let code = ((result[offset] as u32 & 0x7f) << 24)
        | ((result[offset + 1] as u32) << 16)
        | ((result[offset + 2] as u32) << 8)
        | (result[offset + 3] as u32);

    let modulus = 10u32.pow(TOTP_DIGITS);
    Some(format!(
        "{:0>width$}",
        code % modulus,
        width = TOTP_DIGITS as usize
    ))
}

/// Verify a code against the current wall clock.
///
/// Returns the matched time step on success, `None` otherwise.
pub fn verify(secret: &TotpSecret, code: &str, period_seconds: u64, skew_steps: u64) -> Option<u64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    verify_at(secret, code, period_seconds, skew_steps, now)
}

/// Verify a code at an explicit unix time, allowing for clock skew.
///
/// Checks the current step and up to `skew_steps` adjacent steps in each
/// direction. Returns the matched step so the caller can record it and
/// refuse replays.
pub fn verify_at(
    secret: &TotpSecret,
    code: &str,
    period_seconds: u64,
    skew_steps: u64,
    now_unix: u64,
) -> Option<u64> {
    let current_step = now_unix / period_seconds.max(1);

    for offset in 0..=skew_steps {
        let ahead = current_step + offset;
        if let Some(expected) = code_at(secret, ahead) {
            if constant_time_eq(code.as_bytes(), expected.as_bytes()) {
                return Some(ahead);
            }
        }
        // The 0 offset is already covered by the forward check
        if offset > 0 && current_step >= offset {
            let behind = current_step - offset;
            if let Some(expected) = code_at(secret, behind) {
                if constant_time_eq(code.as_bytes(), expected.as_bytes()) {
                    return Some(behind);
                }
            }
        }
    }
    None
}

/// Build the `otpauth://` enrollment URI an authenticator app scans.
pub fn enrollment_uri(
    secret: &TotpSecret,
    issuer: &str,
    account: &Identity,
    period_seconds: u64,
) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={TOTP_DIGITS}&period={period_seconds}",
        secret = secret.as_base32(),
    )
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// RFC 4648 base32, no padding.
pub(crate) mod base32 {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    pub fn encode(input: &[u8]) -> String {
        let mut output = String::with_capacity(input.len().div_ceil(5) * 8);
        let mut buffer: u64 = 0;
        let mut bits_in_buffer = 0u32;

        for &byte in input {
            buffer = (buffer << 8) | byte as u64;
            bits_in_buffer += 8;

            while bits_in_buffer >= 5 {
                bits_in_buffer -= 5;
                let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
                output.push(ALPHABET[index] as char);
            }
        }

        if bits_in_buffer > 0 {
            let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
            output.push(ALPHABET[index] as char);
        }

        output
    }

    pub fn decode(input: &str) -> Option<Vec<u8>> {
        let input = input.trim_end_matches('=').to_uppercase();
        let input = input.as_bytes();

        let mut output = Vec::with_capacity(input.len() * 5 / 8);
        let mut buffer: u64 = 0;
        let mut bits_in_buffer = 0u32;

        for &byte in input {
            let value = ALPHABET.iter().position(|&c| c == byte)? as u64;
            buffer = (buffer << 5) | value;
            bits_in_buffer += 5;

            if bits_in_buffer >= 8 {
                bits_in_buffer -= 8;
                output.push((buffer >> bits_in_buffer) as u8);
                buffer &= (1u64 << bits_in_buffer) - 1;
            }
        }

        Some(output)
    }
}
