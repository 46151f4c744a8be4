//! Authentication boundary
//!
//! The actual credential check is never performed by this crate. The
//! [`IdentityVerifier`] trait is the seam to the external identity provider;
//! the facade calls it (when configured) and records the outcome against the
//! lockout tracker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, identity::Identity};

/// How a principal authenticated. Carried on the `login.succeeded` audit
/// event so downstream consumers can distinguish first factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    Password,
    OAuth,
    Passkey,
    MagicLink,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::OAuth => "oauth",
            Self::Passkey => "passkey",
            Self::MagicLink => "magic_link",
        }
    }
}

impl std::fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External identity provider boundary.
///
/// Implementations validate a credential (password, OAuth token, ...) for an
/// identity and report success or failure. They must not mutate any security
/// state; recording the outcome is the facade's job.
#[async_trait]
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Check a credential for an identity.
    ///
    /// Returns `Ok(true)` on a successful check, `Ok(false)` on a failed
    /// check, and `Err` only for provider-level failures (network, backend).
    async fn verify(&self, identity: &Identity, credential: &str) -> Result<bool, Error>;
}
