use crate::{Error, identity::Identity, mfa::MfaSettings};
use async_trait::async_trait;

/// Repository for durable MFA settings
///
/// Implementations store one [`MfaSettings`] record per identity. Writes
/// replace the whole record; the service layer always writes a fully-formed
/// value, so a reader never observes a record with `enabled` set but no
/// secret.
#[async_trait]
pub trait MfaRepository: Send + Sync + 'static {
    /// Fetch the settings for an identity, if any exist.
    async fn get_settings(&self, identity: &Identity) -> Result<Option<MfaSettings>, Error>;

    /// Create or replace the settings for an identity.
    async fn upsert_settings(
        &self,
        identity: &Identity,
        settings: &MfaSettings,
    ) -> Result<(), Error>;

    /// Remove the settings for an identity.
    async fn delete_settings(&self, identity: &Identity) -> Result<(), Error>;
}
