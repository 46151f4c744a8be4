//! In-memory storage backend for the vigil account-security core
//!
//! Process-local implementations of the storage and audit boundaries:
//! [`MemoryMfaRepository`] for durable MFA settings and [`MemoryAuditSink`]
//! as a capturing sink. Suitable for single-process deployments, development,
//! and tests; a production deployment implements the same traits over the
//! application's document store and audit pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use vigil_core::{
    Error, Identity, MfaSettings,
    error::AuditError,
    events::{AuditSink, SecurityEvent},
    repositories::MfaRepository,
};

/// MFA settings store backed by a concurrent map.
#[derive(Default)]
pub struct MemoryMfaRepository {
    settings: DashMap<Identity, MfaSettings>,
}

impl MemoryMfaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MfaRepository for MemoryMfaRepository {
    async fn get_settings(&self, identity: &Identity) -> Result<Option<MfaSettings>, Error> {
        Ok(self.settings.get(identity).map(|s| s.value().clone()))
    }

    async fn upsert_settings(
        &self,
        identity: &Identity,
        settings: &MfaSettings,
    ) -> Result<(), Error> {
        self.settings.insert(identity.clone(), settings.clone());
        Ok(())
    }

    async fn delete_settings(&self, identity: &Identity) -> Result<(), Error> {
        self.settings.remove(identity);
        Ok(())
    }
}

/// Audit sink that captures events in memory.
///
/// `fail_next` injects sink failures, which the dispatcher's retry logic
/// must absorb; tests use it to exercise that path.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<SecurityEvent>>,
    failures_remaining: AtomicU32,
}

impl MemoryAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `count` calls to `record` fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Snapshot of everything recorded so far, in order.
    pub async fn recorded(&self) -> Vec<SecurityEvent> {
        self.events.lock().await.clone()
    }

    /// Event types recorded so far, in order.
    pub async fn recorded_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .map(|e| e.event_type())
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &SecurityEvent) -> Result<(), AuditError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(AuditError::SinkUnavailable(
                "memory sink failure injected".to_string(),
            ));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
