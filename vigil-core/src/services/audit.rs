//! Audit event dispatch
//!
//! Security decisions never wait on the audit sink: [`AuditDispatcher::dispatch`]
//! enqueues and returns, and a worker task drives the sink. Events are not
//! silently droppable either — a failed `record` is retried once, and only a
//! second failure drops the event, leaving a local log record with the full
//! payload as the fallback trail.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{
    Error,
    error::AuditError,
    events::{AuditSink, SecurityEvent},
};

enum AuditCommand {
    Record(SecurityEvent),
    Flush(oneshot::Sender<()>),
}

/// Forwards security events to the configured sink, queue-and-retry.
///
/// Events are delivered in dispatch order. Must be created from within a
/// tokio runtime; the worker task runs until the dispatcher is dropped and
/// the queue drains.
pub struct AuditDispatcher {
    tx: mpsc::UnboundedSender<AuditCommand>,
}

impl AuditDispatcher {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    AuditCommand::Record(event) => Self::deliver(sink.as_ref(), event).await,
                    AuditCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    /// Enqueue an event. Never blocks and never fails the caller's state
    /// transition; if the worker is gone the event goes straight to the
    /// local fallback log.
    pub fn dispatch(&self, event: SecurityEvent) {
        if let Err(mpsc::error::SendError(AuditCommand::Record(event))) =
            self.tx.send(AuditCommand::Record(event))
        {
            tracing::error!(
                event_type = event.event_type(),
                payload = %event.payload(),
                "audit dispatcher stopped; event recorded locally only"
            );
        }
    }

    /// Wait until every event enqueued before this call has been handed to
    /// the sink (or dropped after its retry). Test and shutdown support.
    pub async fn flush(&self) -> Result<(), Error> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(AuditCommand::Flush(ack_tx))
            .map_err(|_| AuditError::DispatcherStopped)?;
        ack_rx.await.map_err(|_| AuditError::DispatcherStopped)?;
        Ok(())
    }

    async fn deliver(sink: &dyn AuditSink, event: SecurityEvent) {
        if let Err(first) = sink.record(&event).await {
            tracing::warn!(
                event_type = event.event_type(),
                error = %first,
                "audit sink rejected event, retrying once"
            );
            if let Err(second) = sink.record(&event).await {
                tracing::error!(
                    event_type = event.event_type(),
                    severity = %event.severity(),
                    payload = %event.payload(),
                    error = %second,
                    "audit event dropped after retry; payload recorded locally"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<SecurityEvent>>,
        failures_remaining: AtomicU32,
        attempts: AtomicU32,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Self::failing(0)
        }

        fn failing(times: u32) -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                failures_remaining: AtomicU32::new(times),
                attempts: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, event: &SecurityEvent) -> Result<(), AuditError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(AuditError::SinkUnavailable("injected failure".into()));
            }
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    fn mfa_enabled_event(identity: &str) -> SecurityEvent {
        SecurityEvent::MfaEnabled {
            identity: Identity::new(identity),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let sink = RecordingSink::new();
        let dispatcher = AuditDispatcher::new(sink.clone());

        dispatcher.dispatch(mfa_enabled_event("u1"));
        dispatcher.dispatch(mfa_enabled_event("u2"));
        dispatcher.dispatch(mfa_enabled_event("u3"));
        dispatcher.flush().await.unwrap();

        let events = sink.events.lock().await;
        let identities: Vec<_> = events.iter().map(|e| e.identity().to_string()).collect();
        assert_eq!(identities, ["u1", "u2", "u3"]);
    }

    #[tokio::test]
    async fn test_single_failure_retried_and_delivered() {
        let sink = RecordingSink::failing(1);
        let dispatcher = AuditDispatcher::new(sink.clone());

        dispatcher.dispatch(mfa_enabled_event("u1"));
        dispatcher.flush().await.unwrap();

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_failure_drops_event_without_blocking() {
        let sink = RecordingSink::failing(2);
        let dispatcher = AuditDispatcher::new(sink.clone());

        dispatcher.dispatch(mfa_enabled_event("u1"));
        dispatcher.dispatch(mfa_enabled_event("u2"));
        dispatcher.flush().await.unwrap();

        // First event burned both failures and was dropped; second delivered
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity().as_str(), "u2");
    }
}
