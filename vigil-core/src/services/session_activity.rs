//! Session-idle monitoring
//!
//! Tracks the last recognized activity signal per session and terminates a
//! session after a fixed period of inactivity. The deadline is always
//! derived from the last activity timestamp; it is never stored separately.
//!
//! Expiry is detected two ways, whichever observes it first:
//!
//! - a per-session watcher task that sleeps until the derived deadline and
//!   re-validates on wake (activity bumps a generation counter, so a fire
//!   scheduled before a reset is a no-op), and
//! - a lazy check on [`SessionActivityMonitor::is_expired`].
//!
//! Both paths go through the same latch, so registered handlers run at most
//! once per session. An expired session is terminal: activity against it is
//! refused, never silently revived.

use std::sync::{Arc, atomic::{AtomicU64, Ordering}};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::{
    Error,
    config::SessionIdleConfig,
    error::SessionError,
    identity::Identity,
    session::{ExpiredSession, SessionId},
};

/// A trait for handling session expiry
///
/// Implementors are registered with the [`SessionActivityMonitor`] and are
/// called once per expired session, after the expiry is committed. The
/// facade registers a handler that emits the audit event; auth middleware
/// registers one to force re-authentication.
#[async_trait]
pub trait SessionExpiryHandler: Send + Sync + 'static {
    async fn on_expire(&self, expired: &ExpiredSession);
}

struct ActivityState {
    identity: Identity,
    last_activity: chrono::DateTime<Utc>,
    /// Bumped on every activity reset; a watcher wake that observes a
    /// different generation than it slept on treats its deadline as stale.
    generation: u64,
    /// Latch: set exactly once, by whichever path observes expiry first.
    expired: bool,
    /// Distinguishes this registration from a replaced one with the same id.
    epoch: u64,
}

/// Monitors per-session user activity and expires idle sessions.
pub struct SessionActivityMonitor {
    sessions: Arc<DashMap<SessionId, ActivityState>>,
    handlers: Arc<RwLock<Vec<Arc<dyn SessionExpiryHandler>>>>,
    idle_timeout: Duration,
    epoch_counter: AtomicU64,
}

impl SessionActivityMonitor {
    pub fn new(config: SessionIdleConfig) -> Self {
        Self::with_handlers(config, Vec::new())
    }

    /// Create a monitor with handlers installed before any session can
    /// expire.
    pub fn with_handlers(
        config: SessionIdleConfig,
        handlers: Vec<Arc<dyn SessionExpiryHandler>>,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            handlers: Arc::new(RwLock::new(handlers)),
            idle_timeout: config.idle_timeout,
            epoch_counter: AtomicU64::new(0),
        }
    }

    /// Register an additional expiry handler.
    pub async fn on_expire(&self, handler: Arc<dyn SessionExpiryHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Begin tracking a session. Re-registering an id replaces the previous
    /// tracking state; the old watcher task stands down.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, session_id: &SessionId, identity: &Identity) {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(
            session_id.clone(),
            ActivityState {
                identity: identity.clone(),
                last_activity: Utc::now(),
                generation: 0,
                expired: false,
                epoch,
            },
        );
        self.spawn_watcher(session_id.clone(), epoch);
    }

    /// Record a recognized activity signal: moves the deadline out to
    /// `now + idle_timeout`.
    ///
    /// A burst of signals coalesces naturally — each one only overwrites the
    /// activity timestamp; there is a single watcher and a single derived
    /// deadline per session, never a timer per signal.
    pub fn record_activity(&self, session_id: &SessionId) -> Result<(), Error> {
        let Some(mut state) = self.sessions.get_mut(session_id) else {
            return Err(SessionError::NotFound.into());
        };

        let now = Utc::now();
        if state.expired || now > state.last_activity + self.idle_timeout {
            // Terminal: the session must be re-established, not revived.
            return Err(SessionError::Expired.into());
        }

        state.last_activity = now;
        state.generation += 1;
        Ok(())
    }

    /// Whether the session has passed its idle deadline.
    ///
    /// Unknown sessions read as expired. If this call is the first to
    /// observe the deadline passing it also commits the expiry and runs the
    /// handlers, so callers polling this see the same exactly-once behavior
    /// as the watcher path.
    pub async fn is_expired(&self, session_id: &SessionId) -> bool {
        let fired = {
            let Some(mut state) = self.sessions.get_mut(session_id) else {
                return true;
            };
            if state.expired {
                return true;
            }
            if Utc::now() > state.last_activity + self.idle_timeout {
                state.expired = true;
                Some(ExpiredSession {
                    session_id: session_id.clone(),
                    identity: state.identity.clone(),
                    last_activity: state.last_activity,
                })
            } else {
                None
            }
        };

        match fired {
            Some(expired) => {
                Self::fire_handlers(&self.handlers, &expired).await;
                true
            }
            None => false,
        }
    }

    /// Stop tracking a session (logout). No expiry fires for it afterwards.
    pub fn deregister(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }

    /// Number of sessions currently tracked, including expired ones not yet
    /// deregistered.
    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }

    async fn fire_handlers(
        handlers: &RwLock<Vec<Arc<dyn SessionExpiryHandler>>>,
        expired: &ExpiredSession,
    ) {
        tracing::info!(
            session_id = %expired.session_id,
            identity = %expired.identity,
            "session expired after idle timeout"
        );
        for handler in handlers.read().await.iter() {
            handler.on_expire(expired).await;
        }
    }

    fn spawn_watcher(&self, session_id: SessionId, epoch: u64) {
        let sessions = Arc::clone(&self.sessions);
        let handlers = Arc::clone(&self.handlers);
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            loop {
                // Snapshot the deadline without holding the entry across an await
                let (deadline, generation) = match sessions.get(&session_id) {
                    None => return,
                    Some(state) => {
                        if state.epoch != epoch || state.expired {
                            return;
                        }
                        (state.last_activity + idle_timeout, state.generation)
                    }
                };

                let now = Utc::now();
                if deadline > now {
                    let sleep_for = (deadline - now).to_std().unwrap_or_default();
                    tokio::time::sleep(sleep_for).await;
                    continue;
                }

                let fired = match sessions.get_mut(&session_id) {
                    None => return,
                    Some(mut state) => {
                        if state.epoch != epoch || state.expired {
                            return;
                        }
                        if state.generation != generation
                            || Utc::now() <= state.last_activity + idle_timeout
                        {
                            // Activity arrived after the snapshot; this fire
                            // is stale and must be a no-op.
                            None
                        } else {
                            state.expired = true;
                            Some(ExpiredSession {
                                session_id: session_id.clone(),
                                identity: state.identity.clone(),
                                last_activity: state.last_activity,
                            })
                        }
                    }
                };

                match fired {
                    Some(expired) => {
                        Self::fire_handlers(&handlers, &expired).await;
                        return;
                    }
                    None => continue,
                }
            }
        });
    }
}
