//! Failed-login lockout tracking
//!
//! Per-identity attempt counting with automatic timed lockout. After
//! `max_failed_attempts` consecutive failures an identity is locked until
//! `now + lockout_duration`; the lock lifts lazily on the next access after
//! it elapses, and lifting resets the counter so the next window starts
//! clean.
//!
//! # Thread Safety
//!
//! State lives in a [`DashMap`] keyed by identity. Every update runs under
//! the entry's shard lock, so concurrent failures against one identity
//! serialize around the threshold check: the transition to locked happens
//! exactly once, and failures arriving while locked are refused rather than
//! counted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{
    Error,
    config::LockoutConfig,
    error::LockoutError,
    identity::Identity,
};

/// Point-in-time lockout state for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutStatus {
    /// Failed attempts in the current window. On the status returned by the
    /// locking failure this is the count that triggered the lock; the stored
    /// counter itself is reset to zero at that moment.
    pub failed_attempts: u32,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    fn unlocked(failed_attempts: u32) -> Self {
        Self {
            failed_attempts,
            is_locked: false,
            locked_until: None,
        }
    }

    /// Seconds until the account unlocks, if currently locked.
    pub fn retry_after_seconds(&self) -> Option<i64> {
        self.locked_until
            .filter(|_| self.is_locked)
            .map(|until| (until - Utc::now()).num_seconds().max(0))
    }
}

#[derive(Debug, Default)]
struct LockoutState {
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    /// Lift the lock if its deadline has passed. Lifting resets the counter.
    fn expire_if_due(&mut self, now: DateTime<Utc>) {
        if let Some(until) = self.locked_until {
            if until <= now {
                self.locked_until = None;
                self.failed_attempts = 0;
            }
        }
    }
}

/// Tracks failed authentication attempts per identity and enforces a timed
/// lockout.
pub struct LockoutTracker {
    states: DashMap<Identity, LockoutState>,
    config: LockoutConfig,
}

impl LockoutTracker {
    pub fn new(config: LockoutConfig) -> Self {
        Self {
            states: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Record a failed authentication attempt.
    ///
    /// Refused with [`LockoutError::Locked`] while a lock is in force, so
    /// failures arriving after the threshold never count past it. Otherwise
    /// the counter increments; reaching the threshold imposes the lock,
    /// resets the counter, and the returned status carries the triggering
    /// count and unlock time.
    pub fn record_failure(&self, identity: &Identity) -> Result<LockoutStatus, Error> {
        let mut state = self.states.entry(identity.clone()).or_default();
        let now = Utc::now();
        state.expire_if_due(now);

        if let Some(locked_until) = state.locked_until {
            return Err(LockoutError::Locked { locked_until }.into());
        }

        state.failed_attempts += 1;
        if state.failed_attempts >= self.config.max_failed_attempts {
            let locked_until = now + self.config.lockout_duration;
            let attempts = state.failed_attempts;
            state.locked_until = Some(locked_until);
            state.failed_attempts = 0;

            tracing::warn!(
                identity = %identity,
                failed_attempts = attempts,
                locked_until = %locked_until,
                "account locked after repeated failed logins"
            );

            return Ok(LockoutStatus {
                failed_attempts: attempts,
                is_locked: true,
                locked_until: Some(locked_until),
            });
        }

        Ok(LockoutStatus::unlocked(state.failed_attempts))
    }

    /// Record a successful authentication: resets the counter.
    ///
    /// An unexpired lock is NOT lifted here; a success against a locked
    /// identity should have been refused upstream, and if one slips through
    /// only the counter is cleared so the next window starts clean.
    pub fn record_success(&self, identity: &Identity) {
        if let Some(mut state) = self.states.get_mut(identity) {
            state.failed_attempts = 0;
        }
    }

    /// Whether the identity is currently locked. Lazily lifts an elapsed
    /// lock as a side effect.
    pub fn is_locked(&self, identity: &Identity) -> bool {
        self.status(identity).is_locked
    }

    /// Current lockout status for an identity. Lazily lifts an elapsed lock.
    pub fn status(&self, identity: &Identity) -> LockoutStatus {
        let Some(mut state) = self.states.get_mut(identity) else {
            return LockoutStatus::unlocked(0);
        };
        state.expire_if_due(Utc::now());

        match state.locked_until {
            Some(locked_until) => LockoutStatus {
                failed_attempts: state.failed_attempts,
                is_locked: true,
                locked_until: Some(locked_until),
            },
            None => LockoutStatus::unlocked(state.failed_attempts),
        }
    }

    /// Drop all state for an identity (eviction on logout or TTL).
    pub fn evict(&self, identity: &Identity) {
        self.states.remove(identity);
    }
}
