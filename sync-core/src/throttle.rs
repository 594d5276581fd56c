//! Per-aggregate admission for outbound integration calls.
//!
//! Pure state machine: the caller passes `now` and interprets the returned
//! [`Admission`]. Timers, tasks and the integration call itself live in
//! sync-client.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default minimum spacing between effective calls per aggregate.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default window in which identical requests are dropped.
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_secs(15);

/// Throttling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Minimum spacing between effective calls for one aggregate.
    pub cooldown: Duration,
    /// Identical keys accepted within this window are dropped.
    pub dedupe_window: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }
}

/// What to do with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Same key accepted within the dedupe window; drop silently.
    Duplicate,
    /// Cooldown has elapsed; call now.
    RunNow,
    /// Cooldown active and no timer pending; schedule a call after `delay`.
    Schedule {
        /// Time left in the cooldown.
        delay: Duration,
    },
    /// Cooldown active and a timer is already pending; the pending call wins.
    Coalesced,
}

/// Throttling state for one aggregate.
#[derive(Debug, Clone, Default)]
pub struct PendingSyncEntry {
    last_run_at: Option<Instant>,
    scheduled: bool,
    recent_keys: HashMap<String, Instant>,
}

impl PendingSyncEntry {
    /// Fresh entry: never run, nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what to do with a request for `key` at `now`.
    ///
    /// Dedupe runs first and is independent of cooldown state. A key that
    /// passes dedupe is remembered even if the call is coalesced.
    pub fn admit(&mut self, key: &str, now: Instant, policy: &ThrottlePolicy) -> Admission {
        self.recent_keys
            .retain(|_, seen| now.saturating_duration_since(*seen) < policy.dedupe_window);

        if self.recent_keys.contains_key(key) {
            return Admission::Duplicate;
        }
        self.recent_keys.insert(key.to_string(), now);

        // The pending timer is the one call allowed after this cooldown.
        if self.scheduled {
            return Admission::Coalesced;
        }

        let remaining = match self.last_run_at {
            None => Duration::ZERO,
            Some(last) => policy
                .cooldown
                .saturating_sub(now.saturating_duration_since(last)),
        };

        if remaining.is_zero() {
            self.last_run_at = Some(now);
            Admission::RunNow
        } else {
            self.scheduled = true;
            Admission::Schedule { delay: remaining }
        }
    }

    /// A scheduled timer fired at `now`: clear the marker and restart the cooldown.
    pub fn fire(&mut self, now: Instant) {
        self.scheduled = false;
        self.last_run_at = Some(now);
    }

    /// Drop the scheduled marker without running (timer aborted).
    pub fn cancel_scheduled(&mut self) {
        self.scheduled = false;
    }

    /// Whether a timer is pending.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// When the last effective call started.
    pub fn last_run_at(&self) -> Option<Instant> {
        self.last_run_at
    }

    /// Number of remembered dedupe keys.
    pub fn recent_key_count(&self) -> usize {
        self.recent_keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: Duration = Duration::from_secs(1);

    #[test]
    fn first_call_runs_immediately() {
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        assert_eq!(
            entry.admit("p1:upsert:c1", t0, &ThrottlePolicy::default()),
            Admission::RunNow
        );
        assert_eq!(entry.last_run_at(), Some(t0));
    }

    #[test]
    fn identical_key_within_window_is_duplicate() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("p1:upsert:c1", t0, &policy);
        assert_eq!(
            entry.admit("p1:upsert:c1", t0 + 5 * S, &policy),
            Admission::Duplicate
        );
    }

    #[test]
    fn dedupe_is_independent_of_cooldown() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("p1:upsert:c1", t0, &policy);
        // Different key inside cooldown: scheduled. Same key again: dropped.
        assert_eq!(
            entry.admit("p1:upsert:c2", t0 + S, &policy),
            Admission::Schedule { delay: 59 * S }
        );
        assert_eq!(
            entry.admit("p1:upsert:c2", t0 + 2 * S, &policy),
            Admission::Duplicate
        );
    }

    #[test]
    fn key_expires_after_window() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("k", t0, &policy);
        assert_eq!(
            entry.admit("k", t0 + 15 * S, &policy),
            Admission::Schedule { delay: 45 * S }
        );
        assert_eq!(entry.recent_key_count(), 1);
    }

    #[test]
    fn second_timer_is_coalesced() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("a", t0, &policy);
        assert!(matches!(
            entry.admit("b", t0 + 10 * S, &policy),
            Admission::Schedule { delay } if delay == 50 * S
        ));
        assert_eq!(entry.admit("c", t0 + 11 * S, &policy), Admission::Coalesced);
        assert!(entry.is_scheduled());
    }

    #[test]
    fn fire_restarts_cooldown() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("a", t0, &policy);
        entry.admit("b", t0 + 10 * S, &policy);
        entry.fire(t0 + 60 * S);
        assert!(!entry.is_scheduled());
        assert_eq!(
            entry.admit("c", t0 + 70 * S, &policy),
            Admission::Schedule { delay: 50 * S }
        );
    }

    #[test]
    fn runs_again_after_cooldown() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("a", t0, &policy);
        assert_eq!(entry.admit("b", t0 + 60 * S, &policy), Admission::RunNow);
    }

    #[test]
    fn pending_timer_absorbs_request_at_cooldown_expiry() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("a", t0, &policy);
        entry.admit("b", t0 + 10 * S, &policy);
        // Cooldown is over but the timer has not fired yet.
        assert_eq!(entry.admit("c", t0 + 60 * S, &policy), Admission::Coalesced);
        assert_eq!(entry.last_run_at(), Some(t0));
        assert!(entry.is_scheduled());

        entry.fire(t0 + 60 * S);
        assert_eq!(
            entry.admit("d", t0 + 61 * S, &policy),
            Admission::Schedule { delay: 59 * S }
        );
    }

    #[test]
    fn cancel_clears_marker() {
        let policy = ThrottlePolicy::default();
        let mut entry = PendingSyncEntry::new();
        let t0 = Instant::now();
        entry.admit("a", t0, &policy);
        entry.admit("b", t0 + S, &policy);
        entry.cancel_scheduled();
        assert!(!entry.is_scheduled());
    }
}
