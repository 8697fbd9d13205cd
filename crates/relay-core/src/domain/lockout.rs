//! Progressive lockout against credential guessing.
//!
//! Every failed challenge response increments a per-peer failure counter and
//! starts a cooldown window during which further attempts are refused, no
//! matter whether they would have been correct.
//!
//! | Consecutive failures | Cooldown |
//! |----------------------|----------|
//! | 1 – 3                | 5 s      |
//! | 4 – 6                | 300 s    |
//! | 7 – 9                | 600 s    |
//! | each further 3       | +300 s   |
//!
//! A successful response resets the counter.  A peer that stays quiet for
//! [`FORGET_AFTER`] once its cooldown has ended is forgotten, so the ledger
//! does not grow with every address that ever failed once.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::domain::allow_list::strip_port;

/// Cooldown applied after each of the first [`GRACE_FAILURES`] failures.
pub const INITIAL_COOLDOWN: Duration = Duration::from_secs(5);

/// Cooldown increment per escalation block.
pub const ESCALATION_STEP: Duration = Duration::from_secs(300);

/// Failures tolerated with the short cooldown.
pub const GRACE_FAILURES: u32 = 3;

/// Failures per escalation block once the grace failures are used up.
pub const ESCALATION_BLOCK: u32 = 3;

/// Quiet time after a cooldown ends before the peer's failures are dropped.
pub const FORGET_AFTER: Duration = Duration::from_secs(60 * 60);

/// Ledger size below which stale entries are left alone.
const SWEEP_THRESHOLD: usize = 1024;

/// Per-peer failure bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutEntry {
    pub failure_count: u32,
    pub lockout_until: Option<Instant>,
}

impl LockoutEntry {
    fn is_stale(&self, now: Instant) -> bool {
        match self.lockout_until {
            Some(until) => now.saturating_duration_since(until) >= FORGET_AFTER,
            None => true,
        }
    }
}

/// Returns the cooldown that follows the `failures`-th consecutive failure.
pub fn cooldown_for(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    if failures <= GRACE_FAILURES {
        return INITIAL_COOLDOWN;
    }
    let block = (failures - GRACE_FAILURES - 1) / ESCALATION_BLOCK + 1;
    ESCALATION_STEP.saturating_mul(block)
}

/// Key under which a peer's failures are recorded: its address without port.
pub fn ledger_key(peer_address: &str) -> String {
    strip_port(peer_address).to_string()
}

/// Failure counters and cooldown deadlines keyed by peer.
///
/// The server wraps one instance in a mutex and shares it between all
/// connections, so repeated reconnects from the same host cannot reset the
/// counter.
#[derive(Debug, Default)]
pub struct LockoutPolicy {
    entries: HashMap<String, LockoutEntry>,
    next_sweep: usize,
}

impl LockoutPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed attempt and returns the new cooldown in seconds.
    ///
    /// Failures older than the forget window start counting from zero again.
    pub fn record_failure(&mut self, key: &str, now: Instant) -> u64 {
        // Sweep only when the ledger has doubled since the last sweep.
        if self.entries.len() >= self.next_sweep.max(SWEEP_THRESHOLD) {
            self.forget_stale(now);
            self.next_sweep = self.entries.len().saturating_mul(2);
        }
        let entry = self.entries.entry(key.to_string()).or_default();
        if entry.failure_count > 0 && entry.is_stale(now) {
            *entry = LockoutEntry::default();
        }
        entry.failure_count = entry.failure_count.saturating_add(1);
        let cooldown = cooldown_for(entry.failure_count);
        entry.lockout_until = Some(now + cooldown);
        cooldown.as_secs()
    }

    /// Clears all failure state for `key`.
    pub fn record_success(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Seconds left in the cooldown for `key`, rounded up; `0` if none.
    pub fn current_cooldown(&self, key: &str, now: Instant) -> u64 {
        let Some(until) = self.entries.get(key).and_then(|e| e.lockout_until) else {
            return 0;
        };
        let remaining = until.saturating_duration_since(now);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Drops every peer whose cooldown ended at least [`FORGET_AFTER`] ago.
    /// Returns how many were dropped.
    pub fn forget_stale(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now));
        before - self.entries.len()
    }

    /// Snapshot of the bookkeeping for `key`.
    pub fn entry(&self, key: &str) -> Option<LockoutEntry> {
        self.entries.get(key).copied()
    }

    /// Number of peers with recorded failures.
    pub fn tracked_peers(&self) -> usize {
        self.entries.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
