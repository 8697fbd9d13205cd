//! Process-wide lockout ledger shared by every connection worker.
//!
//! Wraps [`LockoutPolicy`] in an async mutex.  The supervisor creates one
//! ledger and hands a clone to every worker, including workers started after
//! a reconfiguration, so failure counts survive restarts of the listener.

use std::sync::Arc;
use std::time::Instant;

use relay_core::{LockoutEntry, LockoutPolicy};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct LockoutLedger {
    inner: Arc<Mutex<LockoutPolicy>>,
}

impl LockoutLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed response from `key`; returns the new cooldown in seconds.
    pub async fn record_failure(&self, key: &str, now: Instant) -> u64 {
        self.inner.lock().await.record_failure(key, now)
    }

    pub async fn record_success(&self, key: &str) {
        self.inner.lock().await.record_success(key);
    }

    /// Seconds left before `key` may attempt authentication again.
    pub async fn current_cooldown(&self, key: &str, now: Instant) -> u64 {
        self.inner.lock().await.current_cooldown(key, now)
    }

    pub async fn entry(&self, key: &str) -> Option<LockoutEntry> {
        self.inner.lock().await.entry(key)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
