//! Process-local cooldown ledger
//!
//! Tracks the instant of the last successful scale write per policy so that
//! consecutive writes stay at least one cooldown apart. The ledger is
//! advisory and in-memory only: a controller restart clears it, after which
//! the first pass may scale immediately. The durable record for operators is
//! `status.lastScaleTime`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Thread-safe map from policy key (`namespace/name`) to last scale instant
///
/// Eligibility checks take the read lock so concurrent reconciliations for
/// distinct policies do not serialize; only a successful write takes the
/// write lock.
#[derive(Default)]
pub struct CooldownLedger {
    entries: RwLock<HashMap<String, Instant>>,
}

impl CooldownLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the policy may scale now
    ///
    /// True when no entry exists or at least `cooldown` has elapsed since
    /// the recorded instant.
    pub fn eligible(&self, key: &str, cooldown: Duration) -> bool {
        match self
            .entries
            .read()
            .expect("cooldown lock poisoned")
            .get(key)
        {
            Some(last) => last.elapsed() >= cooldown,
            None => true,
        }
    }

    /// Seconds until the policy becomes eligible again, zero if eligible
    pub fn remaining(&self, key: &str, cooldown: Duration) -> Duration {
        match self
            .entries
            .read()
            .expect("cooldown lock poisoned")
            .get(key)
        {
            Some(last) => cooldown.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Record a successful scale write for the policy
    ///
    /// Called only after `set_replicas` succeeded; a failed write must not
    /// advance the ledger.
    pub fn record(&self, key: &str) {
        self.entries
            .write()
            .expect("cooldown lock poisoned")
            .insert(key.to_string(), Instant::now());
    }

    /// Drop the entry for a deleted policy
    pub fn remove(&self, key: &str) {
        self.entries
            .write()
            .expect("cooldown lock poisoned")
            .remove(key);
    }
}
