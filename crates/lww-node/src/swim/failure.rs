//! SWIM failure detection timing.
//!
//! Probing itself is driven by the gossip layer; this module only remembers
//! when each suspicion (or tombstone) started and reports the ones that have
//! run out.

use std::collections::HashMap;
use std::time::Duration;

/// Configuration for failure detection.
#[derive(Debug, Clone)]
pub struct FailureDetectorConfig {
    /// How often to probe a random member (default: 1s)
    pub probe_interval: Duration,
    /// How long to wait for an ack (default: 500ms)
    pub probe_timeout: Duration,
    /// Time before suspected → dead (default: 5s)
    pub suspicion_timeout: Duration,
    /// Time a dead or departed member is remembered before it is dropped (default: 60s)
    pub tombstone_timeout: Duration,
}

impl Default for FailureDetectorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(500),
            suspicion_timeout: Duration::from_secs(5),
            tombstone_timeout: Duration::from_secs(60),
        }
    }
}

/// Start times of current suspicions, in milliseconds.
///
/// The gossip layer keeps a second tracker with the tombstone timeout for
/// members that are dead or have left.
pub struct SuspicionTracker {
    timeout_ms: u64,
    started: HashMap<String, u64>,
}

impl SuspicionTracker {
    pub fn new(suspicion_timeout: Duration) -> Self {
        Self {
            timeout_ms: suspicion_timeout.as_millis() as u64,
            started: HashMap::new(),
        }
    }

    /// Start tracking a suspicion. An existing suspicion keeps its start time.
    pub fn suspect(&mut self, name: &str, now_ms: u64) {
        self.started.entry(name.to_string()).or_insert(now_ms);
    }

    /// Stop tracking a member. Returns true if it was suspected.
    pub fn clear(&mut self, name: &str) -> bool {
        self.started.remove(name).is_some()
    }

    #[cfg(test)]
    pub fn is_suspected(&self, name: &str) -> bool {
        self.started.contains_key(name)
    }

    /// Make the tracked set match `suspected`: new names start at `now_ms`,
    /// names no longer suspected are dropped.
    pub fn track(&mut self, suspected: &[String], now_ms: u64) {
        self.started.retain(|name, _| suspected.contains(name));
        for name in suspected {
            self.suspect(name, now_ms);
        }
    }

    /// Remove and return every suspicion older than the timeout.
    pub fn expired(&mut self, now_ms: u64) -> Vec<String> {
        let timeout_ms = self.timeout_ms;
        let expired: Vec<String> = self
            .started
            .iter()
            .filter(|&(_, &started)| now_ms.saturating_sub(started) >= timeout_ms)
            .map(|(name, _)| name.clone())
            .collect();

        for name in &expired {
            self.started.remove(name);
        }
        expired
    }
}
