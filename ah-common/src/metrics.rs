//! Process-wide counters and gauges for the auto-host agent (§4.12).
//!
//! `Counter`/`Gauge` are lock-free atomic primitives in the same style as
//! the teacher's own metrics module; `AgentMetrics` aggregates the specific
//! set this agent tracks and is incremented at the same call sites the
//! teacher increments its face-level counters (`Face::express_interest`,
//! `send_data`).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// The counters/gauges named in §3 "Agent Metrics (added)".
#[derive(Debug, Default)]
pub struct AgentMetrics {
    pub interests_sent: Counter,
    pub interests_satisfied: Counter,
    pub interests_nacked: Counter,
    pub interests_timed_out: Counter,
    pub faces_created: Counter,
    pub faces_destroyed: Counter,
    pub routes_registered: Counter,
    pub routes_unregistered: Counter,
    pub peers_added: Counter,
    pub peers_removed: Counter,
    pub control_clients_active: Gauge,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the `"metrics"` object carried in the `status` reply (§4.7,
    /// §6). Uses `serde_json::Value` directly rather than a derived struct
    /// since this is the only place the full set is ever serialized.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "interests_sent": self.interests_sent.value(),
            "interests_satisfied": self.interests_satisfied.value(),
            "interests_nacked": self.interests_nacked.value(),
            "interests_timed_out": self.interests_timed_out.value(),
            "faces_created": self.faces_created.value(),
            "faces_destroyed": self.faces_destroyed.value(),
            "routes_registered": self.routes_registered.value(),
            "routes_unregistered": self.routes_unregistered.value(),
            "peers_added": self.peers_added.value(),
            "peers_removed": self.peers_removed.value(),
            "control_clients_active": self.control_clients_active.value(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_and_adds() {
        let c = Counter::new();
        c.increment();
        c.add(4);
        assert_eq!(c.value(), 5);
    }

    #[test]
    fn gauge_tracks_active_clients() {
        let g = Gauge::new();
        g.increment();
        g.increment();
        g.decrement();
        assert_eq!(g.value(), 1);
    }

    #[test]
    fn agent_metrics_to_json_has_expected_keys() {
        let m = AgentMetrics::new();
        m.interests_sent.increment();
        let json = m.to_json();
        assert_eq!(json["interests_sent"], 1);
        assert_eq!(json["peers_added"], 0);
    }
}
