//! Lock-free Bridge metrics, mirroring the teacher's `BusMetrics`
//! (atomic counters, point-in-time JSON snapshot) rather than pulling in a
//! separate metrics crate the teacher itself never wires up.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

const ORD: Ordering = Ordering::Relaxed;

#[derive(Debug, Default)]
pub struct BridgeMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    dead_lettered: AtomicU64,
    rate_limited: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, ORD);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, ORD);
    }

    pub(crate) fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, ORD);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, ORD);
    }

    pub fn snapshot(&self) -> BridgeMetricsSnapshot {
        BridgeMetricsSnapshot {
            published: self.published.load(ORD),
            delivered: self.delivered.load(ORD),
            dead_lettered: self.dead_lettered.load(ORD),
            rate_limited: self.rate_limited.load(ORD),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMetricsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub dead_lettered: u64,
    pub rate_limited: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let m = BridgeMetrics::new();
        let s = m.snapshot();
        assert_eq!(s.published, 0);
        assert_eq!(s.delivered, 0);
    }

    #[test]
    fn records_increment() {
        let m = BridgeMetrics::new();
        m.record_published();
        m.record_delivered();
        m.record_dead_lettered();
        m.record_rate_limited();
        let s = m.snapshot();
        assert_eq!(s.published, 1);
        assert_eq!(s.delivered, 1);
        assert_eq!(s.dead_lettered, 1);
        assert_eq!(s.rate_limited, 1);
    }
}
