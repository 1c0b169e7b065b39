//! Lock-free Worker metrics, mirroring the teacher's `BusMetrics`
//! (atomic counters, point-in-time JSON snapshot).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

const ORD: Ordering = Ordering::Relaxed;

#[derive(Debug, Default)]
pub struct WorkerMetrics {
    calls_total: AtomicU64,
    calls_failed: AtomicU64,
    calls_timed_out: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self) {
        self.calls_total.fetch_add(1, ORD);
    }

    pub fn record_failure(&self) {
        self.calls_failed.fetch_add(1, ORD);
    }

    pub fn record_timeout(&self) {
        self.calls_timed_out.fetch_add(1, ORD);
    }

    pub fn snapshot(&self, tool_count: usize) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            calls_total: self.calls_total.load(ORD),
            calls_failed: self.calls_failed.load(ORD),
            calls_timed_out: self.calls_timed_out.load(ORD),
            tool_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetricsSnapshot {
    pub calls_total: u64,
    pub calls_failed: u64,
    pub calls_timed_out: u64,
    pub tool_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_increment() {
        let m = WorkerMetrics::new();
        m.record_call();
        m.record_failure();
        m.record_timeout();
        let s = m.snapshot(3);
        assert_eq!(s.calls_total, 1);
        assert_eq!(s.calls_failed, 1);
        assert_eq!(s.calls_timed_out, 1);
        assert_eq!(s.tool_count, 3);
    }
}
