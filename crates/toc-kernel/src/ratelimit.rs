//! Token-bucket rate limiting (spec §3: per-source Bridge throughput caps).
//!
//! Mirrors the teacher's gateway filter bucket (token-bucket with a
//! `rate_per_second` refill and a `burst_capacity` ceiling) rather than the
//! fixed-window limiter the same teacher also carries — a token bucket
//! tolerates short bursts without penalizing a source for the rest of the
//! window, which is the behavior spec §3 calls for.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(refill_per_second: f64, burst_capacity: f64) -> Self {
        Self {
            capacity: burst_capacity,
            tokens: burst_capacity,
            refill_per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Attempt to consume one token. Returns `true` if allowed.
    pub fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }
}

/// Per-source token buckets keyed by component id, with idle-bucket eviction
/// so long-lived Bridge processes don't accumulate one bucket per ephemeral
/// dynamic component forever.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    buckets: dashmap::DashMap<String, (TokenBucket, Instant)>,
    refill_per_second: f64,
    burst_capacity: f64,
    idle_eviction: Duration,
}

impl RateLimiterRegistry {
    pub fn new(refill_per_second: f64, burst_capacity: f64) -> Self {
        Self {
            buckets: dashmap::DashMap::new(),
            refill_per_second,
            burst_capacity,
            idle_eviction: Duration::from_secs(600),
        }
    }

    pub fn check(&self, source: &str) -> bool {
        let mut entry = self
            .buckets
            .entry(source.to_string())
            .or_insert_with(|| {
                (
                    TokenBucket::new(self.refill_per_second, self.burst_capacity),
                    Instant::now(),
                )
            });
        entry.1 = Instant::now();
        entry.0.try_consume()
    }

    /// Drop buckets untouched since the idle threshold. Call periodically
    /// from a housekeeping tick, not on every message.
    pub fn evict_idle(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, (_, last_used)| now.duration_since(*last_used) < self.idle_eviction);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_burst_then_throttles() {
        let mut bucket = TokenBucket::new(1.0, 3.0);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn registry_tracks_sources_independently() {
        let registry = RateLimiterRegistry::new(1.0, 1.0);
        assert!(registry.check("igor-1"));
        assert!(!registry.check("igor-1"));
        assert!(registry.check("igor-2"));
    }
}
