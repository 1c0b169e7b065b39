//! Step retry backoff (spec §4.4 step 2: "sleep `min(2^attempt, 30 s)` and
//! re-dispatch"). A narrower, spec-literal cousin of the teacher's general
//! `RetryPolicy::ExponentialBackoff` — fixed base, no jitter, because the
//! spec pins the exact schedule rather than leaving it tunable.

use std::time::Duration;

pub const MAX_DELAY_MS: u64 = 30_000;

pub fn delay_for(attempt: u32) -> Duration {
    let exp_ms = 1_000u64.checked_shl(attempt).unwrap_or(MAX_DELAY_MS);
    Duration::from_millis(exp_ms.min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_thirty_seconds() {
        assert_eq!(delay_for(0), Duration::from_millis(1_000));
        assert_eq!(delay_for(4), Duration::from_millis(16_000));
        assert_eq!(delay_for(10), Duration::from_millis(MAX_DELAY_MS));
    }
}
