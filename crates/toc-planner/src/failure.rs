//! Failure-pattern accumulator (spec §4.5 steps 6-7).
//!
//! Generalizes the teacher's `CapabilityIndex` (tag -> ids, intersection
//! lookup) from an indexing structure to a signature -> count accumulator:
//! instead of looking entities up by tag, entries here are bumped by
//! signature and checked against a threshold.
//!
//! Open Question resolution: signatures are family-level, not exact-selector
//! (`click:id` rather than `click:#login-button-2`), so two distinct `#id`
//! selectors on the same action still bucket together. This is recorded in
//! DESIGN.md.

use std::collections::HashMap;

use toc_kernel::model::{FailurePattern, Step, StepAction};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;
pub const DEFAULT_MAX_CREATE_RETRIES: u32 = 3;

/// Selector "family": the kind of selector, not its exact value.
fn selector_family(selector: &str) -> &'static str {
    if selector.starts_with('#') {
        "id"
    } else if selector.starts_with('.') {
        "class"
    } else if selector.starts_with('[') {
        "attr"
    } else {
        "other"
    }
}

/// The bucketing key for a failed step: action plus selector family, when
/// the step carries a selector.
pub fn signature_for(step: &Step) -> String {
    let action = format!("{:?}", step.action).to_lowercase();
    match step.params.get("selector").and_then(|v| v.as_str()) {
        Some(selector) => format!("{action}:{}", selector_family(selector)),
        None => action,
    }
}

#[derive(Debug, Default)]
pub struct FailureAccumulator {
    patterns: HashMap<String, FailurePattern>,
    threshold: u32,
}

impl FailureAccumulator {
    pub fn new(threshold: u32) -> Self {
        Self {
            patterns: HashMap::new(),
            threshold: threshold.max(1),
        }
    }

    /// Records a step failure. Returns the signature if it has just reached
    /// (or already exceeds) the threshold and therefore should trigger
    /// `tool.create` — callers should only act on patterns not already
    /// satisfied (tracked by the caller, since `satisfy` resets the count).
    pub fn record(&mut self, step: &Step, plan_id: &str) -> Option<String> {
        use std::collections::hash_map::Entry;

        let signature = signature_for(step);
        let count = match self.patterns.entry(signature.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(FailurePattern::new(signature.clone(), plan_id)).count
            }
            Entry::Occupied(mut slot) => {
                let pattern = slot.get_mut();
                pattern.record(plan_id);
                pattern.count
            }
        };

        if count >= self.threshold {
            Some(signature)
        } else {
            None
        }
    }

    pub fn get(&self, signature: &str) -> Option<&FailurePattern> {
        self.patterns.get(signature)
    }

    /// Marks a pattern satisfied (its `tool.create` succeeded); resets the
    /// count so future failures must re-cross the threshold.
    pub fn satisfy(&mut self, signature: &str) {
        if let Some(pattern) = self.patterns.get_mut(signature) {
            pattern.satisfy();
        }
    }

    /// Tie-break (spec §4.5 "Tie-breaks"): among patterns crossing the
    /// threshold in the same tick, the larger `count` wins; ties broken by
    /// earliest `firstSeenAt`.
    pub fn pick_winner<'a>(&'a self, candidates: &[&'a str]) -> Option<&'a FailurePattern> {
        candidates
            .iter()
            .filter_map(|sig| self.patterns.get(*sig))
            .max_by(|a, b| a.count.cmp(&b.count).then(b.first_seen_ms.cmp(&a.first_seen_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn click_step(selector: &str) -> Step {
        Step {
            action: StepAction::Click,
            params: json!({"selector": selector}),
            timeout_ms: 1000,
            retries: 0,
        }
    }

    #[test]
    fn signature_is_family_level_not_exact_selector() {
        let a = signature_for(&click_step("#login-button"));
        let b = signature_for(&click_step("#search-box"));
        assert_eq!(a, b);
        assert_eq!(a, "click:id");
    }

    #[test]
    fn threshold_triggers_on_second_distinct_plan() {
        let mut acc = FailureAccumulator::new(DEFAULT_FAILURE_THRESHOLD);
        assert!(acc.record(&click_step("#search-box"), "plan-1").is_none());
        let triggered = acc.record(&click_step("#other-box"), "plan-2");
        assert!(triggered.is_some());
    }

    #[test]
    fn satisfy_resets_count() {
        let mut acc = FailureAccumulator::new(2);
        acc.record(&click_step("#a"), "plan-1");
        let sig = acc.record(&click_step("#b"), "plan-2").unwrap();
        acc.satisfy(&sig);
        assert_eq!(acc.get(&sig).unwrap().count, 0);
    }

    #[test]
    fn pick_winner_prefers_larger_count_then_earlier_first_seen() {
        let mut acc = FailureAccumulator::new(1);
        acc.record(&click_step("#a"), "plan-1");
        acc.record(&click_step("#a"), "plan-2");
        acc.record(
            &Step { action: StepAction::Type, params: json!({"selector": "#x"}), timeout_ms: 1000, retries: 0 },
            "plan-3",
        );
        let winner = acc.pick_winner(&["click:id", "type:id"]).unwrap();
        assert_eq!(winner.signature, "click:id");
    }
}
