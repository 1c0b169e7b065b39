//! Shared data model (spec §3).
//!
//! Every type here is inert data — no component owns a global singleton of
//! these types except through the Bridge's component registry. Plans are
//! owned exclusively by the Planner; the Executor holds only a read/append
//! reference for step results (spec §3, §4.4).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Component identity
// ---------------------------------------------------------------------------

const STATIC_COMPONENT_IDS: &[&str] = &["bridge", "doctor", "igor", "frankenstein", "meta"];

fn dynamic_id_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^(igor|frank|doctor|mcp)-[a-z0-9_-]+$").unwrap())
}

/// `true` iff `id` is a static component id or matches the dynamic id pattern
/// `^(igor|frank|doctor|mcp)-[a-z0-9_-]+$` (spec §3).
pub fn is_valid_component_id(id: &str) -> bool {
    STATIC_COMPONENT_IDS.contains(&id) || dynamic_id_regex().is_match(id)
}

/// Liveness state of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentHealth {
    Healthy,
    Degraded,
    Dead,
}

/// An entry in the Bridge's component registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRegistration {
    pub id: String,
    pub declared_version: String,
    pub last_heartbeat_ms: u64,
    pub health: ComponentHealth,
}

impl ComponentRegistration {
    pub fn new(id: impl Into<String>, declared_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            declared_version: declared_version.into(),
            last_heartbeat_ms: now_epoch_ms(),
            health: ComponentHealth::Healthy,
        }
    }

    /// Dead after 3 missed heartbeats at the default 1s cadence (spec §3).
    pub fn is_dead(&self, cadence_ms: u64, missed_threshold: u32) -> bool {
        let age = now_epoch_ms().saturating_sub(self.last_heartbeat_ms);
        age > cadence_ms * missed_threshold as u64
    }
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Plan / Step
// ---------------------------------------------------------------------------

/// Closed set of allowed step actions (spec §4.5 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Launch,
    Navigate,
    Click,
    Type,
    Screenshot,
    Close,
    Wait,
    Scroll,
    Select,
    Hover,
    Verify,
    ExecuteIntent,
}

pub const MAX_INTENT_CHARS: usize = 5000;
pub const MAX_PLAN_STEPS: usize = 100;
pub const MAX_STEP_TIMEOUT_MS: u64 = 300_000;
pub const MAX_STEP_RETRIES: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub action: StepAction,
    pub params: serde_json::Value,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Step {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.timeout_ms == 0 || self.timeout_ms > MAX_STEP_TIMEOUT_MS {
            return Err(CoreError::Validation(format!(
                "step timeout_ms {} out of bounds (0, {}]",
                self.timeout_ms, MAX_STEP_TIMEOUT_MS
            )));
        }
        if self.retries > MAX_STEP_RETRIES {
            return Err(CoreError::Validation(format!(
                "step retries {} exceeds max {}",
                self.retries, MAX_STEP_RETRIES
            )));
        }
        Ok(())
    }
}

/// A single recorded step outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub success: bool,
    pub output: serde_json::Value,
    pub error_tag: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

/// A reportable `{tag, message}` pair (spec §7 "errors[] is a list of stable
/// tag + human message pairs, newest-first").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanError {
    pub tag: String,
    pub message: String,
    pub at_ms: u64,
}

impl PlanError {
    pub fn from_core(err: &CoreError) -> Self {
        Self {
            tag: err.tag().to_string(),
            message: err.to_string(),
            at_ms: now_epoch_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub intent: String,
    pub status: PlanStatus,
    pub total_steps: usize,
    pub current_step: usize,
    pub steps: Vec<Step>,
    pub results: Vec<StepResult>,
    /// Newest-first.
    pub errors: Vec<PlanError>,
    pub tool_bag: Vec<String>,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl Plan {
    pub fn new(id: impl Into<String>, intent: impl Into<String>, steps: Vec<Step>) -> Self {
        let total_steps = steps.len();
        Self {
            id: id.into(),
            intent: intent.into(),
            status: PlanStatus::Pending,
            total_steps,
            current_step: 0,
            steps,
            results: Vec::new(),
            errors: Vec::new(),
            tool_bag: Vec::new(),
            created_at_ms: now_epoch_ms(),
            completed_at_ms: None,
        }
    }

    /// Structural invariants (spec §3): `0 <= current_step <= total_steps`;
    /// `results.len() <= current_step`; a `completed` plan has
    /// `current_step == total_steps` and no unhandled error.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.current_step > self.total_steps {
            return Err(CoreError::Validation(
                "current_step exceeds total_steps".into(),
            ));
        }
        if self.results.len() > self.current_step {
            return Err(CoreError::Validation(
                "results.len() exceeds current_step".into(),
            ));
        }
        if self.status == PlanStatus::Completed {
            if self.current_step != self.total_steps {
                return Err(CoreError::Validation(
                    "completed plan must have current_step == total_steps".into(),
                ));
            }
            if !self.errors.is_empty() {
                return Err(CoreError::Validation(
                    "completed plan must have no unhandled errors".into(),
                ));
            }
        }
        if self.status == PlanStatus::Failed && self.errors.is_empty() {
            return Err(CoreError::Validation(
                "failed plan must record at least one error".into(),
            ));
        }
        Ok(())
    }

    pub fn push_error(&mut self, err: &CoreError) {
        self.errors.insert(0, PlanError::from_core(err));
    }

    pub fn record_result(&mut self, result: StepResult) {
        self.results.push(result);
        self.current_step = self.current_step.max(self.results.len());
    }
}

// ---------------------------------------------------------------------------
// Tool registry entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    BrowserCore,
    BrowserInteract,
    BrowserRead,
    Assertions,
    Performance,
    Accessibility,
    Security,
    Utility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub tags: Vec<String>,
    pub input_schema: serde_json::Value,
    pub weight: i32,
}

pub const DEFAULT_TOOL_BAG_CAP: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBag {
    pub tools: Vec<String>,
    pub reasoning: String,
    pub categories: Vec<ToolCategory>,
}

// ---------------------------------------------------------------------------
// DynamicTool (Worker-side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub permissions: Vec<String>,
    pub source_path: String,
    pub content_hash: String,
}

fn dynamic_tool_name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[a-z][a-z0-9_]*$").unwrap())
}

pub fn is_valid_tool_name(name: &str) -> bool {
    dynamic_tool_name_regex().is_match(name)
}

pub const DEFAULT_PROTECTED_TOOL_NAMES: &[&str] = &["dynamic_tool_create", "hello_world"];

// ---------------------------------------------------------------------------
// FailurePattern (Planner-side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePattern {
    pub signature: String,
    pub count: u32,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub sample_plan_ids: Vec<String>,
}

impl FailurePattern {
    pub fn new(signature: impl Into<String>, plan_id: impl Into<String>) -> Self {
        let now = now_epoch_ms();
        Self {
            signature: signature.into(),
            count: 1,
            first_seen_ms: now,
            last_seen_ms: now,
            sample_plan_ids: vec![plan_id.into()],
        }
    }

    pub fn record(&mut self, plan_id: impl Into<String>) {
        self.count += 1;
        self.last_seen_ms = now_epoch_ms();
        let id = plan_id.into();
        if !self.sample_plan_ids.contains(&id) {
            self.sample_plan_ids.push(id);
        }
    }

    pub fn satisfy(&mut self) {
        self.count = 0;
    }
}

// ---------------------------------------------------------------------------
// Snapshot (Supervisor-side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Initial,
    Auto,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: String,
    pub created_at_ms: u64,
    pub kind: SnapshotKind,
    pub tool_count: usize,
}

impl SnapshotMeta {
    pub fn new(id: impl Into<String>, kind: SnapshotKind, tool_count: usize) -> Self {
        Self {
            id: id.into(),
            created_at_ms: now_epoch_ms(),
            kind,
            tool_count,
        }
    }
}

// ---------------------------------------------------------------------------
// DeadLetter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub original_message: serde_json::Value,
    pub target_component: String,
    pub reason: String,
    pub timestamp_ms: u64,
    pub retry_count: u32,
    pub last_retry_at_ms: Option<u64>,
}

pub const DEFAULT_DEAD_LETTER_CAP: usize = 1000;
pub const DEFAULT_MAX_DEAD_LETTER_RETRIES: u32 = 3;

/// Bounded FIFO ring, oldest-dropped on overflow (used for Bridge history,
/// the dead-letter queue, and the Supervisor's snapshot retention — spec §3,
/// §5, §8 P7).
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            items: VecDeque::with_capacity(cap.min(1024)),
        }
    }

    /// Push a new item, evicting the oldest if at capacity. Returns the
    /// evicted item, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.cap {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn last_n(&self, n: usize) -> Vec<&T> {
        let len = self.items.len();
        let skip = len.saturating_sub(n);
        self.items.iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_and_dynamic_component_ids() {
        assert!(is_valid_component_id("bridge"));
        assert!(is_valid_component_id("igor-1"));
        assert!(is_valid_component_id("frank-worker_2"));
        assert!(!is_valid_component_id("Igor-1"));
        assert!(!is_valid_component_id("random"));
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.last_n(10), vec![&2, &3, &4]);
    }

    #[test]
    fn plan_invariants_catch_bad_current_step() {
        let mut plan = Plan::new("p1", "do a thing", vec![]);
        plan.current_step = 5;
        assert!(plan.check_invariants().is_err());
    }

    #[test]
    fn completed_plan_requires_full_progress() {
        let mut plan = Plan::new("p1", "intent", vec![]);
        plan.status = PlanStatus::Completed;
        assert!(plan.check_invariants().is_ok());
        plan.total_steps = 1;
        assert!(plan.check_invariants().is_err());
    }

    #[test]
    fn dynamic_tool_name_validation() {
        assert!(is_valid_tool_name("smart_fill_search"));
        assert!(!is_valid_tool_name("SmartFill"));
        assert!(!is_valid_tool_name("1tool"));
    }

    #[test]
    fn failure_pattern_accumulates_and_resets() {
        let mut pattern = FailurePattern::new("click:#login", "plan-1");
        assert_eq!(pattern.count, 1);
        pattern.record("plan-2");
        assert_eq!(pattern.count, 2);
        pattern.satisfy();
        assert_eq!(pattern.count, 0);
    }
}
