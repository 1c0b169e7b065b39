//! Plan lifecycle store (spec §4.5 "State machine").
//!
//! Owns every `Plan` the Planner knows about. Mirrors the teacher's
//! `AgentRegistry` (`Arc<RwLock<HashMap<...>>>` with a stats view) sized down
//! to one table, since plans have no secondary index the way agents are
//! indexed by capability tag.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use toc_kernel::error::CoreError;
use toc_kernel::model::{Plan, PlanStatus, Step, StepResult};

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PlanStoreStats {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
}

#[derive(Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<String, Plan>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submit(
        &self,
        id: impl Into<String>,
        intent: impl Into<String>,
        steps: Vec<Step>,
        tool_bag: Vec<String>,
    ) -> Plan {
        let mut plan = Plan::new(id, intent, steps);
        plan.tool_bag = tool_bag;
        let snapshot = plan.clone();
        self.plans.write().await.insert(snapshot.id.clone(), plan);
        snapshot
    }

    pub async fn get(&self, id: &str) -> Option<Plan> {
        self.plans.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Plan> {
        self.plans.read().await.values().cloned().collect()
    }

    /// `pending -> failed` on a validation failure, before any dispatch.
    pub async fn reject(&self, id: &str, err: &CoreError) -> Result<(), CoreError> {
        self.transition(id, |plan| {
            plan.status = PlanStatus::Failed;
            plan.push_error(err);
        })
        .await
    }

    /// `pending -> running` on `plan.accepted`.
    pub async fn mark_running(&self, id: &str) -> Result<(), CoreError> {
        self.transition(id, |plan| {
            if plan.status == PlanStatus::Pending {
                plan.status = PlanStatus::Running;
            }
        })
        .await
    }

    pub async fn record_step_result(&self, id: &str, result: StepResult) -> Result<(), CoreError> {
        self.transition(id, |plan| plan.record_result(result)).await
    }

    pub async fn mark_completed(&self, id: &str) -> Result<(), CoreError> {
        self.transition(id, |plan| {
            plan.status = PlanStatus::Completed;
            plan.completed_at_ms = Some(now_ms());
        })
        .await
    }

    pub async fn mark_failed(&self, id: &str, err: &CoreError) -> Result<(), CoreError> {
        self.transition(id, |plan| {
            plan.status = PlanStatus::Failed;
            plan.push_error(err);
            plan.completed_at_ms = Some(now_ms());
        })
        .await
    }

    /// `cancel` while `pending` transitions directly to `cancelled` without
    /// dispatch; while `running`, marks cancelled for the Executor to observe
    /// at its next dispatch boundary (spec §4.5, §5 "Cancellation"). Terminal
    /// states are immutable — cancelling a finished plan is a no-op.
    pub async fn cancel(&self, id: &str) -> Result<(), CoreError> {
        self.transition(id, |plan| {
            if !plan.status.is_terminal() {
                plan.status = PlanStatus::Cancelled;
                plan.completed_at_ms = Some(now_ms());
            }
        })
        .await
    }

    /// Applies `f` to a clone of the plan and only commits it back if the
    /// result still satisfies `check_invariants` — a rejected transition
    /// leaves the stored plan untouched rather than partially applied.
    async fn transition(&self, id: &str, f: impl FnOnce(&mut Plan)) -> Result<(), CoreError> {
        let mut plans = self.plans.write().await;
        let plan = plans
            .get(id)
            .ok_or_else(|| CoreError::Validation(format!("unknown plan id: {id}")))?;
        if plan.status.is_terminal() {
            return Ok(());
        }
        let mut candidate = plan.clone();
        f(&mut candidate);
        candidate.check_invariants()?;
        plans.insert(id.to_string(), candidate);
        Ok(())
    }

    pub async fn stats(&self) -> PlanStoreStats {
        let plans = self.plans.read().await;
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for plan in plans.values() {
            *by_status.entry(format!("{:?}", plan.status)).or_insert(0) += 1;
        }
        PlanStoreStats { total: plans.len(), by_status }
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use toc_kernel::model::StepAction;

    fn step() -> Step {
        Step { action: StepAction::Wait, params: serde_json::json!({}), timeout_ms: 1000, retries: 0 }
    }

    #[tokio::test]
    async fn pending_cancel_goes_straight_to_cancelled() {
        let store = PlanStore::new();
        store.submit("p1", "do a thing", vec![step()], vec![]).await;
        store.cancel("p1").await.unwrap();
        let plan = store.get("p1").await.unwrap();
        assert_eq!(plan.status, PlanStatus::Cancelled);
    }

    #[tokio::test]
    async fn terminal_states_are_immutable() {
        let store = PlanStore::new();
        store.submit("p1", "do a thing", vec![step()], vec![]).await;
        store.cancel("p1").await.unwrap();
        store.mark_running("p1").await.unwrap();
        let plan = store.get("p1").await.unwrap();
        assert_eq!(plan.status, PlanStatus::Cancelled);
    }

    #[tokio::test]
    async fn completed_requires_all_steps_recorded() {
        let store = PlanStore::new();
        store.submit("p1", "do a thing", vec![step(), step()], vec![]).await;
        store.mark_running("p1").await.unwrap();
        let result = StepResult { step_index: 0, success: true, output: serde_json::json!({}), error_tag: None, attempts: 1 };
        store.record_step_result("p1", result).await.unwrap();
        // current_step=1, total_steps=2: marking completed now must fail the invariant check.
        assert!(store.mark_completed("p1").await.is_err());
    }
}
