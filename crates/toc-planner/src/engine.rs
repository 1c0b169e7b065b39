//! Intent intake and plan-outcome consumption (spec §4.5).
//!
//! The HTTP façade (`server.rs`) is the only intake path: the closed wire
//! catalogue (spec §6) has no `intent.submit` message type, so intents never
//! cross the Bridge — only the resulting `plan.submit`/`plan.*`/`step.*`/
//! `tool.*` traffic does.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use toc_bridge::Bridge;
use toc_kernel::error::CoreError;
use toc_kernel::model::{Plan, StepResult};
use toc_kernel::wire::{Message, MessageTarget, MessageType};
use toc_registry::ToolRegistry;

use crate::failure::{FailureAccumulator, DEFAULT_MAX_CREATE_RETRIES};
use crate::store::PlanStore;
use crate::synthesis::{self, CompletionProvider};
use crate::validate;

pub struct PlannerEngine {
    pub id: String,
    pub executor_id: String,
    pub worker_id: String,
    pub bridge: Arc<Bridge>,
    pub store: Arc<PlanStore>,
    pub registry: Arc<ToolRegistry>,
    pub completion: Arc<dyn CompletionProvider>,
    pub allow_localhost: bool,
    pub max_tools: usize,
    failures: Mutex<FailureAccumulator>,
    create_retries: Mutex<std::collections::HashMap<String, u32>>,
}

impl PlannerEngine {
    pub fn new(
        id: impl Into<String>,
        executor_id: impl Into<String>,
        worker_id: impl Into<String>,
        bridge: Arc<Bridge>,
        store: Arc<PlanStore>,
        registry: Arc<ToolRegistry>,
        completion: Arc<dyn CompletionProvider>,
        allow_localhost: bool,
        failure_threshold: u32,
        max_tools: usize,
    ) -> Self {
        Self {
            id: id.into(),
            executor_id: executor_id.into(),
            worker_id: worker_id.into(),
            bridge,
            store,
            registry,
            completion,
            allow_localhost,
            max_tools,
            failures: Mutex::new(FailureAccumulator::new(failure_threshold)),
            create_retries: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Drives spec §4.5 steps 1-5 for one intent: validate, select tools,
    /// synthesize, validate the resulting plan, then dispatch. Returns the
    /// plan whether it lands `pending` (dispatch in flight) or `failed`
    /// (rejected before dispatch).
    pub async fn submit_intent(&self, intent: &str) -> Result<Plan, CoreError> {
        validate::validate_intent(intent)?;

        let tool_bag = self.registry.select_tools(intent, Some(self.max_tools));
        let synthesis_result = synthesis::synthesize(self.completion.as_ref(), intent, &tool_bag.tools).await;

        let plan_id = format!("plan-{}", Uuid::new_v4());

        let steps = match synthesis_result {
            Ok(steps) => steps,
            Err(e) => {
                let plan = self
                    .store
                    .submit(plan_id.clone(), intent, Vec::new(), tool_bag.tools.clone())
                    .await;
                self.store.reject(&plan.id, &e).await?;
                return self.store.get(&plan.id).await.ok_or(e);
            }
        };

        if let Err(e) = validate::validate_plan_steps(&steps, self.allow_localhost) {
            let plan = self
                .store
                .submit(plan_id.clone(), intent, steps, tool_bag.tools.clone())
                .await;
            self.store.reject(&plan.id, &e).await?;
            return self.store.get(&plan.id).await.ok_or(e);
        }

        let plan = self
            .store
            .submit(plan_id.clone(), intent, steps, tool_bag.tools.clone())
            .await;

        let dispatch = toc_executor::PlanDispatch {
            plan_id: plan_id.clone(),
            steps: plan.steps.clone(),
            tool_bag: tool_bag.tools,
        };
        self.bridge
            .publish(Message::new(
                &self.id,
                MessageTarget::component(&self.executor_id),
                MessageType::PlanSubmit,
                serde_json::to_value(&dispatch)
                    .map_err(|e| CoreError::Validation(format!("plan not serializable: {e}")))?,
            ))
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;

        Ok(plan)
    }

    pub async fn cancel_plan(&self, plan_id: &str) -> Result<(), CoreError> {
        self.store.cancel(plan_id).await?;
        self.bridge
            .publish(Message::new(
                &self.id,
                MessageTarget::component(&self.executor_id),
                MessageType::PlanCancel,
                serde_json::json!({"planId": plan_id}),
            ))
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Consumes `plan.accepted`/`step.*`/`plan.completed`/`plan.rejected`
    /// from the Executor and `tool.created`/`tool.error` from the Worker.
    pub async fn run(self: Arc<Self>, mut inbox: mpsc::Receiver<Message>) {
        while let Some(message) = inbox.recv().await {
            if let Err(e) = self.handle(message).await {
                warn!(error = %e, "planner failed to handle inbound message");
            }
        }
    }

    async fn handle(&self, message: Message) -> Result<(), CoreError> {
        match message.message_type {
            MessageType::PlanAccepted => {
                if let Some(plan_id) = plan_id_of(&message) {
                    self.store.mark_running(plan_id).await?;
                }
            }
            MessageType::StepCompleted => {
                let (plan_id, result) = step_result_of(&message)?;
                self.store.record_step_result(&plan_id, result).await?;
            }
            MessageType::StepFailed => {
                let (plan_id, result) = step_result_of(&message)?;
                self.on_step_failed(&plan_id, &result).await?;
                self.store.record_step_result(&plan_id, result).await?;
            }
            MessageType::PlanCompleted => {
                if let Some(plan_id) = plan_id_of(&message) {
                    self.store.mark_completed(plan_id).await?;
                }
            }
            MessageType::PlanRejected => {
                if let Some(plan_id) = plan_id_of(&message) {
                    self.store
                        .mark_failed(plan_id, &CoreError::PlanFailure("plan rejected by executor".into()))
                        .await?;
                }
            }
            MessageType::ToolCreated => {
                if let Some(name) = message.payload.get("requestSignature").and_then(|v| v.as_str()) {
                    self.failures.lock().await.satisfy(name);
                }
            }
            MessageType::ToolError => {
                if let Some(signature) = message.payload.get("requestSignature").and_then(|v| v.as_str()) {
                    self.retry_or_abandon_create(signature).await;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_step_failed(&self, plan_id: &str, result: &StepResult) -> Result<(), CoreError> {
        let plan = self
            .store
            .get(plan_id)
            .await
            .ok_or_else(|| CoreError::Validation(format!("unknown plan id: {plan_id}")))?;
        let Some(step) = plan.steps.get(result.step_index) else {
            return Ok(());
        };

        let triggered = self.failures.lock().await.record(step, plan_id);
        if let Some(signature) = triggered {
            self.emit_tool_create(&signature, plan_id, step).await;
        }
        Ok(())
    }

    async fn emit_tool_create(&self, signature: &str, plan_id: &str, step: &toc_kernel::model::Step) {
        let tool_name = format!("auto_{}", signature.replace(':', "_"));
        info!(signature, tool_name, "failure pattern crossed threshold, requesting tool.create");
        let _ = self
            .bridge
            .publish(Message::new(
                &self.id,
                MessageTarget::component(&self.worker_id),
                MessageType::ToolCreate,
                serde_json::json!({
                    "requestSignature": signature,
                    "name": tool_name,
                    "description": format!("auto-generated recovery tool for {signature}"),
                    "schema": {"type": "object", "properties": {}},
                    "permissions": [],
                    "samplePlanId": plan_id,
                    "action": step.action,
                }),
            ))
            .await;
    }

    async fn retry_or_abandon_create(&self, signature: &str) {
        let mut retries = self.create_retries.lock().await;
        let count = retries.entry(signature.to_string()).or_insert(0);
        *count += 1;
        if *count > DEFAULT_MAX_CREATE_RETRIES {
            warn!(signature, "tool.create abandoned after exceeding retry budget");
            return;
        }
        warn!(signature, attempt = *count, "tool.create failed, will retry on next threshold crossing");
    }
}

fn plan_id_of(message: &Message) -> Option<&str> {
    message.payload.get("planId").and_then(|v| v.as_str())
}

fn step_result_of(message: &Message) -> Result<(String, StepResult), CoreError> {
    let plan_id = plan_id_of(message)
        .ok_or_else(|| CoreError::Validation("step message missing planId".into()))?
        .to_string();
    let result: StepResult = serde_json::from_value(
        message
            .payload
            .get("result")
            .cloned()
            .ok_or_else(|| CoreError::Validation("step message missing result".into()))?,
    )
    .map_err(|e| CoreError::Validation(format!("bad step result payload: {e}")))?;
    Ok((plan_id, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::NullCompletionProvider;
    use std::collections::HashMap;
    use toc_bridge::BridgeConfig;
    use toc_registry::ToolRegistry;

    fn engine() -> Arc<PlannerEngine> {
        let bridge = Arc::new(Bridge::new(BridgeConfig::default()));
        let _ = bridge.register("doctor", "0.1.0").unwrap();
        let _ = bridge.register("igor", "0.1.0").unwrap();
        let _ = bridge.register("frankenstein", "0.1.0").unwrap();
        let registry = Arc::new(ToolRegistry::new(vec![], HashMap::new()));
        Arc::new(PlannerEngine::new(
            "doctor",
            "igor",
            "frankenstein",
            bridge,
            Arc::new(PlanStore::new()),
            registry,
            Arc::new(NullCompletionProvider),
            true,
            2,
            15,
        ))
    }

    #[tokio::test]
    async fn happy_path_intent_produces_pending_plan_and_dispatches() {
        let engine = engine();
        let plan = engine
            .submit_intent("open https://example.com and take a screenshot")
            .await
            .unwrap();
        assert_eq!(plan.status, toc_kernel::model::PlanStatus::Pending);
        assert_eq!(plan.total_steps, 3);
    }

    #[tokio::test]
    async fn invalid_url_rejected_before_dispatch() {
        let engine = engine();
        let bridge = engine.bridge.clone();
        let before = bridge.history(&Default::default()).len();

        let plan = engine
            .submit_intent("go to javascript:alert(1) and click #go")
            .await
            .unwrap();
        assert_eq!(plan.status, toc_kernel::model::PlanStatus::Failed);

        let after = bridge.history(&Default::default()).len();
        assert_eq!(before, after, "no bridge traffic beyond the rejection");
    }

    #[tokio::test]
    async fn step_failed_feeds_the_failure_accumulator() {
        let engine = engine();
        let plan = engine
            .submit_intent("go to https://example.com and click #login")
            .await
            .unwrap();

        let failed = StepResult { step_index: 1, success: false, output: serde_json::Value::Null, error_tag: Some("ToolRuntime".into()), attempts: 1 };
        engine.on_step_failed(&plan.id, &failed).await.unwrap();
        let sig = crate::failure::signature_for(&plan.steps[1]);
        assert_eq!(engine.failures.lock().await.get(&sig).unwrap().count, 1);
    }
}
