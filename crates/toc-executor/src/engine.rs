//! Plan-step dispatch loop (spec §4.4). Generalizes the teacher's agent
//! execution loop (await → retry-on-failure → report) from in-process agent
//! calls to Bridge round trips correlated by message id.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{oneshot, Semaphore};
use tracing::{info, warn};

use toc_bridge::Bridge;
use toc_kernel::error::CoreError;
use toc_kernel::model::{Step, StepAction, StepResult};
use toc_kernel::wire::{Message, MessageTarget, MessageType};

use crate::retry;

const STEP_DISPATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// What the Planner actually hands to an Executor over `plan.submit`: a
/// plan is owned by the Planner, the Executor only needs enough to drive
/// dispatch and append results (spec §3: "Executor holds a read/append
/// reference for step results only").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PlanDispatch {
    pub plan_id: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub tool_bag: Vec<String>,
}

pub struct ExecutorEngine {
    pub id: String,
    pub worker_id: String,
    pub bridge: Arc<Bridge>,
    pending: DashMap<String, oneshot::Sender<Message>>,
    cancelled: DashMap<String, ()>,
    /// Bounds how many plans this Executor dispatches concurrently — the
    /// `MAX_FRANKS` executor/worker pool size (spec §6). Defaults to 1,
    /// matching spec §4.4 "Concurrency": "an Executor instance processes
    /// one plan at a time by default".
    concurrency: Semaphore,
}

impl ExecutorEngine {
    pub fn new(
        id: impl Into<String>,
        worker_id: impl Into<String>,
        bridge: Arc<Bridge>,
        max_concurrent_plans: usize,
    ) -> Self {
        Self {
            id: id.into(),
            worker_id: worker_id.into(),
            bridge,
            pending: DashMap::new(),
            cancelled: DashMap::new(),
            concurrency: Semaphore::new(max_concurrent_plans.max(1)),
        }
    }

    /// Main inbox loop: routes `plan.submit`/`plan.cancel` and fulfils
    /// pending correlated responses.
    pub async fn run(self: Arc<Self>, mut inbox: tokio::sync::mpsc::Receiver<Message>) {
        while let Some(message) = inbox.recv().await {
            if let Some(correlation_id) = &message.correlation_id {
                if let Some((_, tx)) = self.pending.remove(correlation_id) {
                    let _ = tx.send(message);
                    continue;
                }
            }
            match message.message_type {
                MessageType::PlanSubmit => {
                    let engine = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = engine.handle_plan_submit(message).await {
                            warn!(error = %e, "plan dispatch failed");
                        }
                    });
                }
                MessageType::PlanCancel => {
                    if let Some(plan_id) = message.payload.get("planId").and_then(|v| v.as_str()) {
                        self.cancelled.insert(plan_id.to_string(), ());
                    }
                }
                _ => {}
            }
        }
    }

    async fn handle_plan_submit(self: Arc<Self>, message: Message) -> Result<(), CoreError> {
        let dispatch: PlanDispatch = serde_json::from_value(message.payload.clone())
            .map_err(|e| CoreError::Validation(format!("bad plan.submit payload: {e}")))?;
        let planner = message.source.clone();

        self.publish(
            MessageTarget::component(&planner),
            MessageType::PlanAccepted,
            serde_json::json!({"planId": dispatch.plan_id}),
            Some(message.id.clone()),
        )
        .await;

        let _permit = self
            .concurrency
            .acquire()
            .await
            .expect("semaphore is never closed");
        let mut results = Vec::with_capacity(dispatch.steps.len());
        let mut failed = false;

        for (index, step) in dispatch.steps.iter().enumerate() {
            if self.cancelled.contains_key(&dispatch.plan_id) {
                info!(plan = dispatch.plan_id, "cancelled before dispatch boundary");
                return Ok(());
            }

            self.publish(
                MessageTarget::component(&planner),
                MessageType::StepStarted,
                serde_json::json!({"planId": dispatch.plan_id, "stepIndex": index}),
                None,
            )
            .await;

            let result = self
                .dispatch_step_with_retry(&planner, &dispatch.plan_id, index, step)
                .await;
            let success = result.success;
            results.push(result.clone());

            let step_msg_type = if success {
                MessageType::StepCompleted
            } else {
                MessageType::StepFailed
            };
            self.publish(
                MessageTarget::component(&planner),
                step_msg_type,
                serde_json::json!({"planId": dispatch.plan_id, "result": result}),
                None,
            )
            .await;

            if !success {
                failed = true;
                break;
            }
        }

        let final_type = if failed {
            MessageType::PlanRejected
        } else {
            MessageType::PlanCompleted
        };
        self.publish(
            MessageTarget::component(&planner),
            final_type,
            serde_json::json!({"planId": dispatch.plan_id, "results": results}),
            None,
        )
        .await;
        Ok(())
    }

    async fn dispatch_step_with_retry(
        &self,
        planner: &str,
        plan_id: &str,
        index: usize,
        step: &Step,
    ) -> StepResult {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.dispatch_step(step).await {
                Ok(output) => {
                    return StepResult {
                        step_index: index,
                        success: true,
                        output,
                        error_tag: None,
                        attempts,
                    };
                }
                Err(e) => {
                    if attempts <= step.retries {
                        self.publish(
                            MessageTarget::component(planner),
                            MessageType::StepRetrying,
                            serde_json::json!({
                                "planId": plan_id,
                                "stepIndex": index,
                                "attempt": attempts,
                                "errorTag": e.retry_tag(),
                            }),
                            None,
                        )
                        .await;
                        tokio::time::sleep(retry::delay_for(attempts - 1)).await;
                        continue;
                    }
                    return StepResult {
                        step_index: index,
                        success: false,
                        output: serde_json::Value::Null,
                        error_tag: Some(e.retry_tag().to_string()),
                        attempts,
                    };
                }
            }
        }
    }

    async fn dispatch_step(&self, step: &Step) -> Result<serde_json::Value, CoreError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);

        let (message_type, payload) = wire_message_for(step);
        self.bridge
            .publish(
                Message::new(
                    &self.id,
                    MessageTarget::component(&self.worker_id),
                    message_type,
                    payload,
                )
                .with_correlation_id(correlation_id.clone()),
            )
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;

        let response = tokio::time::timeout(
            Duration::from_millis(step.timeout_ms.min(STEP_DISPATCH_TIMEOUT.as_millis() as u64)),
            rx,
        )
        .await
        .map_err(|_| CoreError::Timeout(Duration::from_millis(step.timeout_ms)))?
        .map_err(|_| CoreError::Transport("worker channel closed".into()))?;

        if matches!(
            response.message_type,
            MessageType::BrowserError | MessageType::ToolError
        ) {
            let text = response
                .payload
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("step failed")
                .to_string();
            return Err(CoreError::ToolRuntime(text));
        }
        Ok(response.payload)
    }

    async fn publish(
        &self,
        target: MessageTarget,
        message_type: MessageType,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) {
        let mut message = Message::new(&self.id, target, message_type, payload);
        if let Some(id) = correlation_id {
            message = message.with_correlation_id(id);
        }
        if let Err(e) = self.bridge.publish(message).await {
            warn!(error = %e, "failed to publish");
        }
    }
}

fn wire_message_for(step: &Step) -> (MessageType, serde_json::Value) {
    let message_type = match step.action {
        StepAction::Launch => MessageType::BrowserLaunch,
        StepAction::Navigate => MessageType::BrowserNavigate,
        StepAction::Click => MessageType::BrowserClick,
        StepAction::Type => MessageType::BrowserType,
        StepAction::Screenshot => MessageType::BrowserScreenshot,
        StepAction::Close => MessageType::BrowserClose,
        // The remaining actions aren't core browser primitives; they're
        // dispatched as named tool calls on the Worker.
        StepAction::Wait
        | StepAction::Scroll
        | StepAction::Select
        | StepAction::Hover
        | StepAction::Verify
        | StepAction::ExecuteIntent => {
            return (
                MessageType::ToolInvoke,
                serde_json::json!({"tool": action_tool_name(step.action), "args": step.params}),
            )
        }
    };
    (message_type, step.params.clone())
}

fn action_tool_name(action: StepAction) -> &'static str {
    match action {
        StepAction::Wait => "wait",
        StepAction::Scroll => "scroll_to",
        StepAction::Select => "select_option",
        StepAction::Hover => "hover_element",
        StepAction::Verify => "verify_text",
        StepAction::ExecuteIntent => "execute_intent",
        _ => unreachable!("core browser actions are handled separately"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(action: StepAction) -> Step {
        Step { action, params: serde_json::json!({}), timeout_ms: 5000, retries: 0 }
    }

    #[test]
    fn core_actions_map_to_browser_messages() {
        let (mt, _) = wire_message_for(&step(StepAction::Navigate));
        assert_eq!(mt, MessageType::BrowserNavigate);
    }

    #[test]
    fn extended_actions_map_to_tool_invoke() {
        let (mt, payload) = wire_message_for(&step(StepAction::Verify));
        assert_eq!(mt, MessageType::ToolInvoke);
        assert_eq!(payload["tool"], "verify_text");
    }

    #[tokio::test]
    async fn executor_completes_a_two_step_plan_against_a_live_bridge() {
        let bridge = Arc::new(Bridge::new(toc_bridge::BridgeConfig::default()));
        let planner_inbox = bridge.register("doctor", "0.1.0").unwrap();
        let worker_inbox = bridge.register("frankenstein", "0.1.0").unwrap();
        let executor_inbox = bridge.register("igor", "0.1.0").unwrap();

        let engine = Arc::new(ExecutorEngine::new("igor", "frankenstein", bridge.clone(), 1));
        tokio::spawn(engine.clone().run(executor_inbox));

        // Fake worker: echoes back a "*ed"/"invoked" response for every request.
        let bridge_for_worker = bridge.clone();
        let mut worker_inbox = worker_inbox;
        tokio::spawn(async move {
            while let Some(msg) = worker_inbox.recv().await {
                let response_type = match msg.message_type {
                    MessageType::BrowserLaunch => MessageType::BrowserLaunched,
                    MessageType::BrowserNavigate => MessageType::BrowserNavigated,
                    _ => MessageType::ToolInvoked,
                };
                let mut response = Message::new(
                    "frankenstein",
                    MessageTarget::component(&msg.source),
                    response_type,
                    serde_json::json!({"ok": true}),
                );
                response.correlation_id = msg.correlation_id.clone();
                let _ = bridge_for_worker.publish(response).await;
            }
        });

        let dispatch = PlanDispatch {
            plan_id: "plan-1".into(),
            steps: vec![step(StepAction::Launch), step(StepAction::Navigate)],
            tool_bag: vec![],
        };
        bridge
            .publish(Message::new(
                "doctor",
                MessageTarget::component("igor"),
                MessageType::PlanSubmit,
                serde_json::to_value(&dispatch).unwrap(),
            ))
            .await
            .unwrap();

        let mut planner_inbox = planner_inbox;
        let mut saw_completed = false;
        for _ in 0..8 {
            let msg = tokio::time::timeout(Duration::from_secs(2), planner_inbox.recv())
                .await
                .unwrap()
                .unwrap();
            if msg.message_type == MessageType::PlanCompleted {
                saw_completed = true;
                break;
            }
        }
        assert!(saw_completed);
    }
}
