//! Plan synthesis (spec §4.5 step 3).
//!
//! The AI completion capability is opaque and out of scope (spec §1); it is
//! modeled as a trait boundary the same way `toc_worker::browser::BrowserDriver`
//! stands in for a concrete browser driver. [`NullCompletionProvider`] always
//! falls through to the deterministic template, matching "if parsing fails,
//! fall back to a deterministic template per intent category".

use async_trait::async_trait;
use serde_json::Value;

use toc_kernel::error::CoreError;
use toc_kernel::model::{Step, StepAction};

/// Boundary around an out-of-scope AI completion capability.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns a raw JSON value the caller attempts to parse into steps.
    async fn complete_plan(&self, intent: &str, tool_bag: &[String]) -> Result<Value, CoreError>;
}

/// Stand-in with no completion capability wired up; every intent falls
/// through to [`template_for_intent`].
pub struct NullCompletionProvider;

#[async_trait]
impl CompletionProvider for NullCompletionProvider {
    async fn complete_plan(&self, _intent: &str, _tool_bag: &[String]) -> Result<Value, CoreError> {
        Err(CoreError::ToolRuntime("no completion provider configured".into()))
    }
}

/// Drives the full step-3 fallback chain: provider completion, then parse,
/// then deterministic template, then reject.
pub async fn synthesize(
    provider: &dyn CompletionProvider,
    intent: &str,
    tool_bag: &[String],
) -> Result<Vec<Step>, CoreError> {
    if let Ok(raw) = provider.complete_plan(intent, tool_bag).await {
        if let Ok(steps) = parse_steps(&raw) {
            if !steps.is_empty() {
                return Ok(steps);
            }
        }
    }
    template_for_intent(intent)
}

fn parse_steps(value: &Value) -> Result<Vec<Step>, CoreError> {
    let steps = value
        .get("steps")
        .cloned()
        .unwrap_or_else(|| value.clone());
    serde_json::from_value(steps)
        .map_err(|e| CoreError::Validation(format!("plan synthesis parse failure: {e}")))
}

const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_STEP_RETRIES: u32 = 1;

fn step(action: StepAction, params: serde_json::Value) -> Step {
    Step {
        action,
        params,
        timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
        retries: DEFAULT_STEP_RETRIES,
    }
}

/// Deterministic per-category template, used when the completion capability
/// is unavailable or its output doesn't parse. Categorized on keyword
/// presence since there's no completion result to drive synthesis from.
fn template_for_intent(intent: &str) -> Result<Vec<Step>, CoreError> {
    let lower = intent.to_lowercase();
    let url = extract_url(intent);

    if lower.contains("screenshot") {
        let Some(url) = url else {
            return Err(CoreError::Validation(
                "screenshot template requires a URL in the intent".into(),
            ));
        };
        return Ok(vec![
            step(StepAction::Navigate, serde_json::json!({"url": url})),
            step(StepAction::Screenshot, serde_json::json!({"fullPage": false})),
            step(StepAction::Close, serde_json::json!({})),
        ]);
    }

    if lower.contains("click") {
        let Some(url) = url else {
            return Err(CoreError::Validation(
                "click template requires a URL in the intent".into(),
            ));
        };
        let selector = extract_selector(intent).unwrap_or_else(|| "#submit".to_string());
        return Ok(vec![
            step(StepAction::Navigate, serde_json::json!({"url": url})),
            step(StepAction::Click, serde_json::json!({"selector": selector})),
            step(StepAction::Close, serde_json::json!({})),
        ]);
    }

    if let Some(url) = url {
        return Ok(vec![
            step(StepAction::Navigate, serde_json::json!({"url": url})),
            step(StepAction::Close, serde_json::json!({})),
        ]);
    }

    // No URL and no recognized category: hand the whole intent to the
    // catch-all tool so the plan is never empty.
    Ok(vec![step(
        StepAction::ExecuteIntent,
        serde_json::json!({"intent": intent}),
    )])
}

fn extract_url(intent: &str) -> Option<String> {
    intent
        .split_whitespace()
        .find(|word| word.starts_with("http://") || word.starts_with("https://"))
        .map(|s| s.trim_matches(|c: char| c == '.' || c == ',').to_string())
}

fn extract_selector(intent: &str) -> Option<String> {
    intent
        .split_whitespace()
        .find(|word| word.starts_with('#') || word.starts_with('.'))
        .map(|s| s.trim_matches(|c: char| c == '.' || c == ',').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_provider_falls_back_to_template() {
        let steps = synthesize(
            &NullCompletionProvider,
            "open https://example.com and take a screenshot",
            &[],
        )
        .await
        .unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].action, StepAction::Navigate);
        assert_eq!(steps[1].action, StepAction::Screenshot);
        assert_eq!(steps[2].action, StepAction::Close);
    }

    #[tokio::test]
    async fn click_template_picks_up_selector() {
        let steps = synthesize(
            &NullCompletionProvider,
            "go to https://example.com and click #login",
            &[],
        )
        .await
        .unwrap();
        assert_eq!(steps[1].action, StepAction::Click);
        assert_eq!(steps[1].params["selector"], "#login");
    }

    #[tokio::test]
    async fn no_url_no_category_falls_back_to_execute_intent() {
        let steps = synthesize(&NullCompletionProvider, "do something vague", &[])
            .await
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action, StepAction::ExecuteIntent);
    }
}
