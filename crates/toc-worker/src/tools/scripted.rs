//! The "scripted" tool kind: a tiny declarative action interpreter used as
//! the fallback for any `tool.create` whose `kind` isn't a recognized
//! built-in. Code is a newline-separated list of `op arg` directives drawn
//! from a closed, side-effect-free vocabulary — no subprocess spawn, no
//! dynamic code evaluation, mirroring the allowed-commands whitelist the
//! teacher's shell tool uses for its own command surface.

use async_trait::async_trait;

use super::{CallResult, ToolHandler};
use toc_kernel::error::CoreError;

pub struct ScriptedHandler {
    program: Vec<String>,
}

impl ScriptedHandler {
    pub fn new(source: &str) -> Self {
        Self {
            program: source.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect(),
        }
    }
}

#[async_trait]
impl ToolHandler for ScriptedHandler {
    async fn call(&self, args: serde_json::Value) -> Result<CallResult, CoreError> {
        let mut output = args.clone();
        for line in &self.program {
            let mut parts = line.splitn(2, ' ');
            let op = parts.next().unwrap_or("");
            let rest = parts.next().unwrap_or("").trim();
            output = apply(op, rest, &output, &args)?;
        }
        Ok(CallResult::ok(output.to_string()))
    }
}

fn apply(
    op: &str,
    rest: &str,
    current: &serde_json::Value,
    original_args: &serde_json::Value,
) -> Result<serde_json::Value, CoreError> {
    match op {
        "const" => serde_json::from_str(rest)
            .map_err(|e| CoreError::ToolRuntime(format!("bad const literal: {e}"))),
        "get" => Ok(original_args.get(rest).cloned().unwrap_or(serde_json::Value::Null)),
        "uppercase" => Ok(serde_json::Value::String(
            current.as_str().unwrap_or_default().to_uppercase(),
        )),
        "lowercase" => Ok(serde_json::Value::String(
            current.as_str().unwrap_or_default().to_lowercase(),
        )),
        "concat" => {
            let suffix = original_args
                .get(rest)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(serde_json::Value::String(format!(
                "{}{}",
                current.as_str().unwrap_or_default(),
                suffix
            )))
        }
        "" => Ok(current.clone()),
        other => Err(CoreError::ToolLoad(format!("unknown scripted op: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_program_echoes_args() {
        let handler = ScriptedHandler::new("");
        let result = handler.call(serde_json::json!({"a": 1})).await.unwrap();
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn pipeline_transforms_output() {
        let handler = ScriptedHandler::new("get name\nuppercase");
        let result = handler
            .call(serde_json::json!({"name": "frank"}))
            .await
            .unwrap();
        assert_eq!(result.content[0].text, "\"FRANK\"");
    }

    #[tokio::test]
    async fn unknown_op_is_a_tool_load_error() {
        let handler = ScriptedHandler::new("explode everything");
        let result = handler.call(serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
