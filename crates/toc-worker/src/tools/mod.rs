//! Tool handler contract and the built-in/scripted handler kinds.

pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use toc_kernel::error::CoreError;

/// Tool-call result body (spec §4.2 `POST /call` response shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock { kind: "text".into(), text: text.into() }],
            is_error: false,
        }
    }

    pub fn err(kind: &str, message: &str) -> Self {
        Self {
            content: vec![ContentBlock {
                kind: "text".into(),
                text: format!("{kind}: {message}"),
            }],
            is_error: true,
        }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Value) -> Result<CallResult, CoreError>;
}

/// A handler synthesized from a `DynamicTool`'s `kind` tag rather than from
/// compiled code. Unrecognized kinds fall back to the scripted interpreter.
pub fn handler_for_kind(kind: &str, code: Option<&str>) -> Box<dyn ToolHandler> {
    match kind {
        "echo" => Box::new(EchoHandler),
        _ => Box::new(scripted::ScriptedHandler::new(code.unwrap_or_default())),
    }
}

struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, args: serde_json::Value) -> Result<CallResult, CoreError> {
        Ok(CallResult::ok(args.to_string()))
    }
}

/// Always present, protected (spec §3: `hello_world` cannot be deleted).
pub struct HelloWorldHandler;

#[async_trait]
impl ToolHandler for HelloWorldHandler {
    async fn call(&self, _args: serde_json::Value) -> Result<CallResult, CoreError> {
        Ok(CallResult::ok("hello, world"))
    }
}
