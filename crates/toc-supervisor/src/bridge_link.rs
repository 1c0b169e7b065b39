//! Brokers Bridge traffic addressed to the Worker onto its HTTP surface —
//! the Worker is a child process with no Bridge connection of its own (spec
//! §4.3: the Supervisor "exposes the same external protocol surface as a
//! plain tool-server"). Generalizes `server.rs::forward_call_handler`'s
//! `/call` forwarding to also cover `browser.*`/`tool.invoke`/`tool.create`.

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tracing::warn;

use toc_bridge::Bridge;
use toc_kernel::wire::{Message, MessageTarget, MessageType};

use crate::supervisor::Supervisor;

pub struct BridgeLink {
    worker_id: String,
    bridge: Arc<Bridge>,
    supervisor: Arc<Supervisor>,
    client: reqwest::Client,
}

impl BridgeLink {
    pub fn new(worker_id: impl Into<String>, bridge: Arc<Bridge>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            worker_id: worker_id.into(),
            bridge,
            supervisor,
            client: reqwest::Client::new(),
        }
    }

    pub async fn run(self: Arc<Self>, mut inbox: Receiver<Message>) {
        while let Some(message) = inbox.recv().await {
            let link = self.clone();
            tokio::spawn(async move { link.handle(message).await });
        }
    }

    async fn handle(&self, message: Message) {
        let reply_to = message.source.clone();
        let correlation_id = message.correlation_id.clone();
        let (reply_type, payload) = self.forward(&message).await;

        let mut response = Message::new(
            &self.worker_id,
            MessageTarget::component(&reply_to),
            reply_type,
            payload,
        );
        response.correlation_id = correlation_id;
        if let Err(e) = self.bridge.publish(response).await {
            warn!(error = %e, "worker broker failed to publish reply");
        }
    }

    async fn forward(&self, message: &Message) -> (MessageType, serde_json::Value) {
        let port = self.supervisor.worker_port();
        match message.message_type {
            MessageType::BrowserLaunch => {
                self.browser_call(port, "launch", &message.payload, MessageType::BrowserLaunched).await
            }
            MessageType::BrowserNavigate => {
                self.browser_call(port, "navigate", &message.payload, MessageType::BrowserNavigated).await
            }
            MessageType::BrowserClick => {
                self.browser_call(port, "click", &message.payload, MessageType::BrowserClicked).await
            }
            MessageType::BrowserType => {
                self.browser_call(port, "type", &message.payload, MessageType::BrowserTyped).await
            }
            MessageType::BrowserScreenshot => {
                self.browser_call(port, "screenshot", &message.payload, MessageType::BrowserScreenshotted)
                    .await
            }
            MessageType::BrowserClose => {
                self.browser_call(port, "close", &message.payload, MessageType::BrowserClosed).await
            }
            MessageType::ToolInvoke => self.tool_invoke(port, &message.payload).await,
            MessageType::ToolCreate => self.tool_create(port, &message.payload).await,
            _ => (
                MessageType::ToolError,
                serde_json::json!({"message": "unsupported message type for worker broker"}),
            ),
        }
    }

    async fn browser_call(
        &self,
        port: u16,
        action: &str,
        params: &serde_json::Value,
        ok_type: MessageType,
    ) -> (MessageType, serde_json::Value) {
        let url = format!("http://127.0.0.1:{port}/browser/{action}");
        match self.client.post(&url).json(params).send().await {
            Ok(resp) => {
                let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
                if body.get("error").is_some() {
                    (MessageType::BrowserError, body)
                } else {
                    (ok_type, body)
                }
            }
            Err(e) => (MessageType::BrowserError, serde_json::json!({"message": e.to_string()})),
        }
    }

    async fn tool_invoke(&self, port: u16, payload: &serde_json::Value) -> (MessageType, serde_json::Value) {
        let url = format!("http://127.0.0.1:{port}/call");
        let body = serde_json::json!({
            "tool": payload.get("tool").and_then(|v| v.as_str()).unwrap_or_default(),
            "args": payload.get("args").cloned().unwrap_or(serde_json::Value::Null),
        });
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) => {
                let result: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
                if result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
                    (MessageType::ToolError, result)
                } else {
                    (MessageType::ToolInvoked, result)
                }
            }
            Err(e) => (MessageType::ToolError, serde_json::json!({"message": e.to_string()})),
        }
    }

    async fn tool_create(&self, port: u16, payload: &serde_json::Value) -> (MessageType, serde_json::Value) {
        let signature = payload
            .get("requestSignature")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let url = format!("http://127.0.0.1:{port}/tools/create");
        let body = serde_json::json!({
            "name": payload.get("name").cloned().unwrap_or(serde_json::Value::Null),
            "description": payload.get("description").cloned().unwrap_or(serde_json::Value::Null),
            "schema": payload.get("schema").cloned().unwrap_or_else(|| serde_json::json!({"type": "object"})),
            "permissions": payload.get("permissions").cloned().unwrap_or_else(|| serde_json::json!([])),
            "kind": "scripted",
        });
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => (
                MessageType::ToolCreated,
                serde_json::json!({"requestSignature": signature, "name": payload.get("name")}),
            ),
            Ok(resp) => {
                let err: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
                (
                    MessageType::ToolError,
                    serde_json::json!({"requestSignature": signature, "error": err}),
                )
            }
            Err(e) => (
                MessageType::ToolError,
                serde_json::json!({"requestSignature": signature, "message": e.to_string()}),
            ),
        }
    }
}
