//! Bridge wire envelope (spec §6) and message signing (spec §3, §9).
//!
//! The signable content is the JSON encoding of the envelope with the
//! `signature` field omitted and all object keys sorted ascending.
//! `serde_json::Map` is `BTreeMap`-backed unless the `preserve_order` feature
//! is enabled (it is not, here), so `serde_json::to_vec` of a `Value` already
//! produces keys in sorted order — canonicalization falls out of the default
//! representation rather than needing a custom sorter.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum serialized message size accepted by the Bridge (spec §3: 512 KiB
/// payload bound, 1 MiB total envelope bound).
pub const MAX_PAYLOAD_BYTES: usize = 512 * 1024;
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Routing target of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTarget {
    Component(String),
    Broadcast,
}

impl MessageTarget {
    pub fn component(id: impl Into<String>) -> Self {
        MessageTarget::Component(id.into())
    }
}

/// Closed message-type catalogue (spec §6). Any tag not in this enum is
/// rejected by the Bridge as `invalid` at the deserialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[serde(rename = "component.register")]
    ComponentRegister,
    #[serde(rename = "component.unregister")]
    ComponentUnregister,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "version.announce")]
    VersionAnnounce,

    #[serde(rename = "plan.submit")]
    PlanSubmit,
    #[serde(rename = "plan.cancel")]
    PlanCancel,
    #[serde(rename = "plan.modify")]
    PlanModify,
    #[serde(rename = "plan.accepted")]
    PlanAccepted,
    #[serde(rename = "plan.rejected")]
    PlanRejected,
    #[serde(rename = "step.started")]
    StepStarted,
    #[serde(rename = "step.completed")]
    StepCompleted,
    #[serde(rename = "step.failed")]
    StepFailed,
    #[serde(rename = "step.retrying")]
    StepRetrying,
    #[serde(rename = "plan.completed")]
    PlanCompleted,

    #[serde(rename = "browser.launch")]
    BrowserLaunch,
    #[serde(rename = "browser.launched")]
    BrowserLaunched,
    #[serde(rename = "browser.navigate")]
    BrowserNavigate,
    #[serde(rename = "browser.navigated")]
    BrowserNavigated,
    #[serde(rename = "browser.click")]
    BrowserClick,
    #[serde(rename = "browser.clicked")]
    BrowserClicked,
    #[serde(rename = "browser.type")]
    BrowserType,
    #[serde(rename = "browser.typed")]
    BrowserTyped,
    #[serde(rename = "browser.screenshot")]
    BrowserScreenshot,
    #[serde(rename = "browser.screenshotted")]
    BrowserScreenshotted,
    #[serde(rename = "browser.close")]
    BrowserClose,
    #[serde(rename = "browser.closed")]
    BrowserClosed,
    #[serde(rename = "browser.error")]
    BrowserError,

    #[serde(rename = "event.console")]
    EventConsole,
    #[serde(rename = "event.network")]
    EventNetwork,
    #[serde(rename = "event.error")]
    EventError,

    #[serde(rename = "tool.create")]
    ToolCreate,
    #[serde(rename = "tool.created")]
    ToolCreated,
    #[serde(rename = "tool.invoke")]
    ToolInvoke,
    #[serde(rename = "tool.invoked")]
    ToolInvoked,
    #[serde(rename = "tool.update")]
    ToolUpdate,
    #[serde(rename = "tool.updated")]
    ToolUpdated,
    #[serde(rename = "tool.delete")]
    ToolDelete,
    #[serde(rename = "tool.deleted")]
    ToolDeleted,
    #[serde(rename = "tool.list")]
    ToolList,
    #[serde(rename = "tool.listed")]
    ToolListed,
    #[serde(rename = "tool.export")]
    ToolExport,
    #[serde(rename = "tool.exported")]
    ToolExported,
    #[serde(rename = "tool.error")]
    ToolError,
    #[serde(rename = "tool.debug.start")]
    ToolDebugStart,
    #[serde(rename = "tool.debug.eval")]
    ToolDebugEval,
    #[serde(rename = "tool.debug.output")]
    ToolDebugOutput,
    #[serde(rename = "tool.debug.stop")]
    ToolDebugStop,

    #[serde(rename = "error")]
    Error,

    #[serde(rename = "tools/list_changed")]
    ToolsListChanged,
}

/// A Bridge message (spec §3 "Message").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Epoch milliseconds, monotonically issued by the Bridge.
    pub timestamp: u64,
    pub source: String,
    pub target: MessageTarget,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    pub source_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Message {
    pub fn new(
        source: impl Into<String>,
        target: MessageTarget,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now_epoch_ms(),
            source: source.into(),
            target,
            message_type,
            payload,
            correlation_id: None,
            causation_id: None,
            source_version: "0.1.0".to_string(),
            signature: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    pub fn with_source_version(mut self, version: impl Into<String>) -> Self {
        self.source_version = version.into();
        self
    }

    /// Canonical signable bytes: this message as JSON with `signature`
    /// omitted and keys sorted ascending.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        let value = serde_json::to_value(&unsigned)
            .map_err(|e| CoreError::Validation(format!("envelope not serializable: {e}")))?;
        serde_json::to_vec(&value)
            .map_err(|e| CoreError::Validation(format!("canonical encoding failed: {e}")))
    }

    /// Sign in place with the shared Bridge secret.
    pub fn sign(&mut self, secret: &[u8]) -> Result<(), CoreError> {
        let digest = hmac_hex(secret, &self.canonical_bytes()?)?;
        self.signature = Some(digest);
        Ok(())
    }

    /// Verify the current signature against the shared secret using a
    /// timing-safe comparison (spec §9: "Timing-safe comparison is required").
    pub fn verify(&self, secret: &[u8]) -> Result<bool, CoreError> {
        let Some(sig) = &self.signature else {
            return Ok(false);
        };
        let expected = hmac_hex(secret, &self.canonical_bytes()?)?;
        Ok(bool::from(sig.as_bytes().ct_eq(expected.as_bytes())))
    }

    /// `true` if the serialized envelope exceeds the size bound (spec §3).
    pub fn exceeds_size_bound(&self) -> Result<bool, CoreError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| CoreError::Validation(format!("not serializable: {e}")))?;
        Ok(bytes.len() > MAX_MESSAGE_BYTES)
    }

    pub fn payload_exceeds_bound(&self) -> Result<bool, CoreError> {
        let bytes = serde_json::to_vec(&self.payload)
            .map_err(|e| CoreError::Validation(format!("payload not serializable: {e}")))?;
        Ok(bytes.len() > MAX_PAYLOAD_BYTES)
    }
}

fn hmac_hex(secret: &[u8], bytes: &[u8]) -> Result<String, CoreError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CoreError::Fatal(format!("invalid HMAC key length: {e}")))?;
    mac.update(bytes);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> Message {
        Message::new(
            "doctor",
            MessageTarget::component("igor"),
            MessageType::PlanSubmit,
            serde_json::json!({"plan_id": "p1"}),
        )
    }

    #[test]
    fn sign_then_verify_is_identity() {
        let mut m = msg();
        m.sign(b"secret").unwrap();
        assert!(m.verify(b"secret").unwrap());
    }

    #[test]
    fn tampering_breaks_verification() {
        let mut m = msg();
        m.sign(b"secret").unwrap();
        m.payload = serde_json::json!({"plan_id": "p2"});
        assert!(!m.verify(b"secret").unwrap());
    }

    #[test]
    fn wrong_secret_fails() {
        let mut m = msg();
        m.sign(b"secret").unwrap();
        assert!(!m.verify(b"other-secret").unwrap());
    }

    #[test]
    fn unsigned_message_does_not_verify() {
        let m = msg();
        assert!(!m.verify(b"secret").unwrap());
    }

    #[test]
    fn message_type_round_trips_through_json() {
        let m = msg();
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"plan.submit\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message_type, MessageType::PlanSubmit);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let result: Result<MessageType, _> = serde_json::from_str(r#""totally.unknown""#);
        assert!(result.is_err());
    }
}
