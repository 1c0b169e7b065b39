//! The `BrowserDriver` capability boundary (spec §1: out of scope — "treated
//! as an opaque `BrowserDriver` capability"). This crate only needs a trait
//! object it can dispatch `browser.*` bridge messages to; a real driver
//! (CDP, WebDriver) is supplied by the deployer.

use async_trait::async_trait;
use serde_json::Value;
use toc_kernel::error::CoreError;

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, params: Value) -> Result<Value, CoreError>;
    async fn navigate(&self, params: Value) -> Result<Value, CoreError>;
    async fn click(&self, params: Value) -> Result<Value, CoreError>;
    async fn type_text(&self, params: Value) -> Result<Value, CoreError>;
    async fn screenshot(&self, params: Value) -> Result<Value, CoreError>;
    async fn close(&self, params: Value) -> Result<Value, CoreError>;
}

/// A driver stand-in used when no real browser backend is configured —
/// accepts every call and echoes its params back, so the rest of the
/// pipeline (Executor dispatch, Bridge routing, Planner retries) can be
/// exercised without a real browser.
pub struct NullBrowserDriver;

#[async_trait]
impl BrowserDriver for NullBrowserDriver {
    async fn launch(&self, params: Value) -> Result<Value, CoreError> {
        Ok(serde_json::json!({"sessionId": "null-session", "params": params}))
    }

    async fn navigate(&self, params: Value) -> Result<Value, CoreError> {
        Ok(params)
    }

    async fn click(&self, params: Value) -> Result<Value, CoreError> {
        Ok(params)
    }

    async fn type_text(&self, params: Value) -> Result<Value, CoreError> {
        Ok(params)
    }

    async fn screenshot(&self, _params: Value) -> Result<Value, CoreError> {
        Ok(serde_json::json!({"imageBase64": ""}))
    }

    async fn close(&self, params: Value) -> Result<Value, CoreError> {
        Ok(params)
    }
}
