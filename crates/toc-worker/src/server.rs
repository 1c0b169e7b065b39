//! Worker HTTP surface (spec §4.2).

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::browser::BrowserDriver;
use crate::loader::{ToolDescriptor, ToolLoader};
use crate::metrics::WorkerMetrics;
use crate::registry::ToolTable;
use crate::tools::CallResult;

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Stamps every request with an `x-request-id`, echoed back on the
/// response, matching `mofa-gateway/src/server.rs`'s `Uuid::new_v4()`
/// request-id generation.
async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    request.headers_mut().insert(
        REQUEST_ID_HEADER.clone(),
        HeaderValue::from_str(&request_id).unwrap(),
    );
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER.clone(), HeaderValue::from_str(&request_id).unwrap());
    response
}

#[derive(Clone)]
pub struct WorkerState {
    pub table: Arc<ToolTable>,
    pub loader: Arc<ToolLoader>,
    pub driver: Arc<dyn BrowserDriver>,
    pub started_at: Instant,
    pub last_error: Arc<parking_lot::Mutex<Option<String>>>,
    pub metrics: Arc<WorkerMetrics>,
}

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/create", post(create_tool_handler))
        .route("/tools/{name}", delete(delete_tool_handler))
        .route("/call", post(call_handler))
        .route("/browser/{action}", post(browser_handler))
        .route("/reload", post(reload_handler))
        .route("/shutdown", post(shutdown_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Forwards a `BrowserDriver` action (spec §1's opaque browser capability),
/// the HTTP-side counterpart of the `browser.*` Bridge messages a Supervisor
/// broker translates into calls on this route.
async fn browser_handler(
    State(state): State<WorkerState>,
    Path(action): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> impl IntoResponse {
    let result = match action.as_str() {
        "launch" => state.driver.launch(params).await,
        "navigate" => state.driver.navigate(params).await,
        "click" => state.driver.click(params).await,
        "type" => state.driver.type_text(params).await,
        "screenshot" => state.driver.screenshot(params).await,
        "close" => state.driver.close(params).await,
        other => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": format!("unknown browser action: {other}")})),
            )
                .into_response()
        }
    };
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => (
            StatusCode::OK,
            Json(serde_json::json!({"error": {"tag": e.tag(), "message": e.to_string()}})),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<WorkerState>) -> impl IntoResponse {
    let last_error = state.last_error.lock().clone();
    let status = if last_error.is_none() { "healthy" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "uptime": state.started_at.elapsed().as_secs(),
        "toolCount": state.table.len(),
        "lastError": last_error,
    }))
}

async fn list_tools_handler(State(state): State<WorkerState>) -> impl IntoResponse {
    Json(state.table.list())
}

#[derive(Deserialize)]
struct CreateToolBody {
    name: String,
    description: String,
    #[serde(default)]
    schema: serde_json::Value,
    #[serde(default)]
    code: String,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    kind: Option<String>,
}

async fn create_tool_handler(
    State(state): State<WorkerState>,
    Json(body): Json<CreateToolBody>,
) -> impl IntoResponse {
    let descriptor = ToolDescriptor {
        name: body.name.clone(),
        description: body.description,
        schema: if body.schema.is_null() {
            serde_json::json!({"type": "object"})
        } else {
            body.schema
        },
        permissions: body.permissions,
        kind: body.kind.unwrap_or_else(|| "scripted".to_string()),
        code: body.code,
    };
    let path = state.loader.tools_dir_path(&descriptor.name);
    match std::fs::write(&path, serde_json::to_string_pretty(&descriptor).unwrap()) {
        Ok(()) => match state.loader.load_file(&path) {
            Ok(()) => (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response(),
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
                    .into_response()
            }
        },
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn delete_tool_handler(
    State(state): State<WorkerState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.table.remove(&name) {
        Ok(()) => {
            let path = state.loader.tools_dir_path(&name);
            let _ = std::fs::remove_file(&path);
            state.loader.forget(&path);
            (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": e.to_string()})))
            .into_response(),
    }
}

#[derive(Deserialize)]
struct CallBody {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

async fn call_handler(
    State(state): State<WorkerState>,
    Json(body): Json<CallBody>,
) -> impl IntoResponse {
    state.metrics.record_call();
    let Some(handler) = state.table.get(&body.tool) else {
        state.metrics.record_failure();
        return (
            StatusCode::NOT_FOUND,
            Json(CallResult::err("ToolLoad", &format!("unknown tool: {}", body.tool))),
        )
            .into_response();
    };

    let timeout = tokio::time::Duration::from_secs(60);
    match tokio::time::timeout(timeout, handler.call(body.args)).await {
        Ok(Ok(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(Err(e)) => {
            state.metrics.record_failure();
            *state.last_error.lock() = Some(e.to_string());
            (StatusCode::OK, Json(CallResult::err(e.tag(), &e.to_string()))).into_response()
        }
        Err(_) => {
            state.metrics.record_timeout();
            (
                StatusCode::OK,
                Json(CallResult::err("Timeout", "tool call exceeded 60s")),
            )
                .into_response()
        }
    }
}

async fn metrics_handler(State(state): State<WorkerState>) -> impl IntoResponse {
    Json(state.metrics.snapshot(state.table.len()))
}

async fn reload_handler(State(state): State<WorkerState>) -> impl IntoResponse {
    let errors = state.loader.rescan();
    if errors.is_empty() {
        (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
    } else {
        (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "errors": errors.iter().map(|e| e.to_string()).collect::<Vec<_>>()})),
        )
            .into_response()
    }
}

/// Graceful exit: 500ms grace before the process actually terminates (spec
/// §5 cancellation/shutdown ladder — SIGTERM/SIGKILL live one level up, in
/// the Supervisor, since this handler only covers the Worker's own half).
async fn shutdown_handler() -> impl IntoResponse {
    tokio::spawn(async {
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        std::process::exit(0);
    });
    (StatusCode::OK, Json(serde_json::json!({"ok": true})))
}
