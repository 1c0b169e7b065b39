//! Supervisor HTTP surface: primary tools plus forwarded Worker calls
//! (spec §4.3 — "exposes the same external protocol surface as a plain
//! tool-server").

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::primary;
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct SupervisorState {
    pub supervisor: Arc<Supervisor>,
    pub worker_dir: PathBuf,
    pub plans_dir: PathBuf,
    pub client: reqwest::Client,
}

pub fn build_router(state: SupervisorState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/worker/status", get(status_handler))
        .route("/worker/restart", post(restart_handler))
        .route("/worker/snapshot", post(snapshot_handler))
        .route("/worker/snapshots", get(snapshots_handler))
        .route("/worker/rollback/{id}", post(rollback_handler))
        .route("/plan/{name}", get(plan_read_handler))
        .route("/tools/{name}", delete(tool_delete_handler))
        .route("/call", post(forward_call_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

async fn status_handler(State(state): State<SupervisorState>) -> impl IntoResponse {
    Json(primary::worker_status(&state.supervisor).await)
}

async fn restart_handler(State(state): State<SupervisorState>) -> impl IntoResponse {
    match primary::worker_restart(&state.supervisor).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
            .into_response(),
    }
}

async fn snapshot_handler(State(state): State<SupervisorState>) -> impl IntoResponse {
    match primary::worker_snapshot(&state.supervisor, &state.worker_dir) {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
            .into_response(),
    }
}

async fn snapshots_handler(State(state): State<SupervisorState>) -> impl IntoResponse {
    Json(primary::worker_snapshots(&state.supervisor))
}

async fn rollback_handler(
    State(state): State<SupervisorState>,
    AxumPath(id): AxumPath<String>,
) -> impl IntoResponse {
    match primary::worker_rollback(&state.supervisor, &id, &state.worker_dir) {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
            .into_response(),
    }
}

async fn plan_read_handler(
    State(state): State<SupervisorState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    match primary::plan_read(&state.plans_dir, &name) {
        Ok(content) => (StatusCode::OK, content).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
            .into_response(),
    }
}

async fn tool_delete_handler(
    State(state): State<SupervisorState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    if state.supervisor.is_protected_name(&name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": format!("'{name}' is protected")})),
        )
            .into_response();
    }
    match primary::dynamic_tool_delete(&state.client, state.supervisor.worker_port(), &name).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
            .into_response(),
    }
}

#[derive(Deserialize)]
struct ForwardCallBody {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// Forward any call not recognized as a primary tool straight through to
/// the Worker (spec §4.3 "multiplexing ... and the Worker's tools").
async fn forward_call_handler(
    State(state): State<SupervisorState>,
    Json(body): Json<ForwardCallBody>,
) -> impl IntoResponse {
    let url = format!(
        "http://127.0.0.1:{}/call",
        state.supervisor.worker_port()
    );
    match state
        .client
        .post(&url)
        .json(&serde_json::json!({"tool": body.tool, "args": body.args}))
        .send()
        .await
    {
        Ok(resp) => {
            let status = resp.status();
            let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
            (status, Json(body)).into_response()
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
