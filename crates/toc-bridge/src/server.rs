//! HTTP + WebSocket surface exposing the [`Bridge`] to out-of-process
//! components (Worker, Supervisor, Executor, Planner each run as their own
//! binary). Shaped after the teacher's gateway `AppState`/router split.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::{Bridge, HistoryFilter};
use toc_kernel::wire::Message;

#[derive(Clone)]
pub struct BridgeServerState {
    pub bridge: Arc<Bridge>,
}

pub fn build_router(bridge: Arc<Bridge>) -> Router {
    let state = BridgeServerState { bridge };
    Router::new()
        .route("/health", get(health_handler))
        .route("/publish", post(publish_handler))
        .route("/register/{component_id}", post(register_handler))
        .route("/unregister/{component_id}", post(unregister_handler))
        .route("/heartbeat/{component_id}", post(heartbeat_handler))
        .route("/history", get(history_handler))
        .route("/dead-letters", get(dead_letters_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

async fn publish_handler(
    State(state): State<BridgeServerState>,
    Json(message): Json<Message>,
) -> impl IntoResponse {
    match state.bridge.publish(message).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response(),
        Err(e) => {
            (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct RegisterBody {
    version: String,
}

async fn register_handler(
    State(state): State<BridgeServerState>,
    Path(component_id): Path<String>,
    Json(body): Json<RegisterBody>,
) -> impl IntoResponse {
    match state.bridge.register(&component_id, &body.version) {
        Ok(_rx) => {
            info!(component_id, "registered");
            (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
        }
        Err(e) => {
            (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": e.to_string()})))
                .into_response()
        }
    }
}

async fn unregister_handler(
    State(state): State<BridgeServerState>,
    Path(component_id): Path<String>,
) -> impl IntoResponse {
    state.bridge.unregister(&component_id);
    Json(serde_json::json!({"ok": true}))
}

async fn heartbeat_handler(
    State(state): State<BridgeServerState>,
    Path(component_id): Path<String>,
) -> impl IntoResponse {
    if state.bridge.heartbeat(&component_id) {
        (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "not registered"})))
            .into_response()
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    source: Option<String>,
    target: Option<String>,
    #[serde(rename = "sinceMs")]
    since_ms: Option<u64>,
    limit: Option<usize>,
}

async fn history_handler(
    State(state): State<BridgeServerState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let filter = HistoryFilter {
        message_type: None,
        source: query.source,
        target: query.target,
        since_ms: query.since_ms,
        limit: query.limit.unwrap_or(0),
    };
    Json(state.bridge.history(&filter))
}

async fn dead_letters_handler(State(state): State<BridgeServerState>) -> impl IntoResponse {
    Json(state.bridge.dead_letters())
}

async fn metrics_handler(State(state): State<BridgeServerState>) -> impl IntoResponse {
    Json(state.bridge.metrics())
}
