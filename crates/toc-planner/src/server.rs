//! Planner HTTP façade (spec §4.5 "Accepts intents via ... HTTP façade").

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::engine::PlannerEngine;

#[derive(Clone)]
pub struct PlannerState {
    pub engine: Arc<PlannerEngine>,
}

pub fn build_router(state: PlannerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/intents", post(submit_intent))
        .route("/plans/{id}", get(get_plan))
        .route("/plans/{id}/cancel", post(cancel_plan))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

#[derive(Deserialize)]
struct SubmitIntentRequest {
    intent: String,
}

async fn submit_intent(
    State(state): State<PlannerState>,
    Json(req): Json<SubmitIntentRequest>,
) -> impl IntoResponse {
    match state.engine.submit_intent(&req.intent).await {
        Ok(plan) => (StatusCode::OK, Json(serde_json::to_value(&plan).unwrap())),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string(), "tag": e.tag()})),
        ),
    }
}

async fn get_plan(State(state): State<PlannerState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.engine.store.get(&id).await {
        Some(plan) => (StatusCode::OK, Json(serde_json::to_value(&plan).unwrap())),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "unknown plan id"})),
        ),
    }
}

async fn cancel_plan(State(state): State<PlannerState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.engine.cancel_plan(&id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "cancelled"}))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string(), "tag": e.tag()})),
        ),
    }
}
