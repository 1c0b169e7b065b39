use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use toc_bridge::{Bridge, BridgeConfig};
use toc_kernel::config::CoreConfig;
use toc_planner::engine::PlannerEngine;
use toc_planner::server::{build_router, PlannerState};
use toc_planner::store::PlanStore;
use toc_planner::synthesis::NullCompletionProvider;
use toc_registry::ToolRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let core_config = CoreConfig::from_env()?;
    let executor_id = std::env::var("TOC_EXECUTOR_ID").unwrap_or_else(|_| "igor".to_string());
    let worker_id = std::env::var("TOC_WORKER_ID").unwrap_or_else(|_| "frankenstein".to_string());
    let max_tools: usize = std::env::var("TOC_MAX_TOOLS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(toc_registry::DEFAULT_MAX_TOOLS);

    // A standalone Planner binary needs its own Bridge to register against;
    // in the single-process deployment (toc-cli) this Arc is shared instead.
    let bridge = Arc::new(Bridge::new(BridgeConfig {
        bridge_secret: Some(core_config.bridge_secret.clone()),
        ..BridgeConfig::default()
    }));
    let inbox = bridge.register("doctor", "0.1.0")?;
    bridge.spawn_heartbeat("doctor", Duration::from_millis(toc_bridge::DEFAULT_HEARTBEAT_CADENCE_MS));
    bridge.spawn_sweep(
        toc_bridge::DEFAULT_HEARTBEAT_CADENCE_MS,
        toc_bridge::DEFAULT_MISSED_HEARTBEAT_THRESHOLD,
    );

    // The registry's tool catalogue is built up from `tool.listed` responses
    // in a full deployment; a standalone Planner starts with an empty table
    // and relies on category-fill/forced categories producing an empty bag
    // until the Worker's catalogue is synced.
    let registry = Arc::new(ToolRegistry::new(Vec::new(), HashMap::new()));

    let engine = Arc::new(PlannerEngine::new(
        "doctor",
        executor_id,
        worker_id,
        bridge,
        Arc::new(PlanStore::new()),
        registry,
        Arc::new(NullCompletionProvider),
        core_config.allow_localhost,
        core_config.failure_threshold,
        max_tools,
    ));

    let bridge_loop = engine.clone();
    tokio::spawn(bridge_loop.run(inbox));

    let state = PlannerState { engine };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", core_config.port)).await?;
    tracing::info!(port = core_config.port, "planner listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(toc_kernel::shutdown::ctrl_c())
        .await?;
    Ok(())
}
