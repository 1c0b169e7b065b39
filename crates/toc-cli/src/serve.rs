//! All-in-one deployment: one `Arc<Bridge>` shared in-process by the
//! Executor and Planner, the Worker supervised as a real child process
//! exactly as the standalone Supervisor binary runs it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;

use toc_bridge::{server as bridge_server, Bridge, BridgeConfig};
use toc_executor::ExecutorEngine;
use toc_kernel::config::CoreConfig;
use toc_planner::engine::PlannerEngine;
use toc_planner::server::{self as planner_server, PlannerState};
use toc_planner::store::PlanStore;
use toc_planner::synthesis::NullCompletionProvider;
use toc_registry::ToolRegistry;
use toc_supervisor::bridge_link::BridgeLink;
use toc_supervisor::server::{self as supervisor_server, SupervisorState};
use toc_supervisor::snapshot::SnapshotStore;
use toc_supervisor::supervisor::{Supervisor, SupervisorConfig, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_DELAY};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
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

    let worker_dir = std::env::var("TOC_WORKER_DIR").unwrap_or_else(|_| "./worker".to_string());
    let worker_binary =
        std::env::var("TOC_WORKER_BINARY").unwrap_or_else(|_| "toc-worker".to_string());
    let snapshots_dir =
        std::env::var("TOC_SNAPSHOTS_DIR").unwrap_or_else(|_| "./snapshots".to_string());
    let plans_dir = std::env::var("TOC_PLANS_DIR").unwrap_or_else(|_| "./plans".to_string());
    let worker_port: u16 = std::env::var("TOC_WORKER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001);

    std::fs::create_dir_all(&worker_dir)?;
    std::fs::create_dir_all(&plans_dir)?;

    // One Bridge shared by the Executor, Planner and Supervisor, rather
    // than the private one each standalone binary instantiates for itself.
    let bridge = Arc::new(Bridge::new(BridgeConfig {
        bridge_secret: Some(core_config.bridge_secret.clone()),
        ..BridgeConfig::default()
    }));
    let executor_inbox = bridge.register(&executor_id, "0.1.0")?;
    let planner_inbox = bridge.register("doctor", "0.1.0")?;
    let worker_inbox = bridge.register(&worker_id, "0.1.0")?;
    bridge.spawn_heartbeat(executor_id.clone(), core_config.health_check_interval);
    bridge.spawn_sweep(
        toc_bridge::DEFAULT_HEARTBEAT_CADENCE_MS,
        toc_bridge::DEFAULT_MISSED_HEARTBEAT_THRESHOLD,
    );

    let executor = Arc::new(ExecutorEngine::new(
        executor_id.clone(),
        worker_id.clone(),
        bridge.clone(),
        core_config.max_franks,
    ));
    tokio::spawn(executor.run(executor_inbox));

    let registry = Arc::new(ToolRegistry::new(Vec::new(), HashMap::new()));
    let planner = Arc::new(PlannerEngine::new(
        "doctor",
        executor_id,
        worker_id.clone(),
        bridge.clone(),
        Arc::new(PlanStore::new()),
        registry,
        Arc::new(NullCompletionProvider),
        core_config.allow_localhost,
        core_config.failure_threshold,
        max_tools,
    ));
    tokio::spawn(planner.clone().run(planner_inbox));

    let snapshots = SnapshotStore::new(&snapshots_dir, core_config.snapshot_retention)?;
    let supervisor = Arc::new(Supervisor::new(
        SupervisorConfig {
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_delay: DEFAULT_RESTART_DELAY,
            worker_binary: worker_binary.into(),
            worker_dir: worker_dir.clone().into(),
            worker_port,
        },
        snapshots,
        bridge.clone(),
        worker_id.clone(),
    ));
    supervisor.start().await?;

    let bridge_link = Arc::new(BridgeLink::new(worker_id, bridge.clone(), supervisor.clone()));
    tokio::spawn(bridge_link.run(worker_inbox));

    let monitor = supervisor.clone();
    let health_check_interval = core_config.health_check_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(health_check_interval).await;
            if let Err(e) = monitor.tick().await {
                tracing::error!(error = %e, "supervisor tick failed");
            }
        }
    });

    let bridge_router = bridge_server::build_router(bridge);
    let supervisor_router = supervisor_server::build_router(SupervisorState {
        supervisor,
        worker_dir: worker_dir.into(),
        plans_dir: plans_dir.into(),
        client: reqwest::Client::new(),
    });
    let planner_router = planner_server::build_router(PlannerState { engine: planner });

    let app = Router::new()
        .nest("/bridge", bridge_router)
        .nest("/supervisor", supervisor_router)
        .nest("/planner", planner_router);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", core_config.port)).await?;
    tracing::info!(port = core_config.port, "toc-cli serving bridge+supervisor+planner");
    axum::serve(listener, app)
        .with_graceful_shutdown(toc_kernel::shutdown::ctrl_c())
        .await?;
    Ok(())
}
