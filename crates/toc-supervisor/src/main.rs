use std::sync::Arc;

use toc_bridge::{Bridge, BridgeConfig};
use toc_kernel::config::CoreConfig;
use toc_supervisor::bridge_link::BridgeLink;
use toc_supervisor::server::{build_router, SupervisorState};
use toc_supervisor::snapshot::SnapshotStore;
use toc_supervisor::supervisor::{Supervisor, SupervisorConfig, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_DELAY};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let core_config = CoreConfig::from_env()?;
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
    let worker_id = std::env::var("TOC_WORKER_ID").unwrap_or_else(|_| "frankenstein".to_string());
    let supervisor_id = std::env::var("TOC_SUPERVISOR_ID").unwrap_or_else(|_| "meta".to_string());

    std::fs::create_dir_all(&worker_dir)?;
    std::fs::create_dir_all(&plans_dir)?;

    // A standalone Supervisor binary needs its own Bridge to register
    // against; in the single-process deployment (toc-cli) this Arc is
    // shared instead.
    let bridge = Arc::new(Bridge::new(BridgeConfig {
        bridge_secret: Some(core_config.bridge_secret.clone()),
        ..BridgeConfig::default()
    }));
    let _supervisor_inbox = bridge.register(&supervisor_id, "0.1.0")?;
    bridge.spawn_heartbeat(supervisor_id.clone(), core_config.health_check_interval);
    bridge.spawn_sweep(
        toc_bridge::DEFAULT_HEARTBEAT_CADENCE_MS,
        toc_bridge::DEFAULT_MISSED_HEARTBEAT_THRESHOLD,
    );
    let worker_inbox = bridge.register(&worker_id, "0.1.0")?;

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

    let bridge_link = Arc::new(BridgeLink::new(worker_id, bridge, supervisor.clone()));
    tokio::spawn(bridge_link.run(worker_inbox));

    let monitor = supervisor.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(core_config.health_check_interval).await;
            if let Err(e) = monitor.tick().await {
                tracing::error!(error = %e, "supervisor tick failed");
            }
        }
    });

    let state = SupervisorState {
        supervisor,
        worker_dir: worker_dir.into(),
        plans_dir: plans_dir.into(),
        client: reqwest::Client::new(),
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", core_config.port)).await?;
    tracing::info!(port = core_config.port, "supervisor listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(toc_kernel::shutdown::ctrl_c())
        .await?;
    Ok(())
}
