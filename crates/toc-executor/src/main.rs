use std::sync::Arc;
use std::time::Duration;

use toc_bridge::{Bridge, BridgeConfig};
use toc_executor::ExecutorEngine;
use toc_kernel::config::CoreConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let core_config = CoreConfig::from_env()?;
    let executor_id = std::env::var("TOC_EXECUTOR_ID").unwrap_or_else(|_| "igor".to_string());
    let worker_id = std::env::var("TOC_WORKER_ID").unwrap_or_else(|_| "frankenstein".to_string());

    // A standalone Executor binary needs its own Bridge to register against;
    // in the single-process deployment (toc-cli) this Arc is shared instead.
    let bridge = Arc::new(Bridge::new(BridgeConfig {
        bridge_secret: Some(core_config.bridge_secret.clone()),
        ..BridgeConfig::default()
    }));
    let inbox = bridge.register(&executor_id, "0.1.0")?;
    bridge.spawn_heartbeat(executor_id.clone(), Duration::from_millis(toc_bridge::DEFAULT_HEARTBEAT_CADENCE_MS));
    bridge.spawn_sweep(
        toc_bridge::DEFAULT_HEARTBEAT_CADENCE_MS,
        toc_bridge::DEFAULT_MISSED_HEARTBEAT_THRESHOLD,
    );

    let engine = Arc::new(ExecutorEngine::new(
        executor_id,
        worker_id,
        bridge,
        core_config.max_franks,
    ));
    engine.run(inbox).await;
    Ok(())
}
