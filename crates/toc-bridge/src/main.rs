use std::sync::Arc;

use toc_bridge::{server, Bridge, BridgeConfig};
use toc_kernel::config::CoreConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let core_config = CoreConfig::from_env()?;
    let bridge = Arc::new(Bridge::new(BridgeConfig {
        bridge_secret: Some(core_config.bridge_secret.clone()),
        tokens_per_second: 100.0,
        ..BridgeConfig::default()
    }));

    let app = server::build_router(bridge);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", core_config.port)).await?;
    tracing::info!(port = core_config.port, "bridge listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(toc_kernel::shutdown::ctrl_c())
        .await?;
    Ok(())
}
