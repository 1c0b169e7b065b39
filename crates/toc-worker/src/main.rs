use std::sync::Arc;
use std::time::Instant;

use toc_kernel::config::CoreConfig;
use toc_worker::browser::NullBrowserDriver;
use toc_worker::loader::{spawn_watch, ToolLoader};
use toc_worker::registry::ToolTable;
use toc_worker::server::{build_router, WorkerState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let core_config = CoreConfig::from_env()?;
    let tools_dir = std::env::var("TOC_TOOLS_DIR").unwrap_or_else(|_| "./tools".to_string());
    std::fs::create_dir_all(&tools_dir)?;

    let table = Arc::new(ToolTable::new(vec![]));
    let loader = Arc::new(ToolLoader::new(tools_dir.clone(), table.clone()));
    for err in loader.rescan() {
        tracing::warn!(error = %err, "initial tool load failed");
    }
    let _watcher = spawn_watch(loader.clone(), tools_dir.into())?;

    let state = WorkerState {
        table,
        loader,
        driver: Arc::new(NullBrowserDriver),
        started_at: Instant::now(),
        last_error: Arc::new(parking_lot::Mutex::new(None)),
        metrics: Arc::new(toc_worker::metrics::WorkerMetrics::new()),
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", core_config.port)).await?;
    tracing::info!(port = core_config.port, "worker listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(toc_kernel::shutdown::ctrl_c())
        .await?;
    Ok(())
}
