//! Ctrl-C graceful-shutdown future for `axum::serve(...).with_graceful_shutdown(...)`,
//! generalizing the `mpsc`-channel shutdown signal in the teacher's hot-reload
//! manager from an explicit stop call to a process-wide SIGINT trap.

pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install ctrl-c handler");
    }
}
