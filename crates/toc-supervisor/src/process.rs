//! Worker child-process lifecycle: spawn, health poll, restart (spec §4.3).

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use toc_kernel::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Stopped,
}

pub struct WorkerProcess {
    pub binary: PathBuf,
    pub worker_dir: PathBuf,
    pub port: u16,
    pub health_url: String,
    child: Option<Child>,
    pub state: WorkerState,
    pub restart_count: u32,
}

impl WorkerProcess {
    pub fn new(binary: PathBuf, worker_dir: PathBuf, port: u16) -> Self {
        Self {
            health_url: format!("http://127.0.0.1:{port}/health"),
            binary,
            worker_dir,
            port,
            child: None,
            state: WorkerState::Stopped,
            restart_count: 0,
        }
    }

    pub fn spawn(&mut self) -> Result<(), CoreError> {
        let child = Command::new(&self.binary)
            .current_dir(&self.worker_dir)
            .env("PORT", self.port.to_string())
            .env("TOC_TOOLS_DIR", self.worker_dir.join("tools"))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::WorkerCrash(format!("spawn failed: {e}")))?;
        self.child = Some(child);
        self.state = WorkerState::Starting;
        info!(port = self.port, "worker spawned");
        Ok(())
    }

    /// Poll `/health` up to 10s (spec §4.3 step 3).
    pub async fn wait_healthy(&mut self, client: &reqwest::Client) -> Result<(), CoreError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            if client.get(&self.health_url).send().await.map(|r| r.status().is_success()).unwrap_or(false) {
                self.state = WorkerState::Running;
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Err(CoreError::WorkerCrash("worker never became healthy".into()))
    }

    /// `true` if the child has exited.
    pub fn has_exited(&mut self) -> bool {
        match &mut self.child {
            Some(child) => child.try_wait().ok().flatten().is_some(),
            None => true,
        }
    }

    pub async fn shutdown_gracefully(&mut self, client: &reqwest::Client) {
        let shutdown_url = format!("http://127.0.0.1:{}/shutdown", self.port);
        let _ = client.post(&shutdown_url).send().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Some(child) = &mut self.child {
            if child.try_wait().ok().flatten().is_none() {
                warn!("worker did not exit gracefully, killing");
                let _ = child.start_kill();
            }
        }
        self.state = WorkerState::Stopped;
    }
}
