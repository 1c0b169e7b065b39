//! Supervision loop: health poll, restart/rollback policy, tool-set content
//! hash (spec §4.3). Generalizes the teacher's hot-reload manager event loop
//! from in-process plugin reload attempts to child-process restart bursts.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use toc_bridge::Bridge;
use toc_kernel::error::CoreError;
use toc_kernel::model::{DynamicTool, SnapshotKind};
use toc_kernel::wire::{Message, MessageTarget, MessageType};

use crate::process::{WorkerProcess, WorkerState};
use crate::snapshot::SnapshotStore;

pub const DEFAULT_MAX_RESTARTS: u32 = 5;
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_TOOL_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct SupervisorConfig {
    pub max_restarts: u32,
    pub restart_delay: Duration,
    pub worker_binary: PathBuf,
    pub worker_dir: PathBuf,
    pub worker_port: u16,
}

pub struct Supervisor {
    config: SupervisorConfig,
    process: Mutex<WorkerProcess>,
    pub snapshots: SnapshotStore,
    client: reqwest::Client,
    bridge: Arc<Bridge>,
    worker_id: String,
    last_tool_hash: Mutex<Option<String>>,
    /// Snapshot taken immediately before the first failure in the current
    /// restart burst — rollback target if the burst exhausts its budget.
    pre_burst_snapshot: Mutex<Option<String>>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        snapshots: SnapshotStore,
        bridge: Arc<Bridge>,
        worker_id: impl Into<String>,
    ) -> Self {
        let process = WorkerProcess::new(
            config.worker_binary.clone(),
            config.worker_dir.clone(),
            config.worker_port,
        );
        Self {
            config,
            process: Mutex::new(process),
            snapshots,
            client: reqwest::Client::new(),
            bridge,
            worker_id: worker_id.into(),
            last_tool_hash: Mutex::new(None),
            pre_burst_snapshot: Mutex::new(None),
        }
    }

    /// Spec §4.3 step 1: initialize snapshots directory; if empty, create
    /// `initial`.
    pub fn ensure_initial_snapshot(&self) -> Result<(), CoreError> {
        if self.snapshots.most_recent().is_none() {
            self.snapshots
                .capture(&self.config.worker_dir, SnapshotKind::Initial, 0)?;
        }
        Ok(())
    }

    pub async fn start(&self) -> Result<(), CoreError> {
        self.ensure_initial_snapshot()?;
        {
            let mut process = self.process.lock().unwrap();
            process.spawn()?;
        }
        self.wait_until_healthy().await
    }

    async fn wait_until_healthy(&self) -> Result<(), CoreError> {
        // `reqwest::Client` isn't held across the lock, so the blocking
        // std Mutex is safe to hold only for the synchronous state flip.
        let health_url = {
            let process = self.process.lock().unwrap();
            process.health_url.clone()
        };
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            if self
                .client
                .get(&health_url)
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false)
            {
                self.process.lock().unwrap().state = WorkerState::Running;
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Err(CoreError::WorkerCrash("worker never became healthy".into()))
    }

    /// One iteration of the monitor loop: checks whether the child exited
    /// and applies the restart/rollback policy (spec §4.3).
    pub async fn tick(&self) -> Result<(), CoreError> {
        let exited = {
            let mut process = self.process.lock().unwrap();
            process.state == WorkerState::Running && process.has_exited()
        };
        if exited {
            self.handle_crash().await?;
        }
        self.poll_tool_hash().await;
        Ok(())
    }

    async fn handle_crash(&self) -> Result<(), CoreError> {
        let (restart_count, is_first_in_burst) = {
            let mut process = self.process.lock().unwrap();
            process.restart_count += 1;
            (process.restart_count, process.restart_count == 1)
        };

        if is_first_in_burst {
            if let Some(meta) = self.snapshots.most_recent() {
                *self.pre_burst_snapshot.lock().unwrap() = Some(meta.id);
            }
        }

        warn!(restart_count, "worker crashed");

        if restart_count >= self.config.max_restarts {
            error!("restart budget exhausted, rolling back to last-good snapshot");
            self.rollback().await?;
            self.process.lock().unwrap().restart_count = 0;
        } else {
            tokio::time::sleep(self.config.restart_delay).await;
        }

        let mut process = self.process.lock().unwrap();
        process.spawn()?;
        drop(process);
        self.wait_until_healthy().await
    }

    async fn rollback(&self) -> Result<(), CoreError> {
        let target = self
            .pre_burst_snapshot
            .lock()
            .unwrap()
            .clone()
            .or_else(|| self.snapshots.list().last().cloned().map(|m| m.id));

        let Some(id) = target else {
            return Err(CoreError::Fatal(
                "no snapshot available for rollback".into(),
            ));
        };
        self.snapshots.restore(&id, &self.config.worker_dir)?;
        info!(snapshot = %id, "rolled back worker to snapshot");
        Ok(())
    }

    async fn poll_tool_hash(&self) {
        let tools_url = {
            let process = self.process.lock().unwrap();
            format!("http://127.0.0.1:{}/tools", process.port)
        };
        let Ok(resp) = self.client.get(&tools_url).send().await else {
            return;
        };
        let Ok(tools) = resp.json::<Vec<DynamicTool>>().await else {
            return;
        };
        let hash = tool_set_content_hash(&tools);
        let changed = {
            let mut last = self.last_tool_hash.lock().unwrap();
            let changed = last.as_deref() != Some(hash.as_str());
            *last = Some(hash.clone());
            changed
        };
        if changed {
            info!(hash, "tools/list_changed");
            let message = Message::new(
                &self.worker_id,
                MessageTarget::Broadcast,
                MessageType::ToolsListChanged,
                serde_json::json!({"hash": hash}),
            );
            if let Err(e) = self.bridge.publish(message).await {
                warn!(error = %e, "failed to publish tools/list_changed");
            }
        }
    }

    pub fn worker_port(&self) -> u16 {
        self.process.lock().unwrap().port
    }

    pub fn is_protected_name(&self, name: &str) -> bool {
        toc_kernel::model::DEFAULT_PROTECTED_TOOL_NAMES.contains(&name)
    }
}

/// Stable hash over sorted `(name, description, canonical(schema))` triples
/// (spec §4.3 step 4).
pub fn tool_set_content_hash(tools: &[DynamicTool]) -> String {
    let mut rows: Vec<(String, String, String)> = tools
        .iter()
        .map(|t| (t.name.clone(), t.description.clone(), t.input_schema.to_string()))
        .collect();
    rows.sort();
    let mut hasher = Sha256::new();
    for (name, desc, schema) in rows {
        hasher.update(name.as_bytes());
        hasher.update(desc.as_bytes());
        hasher.update(schema.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_set_hash_is_order_independent() {
        let a = vec![
            DynamicTool {
                name: "b".into(),
                description: "d".into(),
                input_schema: serde_json::json!({}),
                permissions: vec![],
                source_path: "".into(),
                content_hash: "".into(),
            },
            DynamicTool {
                name: "a".into(),
                description: "d".into(),
                input_schema: serde_json::json!({}),
                permissions: vec![],
                source_path: "".into(),
                content_hash: "".into(),
            },
        ];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(tool_set_content_hash(&a), tool_set_content_hash(&b));
    }
}
