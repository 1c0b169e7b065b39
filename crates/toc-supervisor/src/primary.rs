//! Primary tools: the Supervisor's own tool surface, multiplexed alongside
//! the Worker's forwarded tools (spec §4.3).

use std::path::Path;

use toc_kernel::error::CoreError;
use toc_kernel::model::SnapshotKind;

use crate::supervisor::Supervisor;

pub async fn worker_status(supervisor: &Supervisor) -> serde_json::Value {
    let port = supervisor.worker_port();
    serde_json::json!({"port": port})
}

pub async fn worker_restart(supervisor: &Supervisor) -> Result<serde_json::Value, CoreError> {
    supervisor.tick().await?;
    Ok(serde_json::json!({"ok": true}))
}

pub fn worker_snapshot(supervisor: &Supervisor, worker_dir: &Path) -> Result<serde_json::Value, CoreError> {
    let tools = supervisor.snapshots.most_recent().map(|m| m.tool_count).unwrap_or(0);
    let meta = supervisor.snapshots.capture(worker_dir, SnapshotKind::Manual, tools)?;
    Ok(serde_json::to_value(meta).unwrap())
}

pub fn worker_rollback(supervisor: &Supervisor, id: &str, worker_dir: &Path) -> Result<serde_json::Value, CoreError> {
    supervisor.snapshots.restore(id, worker_dir)?;
    Ok(serde_json::json!({"ok": true}))
}

pub fn worker_snapshots(supervisor: &Supervisor) -> serde_json::Value {
    serde_json::to_value(supervisor.snapshots.list()).unwrap()
}

/// `plan_read` invariant (spec §4.3): path must end in `.md` and not
/// contain `..`.
pub fn plan_read(base_dir: &Path, relative_path: &str) -> Result<String, CoreError> {
    if !relative_path.ends_with(".md") {
        return Err(CoreError::Validation("plan_read path must end in .md".into()));
    }
    if relative_path.contains("..") {
        return Err(CoreError::Validation("plan_read path must not contain ..".into()));
    }
    let full_path = base_dir.join(relative_path);
    std::fs::read_to_string(&full_path)
        .map_err(|e| CoreError::Validation(format!("cannot read {relative_path}: {e}")))
}

pub async fn dynamic_tool_delete(
    client: &reqwest::Client,
    worker_port: u16,
    name: &str,
) -> Result<serde_json::Value, CoreError> {
    let url = format!("http://127.0.0.1:{worker_port}/tools/{name}");
    let resp = client
        .delete(&url)
        .send()
        .await
        .map_err(|e| CoreError::Transport(e.to_string()))?;
    if resp.status().is_success() {
        Ok(serde_json::json!({"ok": true}))
    } else {
        Err(CoreError::Validation(format!(
            "worker rejected delete of {name}: {}",
            resp.status()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_read_rejects_non_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan_read(dir.path(), "plan.txt").unwrap_err();
        assert_eq!(err.tag(), "ValidationError");
    }

    #[test]
    fn plan_read_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan_read(dir.path(), "../secret.md").unwrap_err();
        assert_eq!(err.tag(), "ValidationError");
    }

    #[test]
    fn plan_read_reads_valid_markdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plan.md"), "# plan").unwrap();
        let content = plan_read(dir.path(), "plan.md").unwrap();
        assert_eq!(content, "# plan");
    }
}
