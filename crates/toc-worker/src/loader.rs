//! Debounced filesystem watcher + loader for dynamic tool descriptors
//! (spec §4.2). Generalizes the teacher's `.so`/`.dylib` hot-reload watcher
//! to a directory of `*.json` tool descriptors, content-hashed with SHA-256
//! instead of relying on the OS loader's own versioning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{info, warn};

use toc_kernel::error::CoreError;
use toc_kernel::model::{is_valid_tool_name, DynamicTool};

use crate::registry::ToolTable;
use crate::security::scan;
use crate::tools::handler_for_kind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default = "default_schema")]
    pub schema: serde_json::Value,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub code: String,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

fn default_kind() -> String {
    "scripted".to_string()
}

pub const DEBOUNCE: Duration = Duration::from_millis(100);

pub struct ToolLoader {
    dir: PathBuf,
    table: Arc<ToolTable>,
    hashes: dashmap::DashMap<PathBuf, String>,
}

impl ToolLoader {
    pub fn new(dir: impl Into<PathBuf>, table: Arc<ToolTable>) -> Self {
        Self {
            dir: dir.into(),
            table,
            hashes: dashmap::DashMap::new(),
        }
    }

    /// Full rescan of the tools directory (spec `POST /reload`).
    pub fn rescan(&self) -> Vec<CoreError> {
        let mut errors = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                errors.push(CoreError::ToolLoad(format!("cannot read tools dir: {e}")));
                return errors;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Err(e) = self.load_file(&path) {
                errors.push(e);
            }
        }
        errors
    }

    pub fn load_file(&self, path: &Path) -> Result<(), CoreError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ToolLoad(format!("read {path:?}: {e}")))?;
        let hash = content_hash(&source);
        if self.hashes.get(path).map(|h| *h == hash).unwrap_or(false) {
            return Ok(()); // unchanged, skip
        }

        let descriptor: ToolDescriptor = serde_json::from_str(&source)
            .map_err(|e| CoreError::ToolLoad(format!("{path:?} is not a valid descriptor: {e}")))?;

        if !is_valid_tool_name(&descriptor.name) {
            return Err(CoreError::ToolLoad(format!(
                "tool name '{}' fails the naming pattern",
                descriptor.name
            )));
        }
        if descriptor.description.trim().is_empty() {
            return Err(CoreError::ToolLoad("description must not be empty".into()));
        }
        if !descriptor.schema.is_object() {
            return Err(CoreError::ToolLoad("schema must be a JSON object".into()));
        }

        let scan_result = scan(&descriptor.code);
        if scan_result.has_error() {
            return Err(CoreError::ToolLoad(format!(
                "security scan rejected '{}': {:?}",
                descriptor.name, scan_result.findings
            )));
        }

        let definition = DynamicTool {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            input_schema: descriptor.schema.clone(),
            permissions: descriptor.permissions.clone(),
            source_path: path.display().to_string(),
            content_hash: hash.clone(),
        };
        let handler = Arc::from(handler_for_kind(&descriptor.kind, Some(&descriptor.code)));

        let was_known = self.table.hash_of(&descriptor.name).is_some();
        if was_known {
            self.table.replace(definition, handler);
            info!(tool = descriptor.name, "reloaded");
        } else {
            self.table.try_insert(definition, handler)?;
            info!(tool = descriptor.name, "loaded");
        }
        self.hashes.insert(path.to_path_buf(), hash);
        Ok(())
    }

    pub fn forget(&self, path: &Path) {
        self.hashes.remove(path);
    }

    pub fn tools_dir_path(&self, tool_name: &str) -> PathBuf {
        self.dir.join(format!("{tool_name}.json"))
    }
}

fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

/// Spawn the debounced watch loop. Returns the `RecommendedWatcher` which
/// must be kept alive for the duration of the watch.
pub fn spawn_watch(loader: Arc<ToolLoader>, dir: PathBuf) -> notify::Result<RecommendedWatcher> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        let mut pending: HashMap<PathBuf, tokio::time::Instant> = HashMap::new();
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let is_remove = matches!(event.kind, EventKind::Remove(_));
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) != Some("json") {
                            continue;
                        }
                        if is_remove {
                            loader.forget(&path);
                        }
                        pending.insert(path, tokio::time::Instant::now() + DEBOUNCE);
                    }
                }
                _ = tokio::time::sleep(DEBOUNCE) => {
                    let now = tokio::time::Instant::now();
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, deadline)| **deadline <= now)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in ready {
                        pending.remove(&path);
                        if path.exists() {
                            if let Err(e) = loader.load_file(&path) {
                                warn!(?path, error = %e, "tool load failed");
                            }
                        }
                    }
                }
            }
        }
    });

    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dangerous_code() {
        let table = Arc::new(ToolTable::new(vec![]));
        let loader = ToolLoader::new("/tmp/does-not-matter", table);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evil.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "name": "evil_tool",
                "description": "bad",
                "code": "Command::new(\"rm\")"
            })
            .to_string(),
        )
        .unwrap();
        let err = loader.load_file(&path).unwrap_err();
        assert_eq!(err.tag(), "ToolLoad");
    }

    #[test]
    fn loads_a_valid_descriptor() {
        let table = Arc::new(ToolTable::new(vec![]));
        let loader = ToolLoader::new("/tmp/does-not-matter", table.clone());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greet.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "name": "greet",
                "description": "says hi",
                "kind": "scripted",
                "code": "get name\nuppercase"
            })
            .to_string(),
        )
        .unwrap();
        loader.load_file(&path).unwrap();
        assert!(table.get("greet").is_some());
    }

    #[test]
    fn unchanged_content_is_skipped_on_rescan() {
        let table = Arc::new(ToolTable::new(vec![]));
        let loader = ToolLoader::new("/tmp/does-not-matter", table.clone());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greet.json");
        std::fs::write(
            &path,
            serde_json::json!({"name": "greet", "description": "says hi"}).to_string(),
        )
        .unwrap();
        loader.load_file(&path).unwrap();
        loader.load_file(&path).unwrap();
        assert_eq!(table.len(), 2); // hello_world + greet
    }
}
