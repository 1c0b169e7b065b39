//! Worker source+tools archival (spec §3 `Snapshot`, §4.3 retention ring).
//!
//! Generalizes the teacher's in-process plugin state snapshot to a
//! whole-directory tarball, since a supervised Worker is a separate process
//! rather than a loaded module whose state can be captured in memory.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tar::{Archive, Builder};

use toc_kernel::error::CoreError;
use toc_kernel::model::{RingBuffer, SnapshotKind, SnapshotMeta};

pub struct SnapshotStore {
    archive_dir: PathBuf,
    ring: std::sync::Mutex<RingBuffer<SnapshotMeta>>,
    retention: usize,
}

impl SnapshotStore {
    pub fn new(archive_dir: impl Into<PathBuf>, retention: usize) -> std::io::Result<Self> {
        let archive_dir = archive_dir.into();
        std::fs::create_dir_all(&archive_dir)?;
        Ok(Self {
            archive_dir,
            ring: std::sync::Mutex::new(RingBuffer::new(retention)),
            retention,
        })
    }

    fn archive_path(&self, id: &str) -> PathBuf {
        self.archive_dir.join(format!("{id}.tar.gz"))
    }

    /// Tar+gzip `worker_dir`, content-address the archive by its SHA-256.
    pub fn capture(
        &self,
        worker_dir: &Path,
        kind: SnapshotKind,
        tool_count: usize,
    ) -> Result<SnapshotMeta, CoreError> {
        let mut raw = Vec::new();
        {
            let encoder = GzEncoder::new(&mut raw, Compression::default());
            let mut builder = Builder::new(encoder);
            builder
                .append_dir_all(".", worker_dir)
                .map_err(|e| CoreError::Fatal(format!("snapshot tar failed: {e}")))?;
            builder
                .into_inner()
                .and_then(|enc| enc.finish())
                .map_err(|e| CoreError::Fatal(format!("snapshot gzip failed: {e}")))?;
        }

        let mut hasher = Sha256::new();
        hasher.update(&raw);
        let id = hex::encode(hasher.finalize());

        std::fs::write(self.archive_path(&id), &raw)
            .map_err(|e| CoreError::Fatal(format!("write snapshot {id}: {e}")))?;

        let meta = SnapshotMeta::new(id, kind, tool_count);
        let mut ring = self.ring.lock().unwrap();
        if let Some(evicted) = ring.push(meta.clone()) {
            let _ = std::fs::remove_file(self.archive_path(&evicted.id));
        }
        Ok(meta)
    }

    /// Extract a snapshot over `worker_dir`, replacing its contents.
    pub fn restore(&self, id: &str, worker_dir: &Path) -> Result<(), CoreError> {
        let path = self.archive_path(id);
        let mut raw = Vec::new();
        std::fs::File::open(&path)
            .map_err(|e| CoreError::Fatal(format!("open snapshot {id}: {e}")))?
            .read_to_end(&mut raw)
            .map_err(|e| CoreError::Fatal(format!("read snapshot {id}: {e}")))?;

        if worker_dir.exists() {
            std::fs::remove_dir_all(worker_dir)
                .map_err(|e| CoreError::Fatal(format!("clear worker dir: {e}")))?;
        }
        std::fs::create_dir_all(worker_dir)
            .map_err(|e| CoreError::Fatal(format!("recreate worker dir: {e}")))?;

        let decoder = GzDecoder::new(raw.as_slice());
        let mut archive = Archive::new(decoder);
        archive
            .unpack(worker_dir)
            .map_err(|e| CoreError::Fatal(format!("unpack snapshot {id}: {e}")))?;
        Ok(())
    }

    /// Newest-first (spec §4.3: "listing is ordered newest-first").
    pub fn list(&self) -> Vec<SnapshotMeta> {
        let ring = self.ring.lock().unwrap();
        let mut all: Vec<SnapshotMeta> = ring.iter().cloned().collect();
        all.reverse();
        all
    }

    pub fn most_recent(&self) -> Option<SnapshotMeta> {
        self.list().into_iter().next()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_then_restore_round_trips() {
        let archive_dir = tempfile::tempdir().unwrap();
        let worker_dir = tempfile::tempdir().unwrap();
        std::fs::write(worker_dir.path().join("tool.json"), "{}").unwrap();

        let store = SnapshotStore::new(archive_dir.path(), 3).unwrap();
        let meta = store.capture(worker_dir.path(), SnapshotKind::Manual, 1).unwrap();

        std::fs::remove_file(worker_dir.path().join("tool.json")).unwrap();
        assert!(!worker_dir.path().join("tool.json").exists());

        store.restore(&meta.id, worker_dir.path()).unwrap();
        assert!(worker_dir.path().join("tool.json").exists());
    }

    #[test]
    fn retention_drops_oldest() {
        let archive_dir = tempfile::tempdir().unwrap();
        let worker_dir = tempfile::tempdir().unwrap();
        std::fs::write(worker_dir.path().join("a.json"), "{}").unwrap();
        let store = SnapshotStore::new(archive_dir.path(), 2).unwrap();

        std::fs::write(worker_dir.path().join("a.json"), "{\"v\":1}").unwrap();
        let first = store.capture(worker_dir.path(), SnapshotKind::Auto, 1).unwrap();
        std::fs::write(worker_dir.path().join("a.json"), "{\"v\":2}").unwrap();
        store.capture(worker_dir.path(), SnapshotKind::Auto, 1).unwrap();
        std::fs::write(worker_dir.path().join("a.json"), "{\"v\":3}").unwrap();
        store.capture(worker_dir.path(), SnapshotKind::Auto, 1).unwrap();

        assert_eq!(store.list().len(), 2);
        assert!(store.list().iter().all(|m| m.id != first.id));
    }
}
