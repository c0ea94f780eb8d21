//! Append-only audit trail
//!
//! One line per run. The line format is the compatibility contract;
//! the destination is injected.

use crate::error::OrchestrationError;
use crate::models::{EnvironmentSnapshot, RunEvent};
use crate::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// Append-only event sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event atomically. Returns the rendered line.
    async fn append(&self, event: &RunEvent) -> Result<String>;
}

/// File-backed audit log; creates the parent directory on first write
pub struct FileAuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditLog {
    async fn append(&self, event: &RunEvent) -> Result<String> {
        let line = event.to_line();
        let mut entry = line.clone();
        entry.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrchestrationError::AuditError(format!(
                    "cannot create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                OrchestrationError::AuditError(format!(
                    "cannot open audit log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        // Single write of the whole entry; O_APPEND keeps it contiguous
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;

        Ok(line)
    }
}

/// In-memory audit trail for development & testing
#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    lines: Arc<RwLock<Vec<String>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.lines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lines.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn append(&self, event: &RunEvent) -> Result<String> {
        let line = event.to_line();
        self.lines.write().await.push(line.clone());
        Ok(line)
    }
}

/// Compute SHA256 hash of a snapshot for traceability
/// Uses zero-copy streaming serialization into hasher
pub fn compute_snapshot_digest(snapshot: &EnvironmentSnapshot) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), snapshot).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunStatus;

    #[tokio::test]
    async fn test_file_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("procurement_audit.log");
        let log = FileAuditLog::new(&path);
        assert_eq!(log.path(), path.as_path());

        log.append(&RunEvent::without_record(RunStatus::CancelledByHuman))
            .await
            .unwrap();
        log.append(&RunEvent::without_record(RunStatus::OrderVerified))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("STATUS: CANCELLED BY HUMAN"));
        assert!(lines[1].ends_with("STATUS: SUCCESS - ORDER VERIFIED"));
        assert!(contents.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = Arc::new(FileAuditLog::new(&path));

        let mut handles = Vec::new();
        for i in 0..16 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let status = RunStatus::UiStateMismatch(format!("state-{}", i));
                log.append(&RunEvent::without_record(status)).await
            }));
        }
        for handle in handles {
            tokio_test::assert_ok!(handle.await.unwrap());
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 16);
        for line in contents.lines() {
            assert!(line.starts_with('['));
            assert!(line.contains("STATUS: FAILURE - UI STATE MISMATCH: state-"));
        }
    }

    #[tokio::test]
    async fn test_in_memory_log() {
        let log = InMemoryAuditLog::new();
        assert!(log.is_empty().await);

        let line = log
            .append(&RunEvent::without_record(RunStatus::CancelledByHuman))
            .await
            .unwrap();

        assert_eq!(log.lines().await, vec![line]);
    }

    #[test]
    fn test_snapshot_digest_is_stable() {
        let snapshot = EnvironmentSnapshot::new("<html/>", vec!["quoteBtn".to_string()]);
        let first = compute_snapshot_digest(&snapshot);
        let second = compute_snapshot_digest(&snapshot);

        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
    }
}
