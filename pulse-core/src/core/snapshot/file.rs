use crate::core::metrics::{Metric, MetricDto};
use crate::core::snapshot::store::{ensure_persistable, into_metrics};
use crate::core::snapshot::{MetricDumper, MetricRestorer, Result, SnapshotError};
use async_trait::async_trait;
use derive_more::Display;
use log::{debug, trace};
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;

/// The file snapshot backend which stores the metrics as a pretty JSON array.
///
/// A dump never modifies the snapshot file in place. The document is written to a temporary file
/// within the same directory, synced to disk and then renamed over the snapshot file, so readers
/// either observe the previous or the new snapshot, never a partial one.
/// Dumps are written one at a time, in the order in which they were requested.
#[derive(Debug, Display, Clone)]
#[display("{}", path.display())]
pub struct FileSnapshotStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileSnapshotStore {
    /// Create a new file snapshot store for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Default::default(),
        }
    }

    /// Returns the path of the snapshot file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let directory = match path.parent() {
            Some(e) if !e.as_os_str().is_empty() => e.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory)?;

        let mut file = NamedTempFile::new_in(&directory)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;

        Ok(())
    }
}

#[async_trait]
impl MetricDumper for FileSnapshotStore {
    async fn dump(&self, metrics: &[Metric]) -> Result<()> {
        ensure_persistable(metrics)?;
        let bytes = serde_json::to_vec_pretty(metrics)?;
        let path = self.path.clone();
        let len = bytes.len();

        let _guard = self.write_lock.lock().await;
        trace!("Writing {} bytes to snapshot file {}", len, self);
        tokio::task::spawn_blocking(move || Self::write_atomically(path.as_path(), &bytes))
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))??;
        debug!("Snapshot of {} metrics written to {}", metrics.len(), self);
        Ok(())
    }
}

#[async_trait]
impl MetricRestorer for FileSnapshotStore {
    async fn restore(&self) -> Result<Vec<Metric>> {
        let bytes = match fs::read(&self.path).await {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Snapshot file {} doesn't exist, nothing to restore", self);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(|e| e.is_ascii_whitespace()) {
            debug!("Snapshot file {} is empty, nothing to restore", self);
            return Ok(Vec::new());
        }

        let entries: Vec<MetricDto> = serde_json::from_slice(&bytes)?;
        into_metrics(entries)
    }
}
