use crate::core::config::CollectorProperties;
use crate::core::snapshot::{
    FileSnapshotStore, MetricDumper, MetricRestorer, Result, SqliteSnapshotStore,
};
use derive_more::Display;
use log::info;
use std::sync::Arc;

/// The durable backend of the collector snapshots.
///
/// Each backend provides a matching dumper and restorer pair.
#[derive(Debug, Display, Clone)]
pub enum SnapshotBackend {
    /// The atomic JSON file backend.
    #[display("file {}", _0)]
    File(Arc<FileSnapshotStore>),
    /// The SQLite database backend.
    #[display("database {}", _0)]
    Database(Arc<SqliteSnapshotStore>),
}

impl SnapshotBackend {
    /// Select the snapshot backend for the given collector properties.
    ///
    /// A database connection string selects the database backend, otherwise the file storage path
    /// selects the file backend.
    pub fn from_properties(properties: &CollectorProperties) -> Result<Self> {
        let backend = match properties
            .database_dsn
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        {
            Some(dsn) => Self::Database(Arc::new(SqliteSnapshotStore::open(dsn)?)),
            None => Self::File(Arc::new(FileSnapshotStore::new(
                properties.file_storage_path.as_str(),
            ))),
        };

        info!("Using snapshot backend {}", backend);
        Ok(backend)
    }

    /// Returns the dumper of the backend.
    pub fn dumper(&self) -> Arc<dyn MetricDumper> {
        match self {
            SnapshotBackend::File(e) => e.clone(),
            SnapshotBackend::Database(e) => e.clone(),
        }
    }

    /// Returns the restorer of the backend.
    pub fn restorer(&self) -> Arc<dyn MetricRestorer> {
        match self {
            SnapshotBackend::File(e) => e.clone(),
            SnapshotBackend::Database(e) => e.clone(),
        }
    }
}
