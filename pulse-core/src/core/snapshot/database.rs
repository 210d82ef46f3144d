use crate::core::metrics::{Metric, MetricDto, MetricValue};
use crate::core::snapshot::store::{ensure_persistable, into_metrics};
use crate::core::snapshot::{MetricDumper, MetricRestorer, Result, SnapshotError};
use async_trait::async_trait;
use derive_more::Display;
use log::{debug, trace};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const IN_MEMORY_DSN: &str = ":memory:";
const DSN_PREFIXES: [&str; 2] = ["sqlite://", "sqlite:"];

const SNAPSHOT_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS metrics (
    name    TEXT NOT NULL,
    type    TEXT NOT NULL,
    delta   INTEGER,
    value   REAL,
    PRIMARY KEY (name, type)
);
";

const UPSERT_METRIC: &str = "INSERT INTO metrics (name, type, delta, value) \
     VALUES (?1, ?2, ?3, ?4) \
     ON CONFLICT (name, type) DO UPDATE SET delta = excluded.delta, value = excluded.value";

const SELECT_METRICS: &str = "SELECT name, type, delta, value FROM metrics ORDER BY type, name";

/// The database snapshot backend which upserts the metrics into a SQLite table keyed by
/// `(name, type)`.
///
/// A dump is executed as a single transaction, either all metrics are upserted or none.
#[derive(Debug, Display, Clone)]
#[display("{}", dsn)]
pub struct SqliteSnapshotStore {
    dsn: String,
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    /// Open the snapshot database for the given connection string.
    ///
    /// The connection string is the path of the database file, optionally prefixed with
    /// `sqlite://`, or `:memory:` for an in-memory database.
    /// The snapshot table is created when it doesn't exist yet.
    pub fn open<S: AsRef<str>>(dsn: S) -> Result<Self> {
        let dsn = dsn.as_ref().trim().to_string();
        let path = DSN_PREFIXES
            .iter()
            .find_map(|prefix| dsn.strip_prefix(prefix))
            .unwrap_or(dsn.as_str());
        if path.is_empty() {
            return Err(SnapshotError::Database(format!(
                "invalid connection string \"{}\"",
                dsn
            )));
        }

        trace!("Opening snapshot database {}", dsn);
        let connection = if path == IN_MEMORY_DSN {
            Connection::open_in_memory()?
        } else {
            let connection = Connection::open(path)?;
            connection.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            connection
        };
        connection.execute_batch(SNAPSHOT_SCHEMA)?;
        debug!("Snapshot database {} is ready", dsn);

        Ok(Self {
            dsn,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the connection string of the database.
    pub fn dsn(&self) -> &str {
        self.dsn.as_str()
    }

    fn upsert(connection: &Arc<Mutex<Connection>>, metrics: &[Metric]) -> Result<()> {
        let mut connection = connection
            .lock()
            .map_err(|e| SnapshotError::Database(e.to_string()))?;
        let transaction = connection.transaction()?;

        {
            let mut statement = transaction.prepare_cached(UPSERT_METRIC)?;
            for metric in metrics {
                let (delta, value) = match metric.value() {
                    MetricValue::Counter(e) => (Some(*e), None),
                    MetricValue::Gauge(e) => (None, Some(*e)),
                };
                statement.execute(params![
                    metric.id(),
                    metric.kind().to_string(),
                    delta,
                    value
                ])?;
            }
        }

        transaction.commit()?;
        Ok(())
    }

    fn select(connection: &Arc<Mutex<Connection>>) -> Result<Vec<MetricDto>> {
        let connection = connection
            .lock()
            .map_err(|e| SnapshotError::Database(e.to_string()))?;
        let mut statement = connection.prepare(SELECT_METRICS)?;
        let rows = statement.query_map([], |row| {
            Ok(MetricDto {
                id: row.get(0)?,
                kind: row.get(1)?,
                delta: row.get(2)?,
                value: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl MetricDumper for SqliteSnapshotStore {
    async fn dump(&self, metrics: &[Metric]) -> Result<()> {
        ensure_persistable(metrics)?;
        let connection = self.connection.clone();
        let metrics = metrics.to_vec();
        let len = metrics.len();

        tokio::task::spawn_blocking(move || Self::upsert(&connection, metrics.as_slice()))
            .await
            .map_err(|e| SnapshotError::Database(e.to_string()))??;
        debug!("Snapshot of {} metrics upserted into {}", len, self);
        Ok(())
    }
}

#[async_trait]
impl MetricRestorer for SqliteSnapshotStore {
    async fn restore(&self) -> Result<Vec<Metric>> {
        let connection = self.connection.clone();
        let entries = tokio::task::spawn_blocking(move || Self::select(&connection))
            .await
            .map_err(|e| SnapshotError::Database(e.to_string()))??;

        trace!("Read {} snapshot entries from {}", entries.len(), self);
        into_metrics(entries)
    }
}
