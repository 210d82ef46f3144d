use crate::core::config::{ConfigError, Result};
use derive_more::Display;
use log::{debug, trace, warn};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ADDRESS: fn() -> String = || "http://localhost:8080".to_string();
const DEFAULT_POLL_INTERVAL: fn() -> u64 = || 2;
const DEFAULT_REPORT_INTERVAL: fn() -> u64 = || 10;
const DEFAULT_BATCH: fn() -> bool = || true;
const DEFAULT_QUEUE_SIZE: fn() -> usize = || 16;
const DEFAULT_RETRY_BACKOFF: fn() -> Vec<u64> = || vec![1, 3, 5];
const DEFAULT_REQUEST_TIMEOUT: fn() -> u64 = || 10;
const DEFAULT_STORE_INTERVAL: fn() -> u64 = || 300;
const DEFAULT_FILE_STORAGE_PATH: fn() -> String = || "metrics-db.json".to_string();
const DEFAULT_RESTORE: fn() -> bool = || true;

const DEFAULT_CONFIG_FILENAME: &str = "application";
const CONFIG_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct PropertiesWrapper {
    #[serde(default)]
    pub pulse: PulseProperties,
}

/// The application properties of Pulse.
///
/// The properties are read from the `pulse` section of an `application.yml` or
/// `application.yaml` document.
#[derive(Debug, Display, Clone, Default, Deserialize, PartialEq)]
#[display("agent: {:?}, collector: {:?}", agent, collector)]
pub struct PulseProperties {
    #[serde(default)]
    pub agent: AgentProperties,
    #[serde(default)]
    pub collector: CollectorProperties,
}

impl PulseProperties {
    /// Create new properties which will look for the [DEFAULT_CONFIG_FILENAME] config file within
    /// the working directory.
    /// It will parse the config file if found, else uses the defaults instead.
    pub fn new_auto() -> Self {
        Self::from_filename(DEFAULT_CONFIG_FILENAME)
    }

    /// Search the working directory for the given config filename with one of the supported
    /// extensions.
    /// An unreadable or malformed config file results in the default properties.
    pub fn from_filename(filename: &str) -> Self {
        debug!("Searching for config file with name \"{}\"", filename);
        let config_value = Self::find_existing_file(filename)
            .and_then(|path| match fs::read_to_string(&path) {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("Failed to read config file {}, {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        Self::from_str(config_value.as_str())
    }

    /// Load the properties from the given config file path.
    ///
    /// Unlike [PulseProperties::from_filename], an explicit config file which cannot be read or
    /// parsed results in an error.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config file {}", path.display());
        let config_value = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))?;

        Self::parse(config_value.as_str())
    }

    /// Parse the given config data, using the defaults when the data is malformed.
    pub fn from_str(config_data_value: &str) -> Self {
        match Self::parse(config_data_value) {
            Ok(e) => e,
            Err(e) => {
                warn!("{}, using defaults instead", e);
                Self::default()
            }
        }
    }

    /// Parse the given config data.
    pub fn parse(config_data_value: &str) -> Result<Self> {
        trace!("Parsing config data {}", config_data_value);
        if config_data_value.trim().is_empty() {
            return Ok(Self::default());
        }

        let data: PropertiesWrapper = serde_yaml::from_str(config_data_value)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        debug!("Parsed config data {:?}", &data);
        Ok(data.pulse)
    }

    /// Verify that the properties contain usable values.
    pub fn validate(&self) -> Result<()> {
        self.agent.validate()
    }

    fn find_existing_file(filename: &str) -> Option<PathBuf> {
        let directory = match env::current_dir() {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to determine the working directory, {}", e);
                return None;
            }
        };

        CONFIG_EXTENSIONS
            .iter()
            .map(|extension| directory.join(format!("{}.{}", filename, extension)))
            .find(|path| {
                let exists = path.is_file();
                if exists {
                    debug!("Found config file {}", path.display());
                } else {
                    trace!("Config file location {} doesn't exist", path.display());
                }
                exists
            })
    }
}

/// The properties of the metrics agent.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentProperties {
    /// The base address of the remote collector.
    #[serde(default = "DEFAULT_ADDRESS")]
    pub address: String,
    /// The poll interval in seconds.
    #[serde(alias = "poll-interval", alias = "pollInterval")]
    #[serde(default = "DEFAULT_POLL_INTERVAL")]
    pub poll_interval: u64,
    /// The report interval in seconds.
    #[serde(alias = "report-interval", alias = "reportInterval")]
    #[serde(default = "DEFAULT_REPORT_INTERVAL")]
    pub report_interval: u64,
    /// The maximum number of concurrent deliveries, `0` meaning unbounded.
    #[serde(alias = "rate-limit", alias = "rateLimit")]
    #[serde(default)]
    pub rate_limit: usize,
    /// Indicates if batches are delivered within a single request.
    #[serde(default = "DEFAULT_BATCH")]
    pub batch: bool,
    /// The number of batches the dispatch queue can hold.
    #[serde(alias = "queue-size", alias = "queueSize")]
    #[serde(default = "DEFAULT_QUEUE_SIZE")]
    pub queue_size: usize,
    /// The delays in seconds between delivery attempts.
    #[serde(alias = "retry-backoff", alias = "retryBackoff")]
    #[serde(default = "DEFAULT_RETRY_BACKOFF")]
    pub retry_backoff: Vec<u64>,
    /// The timeout of a single delivery request in seconds.
    #[serde(alias = "request-timeout", alias = "requestTimeout")]
    #[serde(default = "DEFAULT_REQUEST_TIMEOUT")]
    pub request_timeout: u64,
}

impl AgentProperties {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    pub fn retry_backoff(&self) -> Vec<Duration> {
        self.retry_backoff
            .iter()
            .map(|e| Duration::from_secs(*e))
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                self.address.clone(),
                "agent.address".to_string(),
            ));
        }
        if self.poll_interval == 0 {
            return Err(ConfigError::InvalidValue(
                self.poll_interval.to_string(),
                "agent.poll-interval".to_string(),
            ));
        }
        if self.report_interval == 0 {
            return Err(ConfigError::InvalidValue(
                self.report_interval.to_string(),
                "agent.report-interval".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AgentProperties {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS(),
            poll_interval: DEFAULT_POLL_INTERVAL(),
            report_interval: DEFAULT_REPORT_INTERVAL(),
            rate_limit: 0,
            batch: DEFAULT_BATCH(),
            queue_size: DEFAULT_QUEUE_SIZE(),
            retry_backoff: DEFAULT_RETRY_BACKOFF(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT(),
        }
    }
}

/// The properties of the collector snapshots.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CollectorProperties {
    /// The snapshot interval in seconds, `0` meaning a synchronous snapshot on every save.
    #[serde(alias = "store-interval", alias = "storeInterval")]
    #[serde(default = "DEFAULT_STORE_INTERVAL")]
    pub store_interval: u64,
    /// The path of the snapshot file.
    #[serde(alias = "file-storage-path", alias = "fileStoragePath")]
    #[serde(default = "DEFAULT_FILE_STORAGE_PATH")]
    pub file_storage_path: String,
    /// The connection string of the snapshot database, which takes precedence over the file.
    #[serde(alias = "database-dsn", alias = "databaseDsn")]
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// Indicates if the latest snapshot is restored on startup.
    #[serde(default = "DEFAULT_RESTORE")]
    pub restore: bool,
}

impl CollectorProperties {
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval)
    }

    /// Returns true when every save should be followed by a synchronous snapshot.
    pub fn is_sync_store(&self) -> bool {
        self.store_interval == 0
    }
}

impl Default for CollectorProperties {
    fn default() -> Self {
        Self {
            store_interval: DEFAULT_STORE_INTERVAL(),
            file_storage_path: DEFAULT_FILE_STORAGE_PATH(),
            database_dsn: None,
            restore: DEFAULT_RESTORE(),
        }
    }
}
