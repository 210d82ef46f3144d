use thiserror::Error;

/// The result type of configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value {0} given for {1}")]
    InvalidValue(String, String),
    #[error("failed to read config file {0}, {1}")]
    Io(String, String),
    #[error("failed to parse config, {0}")]
    Parse(String),
}
