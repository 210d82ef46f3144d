use pulse_core::core::config::ConfigError;
use pulse_core::core::dispatch::DeliveryError;
use thiserror::Error;

/// The result type of the agent.
pub type Result<T> = std::result::Result<T, AgentError>;

/// The errors which prevent the agent from starting.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to load the agent configuration, {0}")]
    Config(#[from] ConfigError),
    #[error("failed to create the collector sender, {0}")]
    Sender(#[from] DeliveryError),
    #[error("failed to initialize the logger, {0}")]
    Logging(#[from] pulse_logging::Error),
}
