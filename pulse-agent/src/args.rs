use crate::error::Result;
use clap::Parser;
use derive_more::Display;
use log::debug;
use pulse_core::core::config::PulseProperties;
use pulse_logging::PulseLogger;
use std::path::PathBuf;

const LOG_CONFIG_FILENAME: &str = "log4.yml";
const DEFAULT_LOG_LEVEL: fn() -> String = || "info".to_string();

/// The command line options of the [crate::agent::PulseAgent].
/// Every option overrides the value of the loaded application properties.
#[derive(Debug, Clone, Display, Parser)]
#[command(name = "pulse-agent", version, about = "Collects runtime metrics and reports them to a Pulse collector")]
#[display("config: {config:?}, address: {address:?}, log_level: {log_level}")]
pub struct PulseAgentArgs {
    /// The application config file to load.
    /// When omitted, `application.yml` or `application.yaml` is searched within the working directory.
    #[arg(long, env = "PULSE_CONFIG")]
    pub config: Option<PathBuf>,
    /// The base address of the remote collector.
    #[arg(long, env = "PULSE_ADDRESS")]
    pub address: Option<String>,
    /// The poll interval in seconds.
    #[arg(long, env = "PULSE_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,
    /// The report interval in seconds.
    #[arg(long, env = "PULSE_REPORT_INTERVAL")]
    pub report_interval: Option<u64>,
    /// The maximum number of concurrent deliveries, `0` meaning unbounded.
    #[arg(long, env = "PULSE_RATE_LIMIT")]
    pub rate_limit: Option<usize>,
    /// The root log level of the agent.
    #[arg(long, env = "PULSE_LOG_LEVEL", default_value_t = DEFAULT_LOG_LEVEL())]
    pub log_level: String,
    /// The log file to write to, next to the console output.
    #[arg(long, env = "PULSE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
    /// Disable the `log4rs` logger of the agent.
    #[arg(long, default_value_t = false)]
    pub disable_logger: bool,
}

impl PulseAgentArgs {
    /// Load the application properties and apply the command line overrides on top of them.
    ///
    /// An explicit config file which cannot be read or parsed is an error, as are overrides
    /// which result in invalid properties.
    pub fn properties(&self) -> Result<PulseProperties> {
        let mut properties = match self.config.as_ref() {
            Some(path) => PulseProperties::from_path(path)?,
            None => PulseProperties::new_auto(),
        };

        if let Some(address) = self.address.as_ref() {
            properties.agent.address = address.clone();
        }
        if let Some(interval) = self.poll_interval {
            properties.agent.poll_interval = interval;
        }
        if let Some(interval) = self.report_interval {
            properties.agent.report_interval = interval;
        }
        if let Some(rate_limit) = self.rate_limit {
            properties.agent.rate_limit = rate_limit;
        }

        properties.validate()?;
        debug!("Using properties {}", properties);
        Ok(properties)
    }

    /// Initialize the logger of the agent.
    /// A `log4.yml` within the working directory takes precedence over the log options.
    ///
    /// It returns `None` when the logger has been disabled.
    pub fn logger(&self) -> Result<Option<PulseLogger>> {
        if self.disable_logger {
            return Ok(None);
        }

        let mut builder = PulseLogger::builder();
        builder.root_level_str(self.log_level.as_str())?;
        if let Some(path) = self.log_file.as_ref() {
            builder.log_path(path);
        }

        let config_path = PathBuf::from(LOG_CONFIG_FILENAME);
        if config_path.is_file() {
            builder.config_path(config_path);
        }

        Ok(Some(builder.build()?))
    }
}

impl Default for PulseAgentArgs {
    fn default() -> Self {
        Self {
            config: None,
            address: None,
            poll_interval: None,
            report_interval: None,
            rate_limit: None,
            log_level: DEFAULT_LOG_LEVEL(),
            log_file: None,
            disable_logger: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use pulse_core::core::config::ConfigError;
    use pulse_core::init_logger;
    use std::fs;
    use tempfile::tempdir;

    const CONFIG: &str = r#"pulse:
  agent:
    address: http://collector:9000
    poll-interval: 5
    rate-limit: 2
"#;

    #[test]
    fn test_parse_args() {
        let result = PulseAgentArgs::try_parse_from([
            "pulse-agent",
            "--address",
            "localhost:9090",
            "--poll-interval",
            "1",
            "--rate-limit",
            "4",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(Some("localhost:9090".to_string()), result.address);
        assert_eq!(Some(1), result.poll_interval);
        assert_eq!(Some(4), result.rate_limit);
        assert_eq!("debug", result.log_level.as_str());
        assert_eq!(false, result.disable_logger);
    }

    #[test]
    fn test_parse_args_invalid_interval() {
        let result = PulseAgentArgs::try_parse_from(["pulse-agent", "--poll-interval", "lorem"]);

        assert!(result.is_err(), "expected the interval to be rejected");
    }

    #[test]
    fn test_properties_overrides() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("application.yml");
        fs::write(&path, CONFIG).unwrap();
        let args = PulseAgentArgs {
            config: Some(path),
            report_interval: Some(20),
            rate_limit: Some(8),
            ..PulseAgentArgs::default()
        };

        let result = args.properties().unwrap();

        assert_eq!("http://collector:9000", result.agent.address.as_str());
        assert_eq!(5, result.agent.poll_interval);
        assert_eq!(20, result.agent.report_interval);
        assert_eq!(8, result.agent.rate_limit);
    }

    #[test]
    fn test_properties_invalid_override() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("application.yml");
        fs::write(&path, CONFIG).unwrap();
        let args = PulseAgentArgs {
            config: Some(path),
            poll_interval: Some(0),
            ..PulseAgentArgs::default()
        };

        let result = args.properties();

        assert!(
            matches!(
                result,
                Err(AgentError::Config(ConfigError::InvalidValue(_, ref key))) if key == "agent.poll-interval"
            ),
            "expected an invalid poll interval, got {:?}",
            result
        );
    }

    #[test]
    fn test_properties_missing_config() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let args = PulseAgentArgs {
            config: Some(temp_dir.path().join("missing.yml")),
            ..PulseAgentArgs::default()
        };

        let result = args.properties();

        assert!(
            matches!(result, Err(AgentError::Config(ConfigError::Io(_, _)))),
            "expected an io error, got {:?}",
            result
        );
    }

    #[test]
    fn test_logger_disabled() {
        let args = PulseAgentArgs {
            disable_logger: true,
            ..PulseAgentArgs::default()
        };

        let result = args.logger().unwrap();

        assert!(result.is_none(), "expected no logger to have been created");
    }
}
