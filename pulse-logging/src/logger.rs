use crate::{Error, Result};
use log::{info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::{Config, Handle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

const LOG_FORMAT_CONSOLE: &str = "\x1B[37m{d(%Y-%m-%d %H:%M:%S%.3f)}\x1B[0m {h({l:>5.5})} \x1B[35m{I:>6.6}\x1B[0m \x1B[37m---\x1B[0m \x1B[37m[{T:>15.15}]\x1B[0m \x1B[36m{t:<40.40}\x1B[0m \x1B[37m:\x1B[0m {m}{n}";
const LOG_FORMAT_FILE: &str =
    "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:>5.5})} {I:>6.6} --- [{T:>15.15}] {t:<40.40} : {m}{n}";
const CONSOLE_APPENDER: &str = "stdout";
const FILE_APPENDER: &str = "file";
const LOG_FILE_SIZE: u64 = 50 * 1024 * 1024;
const LOG_FILE_WINDOW: u32 = 5;
const DEFAULT_LOG_FILE_STEM: &str = "pulse";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The log4rs backed logger of the Pulse binaries.
#[derive(Debug)]
pub struct PulseLogger {
    handle: Handle,
}

impl PulseLogger {
    /// Returns a builder instance for the logger.
    pub fn builder() -> PulseLoggerBuilder {
        PulseLoggerBuilder::default()
    }

    /// Create a new logging instance.
    /// Only one logging instance can be created per process.
    pub fn new(
        root_level: LevelFilter,
        config_path: Option<impl AsRef<Path>>,
        log_path: Option<impl AsRef<Path>>,
        loggers: Vec<(String, LevelFilter)>,
    ) -> Result<Self> {
        if INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyInitialized);
        }

        let config = match config_path {
            Some(path) => Self::load_from_config(path),
            None => Self::create_config(root_level, log_path, loggers),
        }
        .and_then(|config| {
            log4rs::init_config(config).map_err(|e| Error::InvalidConfig(e.to_string()))
        });

        match config {
            Ok(handle) => {
                info!("Pulse logger has been initialized");
                Ok(Self { handle })
            }
            Err(e) => {
                INITIALIZED.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Returns the root logging level of the logger.
    pub fn root_log_level(&self) -> LevelFilter {
        self.handle.max_log_level()
    }

    fn load_from_config(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }

        log4rs::config::load_config_file(path, Default::default())
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    fn create_config(
        root_level: LevelFilter,
        log_path: Option<impl AsRef<Path>>,
        loggers: Vec<(String, LevelFilter)>,
    ) -> Result<Config> {
        let mut root = Root::builder().appender(CONSOLE_APPENDER);
        let mut config_builder = Config::builder().appender(
            Appender::builder().build(
                CONSOLE_APPENDER,
                Box::new(
                    ConsoleAppender::builder()
                        .encoder(Box::new(PatternEncoder::new(LOG_FORMAT_CONSOLE)))
                        .build(),
                ),
            ),
        );

        if let Some(path) = log_path {
            config_builder = config_builder.appender(Self::create_file_appender(path)?);
            root = root.appender(FILE_APPENDER);
        }

        for (logger, level) in loggers.into_iter() {
            config_builder = config_builder.logger(Logger::builder().build(logger, level));
        }

        config_builder
            .build(root.build(root_level))
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    fn create_file_appender(path: impl AsRef<Path>) -> Result<Appender> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|e| !e.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let roller = FixedWindowRoller::builder()
            .base(1)
            .build(Self::roll_pattern(path).as_str(), LOG_FILE_WINDOW)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let policy = CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_FILE_SIZE)),
            Box::new(roller),
        );

        Ok(Appender::builder().build(
            FILE_APPENDER,
            Box::new(
                RollingFileAppender::builder()
                    .encoder(Box::new(PatternEncoder::new(LOG_FORMAT_FILE)))
                    .append(false)
                    .build(path, Box::new(policy))
                    .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            ),
        ))
    }

    /// Returns the archive pattern of the given log file, which is placed next to the log file.
    fn roll_pattern(path: &Path) -> String {
        let stem = path
            .file_stem()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_LOG_FILE_STEM);
        let pattern = format!("{}.{{}}.log", stem);

        match path.parent().filter(|e| !e.as_os_str().is_empty()) {
            Some(parent) => parent.join(pattern).to_string_lossy().to_string(),
            None => pattern,
        }
    }
}

#[derive(Debug, Default)]
pub struct PulseLoggerBuilder {
    root_level: Option<LevelFilter>,
    config_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    loggers: HashMap<String, LevelFilter>,
}

impl PulseLoggerBuilder {
    /// Set the root level of the logger.
    pub fn root_level(&mut self, level: LevelFilter) -> &mut Self {
        self.root_level = Some(level);
        self
    }

    /// Set the root level of the logger from its name, such as `debug` or `TRACE`.
    pub fn root_level_str<S: AsRef<str>>(&mut self, level: S) -> Result<&mut Self> {
        let level = LevelFilter::from_str(level.as_ref())
            .map_err(|_| Error::InvalidLevel(level.as_ref().to_string()))?;
        Ok(self.root_level(level))
    }

    /// Set the path of the `log4.yml` config to load.
    /// A config file takes precedence over all other options of the builder.
    pub fn config_path(&mut self, path: PathBuf) -> &mut Self {
        self.config_path = Some(path);
        self
    }

    /// Set the log file path of the logger.
    pub fn log_path(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add a log level filter for the given package.
    pub fn logger<S: AsRef<str>>(&mut self, package: S, level: LevelFilter) -> &mut Self {
        self.loggers.insert(package.as_ref().to_string(), level);
        self
    }

    /// Consumes the builder options and creates a new logging instance.
    pub fn build(&mut self) -> Result<PulseLogger> {
        let root_level = self.root_level.take().unwrap_or(LevelFilter::Info);
        let config_path = self.config_path.take();
        let log_path = self.log_path.take();
        let loggers = self.loggers.drain().collect::<Vec<_>>();

        PulseLogger::new(root_level, config_path, log_path, loggers)
    }
}
