use super::GlobalConfig;
use super::{launch::LaunchLogLevel, profiling::ProfilingLogLevel};
use core::fmt::Display;
use hashbrown::HashMap;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

/// Configuration for logging, parameterized by a log level type.
///
/// Note that you can use multiple loggers at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false). Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional forwarding to the `log` crate at the given level.
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// The log level for this logger, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,

    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,

    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Trait for types that can be used as log levels in `LoggerConfig`.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Fans messages out to the sinks configured for each category.
#[derive(Debug)]
pub struct Logger {
    /// Every distinct sink (file, stdout, stderr or `log` crate).
    loggers: Vec<LoggerKind>,

    /// Indices of the sinks used for launch logging.
    launch_index: Vec<usize>,

    /// Indices of the sinks used for profiling logging.
    profiling_index: Vec<usize>,

    /// Global configuration the sinks were created from.
    pub config: Arc<GlobalConfig>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Hash, PartialEq, Eq)]
enum LoggerId {
    File(PathBuf),
    Stdout,
    Stderr,
    LogCrate(LogCrateLevel),
}

impl Logger {
    /// Creates a new `Logger` from the global configuration.
    ///
    /// Note that creating a logger opens its files.
    pub fn new() -> Self {
        Self::from_config(GlobalConfig::get())
    }

    /// Creates a new `Logger` from the given configuration.
    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let mut registry = SinkRegistry::default();
        let mut launch_index = Vec::new();
        let mut profiling_index = Vec::new();

        if config.launch.logger.level != LaunchLogLevel::Disabled {
            registry.register(&config.launch.logger, &mut launch_index);
        }

        if config.profiling.logger.level != ProfilingLogLevel::Disabled {
            registry.register(&config.profiling.logger, &mut profiling_index);
        }

        Self {
            loggers: registry.loggers,
            launch_index,
            profiling_index,
            config,
        }
    }

    /// Logs a message to every launch sink.
    pub fn log_launch<S: Display>(&mut self, msg: &S) {
        Self::log_all(&mut self.loggers, &self.launch_index, msg)
    }

    /// Logs a message to every profiling sink.
    pub fn log_profiling<S: Display>(&mut self, msg: &S) {
        Self::log_all(&mut self.loggers, &self.profiling_index, msg)
    }

    /// Returns the launch log level from the configuration.
    pub fn log_level_launch(&self) -> LaunchLogLevel {
        self.config.launch.logger.level
    }

    /// Returns the profiling log level from the configuration.
    pub fn log_level_profiling(&self) -> ProfilingLogLevel {
        self.config.profiling.logger.level
    }

    fn log_all<S: Display>(loggers: &mut [LoggerKind], indices: &[usize], msg: &S) {
        if indices.len() > 1 {
            let msg = msg.to_string();
            for index in indices {
                loggers[*index].log(&msg);
            }
        } else if let Some(index) = indices.first() {
            loggers[*index].log(msg);
        }
    }
}

/// Deduplicates sinks shared by several categories.
#[derive(Default)]
struct SinkRegistry {
    loggers: Vec<LoggerKind>,
    logger2index: HashMap<LoggerId, usize>,
}

impl SinkRegistry {
    fn register<L: LogLevel>(&mut self, config: &LoggerConfig<L>, setting_index: &mut Vec<usize>) {
        if let Some(file) = &config.file {
            let append = config.append;
            self.insert(setting_index, LoggerId::File(file.clone()), || {
                match FileLogger::new(file, append) {
                    Ok(logger) => Some(LoggerKind::File(logger)),
                    Err(err) => {
                        log::warn!("Can't open log file {}: {err}", file.display());
                        None
                    }
                }
            });
        }

        if config.stdout {
            self.insert(setting_index, LoggerId::Stdout, || Some(LoggerKind::Stdout));
        }

        if config.stderr {
            self.insert(setting_index, LoggerId::Stderr, || Some(LoggerKind::Stderr));
        }

        if let Some(level) = config.log {
            self.insert(setting_index, LoggerId::LogCrate(level), || {
                Some(LoggerKind::Log(level))
            });
        }
    }

    fn insert<F: FnOnce() -> Option<LoggerKind>>(
        &mut self,
        setting_index: &mut Vec<usize>,
        id: LoggerId,
        create: F,
    ) {
        if let Some(index) = self.logger2index.get(&id) {
            setting_index.push(*index);
        } else if let Some(logger) = create() {
            let index = self.loggers.len();
            self.logger2index.insert(id, index);
            self.loggers.push(logger);
            setting_index.push(index);
        }
    }
}

/// Represents different types of loggers.
#[derive(Debug)]
enum LoggerKind {
    /// Logs to a file.
    File(FileLogger),

    /// Logs to standard output.
    Stdout,

    /// Logs to standard error.
    Stderr,

    /// Logs using the `log` crate with a specified level.
    Log(LogCrateLevel),
}

impl LoggerKind {
    fn log<S: Display>(&mut self, msg: &S) {
        match self {
            LoggerKind::File(file_logger) => file_logger.log(msg),
            LoggerKind::Stdout => println!("{msg}"),
            LoggerKind::Stderr => eprintln!("{msg}"),
            LoggerKind::Log(level) => match level {
                LogCrateLevel::Info => log::info!("{msg}"),
                LogCrateLevel::Debug => log::debug!("{msg}"),
                LogCrateLevel::Trace => log::trace!("{msg}"),
            },
        }
    }
}

/// Logger that writes messages to a file.
#[derive(Debug)]
struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    fn new(path: &PathBuf, append: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .create(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    // Logs a message to the file, flushing the buffer to ensure immediate write.
    fn log<S: Display>(&mut self, msg: &S) {
        let result = writeln!(self.writer, "{msg}").and_then(|_| self.writer.flush());

        if let Err(err) = result {
            log::warn!("Failed to write to log file: {err}");
        }
    }
}
