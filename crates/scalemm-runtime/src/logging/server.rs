use core::fmt::Display;
use core::time::Duration;

use crate::config::launch::LaunchLogLevel;
use crate::config::profiling::ProfilingLogLevel;
use crate::config::{GlobalConfig, Logger};
use crate::kernel::{CubeCount, CubeDim};

use super::{ProfileLevel, Profiled};

/// Logger owned by an execution queue.
#[derive(Debug)]
pub struct ServerLogger {
    kind: DebugLoggerKind,
    profiled: Profiled,
}

impl Default for ServerLogger {
    fn default() -> Self {
        Self::new(Logger::new())
    }
}

#[derive(Debug)]
/// The various logging options available.
enum ServerLoggerOptions {
    /// Only log kernel launches.
    LaunchOnly(LaunchLogLevel),
    /// Profile each kernel executed.
    ProfileOnly(ProfileLevel),
    /// Enable all options.
    All(LaunchLogLevel, ProfileLevel),
}

/// Debugging logger.
#[derive(Debug)]
enum DebugLoggerKind {
    /// Activated logger.
    Activated(Logger, ServerLoggerOptions),
    /// Don't log information.
    None,
}

impl ServerLogger {
    /// Creates a server logger writing to the sinks of `logger`.
    pub fn new(logger: Logger) -> Self {
        Self {
            kind: DebugLoggerKind::new(logger),
            profiled: Profiled::default(),
        }
    }

    /// Creates a server logger from an explicit configuration.
    pub fn from_config(config: GlobalConfig) -> Self {
        Self::new(Logger::from_config(config.into()))
    }

    /// Returns the profile level, none if profiling is deactivated.
    pub fn profile_level(&self) -> Option<ProfileLevel> {
        match &self.kind {
            DebugLoggerKind::Activated(_, ServerLoggerOptions::ProfileOnly(level))
            | DebugLoggerKind::Activated(_, ServerLoggerOptions::All(_, level)) => Some(*level),
            _ => None,
        }
    }

    /// Returns true if kernel launches should be logged.
    pub fn launch_activated(&self) -> bool {
        self.launch_level().is_some()
    }

    fn launch_level(&self) -> Option<LaunchLogLevel> {
        match &self.kind {
            DebugLoggerKind::Activated(_, ServerLoggerOptions::LaunchOnly(level))
            | DebugLoggerKind::Activated(_, ServerLoggerOptions::All(level, _)) => Some(*level),
            _ => None,
        }
    }

    /// Logs a kernel launch when launch logging is activated.
    pub fn log_launch(&mut self, name: &str, cube_count: CubeCount, cube_dim: CubeDim) {
        let Some(level) = self.launch_level() else {
            return;
        };

        if let DebugLoggerKind::Activated(logger, _) = &mut self.kind {
            match level {
                LaunchLogLevel::Disabled => {}
                LaunchLogLevel::Basic => logger.log_launch(&format!("[launch] {name}")),
                LaunchLogLevel::Full => logger.log_launch(&format!(
                    "[launch] {name} cube_count={cube_count} cube_dim={cube_dim}"
                )),
            }
        }
    }

    /// Register a profiled task.
    pub fn register_profiled<Name>(&mut self, name: Name, duration: Duration)
    where
        Name: Display,
    {
        let name = name.to_string();
        self.profiled.update(&name, duration);

        let Some(level) = self.profile_level() else {
            return;
        };

        if let DebugLoggerKind::Activated(logger, _) = &mut self.kind {
            match level {
                ProfileLevel::Basic => {}
                ProfileLevel::Medium => {
                    let short = name.split('<').next().unwrap_or(&name);
                    logger.log_profiling(&format!("| {duration:<10?} | {short}"));
                }
                ProfileLevel::Full => {
                    logger.log_profiling(&format!("| {duration:<10?} | {name}"));
                }
            }
        }
    }

    /// Show the profiling summary if activated and reset its state.
    pub fn profile_summary(&mut self) {
        if self.profile_level().is_none() {
            return;
        }

        let profiled = core::mem::take(&mut self.profiled);

        if let DebugLoggerKind::Activated(logger, _) = &mut self.kind
            && !profiled.is_empty()
        {
            logger.log_profiling(&profiled);
        }
    }
}

impl DebugLoggerKind {
    fn new(logger: Logger) -> Self {
        let profile = match logger.log_level_profiling() {
            ProfilingLogLevel::Disabled => None,
            ProfilingLogLevel::Basic => Some(ProfileLevel::Basic),
            ProfilingLogLevel::Medium => Some(ProfileLevel::Medium),
            ProfilingLogLevel::Full => Some(ProfileLevel::Full),
        };
        let launch = match logger.log_level_launch() {
            LaunchLogLevel::Disabled => None,
            level => Some(level),
        };

        let option = match (launch, profile) {
            (None, None) => return Self::None,
            (Some(launch), None) => ServerLoggerOptions::LaunchOnly(launch),
            (None, Some(profile)) => ServerLoggerOptions::ProfileOnly(profile),
            (Some(launch), Some(profile)) => ServerLoggerOptions::All(launch, profile),
        };

        Self::Activated(logger, option)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_deactivates_everything() {
        let logger = ServerLogger::from_config(GlobalConfig::default());

        assert!(!logger.launch_activated());
        assert_eq!(logger.profile_level(), None);
    }

    #[test]
    fn levels_follow_config() {
        let mut config = GlobalConfig::default();
        config.launch.logger.level = LaunchLogLevel::Full;
        config.profiling.logger.level = ProfilingLogLevel::Medium;

        let logger = ServerLogger::from_config(config);

        assert!(logger.launch_activated());
        assert_eq!(logger.profile_level(), Some(ProfileLevel::Medium));
    }

    #[test]
    fn summary_resets_profiled_kernels() {
        let mut config = GlobalConfig::default();
        config.profiling.logger.level = ProfilingLogLevel::Basic;
        let mut logger = ServerLogger::from_config(config);

        logger.register_profiled("kernel", Duration::from_millis(2));
        assert!(!logger.profiled.is_empty());

        logger.profile_summary();
        assert!(logger.profiled.is_empty());
    }
}
