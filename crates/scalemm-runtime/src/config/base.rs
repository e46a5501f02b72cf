use std::path::Path;
use std::sync::Arc;

use super::{
    launch::{LaunchConfig, LaunchLogLevel},
    profiling::{ProfilingConfig, ProfilingLogLevel},
};

/// Static mutex holding the global configuration, initialized as `None`.
static SCALEMM_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// File names searched for, in order, in the current directory and its parents.
const CONFIG_FILE_NAMES: [&str; 2] = ["scalemm.toml", "ScaleMM.toml"];

/// Represents the global configuration, combining launch logging and profiling settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration for kernel launch logging.
    #[serde(default)]
    pub launch: LaunchConfig,

    /// Configuration for profiling kernels.
    #[serde(default)]
    pub profiling: ProfilingConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `scalemm.toml` or `ScaleMM.toml`
    /// in the current directory or its parents, then applies the environment overrides. If no
    /// file is found, a default configuration is used.
    ///
    /// # Notes
    ///
    /// Calling this function takes a global lock. Read it once during initialization rather than
    /// on a hot path.
    pub fn get() -> Arc<Self> {
        let mut state = SCALEMM_GLOBAL_CONFIG.lock();

        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    ///
    /// # Warning
    /// This method must be called at the start of the program, before any calls to `get`.
    pub fn set(config: Self) {
        let mut state = SCALEMM_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Save the current configuration to the provided file path.
    pub fn save_default<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
        let config = Self::get();
        let content = toml::to_string_pretty(config.as_ref())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(path, content)
    }

    /// Parses a configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overrides configuration fields based on environment variables.
    ///
    /// - `SCALEMM_DEBUG_LOG`: `stdout`, `stderr`, `1`/`true` (log to `/tmp/scalemm.log`),
    ///   `0`/`false` (disable) or a file path.
    /// - `SCALEMM_DEBUG_OPTION`: `debug`, `debug-full`, `profile`, `profile-medium` or
    ///   `profile-full`.
    pub fn override_from_env(self) -> Self {
        self.override_from(|key| std::env::var(key).ok())
    }

    /// Same as [`override_from_env`](Self::override_from_env), reading variables from `var`.
    pub fn override_from<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("SCALEMM_DEBUG_LOG") {
            self.launch.logger.level = LaunchLogLevel::Full;
            self.profiling.logger.level = ProfilingLogLevel::Medium;

            match val.as_str() {
                "stdout" => {
                    self.launch.logger.stdout = true;
                    self.profiling.logger.stdout = true;
                }
                "stderr" => {
                    self.launch.logger.stderr = true;
                    self.profiling.logger.stderr = true;
                }
                "1" | "true" => {
                    let file_path = "/tmp/scalemm.log";
                    self.launch.logger.file = Some(file_path.into());
                    self.profiling.logger.file = Some(file_path.into());
                }
                "0" | "false" => {
                    self.launch.logger.level = LaunchLogLevel::Disabled;
                    self.profiling.logger.level = ProfilingLogLevel::Disabled;
                }
                file_path => {
                    self.launch.logger.file = Some(file_path.into());
                    self.profiling.logger.file = Some(file_path.into());
                }
            }
        };

        if let Some(val) = var("SCALEMM_DEBUG_OPTION") {
            match val.as_str() {
                "debug" => {
                    self.launch.logger.level = LaunchLogLevel::Basic;
                    self.profiling.logger.level = ProfilingLogLevel::Medium;
                }
                "debug-full" => {
                    self.launch.logger.level = LaunchLogLevel::Full;
                    self.profiling.logger.level = ProfilingLogLevel::Full;
                }
                "profile" => {
                    self.profiling.logger.level = ProfilingLogLevel::Basic;
                }
                "profile-medium" => {
                    self.profiling.logger.level = ProfilingLogLevel::Medium;
                }
                "profile-full" => {
                    self.profiling.logger.level = ProfilingLogLevel::Full;
                }
                other => log::warn!("Unknown SCALEMM_DEBUG_OPTION {other}, ignored"),
            }
        };

        self
    }

    // Loads configuration from `scalemm.toml` or `ScaleMM.toml` in the current directory or its
    // parents. Returns a default configuration if no file is found.
    fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if !path.is_file() {
                    continue;
                }

                match Self::from_file_path(&path) {
                    Ok(config) => return config,
                    Err(err) => log::warn!("Ignoring config file {}: {err}", path.display()),
                }
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    fn from_file_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}
