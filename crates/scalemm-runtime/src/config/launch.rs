use super::logger::{LogLevel, LoggerConfig};

/// Configuration of kernel launch logging.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LaunchConfig {
    /// Logger configuration for kernel launches.
    #[serde(default)]
    pub logger: LoggerConfig<LaunchLogLevel>,
}

/// How much is logged on every kernel launch.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LaunchLogLevel {
    /// Nothing is logged.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
    /// The kernel name is logged.
    #[serde(rename = "basic")]
    Basic,
    /// The kernel name, the cube count and the cube dim are logged.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for LaunchLogLevel {}
