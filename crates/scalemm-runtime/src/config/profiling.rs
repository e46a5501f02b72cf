use super::logger::{LogLevel, LoggerConfig};

/// Configuration of kernel profiling.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProfilingConfig {
    /// Logger configuration for profiling.
    #[serde(default)]
    pub logger: LoggerConfig<ProfilingLogLevel>,
}

/// Amount of profiling information that is logged.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProfilingLogLevel {
    /// Profiling is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
    /// Only the summary table is logged.
    #[serde(rename = "basic")]
    Basic,
    /// Every kernel duration is logged as well.
    #[serde(rename = "medium")]
    Medium,
    /// Every kernel duration is logged as well, with full kernel names.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for ProfilingLogLevel {}
