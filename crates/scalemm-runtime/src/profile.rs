use core::time::Duration;

/// Instrumentation of a launch.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProfileOptions {
    /// Measure the kernel. When disabled the kernel runs once and the measured time is zero.
    #[serde(default)]
    pub time_kernel: bool,
    /// Untimed launches before measuring.
    #[serde(default = "default_warmup_iterations")]
    pub warmup_iterations: usize,
    /// Timed launches, the reported time is their mean.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
    /// Non-zero levels log the instance and the problem on every launch.
    #[serde(default)]
    pub log_level: u32,
}

fn default_warmup_iterations() -> usize {
    5
}

fn default_repeat() -> usize {
    50
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            time_kernel: false,
            warmup_iterations: default_warmup_iterations(),
            repeat: default_repeat(),
            log_level: 0,
        }
    }
}

impl ProfileOptions {
    /// Options measuring the kernel with the default warmup and repeat counts.
    pub fn timed() -> Self {
        Self {
            time_kernel: true,
            ..Default::default()
        }
    }
}

/// Mean duration of a measured launch.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ProfileDuration {
    pub mean: Duration,
    pub num_samples: usize,
}

impl ProfileDuration {
    /// Mean of `num_samples` launches that took `total` together.
    pub fn from_total(total: Duration, num_samples: usize) -> Self {
        let mean = match num_samples {
            0 => Duration::ZERO,
            samples => total.div_f64(samples as f64),
        };

        Self { mean, num_samples }
    }

    pub fn as_millis_f32(&self) -> f32 {
        self.mean.as_secs_f64() as f32 * 1000.0
    }
}
