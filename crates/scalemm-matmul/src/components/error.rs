use core::fmt::{Debug, Display};

use scalemm_common::ElemType;
use scalemm_runtime::kernel::CubeDim;
use scalemm_runtime::server::ServerError;

/// Errors that can occur during the setup phase of a scaled matmul.
pub enum MatmulSetupError {
    /// A required hardware feature is not available.
    Unavailable(MatmulAvailabilityError),

    /// The provided configuration is invalid.
    InvalidConfig(InvalidConfigError),
}

/// A feature required by the matmul is not available on the device.
pub enum MatmulAvailabilityError {
    /// The number of units in a cube exceeds what the device supports.
    CubeDimTooBig(CubeDim),

    /// The wave size of the device is not supported by the matrix backend.
    PlaneDimUnsupported { plane_dim: u32, backend: &'static str },

    /// The element types are not supported by the kernel or the device.
    TypesUnavailable {
        lhs: ElemType,
        rhs: ElemType,
        scale: ElemType,
        out: ElemType,
    },

    /// No matrix instruction exists for the operand types and tile size.
    MmaInstructionUnavailable {
        lhs: ElemType,
        rhs: ElemType,
        m: u32,
        n: u32,
    },

    /// The staged tiles don't fit in the scratch memory of a cube.
    SharedMemoryOvercommit { required: usize, available: usize },

    /// The accumulators and fragments don't fit in the register file of a unit.
    RegisterOvercommit { required: u32, available: u32 },
}

/// Errors raised when launching a configured matmul.
pub enum MatmulLaunchError {
    /// The problem can't be solved by this instance, try another configuration.
    Unsupported(String),

    /// The device failed while executing the launch.
    Server(ServerError),
}

impl From<MatmulAvailabilityError> for MatmulSetupError {
    fn from(value: MatmulAvailabilityError) -> Self {
        Self::Unavailable(value)
    }
}

impl From<InvalidConfigError> for MatmulSetupError {
    fn from(value: InvalidConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

impl From<ServerError> for MatmulLaunchError {
    fn from(value: ServerError) -> Self {
        Self::Server(value)
    }
}

impl Display for MatmulSetupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for MatmulSetupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MatmulSetupError::Unavailable(err) => {
                write!(
                    f,
                    "Unable to launch matmul because a required feature is unavailable: {err:?}"
                )
            }
            MatmulSetupError::InvalidConfig(err) => {
                write!(
                    f,
                    "Unable to launch matmul because the config is invalid: {:?}",
                    err.to_string()
                )
            }
        }
    }
}

impl Display for MatmulAvailabilityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for MatmulAvailabilityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MatmulAvailabilityError::CubeDimTooBig(dim) => {
                write!(f, "Cube dim too big {dim}")
            }
            MatmulAvailabilityError::PlaneDimUnsupported { plane_dim, backend } => {
                write!(
                    f,
                    "Plane dimension unsupported: {plane_dim} for the {backend} backend."
                )
            }
            MatmulAvailabilityError::TypesUnavailable {
                lhs,
                rhs,
                scale,
                out,
            } => {
                write!(
                    f,
                    "Types lhs={lhs}, rhs={rhs}, scale={scale} and/or out={out} not supported."
                )
            }
            MatmulAvailabilityError::MmaInstructionUnavailable { lhs, rhs, m, n } => write!(
                f,
                "Mma on inputs {lhs} x {rhs} accumulating in f32 with shape m={m}, n={n} not supported."
            ),
            MatmulAvailabilityError::SharedMemoryOvercommit {
                required,
                available,
            } => write!(
                f,
                "Scratch memory overcommit: {required} bytes required, {available} available."
            ),
            MatmulAvailabilityError::RegisterOvercommit {
                required,
                available,
            } => write!(
                f,
                "Register overcommit: {required} registers per unit required, {available} available."
            ),
        }
    }
}

impl Display for MatmulLaunchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MatmulLaunchError::Unsupported(reason) => {
                write!(f, "Configuration not supported for this problem: {reason}")
            }
            MatmulLaunchError::Server(err) => write!(f, "Launch failed: {err}"),
        }
    }
}

impl Debug for MatmulLaunchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self}")
    }
}

/// Error that arises from invalid configurations
pub type InvalidConfigError = Box<dyn Display + Send + Sync>;

/// Error that arises from invalid configurations, formatted only when displayed.
pub struct FormattedConfigError {
    func: Box<dyn Fn() -> String + Send + Sync>,
}

impl FormattedConfigError {
    #[allow(clippy::new_ret_no_self)]
    pub fn new<F: Fn() -> String + Send + Sync + 'static>(func: F) -> InvalidConfigError {
        Box::new(Self {
            func: Box::new(func),
        })
    }
}

impl Display for FormattedConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let string = (self.func)();
        write!(f, "{string}")
    }
}
