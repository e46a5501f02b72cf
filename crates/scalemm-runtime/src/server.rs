use thiserror::Error;

/// An error raised while executing work submitted to an execution queue.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// A cube of the kernel panicked. The other cubes of the launch ran to completion.
    #[error("Kernel {name} panicked during execution\nCaused by:\n  {reason}")]
    KernelPanicked {
        /// Name of the kernel.
        name: String,
        /// The panic message.
        reason: String,
    },

    /// The execution queue thread is gone.
    #[error("The execution queue is disconnected")]
    QueueDisconnected,

    /// A memory operation failed.
    #[error("An IO error happened during execution\nCaused by:\n  {0}")]
    Io(#[from] IoError),
}

impl core::fmt::Debug for ServerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

/// Error returned by memory operations.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum IoError {
    /// The handle doesn't belong to this device.
    #[error("couldn't find resource for that handle")]
    InvalidHandle,

    /// The data size doesn't match the buffer size.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size of the buffer in bytes.
        expected: usize,
        /// Size of the provided data in bytes.
        actual: usize,
    },
}

impl core::fmt::Debug for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}
