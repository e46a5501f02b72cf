//! The scaled matmul kernel and the registry of validated tile descriptors.

mod registry;
mod scaled_matmul;

pub use registry::*;
pub use scaled_matmul::*;
