pub mod batch;
pub mod epilogue;
pub mod global;
pub mod stage;
pub mod tile;
pub mod tiling;

mod error;
mod precision;
mod problem;
mod tensor;

pub use error::*;
pub use precision::*;
pub use problem::*;
pub use tensor::*;
