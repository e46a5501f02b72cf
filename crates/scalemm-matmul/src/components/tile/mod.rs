//! Matrix instructions and the wave-owned accumulators they update.

mod accelerate;
mod accumulator;
mod backend;

pub use accelerate::*;
pub use accumulator::*;
pub use backend::*;
