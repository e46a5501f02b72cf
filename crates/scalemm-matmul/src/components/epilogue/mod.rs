//! Fused rescale of the accumulators, narrowing and shuffled store of the output tile.

mod elementwise;
mod fusion;
mod output;
mod shuffle;

pub use elementwise::*;
pub use fusion::*;
pub use output::*;
pub use shuffle::*;
