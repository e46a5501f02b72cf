//! Mapping of the launch grid to batches and block tiles.

mod dispatcher;
mod global_order;

pub use dispatcher::*;
pub use global_order::*;
