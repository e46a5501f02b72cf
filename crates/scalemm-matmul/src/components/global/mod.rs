//! The multi-stage main loop of a cube: prefetching loads overlapped with matrix instructions.

mod event_listener;
mod pipeline;
mod state;

pub use event_listener::*;
pub use pipeline::*;
pub use state::*;
