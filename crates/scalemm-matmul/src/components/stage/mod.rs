//! Staging of operand tiles from global memory into multi-buffered scratch memory.

mod event_listener;
mod loader;
mod stage_memory;

pub use event_listener::*;
pub use loader::*;
pub use stage_memory::*;
