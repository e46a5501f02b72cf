mod profiling;
mod server;

pub use profiling::ProfileLevel;
pub use server::*;

pub(crate) use profiling::Profiled;
