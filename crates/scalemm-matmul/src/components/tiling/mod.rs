//! Static description of the tiling geometry and its validation against a device.

mod cluster;
mod config;
mod descriptor;

pub use cluster::*;
pub use config::*;
pub use descriptor::*;
