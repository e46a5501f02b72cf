//! Emulated matrix-accelerator runtime.
//!
//! A launch spawns a grid of cubes (thread blocks). Cubes are spread over a pool of worker
//! threads; each cube runs on a single worker, which steps every unit of the cube through its
//! barrier-separated phases in order. Execution order across cubes is unspecified.

#[macro_use]
extern crate derive_new;

/// Compute client and execution queues.
pub mod client;

/// Kernel abstraction.
pub mod kernel;

/// Device memory.
pub mod storage;

/// Server errors.
pub mod server;

/// Device and hardware properties.
pub mod properties;

/// Kernel timing.
pub mod profile;

/// Global configuration.
pub mod config;

/// Loggers used by the execution queues.
pub mod logging;

mod compute;

pub use client::*;
pub use compute::ExecutionQueue;
