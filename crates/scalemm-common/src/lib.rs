//! Numeric building blocks shared by the scalemm crates.

/// Narrow floating point formats.
pub mod float;

/// Random number generation helpers.
pub mod rand;

mod elem;

pub use elem::*;
