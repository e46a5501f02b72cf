//! Batched FP8 matrix multiplication with a fused multiply-multiply scale epilogue.
//!
//! A launch covers one cube per `(batch, block tile)` pair. Each cube stages operand tiles into
//! scratch memory, accumulates them with the matrix instructions of the device in `f32`, then
//! rescales the accumulator by the row and column scales and narrows it to the output type.

#[macro_use]
extern crate derive_new;

/// Building blocks of the scaled matmul.
pub mod components;

/// Kernels and configuration registry.
pub mod kernels;

/// Host-side tensors, reference oracle and validation.
pub mod host;

mod base;

pub use base::*;

#[cfg(any(test, feature = "export_tests"))]
pub mod tests;
