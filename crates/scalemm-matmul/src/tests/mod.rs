//! Property tests of the scaled matmul, generated per hardware generation.
//!
//! Other crates can instantiate them with the `export_tests` feature:
//!
//! ```ignore
//! mod cdna3 {
//!     scalemm_matmul::testgen_scaled_matmul!(Cdna3);
//! }
//! ```

pub mod scaled_matmul;
pub mod test_utils;

#[macro_export]
macro_rules! testgen_scaled_matmul {
    ($generation:ident) => {
        use $crate::tests::scaled_matmul;
        use $crate::tests::test_utils::HardwareGeneration;

        const GENERATION: HardwareGeneration = HardwareGeneration::$generation;

        #[test_log::test]
        fn unit_scales_match_unscaled_product() {
            scaled_matmul::test_unit_scales_match_unscaled_product(GENERATION);
        }

        #[test_log::test]
        fn batch_independence() {
            scaled_matmul::test_batch_independence(GENERATION);
        }

        #[test_log::test]
        fn scale_decomposition() {
            scaled_matmul::test_scale_decomposition(GENERATION);
        }

        #[test_log::test]
        fn scheduler_invariance() {
            scaled_matmul::test_scheduler_invariance(GENERATION);
        }

        #[test_log::test]
        fn tiling_completeness() {
            scaled_matmul::test_tiling_completeness(GENERATION);
        }

        #[test_log::test]
        fn padded_k_matches_zero_extension() {
            scaled_matmul::test_padded_k_matches_zero_extension(GENERATION);
        }

        #[test_log::test]
        fn tolerance_conformance() {
            scaled_matmul::test_tolerance_conformance(GENERATION);
        }

        #[test_log::test]
        fn unsupported_problem_is_rejected() {
            scaled_matmul::test_unsupported_problem_is_rejected(GENERATION);
        }
    };
}

#[cfg(test)]
mod cdna3 {
    crate::testgen_scaled_matmul!(Cdna3);
}

#[cfg(test)]
mod rdna4 {
    crate::testgen_scaled_matmul!(Rdna4);
}

#[cfg(test)]
mod generic {
    crate::testgen_scaled_matmul!(Generic);
}
