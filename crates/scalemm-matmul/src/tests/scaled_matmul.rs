use half::bf16;
use pretty_assertions::assert_eq;
use scalemm_common::float::e4m3;
use scalemm_common::ElemType;
use scalemm_common::rand::DEFAULT_SEED;
use scalemm_runtime::profile::ProfileOptions;

use super::test_utils::{
    HardwareGeneration, ScaledMatmulInputs, bits, matmul_instance, test_client, test_descriptor,
    values,
};
use crate::components::epilogue::ElementwiseOp;
use crate::components::tiling::{GemmSpecialization, PipelineScheduler, PipelineVersion};
use crate::components::{MatmulElems, MatmulLaunchError, MatmulProblem};
use crate::host::{HostTensor, TensorInit, Tolerance, validate};
use crate::kernels::MatmulRegistry;
use crate::{ScaledMatmulArgs, UNSUPPORTED_TIMING};

type Reference = (e4m3, e4m3, f32, bf16);
type WideOut = (e4m3, e4m3, f32, f32);
type NarrowOut = (e4m3, e4m3, f32, e4m3);

/// Checks every batch against the reference oracle.
fn assert_conforms<E: scalemm_common::Element>(
    actual: &HostTensor<E>,
    expected: &HostTensor<E>,
    tolerance: Tolerance,
) {
    for report in validate(actual, expected, tolerance) {
        assert!(report.is_ok(), "{report} ({tolerance})");
    }
}

/// M=256 N=128 K=512 over 4 batches, unit scales: the output is the unscaled product narrowed to
/// bf16.
pub fn test_unit_scales_match_unscaled_product(generation: HardwareGeneration) {
    let client = test_client(generation);
    let problem = MatmulProblem::new(4, 256, 128, 512);
    let matmul = MatmulRegistry::default()
        .select(&client, &problem, MatmulElems::REFERENCE)
        .unwrap();

    let inputs = ScaledMatmulInputs::<Reference>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Integer,
        TensorInit::Constant(1.0),
        DEFAULT_SEED,
    );
    let actual = inputs.launch(&matmul).unwrap();
    let unscaled = inputs.with_op(ElementwiseOp::PassThrough).reference();

    assert_conforms(&actual, &unscaled, Tolerance::for_elem(ElemType::BF16));
    // Integer operands accumulate exactly, so both narrow the same value.
    assert_eq!(bits(&actual), bits(&unscaled));
}

/// Every batch of a launch matches its isolated single-batch launch, and changing the inputs of
/// one batch never changes the output of the others.
pub fn test_batch_independence(generation: HardwareGeneration) {
    let client = test_client(generation);
    let descriptor = test_descriptor(generation);
    let problem = MatmulProblem::new(3, 64, 64, 64);
    let matmul = matmul_instance::<Reference>(&client, descriptor);

    let mut inputs = ScaledMatmulInputs::<Reference>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Decimal,
        TensorInit::Decimal,
        DEFAULT_SEED,
    );
    let before = inputs.launch(&matmul).unwrap();

    for batch in 0..problem.batches {
        let isolated = inputs.single_batch(batch).launch(&matmul).unwrap();

        for row in 0..problem.m {
            for col in 0..problem.n {
                assert_eq!(
                    before.get(batch, row, col).to_bits(),
                    isolated.get(0, row, col).to_bits(),
                    "batch {batch} differs from its isolated launch at ({row}, {col})"
                );
            }
        }
    }

    for row in 0..problem.m {
        for k in 0..problem.k {
            let value = inputs.lhs.get(1, row, k).to_f32();
            inputs.lhs.set(1, row, k, e4m3::from_f32(-value * 0.5));
        }
        inputs.scales[0].set(1, row, 0, 3.0);
    }
    let after = inputs.launch(&matmul).unwrap();

    for batch in [0, 2] {
        for row in 0..problem.m {
            for col in 0..problem.n {
                assert_eq!(
                    before.get(batch, row, col).to_bits(),
                    after.get(batch, row, col).to_bits(),
                    "batch {batch} changed at ({row}, {col})"
                );
            }
        }
    }
    assert_conforms(&after, &inputs.reference(), Tolerance::for_elem(ElemType::BF16));
}

/// The fused epilogue is exactly the accumulator multiplied by `d0` then by `d1` in `f32`.
pub fn test_scale_decomposition(generation: HardwareGeneration) {
    let client = test_client(generation);
    let descriptor = test_descriptor(generation);
    let problem = MatmulProblem::new(2, 64, 64, 96);

    let inputs = ScaledMatmulInputs::<WideOut>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Decimal,
        TensorInit::Decimal,
        DEFAULT_SEED + 1,
    );
    let scaled = inputs
        .launch(&matmul_instance::<WideOut>(&client, descriptor.clone()))
        .unwrap();

    let pass_through = descriptor.with_epilogue(ElementwiseOp::PassThrough);
    let accumulators = inputs
        .with_op(ElementwiseOp::PassThrough)
        .launch(&matmul_instance::<WideOut>(&client, pass_through))
        .unwrap();

    let [d0, d1] = [&inputs.scales[0], &inputs.scales[1]];
    let expected: Vec<f32> = accumulators
        .indices()
        .map(|(b, r, c)| accumulators.get(b, r, c) * d0.get(b, r, c) * d1.get(b, r, c))
        .collect();

    assert_eq!(values(&scaled), expected);
}

/// Every scheduler and pipeline version produces the same bits.
pub fn test_scheduler_invariance(generation: HardwareGeneration) {
    let client = test_client(generation);
    let descriptor = test_descriptor(generation);
    let k = 5 * descriptor.k_per_block as usize;
    let problem = MatmulProblem::new(2, 64, 64, k);

    let inputs = ScaledMatmulInputs::<Reference>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Decimal,
        TensorInit::Decimal,
        DEFAULT_SEED + 2,
    );

    let mut outputs = Vec::new();
    for scheduler in [PipelineScheduler::Interwave, PipelineScheduler::Intrawave] {
        for version in [PipelineVersion::V1, PipelineVersion::V2] {
            let descriptor = descriptor
                .clone()
                .with_scheduler(scheduler)
                .with_version(version);
            let matmul = matmul_instance::<Reference>(&client, descriptor);
            outputs.push(bits(&inputs.launch(&matmul).unwrap()));
        }
    }

    for output in &outputs[1..] {
        assert_eq!(output, &outputs[0]);
    }
}

/// Padded tiles cover every output element exactly once and never write outside the matrices.
pub fn test_tiling_completeness(generation: HardwareGeneration) {
    let client = test_client(generation);
    let descriptor =
        test_descriptor(generation).with_specialization(GemmSpecialization::MNKPadding);
    let matmul = matmul_instance::<Reference>(&client, descriptor);
    let problem = MatmulProblem::new(2, 100, 68, 40);

    let inputs = ScaledMatmulInputs::<Reference>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Integer,
        TensorInit::Decimal,
        DEFAULT_SEED + 3,
    );

    // Rows padded by 4 elements holding a sentinel.
    let row_stride = problem.n + 4;
    let sentinel = bf16::from_f32(-12345.0);
    let out = HostTensor::from_data(
        vec![sentinel; problem.batches * problem.m * row_stride],
        [problem.batches, problem.m, problem.n],
        [problem.m * row_stride, row_stride, 1],
    );

    let actual = inputs.launch_into(&matmul, out).unwrap();

    for batch in 0..problem.batches {
        for row in 0..problem.m {
            let start = batch * problem.m * row_stride + row * row_stride;
            let padding = &actual.data()[start + problem.n..start + row_stride];
            assert!(padding.iter().all(|value| *value == sentinel));
        }
    }
    assert_conforms(
        &actual,
        &inputs.reference(),
        Tolerance::RoundingDistance { max_ulps: 1 },
    );
}

/// Reads past K are zeros: a padded K gives the same bits as an explicit zero extension.
pub fn test_padded_k_matches_zero_extension(generation: HardwareGeneration) {
    let client = test_client(generation);
    let descriptor =
        test_descriptor(generation).with_specialization(GemmSpecialization::MNKPadding);
    let matmul = matmul_instance::<Reference>(&client, descriptor.clone());
    let k_per_block = descriptor.k_per_block as usize;
    let k = k_per_block + 8;
    let problem = MatmulProblem::new(1, 64, 64, k);

    let padded = ScaledMatmulInputs::<Reference>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Decimal,
        TensorInit::Decimal,
        DEFAULT_SEED + 4,
    );

    let extended_k = 2 * k_per_block;
    let mut extended = ScaledMatmulInputs::<Reference>::generate(
        MatmulProblem::new(1, 64, 64, extended_k),
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Zero,
        TensorInit::Zero,
        DEFAULT_SEED,
    );
    for (b, r, c) in padded.lhs.indices() {
        extended.lhs.set(b, r, c, padded.lhs.get(b, r, c));
    }
    for (b, r, c) in padded.rhs.indices() {
        extended.rhs.set(b, r, c, padded.rhs.get(b, r, c));
    }
    extended.scales = padded.scales.clone();

    assert_eq!(
        bits(&padded.launch(&matmul).unwrap()),
        bits(&extended.launch(&matmul).unwrap())
    );
}

/// Narrow outputs stay within one rounding step of the reference.
pub fn test_tolerance_conformance(generation: HardwareGeneration) {
    let client = test_client(generation);
    let descriptor = test_descriptor(generation);
    let problem = MatmulProblem::new(2, 64, 64, 128);

    let inputs = ScaledMatmulInputs::<Reference>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Integer,
        TensorInit::Decimal,
        DEFAULT_SEED + 5,
    );
    let actual = inputs
        .launch(&matmul_instance::<Reference>(&client, descriptor.clone()))
        .unwrap();
    assert_conforms(
        &actual,
        &inputs.reference(),
        Tolerance::RoundingDistance { max_ulps: 1 },
    );

    let inputs = ScaledMatmulInputs::<NarrowOut>::generate(
        problem,
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Integer,
        TensorInit::Decimal,
        DEFAULT_SEED + 6,
    );
    let actual = inputs
        .launch(&matmul_instance::<NarrowOut>(&client, descriptor))
        .unwrap();

    for report in validate(
        &actual,
        &inputs.reference(),
        Tolerance::for_elem(ElemType::E4M3),
    ) {
        assert_eq!(report.mismatch_ratio(), 0.0, "{report}");
    }
}

/// Problems the instance can't handle are reported, never computed.
pub fn test_unsupported_problem_is_rejected(generation: HardwareGeneration) {
    let client = test_client(generation);
    let matmul = matmul_instance::<Reference>(&client, test_descriptor(generation));

    let unaligned = ScaledMatmulInputs::<Reference>::generate(
        MatmulProblem::new(1, 100, 64, 64),
        ElementwiseOp::MultiplyMultiply,
        TensorInit::Integer,
        TensorInit::Constant(1.0),
        DEFAULT_SEED,
    );
    assert!(matches!(
        unaligned.launch(&matmul),
        Err(MatmulLaunchError::Unsupported(_))
    ));

    let problem = MatmulProblem::new(1, 64, 64, 64);
    let missing_scale = ScaledMatmulArgs::new(
        problem,
        HostTensor::<e4m3>::row_major(1, 64, 64).to_device(&client),
        HostTensor::<e4m3>::col_major(1, 64, 64).to_device(&client),
        vec![HostTensor::<f32>::row_broadcast(1, 64, 64).to_device(&client)],
        HostTensor::<bf16>::row_major(1, 64, 64).to_device(&client),
    );

    assert_eq!(
        matmul.run(&missing_scale, &ProfileOptions::default()),
        UNSUPPORTED_TIMING
    );

    let full_row_scale = ScaledMatmulArgs::new(
        problem,
        HostTensor::<e4m3>::row_major(1, 64, 64).to_device(&client),
        HostTensor::<e4m3>::col_major(1, 64, 64).to_device(&client),
        vec![
            HostTensor::<f32>::row_major(1, 64, 64).to_device(&client),
            HostTensor::<f32>::col_broadcast(1, 64, 64).to_device(&client),
        ],
        HostTensor::<bf16>::row_major(1, 64, 64).to_device(&client),
    );
    assert!(matches!(
        matmul.check_support(&full_row_scale),
        Err(MatmulLaunchError::Unsupported(reason)) if reason.contains("PerRow")
    ));

    let swapped_scales = ScaledMatmulArgs::new(
        problem,
        HostTensor::<e4m3>::row_major(1, 64, 64).to_device(&client),
        HostTensor::<e4m3>::col_major(1, 64, 64).to_device(&client),
        vec![
            HostTensor::<f32>::col_broadcast(1, 64, 64).to_device(&client),
            HostTensor::<f32>::row_broadcast(1, 64, 64).to_device(&client),
        ],
        HostTensor::<bf16>::row_major(1, 64, 64).to_device(&client),
    );
    assert_eq!(
        matmul.run(&swapped_scales, &ProfileOptions::default()),
        UNSUPPORTED_TIMING
    );
}
