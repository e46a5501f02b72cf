use scalemm_common::Element;

use super::HostTensor;
use crate::components::MatmulProblem;
use crate::components::epilogue::ElementwiseOp;

/// Solves a batched scaled matmul on the host.
///
/// Products and sums are computed in `f64` from the exact operand values, the elementwise
/// operation is applied in `f64` and each result is narrowed once into `out`, which keeps its
/// strides.
///
/// This is a naive CPU implementation, very slow on large payloads, not designed to be used for
/// other purposes than testing.
pub fn reference_batched_scaled_matmul<L, R, S, O>(
    problem: &MatmulProblem,
    op: ElementwiseOp,
    lhs: &HostTensor<L>,
    rhs: &HostTensor<R>,
    scales: &[HostTensor<S>],
    out: &mut HostTensor<O>,
) where
    L: Element,
    R: Element,
    S: Element,
    O: Element,
{
    assert_eq!(
        scales.len(),
        op.num_aux(),
        "Epilogue {op} expects {} scale tensors",
        op.num_aux()
    );

    let mut aux = vec![0.0f64; scales.len()];

    for batch in 0..problem.batches {
        for row in 0..problem.m {
            for col in 0..problem.n {
                let acc = (0..problem.k)
                    .map(|k| lhs.get(batch, row, k).to_f64() * rhs.get(batch, k, col).to_f64())
                    .sum::<f64>();

                for (value, scale) in aux.iter_mut().zip(scales) {
                    *value = scale.get(batch, row, col).to_f64();
                }

                out.set(batch, row, col, O::from_f64(op.apply_f64(acc, &aux)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use half::bf16;
    use scalemm_common::float::e4m3;

    use super::*;

    #[test]
    fn rescales_rows_and_columns() {
        let problem = MatmulProblem::new(1, 2, 2, 3);
        let lhs = HostTensor::from_data(
            [1.0, 2.0, 3.0, -1.0, 0.5, 4.0].map(e4m3::from_f32).to_vec(),
            [1, 2, 3],
            [6, 3, 1],
        );
        // Column-major [[1, 0], [1, 2], [1, -2]].
        let rhs = HostTensor::from_data(
            [1.0, 1.0, 1.0, 0.0, 2.0, -2.0].map(e4m3::from_f32).to_vec(),
            [1, 3, 2],
            [6, 1, 3],
        );
        let d0 = HostTensor::from_data(vec![2.0f32, 0.5], [1, 2, 2], [2, 1, 0]);
        let d1 = HostTensor::from_data(vec![1.0f32, 3.0], [1, 2, 2], [2, 0, 1]);
        let mut out = HostTensor::<bf16>::row_major(1, 2, 2);

        reference_batched_scaled_matmul(
            &problem,
            ElementwiseOp::MultiplyMultiply,
            &lhs,
            &rhs,
            &[d0, d1],
            &mut out,
        );

        // Unscaled: [[6, -2], [3.5, -7]].
        let values: Vec<f32> = out.data().iter().map(|value| value.to_f32()).collect();
        assert_eq!(values, vec![12.0, -12.0, 1.75, -10.5]);
    }

    #[test]
    fn narrows_once_from_f64() {
        let problem = MatmulProblem::new(1, 1, 1, 2);
        // Through f32 the sum collapses to the tie 1.0625, which e4m3 rounds down to 1.
        let lhs = HostTensor::from_data(vec![1.0f32, 1.0], [1, 1, 2], [2, 2, 1]);
        let rhs = HostTensor::from_data(vec![1.0625f32, 2f32.powi(-30)], [1, 2, 1], [2, 1, 1]);
        let mut out = HostTensor::<e4m3>::row_major(1, 1, 1);

        reference_batched_scaled_matmul::<f32, f32, f32, e4m3>(
            &problem,
            ElementwiseOp::PassThrough,
            &lhs,
            &rhs,
            &[],
            &mut out,
        );

        assert_eq!(out.get(0, 0, 0).to_f32(), 1.125);
    }
}
