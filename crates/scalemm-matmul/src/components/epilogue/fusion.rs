use scalemm_common::Element;

use crate::components::tile::Accumulator;
use crate::components::tiling::MatmulConfig;

use super::{ElementwiseOp, OutputTile, ShuffleBuffer};

/// View of one auxiliary tensor of one batch, indexed by block position.
///
/// A zero stride broadcasts the tensor: `D0` has a zero column stride and varies per row, `D1`
/// has a zero row stride and varies per column.
#[derive(new, Clone, Copy, Debug)]
pub struct ScaleView<'a, E: Element> {
    data: &'a [E],
    offset: usize,
    row_stride: usize,
    col_stride: usize,
}

impl<E: Element> ScaleView<'_, E> {
    pub fn read(&self, row: usize, col: usize) -> f32 {
        self.data[self.offset + row * self.row_stride + col * self.col_stride].to_f32()
    }
}

/// Combines the accumulators with the auxiliary tensors, narrows the result and distributes it
/// to the units storing the output tile.
///
/// For each shuffle step, every wave writes its instruction tiles to the shuffle buffer, then
/// after a barrier every unit of the `[1, M, 1, N]` cluster handles a `slice_rows x slice_cols`
/// region: it reads its auxiliary vectors, applies the elementwise operation in `f32` and writes
/// output vectors. Slices partition the shuffle region, so each output element is written by
/// exactly one unit.
pub struct EpilogueFusion<'a> {
    config: &'a MatmulConfig,
    op: ElementwiseOp,
}

impl<'a> EpilogueFusion<'a> {
    pub fn new(config: &'a MatmulConfig) -> Self {
        Self {
            config,
            op: config.descriptor().epilogue,
        }
    }

    pub fn op(&self) -> ElementwiseOp {
        self.op
    }

    pub fn run<S: Element, O: Element>(
        &self,
        accumulators: &[Accumulator],
        scales: &[ScaleView<'_, S>],
        out: &mut OutputTile<O>,
    ) {
        debug_assert_eq!(scales.len(), self.op.num_aux());

        let config = self.config;
        let descriptor = config.descriptor();
        let shuffle = config.shuffle();
        let m_steps = descriptor.m_xdl_per_wave / shuffle.m_xdl_per_shuffle;
        let n_steps = descriptor.n_xdl_per_wave / shuffle.n_xdl_per_shuffle;
        let mut buffer = ShuffleBuffer::new(config);

        for step_m in 0..m_steps {
            for step_n in 0..n_steps {
                for (wave, acc) in accumulators.iter().enumerate() {
                    buffer.write_wave(config, wave as u32, acc, step_m, step_n);
                }

                for unit in 0..descriptor.block_size {
                    self.store_unit(unit, &buffer, step_m, step_n, scales, out);
                }
            }
        }
    }

    fn store_unit<S: Element, O: Element>(
        &self,
        unit: u32,
        buffer: &ShuffleBuffer,
        step_m: u32,
        step_n: u32,
        scales: &[ScaleView<'_, S>],
        out: &mut OutputTile<O>,
    ) {
        let shuffle = self.config.shuffle();
        let [_, cluster_m, _, cluster_n] = shuffle.cluster.position(unit);
        let row_start = cluster_m * shuffle.slice_rows;
        let col_start = cluster_n * shuffle.slice_cols;
        let slice_cols = shuffle.slice_cols as usize;

        let mut aux = vec![0.0f32; scales.len() * slice_cols];
        let mut operands = vec![0.0f32; scales.len()];
        let mut results = vec![O::zero(); slice_cols];

        for local_row in row_start..row_start + shuffle.slice_rows {
            let row = step_m * buffer.rows() + local_row;
            let col_base = step_n * buffer.cols() + col_start;

            for (index, (scale, vector)) in scales.iter().zip(&shuffle.aux_vectors).enumerate() {
                let values = &mut aux[index * slice_cols..(index + 1) * slice_cols];
                for (chunk, lanes) in values.chunks_mut(*vector as usize).enumerate() {
                    for (lane, value) in lanes.iter_mut().enumerate() {
                        let col = col_base + (chunk * *vector as usize + lane) as u32;
                        if out.in_bounds(row, col) {
                            *value = scale.read(row as usize, col as usize);
                        }
                    }
                }
            }

            for (offset, result) in results.iter_mut().enumerate() {
                let acc = buffer.read(local_row, col_start + offset as u32);
                for (index, operand) in operands.iter_mut().enumerate() {
                    *operand = aux[index * slice_cols + offset];
                }
                *result = O::from_f32(self.op.apply(acc, &operands));
            }

            for (chunk, lanes) in results.chunks(shuffle.out_vector as usize).enumerate() {
                for (lane, value) in lanes.iter().enumerate() {
                    let col = col_base + (chunk * shuffle.out_vector as usize + lane) as u32;
                    if out.in_bounds(row, col) {
                        out.write(row, col, *value);
                    }
                }
            }
        }
    }
}
