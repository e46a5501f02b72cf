use core::marker::PhantomData;
use std::sync::Arc;

use scalemm_runtime::kernel::{CubeDim, CubePosition, CubeTask};

use crate::components::batch::BatchDispatcher;
use crate::components::epilogue::{EpilogueFusion, OutputTile, ScaleView};
use crate::components::global::{BlockPipeline, PipelineState};
use crate::components::stage::{GlobalView, OperandLoader};
use crate::components::tiling::MatmulConfig;
use crate::components::{MatmulIdent, MatmulPrecision, MatmulProblem, TensorArg};

/// One launch of the batched scaled matmul: every cube computes one block tile of one batch.
///
/// A cube resolves its batch and tile, runs the main loop over K, applies the fused epilogue and
/// commits its output tile. Inputs are only read; the output buffer is locked only to commit.
pub struct ScaledMatmulKernel<MP: MatmulPrecision> {
    config: Arc<MatmulConfig>,
    problem: MatmulProblem,
    dispatcher: BatchDispatcher,
    lhs: TensorArg,
    rhs: TensorArg,
    scales: Vec<TensorArg>,
    out: TensorArg,
    _precision: PhantomData<MP>,
}

impl<MP: MatmulPrecision> ScaledMatmulKernel<MP> {
    pub fn new(
        config: Arc<MatmulConfig>,
        problem: MatmulProblem,
        dispatcher: BatchDispatcher,
        lhs: TensorArg,
        rhs: TensorArg,
        scales: Vec<TensorArg>,
        out: TensorArg,
    ) -> Self {
        Self {
            config,
            problem,
            dispatcher,
            lhs,
            rhs,
            scales,
            out,
            _precision: PhantomData,
        }
    }
}

impl<MP: MatmulPrecision> CubeTask for ScaledMatmulKernel<MP> {
    fn name(&self) -> String {
        format!(
            "scaled_matmul<{}, {}>",
            self.config.elems(),
            self.config.descriptor()
        )
    }

    fn cube_dim(&self) -> CubeDim {
        self.config.cube_dim()
    }

    fn execute(&self, cube: CubePosition) {
        let config = self.config.as_ref();
        let descriptor = config.descriptor();
        let problem = &self.problem;

        let mut state = PipelineState::new(descriptor.version.num_stages());
        let tile = self.dispatcher.tile_of(cube.absolute());
        let offsets = self.dispatcher.resolve(tile.batch);
        let row_origin = tile.m as usize * descriptor.m_per_block as usize;
        let col_origin = tile.n as usize * descriptor.n_per_block as usize;

        let output = {
            let lhs_guard = self.lhs.handle.read();
            let rhs_guard = self.rhs.handle.read();
            let [_, lhs_row, lhs_col] = self.lhs.strides;
            let [_, rhs_row, rhs_col] = self.rhs.strides;

            let lhs = OperandLoader::new(
                GlobalView::new(
                    lhs_guard.as_slice::<MP::Lhs>(),
                    offsets.lhs + row_origin * lhs_row,
                    lhs_row,
                    lhs_col,
                    problem.m - row_origin,
                    problem.k,
                ),
                config.transfer(MatmulIdent::Lhs),
            );
            let rhs = OperandLoader::new(
                GlobalView::new(
                    rhs_guard.as_slice::<MP::Rhs>(),
                    offsets.rhs + col_origin * rhs_col,
                    rhs_col,
                    rhs_row,
                    problem.n - col_origin,
                    problem.k,
                ),
                config.transfer(MatmulIdent::Rhs),
            );

            let accumulators = BlockPipeline::new(config, lhs, rhs, problem.k).run(&mut state);
            state.epilogue();

            let scale_guards: Vec<_> = self.scales.iter().map(|arg| arg.handle.read()).collect();
            let scales: Vec<ScaleView<'_, MP::Scale>> = self
                .scales
                .iter()
                .zip(&scale_guards)
                .zip(&offsets.scales)
                .map(|((arg, guard), offset)| {
                    let [_, row, col] = arg.strides;
                    ScaleView::new(
                        guard.as_slice::<MP::Scale>(),
                        offset + row_origin * row + col_origin * col,
                        row,
                        col,
                    )
                })
                .collect();

            let mut output = OutputTile::<MP::Out>::new(
                row_origin,
                col_origin,
                descriptor.m_per_block as usize,
                descriptor.n_per_block as usize,
                problem.m,
                problem.n,
            );
            EpilogueFusion::new(config).run(&accumulators, &scales, &mut output);
            output
        };

        state.store();
        let [_, out_row, out_col] = self.out.strides;
        output.commit(
            self.out.handle.write().as_slice_mut::<MP::Out>(),
            offsets.out,
            [out_row, out_col],
        );
        state.terminate();
    }
}
