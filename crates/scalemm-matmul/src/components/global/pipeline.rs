use scalemm_common::Element;

use crate::components::MatmulIdent;
use crate::components::stage::{NoEvent, OperandLoader, StageMemory};
use crate::components::tile::{Accumulator, MatrixAccelerateCore};
use crate::components::tiling::{MatmulConfig, PipelineScheduler};

use super::{DoubleBufferingEventListener, JobExecutor, PipelineState};

/// Main loop of a cube over the K extent of its block tile.
///
/// The prologue loads the first `prefetch_depth` stages. Iteration `i` then accumulates buffer
/// `i % num_stages` while stage `i + prefetch_depth` is loaded into another buffer, so a buffer is
/// never written while it is read. Iterations are separated by a barrier.
pub struct BlockPipeline<'a, L: Element, R: Element> {
    config: &'a MatmulConfig,
    lhs: OperandLoader<'a, L>,
    rhs: OperandLoader<'a, R>,
    num_loops: u32,
}

impl<'a, L: Element, R: Element> BlockPipeline<'a, L, R> {
    pub fn new(
        config: &'a MatmulConfig,
        lhs: OperandLoader<'a, L>,
        rhs: OperandLoader<'a, R>,
        k: usize,
    ) -> Self {
        let k_per_block = config.descriptor().k_per_block as usize;

        Self {
            config,
            lhs,
            rhs,
            num_loops: k.div_ceil(k_per_block) as u32,
        }
    }

    /// Number of K loop iterations. The last one is zero padded when `K` isn't a multiple of
    /// `KPerBlock`.
    pub fn num_loops(&self) -> u32 {
        self.num_loops
    }

    /// Runs the main loop, returning the accumulator of every wave.
    pub fn run(&self, state: &mut PipelineState) -> Vec<Accumulator> {
        let config = self.config;
        let descriptor = config.descriptor();
        let version = descriptor.version;
        let prefetch = version.prefetch_depth();
        let plane = config.plane_size();

        let mut lhs_stage = StageMemory::<L>::new(
            version.num_stages(),
            config.transfer(MatmulIdent::Lhs).stage_len(),
        );
        let mut rhs_stage = StageMemory::<R>::new(
            version.num_stages(),
            config.transfer(MatmulIdent::Rhs).stage_len(),
        );
        let mut accumulators: Vec<Accumulator> = (0..config.num_waves())
            .map(|_| Accumulator::new(config))
            .collect();
        let mut core = MatrixAccelerateCore::new(config);

        for iteration in 0..prefetch.min(self.num_loops) {
            state.stage(iteration);
            let buffer = state.buffer_of(iteration);
            self.lhs.load_stage(iteration, lhs_stage.buffer_mut(buffer));
            self.rhs.load_stage(iteration, rhs_stage.buffer_mut(buffer));
        }

        for iteration in 0..self.num_loops {
            let read = state.buffer_index();
            let next = iteration + prefetch;

            if next >= self.num_loops {
                state.accumulate();
                for (wave, acc) in accumulators.iter_mut().enumerate() {
                    core.execute(
                        wave as u32,
                        lhs_stage.buffer(read),
                        rhs_stage.buffer(read),
                        acc,
                        &mut NoEvent,
                    );
                }
                state.advance();
                continue;
            }

            state.overlap(next);
            let write = state.buffer_of(next);
            let (lhs_read, lhs_write) = lhs_stage.split(read, write);
            let (rhs_read, rhs_write) = rhs_stage.split(read, write);

            for (wave, acc) in accumulators.iter_mut().enumerate() {
                let wave = wave as u32;
                let units = wave * plane..(wave + 1) * plane;

                match descriptor.scheduler {
                    PipelineScheduler::Interwave => {
                        let mut job = self.lhs.create_job(next, units.clone(), 1);
                        self.lhs.execute_task(&mut job, lhs_write);
                        let mut job = self.rhs.create_job(next, units, 1);
                        self.rhs.execute_task(&mut job, rhs_write);

                        core.execute(wave, lhs_read, rhs_read, acc, &mut NoEvent);
                    }
                    PipelineScheduler::Intrawave => {
                        let num_tasks = (core.num_events() / 2).clamp(1, plane);
                        let mut listener = DoubleBufferingEventListener::new(
                            &self.lhs,
                            &self.rhs,
                            &mut *lhs_write,
                            &mut *rhs_write,
                            self.lhs.create_job(next, units.clone(), num_tasks),
                            self.rhs.create_job(next, units, num_tasks),
                        );

                        core.execute(wave, lhs_read, rhs_read, acc, &mut listener);
                    }
                }
            }

            state.advance();
        }

        accumulators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MatmulElems;
    use crate::components::stage::GlobalView;
    use crate::components::tiling::{PipelineVersion, TileDescriptor};
    use scalemm_common::rand::{Rng, get_rng_from_seed};
    use scalemm_runtime::properties::{DeviceProperties, HardwareGeneration};

    const M: usize = 32;
    const N: usize = 32;

    fn accumulate(descriptor: TileDescriptor, lhs: &[f32], rhs: &[f32], k: usize) -> Vec<Accumulator> {
        let config = MatmulConfig::new(
            descriptor,
            MatmulElems::SUPPORTED[8],
            &DeviceProperties::new(HardwareGeneration::Cdna3),
        )
        .unwrap();

        // lhs is row-major M x K, rhs column-major K x N.
        let lhs = OperandLoader::new(
            GlobalView::new(lhs, 0, k, 1, M, k),
            config.transfer(MatmulIdent::Lhs),
        );
        let rhs = OperandLoader::new(
            GlobalView::new(rhs, 0, k, 1, N, k),
            config.transfer(MatmulIdent::Rhs),
        );
        let pipeline = BlockPipeline::new(&config, lhs, rhs, k);
        let mut state = PipelineState::new(config.descriptor().version.num_stages());

        let accumulators = pipeline.run(&mut state);
        assert_eq!(state.iteration(), pipeline.num_loops());
        accumulators
    }

    fn random(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = get_rng_from_seed(seed);
        (0..len).map(|_| rng.random_range(-4i32..=4) as f32 / 4.0).collect()
    }

    #[test]
    fn schedulers_and_versions_are_bit_identical() {
        let k = 160;
        let lhs = random(M * k, 1);
        let rhs = random(N * k, 2);

        let reference = accumulate(TileDescriptor::cdna3_small(), &lhs, &rhs, k);
        for scheduler in [PipelineScheduler::Interwave, PipelineScheduler::Intrawave] {
            for version in [PipelineVersion::V1, PipelineVersion::V2] {
                let descriptor = TileDescriptor::cdna3_small()
                    .with_scheduler(scheduler)
                    .with_version(version);

                assert_eq!(
                    accumulate(descriptor, &lhs, &rhs, k),
                    reference,
                    "{scheduler:?} {version:?}"
                );
            }
        }
    }

    #[test]
    fn accumulates_the_full_k_extent() {
        let k = 72;
        let lhs = random(M * k, 3);
        let rhs = random(N * k, 4);

        let accumulators = accumulate(
            TileDescriptor::cdna3_small().with_scheduler(PipelineScheduler::Intrawave),
            &lhs,
            &rhs,
            k,
        );

        // Quarter-integer products sum exactly in f32.
        let expected = |row: usize, col: usize| -> f32 {
            (0..k).map(|i| lhs[row * k + i] * rhs[col * k + i]).sum()
        };
        assert_eq!(accumulators[0].get(0, 0, 2, 3), expected(2, 3));
        assert_eq!(accumulators[0].get(1, 1, 15, 0), expected(31, 16));
    }
}
