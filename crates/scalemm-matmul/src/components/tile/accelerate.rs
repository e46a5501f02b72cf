use scalemm_common::Element;

use crate::components::MatmulIdent;
use crate::components::stage::{StageEvent, StageEventListener};
use crate::components::tiling::MatmulConfig;

use super::Accumulator;

/// Drives the matrix instructions of one wave over a pair of staged tiles.
///
/// For each instruction K step, the wave gathers the lhs fragments of its `MXdlPerWave` row
/// tiles and the rhs fragments of its `NXdlPerWave` column tiles, then issues one instruction
/// per `(mx, nx)` pair. Every output element is therefore summed in the same order: K loop
/// iteration, then K step, then lane order inside the instruction, whatever the pipeline does
/// between two events.
pub struct MatrixAccelerateCore<'a> {
    config: &'a MatmulConfig,
    lhs_fragments: Vec<f32>,
    rhs_fragments: Vec<f32>,
}

impl<'a> MatrixAccelerateCore<'a> {
    pub fn new(config: &'a MatmulConfig) -> Self {
        let descriptor = config.descriptor();
        let instruction = config.instruction();

        Self {
            config,
            lhs_fragments: vec![
                0.0;
                (descriptor.m_xdl_per_wave * instruction.m * instruction.k)
                    as usize
            ],
            rhs_fragments: vec![
                0.0;
                (descriptor.n_xdl_per_wave * instruction.n * instruction.k)
                    as usize
            ],
        }
    }

    /// Number of [StageEvent::TileMatmulCompleted] events emitted per stage.
    pub fn num_events(&self) -> u32 {
        self.config.k_steps() * self.config.instructions_per_k_step()
    }

    /// Accumulates the product of the staged tiles into the accumulator of `wave`.
    pub fn execute<L, R, Listener>(
        &mut self,
        wave: u32,
        lhs: &[L],
        rhs: &[R],
        acc: &mut Accumulator,
        listener: &mut Listener,
    ) where
        L: Element,
        R: Element,
        Listener: StageEventListener,
    {
        let config = self.config;
        let descriptor = config.descriptor();
        let instruction = config.instruction();
        let backend = config.backend();
        let (wave_m, wave_n) = config.wave_position(wave);
        let lhs_fragment_len = (instruction.m * instruction.k) as usize;
        let rhs_fragment_len = (instruction.n * instruction.k) as usize;
        let total = self.num_events();
        let mut current = 0;

        listener.on_event(StageEvent::Begin);

        for k_step in 0..config.k_steps() {
            let k_start = k_step * instruction.k;

            for (mx, fragment) in self
                .lhs_fragments
                .chunks_exact_mut(lhs_fragment_len)
                .enumerate()
            {
                let transfer = config.transfer(MatmulIdent::Lhs);
                for row in 0..instruction.m {
                    let block_row = config.block_row(mx as u32, wave_m, row);
                    for lane in 0..instruction.k {
                        fragment[(row * instruction.k + lane) as usize] =
                            lhs[transfer.stage_index(k_start + lane, block_row)].to_f32();
                    }
                }
            }

            for (nx, fragment) in self
                .rhs_fragments
                .chunks_exact_mut(rhs_fragment_len)
                .enumerate()
            {
                let transfer = config.transfer(MatmulIdent::Rhs);
                for col in 0..instruction.n {
                    let block_col = config.block_col(nx as u32, wave_n, col);
                    for lane in 0..instruction.k {
                        fragment[(col * instruction.k + lane) as usize] =
                            rhs[transfer.stage_index(k_start + lane, block_col)].to_f32();
                    }
                }
            }

            listener.on_event(StageEvent::FragmentsLoaded { k_step });

            for mx in 0..descriptor.m_xdl_per_wave {
                let lhs_fragment = &self.lhs_fragments
                    [mx as usize * lhs_fragment_len..(mx as usize + 1) * lhs_fragment_len];

                for nx in 0..descriptor.n_xdl_per_wave {
                    let rhs_fragment = &self.rhs_fragments
                        [nx as usize * rhs_fragment_len..(nx as usize + 1) * rhs_fragment_len];

                    backend.execute(
                        &instruction,
                        lhs_fragment,
                        rhs_fragment,
                        acc.tile_mut(mx, nx),
                    );

                    listener.on_event(StageEvent::TileMatmulCompleted { current, total });
                    current += 1;
                }
            }
        }

        listener.on_event(StageEvent::Finish);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MatmulElems;
    use crate::components::tiling::TileDescriptor;
    use scalemm_runtime::properties::{DeviceProperties, HardwareGeneration};

    #[derive(Default)]
    struct RecordingListener {
        events: Vec<StageEvent>,
    }

    impl StageEventListener for RecordingListener {
        fn on_event(&mut self, event: StageEvent) {
            self.events.push(event);
        }
    }

    fn config() -> MatmulConfig {
        MatmulConfig::new(
            TileDescriptor::cdna3_small(),
            MatmulElems::SUPPORTED[8],
            &DeviceProperties::new(HardwareGeneration::Cdna3),
        )
        .unwrap()
    }

    #[test]
    fn wave_accumulates_its_block_rows_and_cols() {
        let config = config();
        let lhs_transfer = config.transfer(MatmulIdent::Lhs);
        let rhs_transfer = config.transfer(MatmulIdent::Rhs);

        // lhs[m, k] = m, rhs[n, k] = 1 when k == 0.
        let mut lhs = vec![0.0f32; lhs_transfer.stage_len()];
        let mut rhs = vec![0.0f32; rhs_transfer.stage_len()];
        for mn in 0..32 {
            for k in 0..32 {
                lhs[lhs_transfer.stage_index(k, mn)] = mn as f32;
            }
            rhs[rhs_transfer.stage_index(0, mn)] = 1.0;
        }

        let mut core = MatrixAccelerateCore::new(&config);
        let mut acc = Accumulator::new(&config);
        core.execute(0, &lhs, &rhs, &mut acc, &mut crate::components::stage::NoEvent);

        // Instruction tile (1, 0) covers block rows 16..32.
        assert_eq!(acc.get(1, 0, 3, 5), 19.0);
        assert_eq!(acc.get(0, 1, 3, 5), 3.0);
    }

    #[test]
    fn events_follow_instructions() {
        let config = config();
        let lhs = vec![0.0f32; config.transfer(MatmulIdent::Lhs).stage_len()];
        let rhs = vec![0.0f32; config.transfer(MatmulIdent::Rhs).stage_len()];
        let mut core = MatrixAccelerateCore::new(&config);
        let mut acc = Accumulator::new(&config);
        let mut listener = RecordingListener::default();

        core.execute(0, &lhs, &rhs, &mut acc, &mut listener);

        let total = core.num_events();
        let completed: Vec<u32> = listener
            .events
            .iter()
            .filter_map(|event| match event {
                StageEvent::TileMatmulCompleted { current, .. } => Some(*current),
                _ => None,
            })
            .collect();

        assert_eq!(listener.events.first(), Some(&StageEvent::Begin));
        assert_eq!(listener.events.last(), Some(&StageEvent::Finish));
        assert_eq!(completed, (0..total).collect::<Vec<_>>());
    }
}
