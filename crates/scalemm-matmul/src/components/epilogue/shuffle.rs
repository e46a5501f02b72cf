use crate::components::tile::Accumulator;
use crate::components::tiling::MatmulConfig;

/// `f32` scratch buffer through which the accumulators are redistributed from the instruction
/// layout of the waves to the row-contiguous slices of the store.
///
/// One shuffle step covers `MXdlPerWavePerShuffle x NXdlPerWavePerShuffle` instruction tiles of
/// every wave, which is `rows x cols` contiguous elements of the block tile starting at
/// `(step_m * rows, step_n * cols)`.
#[derive(Debug)]
pub struct ShuffleBuffer {
    values: Vec<f32>,
    rows: u32,
    cols: u32,
}

impl ShuffleBuffer {
    pub fn new(config: &MatmulConfig) -> Self {
        let shuffle = config.shuffle();

        Self {
            values: vec![0.0; (shuffle.rows * shuffle.cols) as usize],
            rows: shuffle.rows,
            cols: shuffle.cols,
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Writes the instruction tiles of `wave` belonging to shuffle step `(step_m, step_n)`.
    pub fn write_wave(
        &mut self,
        config: &MatmulConfig,
        wave: u32,
        acc: &Accumulator,
        step_m: u32,
        step_n: u32,
    ) {
        let descriptor = config.descriptor();
        let shuffle = config.shuffle();
        let (wave_m, wave_n) = config.wave_position(wave);
        let (m_waves, n_waves) = (config.m_waves(), config.n_waves());

        for m_sub in 0..shuffle.m_xdl_per_shuffle {
            let mx = step_m * shuffle.m_xdl_per_shuffle + m_sub;

            for n_sub in 0..shuffle.n_xdl_per_shuffle {
                let nx = step_n * shuffle.n_xdl_per_shuffle + n_sub;

                for row in 0..descriptor.m_per_xdl {
                    let local_row = (m_sub * m_waves + wave_m) * descriptor.m_per_xdl + row;

                    for col in 0..descriptor.n_per_xdl {
                        let local_col = (n_sub * n_waves + wave_n) * descriptor.n_per_xdl + col;
                        self.values[(local_row * self.cols + local_col) as usize] =
                            acc.get(mx, nx, row, col);
                    }
                }
            }
        }
    }

    pub fn read(&self, row: u32, col: u32) -> f32 {
        self.values[(row * self.cols + col) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MatmulElems;
    use crate::components::tiling::TileDescriptor;
    use scalemm_runtime::properties::{DeviceProperties, HardwareGeneration};

    #[test]
    fn shuffle_step_is_a_contiguous_block_region() {
        let config = MatmulConfig::new(
            TileDescriptor::reference(),
            MatmulElems::REFERENCE,
            &DeviceProperties::new(HardwareGeneration::Cdna3),
        )
        .unwrap();
        let mut buffer = ShuffleBuffer::new(&config);

        // Fill every accumulator value with its block position.
        for wave in 0..config.num_waves() {
            let (wave_m, wave_n) = config.wave_position(wave);
            let mut acc = crate::components::tile::Accumulator::new(&config);
            for mx in 0..4 {
                for nx in 0..2 {
                    let tile = acc.tile_mut(mx, nx);
                    for row in 0..32 {
                        for col in 0..32 {
                            let block_row = config.block_row(mx, wave_m, row);
                            let block_col = config.block_col(nx, wave_n, col);
                            tile[(row * 32 + col) as usize] = (block_row * 1000 + block_col) as f32;
                        }
                    }
                }
            }
            buffer.write_wave(&config, wave, &acc, 2, 1);
        }

        for row in 0..buffer.rows() {
            for col in 0..buffer.cols() {
                let expected = (2 * 64 + row) * 1000 + 64 + col;
                assert_eq!(buffer.read(row, col), expected as f32);
            }
        }
    }
}
