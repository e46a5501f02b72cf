use crate::components::tiling::MatmulConfig;

/// `f32` partial sums of one wave: `MXdlPerWave x NXdlPerWave` instruction tiles, each
/// `MPerXdl x NPerXdl` row-major.
///
/// Owned by its wave for the whole kernel instance and never shared with another wave.
#[derive(Clone, Debug, PartialEq)]
pub struct Accumulator {
    values: Vec<f32>,
    n_xdl: u32,
    tile_rows: u32,
    tile_cols: u32,
}

impl Accumulator {
    /// A zeroed accumulator shaped after the wave tile of the config.
    pub fn new(config: &MatmulConfig) -> Self {
        let descriptor = config.descriptor();
        let num_tiles = descriptor.m_xdl_per_wave * descriptor.n_xdl_per_wave;
        let tile_len = descriptor.m_per_xdl * descriptor.n_per_xdl;

        Self {
            values: vec![0.0; (num_tiles * tile_len) as usize],
            n_xdl: descriptor.n_xdl_per_wave,
            tile_rows: descriptor.m_per_xdl,
            tile_cols: descriptor.n_per_xdl,
        }
    }

    fn tile_range(&self, mx: u32, nx: u32) -> core::ops::Range<usize> {
        let tile_len = (self.tile_rows * self.tile_cols) as usize;
        let start = (mx * self.n_xdl + nx) as usize * tile_len;
        start..start + tile_len
    }

    /// Instruction tile `(mx, nx)`, row-major.
    pub fn tile(&self, mx: u32, nx: u32) -> &[f32] {
        &self.values[self.tile_range(mx, nx)]
    }

    pub fn tile_mut(&mut self, mx: u32, nx: u32) -> &mut [f32] {
        let range = self.tile_range(mx, nx);
        &mut self.values[range]
    }

    /// Value at `(row, col)` of instruction tile `(mx, nx)`.
    pub fn get(&self, mx: u32, nx: u32, row: u32, col: u32) -> f32 {
        self.tile(mx, nx)[(row * self.tile_cols + col) as usize]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
