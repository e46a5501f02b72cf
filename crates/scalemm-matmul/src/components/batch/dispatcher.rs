use scalemm_runtime::kernel::CubeCount;

use crate::components::MatmulProblem;

/// Offsets in elements of the matrices of one batch in every tensor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorOffsets {
    pub lhs: usize,
    pub rhs: usize,
    pub scales: Vec<usize>,
    pub out: usize,
}

impl TensorOffsets {
    fn scaled(&self, batch: usize) -> Self {
        Self {
            lhs: self.lhs * batch,
            rhs: self.rhs * batch,
            scales: self.scales.iter().map(|stride| stride * batch).collect(),
            out: self.out * batch,
        }
    }
}

/// Block tile computed by one cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CubeTile {
    pub batch: u32,
    /// Tile index along M.
    pub m: u32,
    /// Tile index along N.
    pub n: u32,
}

/// Flattens `(batch, m tile, n tile)` over the x axis of the launch grid.
///
/// Consecutive cubes cover the tiles of one batch in the configured global order, then move to
/// the next batch.
#[derive(Clone, Debug)]
pub struct BatchDispatcher {
    batches: u32,
    m_cubes: u32,
    n_cubes: u32,
    global_order: super::GlobalOrder,
    batch_strides: TensorOffsets,
}

impl BatchDispatcher {
    /// Creates the dispatcher of a problem tiled in `m_per_block x n_per_block` blocks.
    ///
    /// Fails if the global order can't cover the tiles of a batch or if the grid exceeds
    /// `max_cube_count`.
    pub fn new(
        problem: &MatmulProblem,
        m_per_block: u32,
        n_per_block: u32,
        global_order: super::GlobalOrder,
        batch_strides: TensorOffsets,
        max_cube_count: u64,
    ) -> Result<Self, String> {
        let m_cubes = problem.m.div_ceil(m_per_block as usize);
        let n_cubes = problem.n.div_ceil(n_per_block as usize);
        let num_cubes = problem.batches as u64 * m_cubes as u64 * n_cubes as u64;

        if num_cubes > max_cube_count.min(u32::MAX as u64) {
            return Err(format!(
                "{num_cubes} cubes exceed the launch limit of {max_cube_count}"
            ));
        }

        let (m_cubes, n_cubes) = (m_cubes as u32, n_cubes as u32);
        let global_order = global_order.canonicalize();
        global_order.validate(m_cubes, n_cubes)?;

        Ok(Self {
            batches: problem.batches as u32,
            m_cubes,
            n_cubes,
            global_order,
            batch_strides,
        })
    }

    /// One cube per `(batch, tile)` pair.
    pub fn cube_count(&self) -> CubeCount {
        CubeCount::new(self.batches * self.m_cubes * self.n_cubes, 1, 1)
    }

    pub fn cubes_per_batch(&self) -> u32 {
        self.m_cubes * self.n_cubes
    }

    /// Tile computed by the cube at linear position `absolute`.
    pub fn tile_of(&self, absolute: u64) -> CubeTile {
        let per_batch = self.cubes_per_batch() as u64;
        let batch = (absolute / per_batch) as u32;
        let (m, n) = self.global_order.tile_position(
            (absolute % per_batch) as u32,
            self.m_cubes,
            self.n_cubes,
        );

        CubeTile { batch, m, n }
    }

    /// Base offsets of `batch` in every tensor.
    ///
    /// # Panics
    ///
    /// If `batch` isn't smaller than the batch count of the launch.
    pub fn resolve(&self, batch: u32) -> TensorOffsets {
        assert!(
            batch < self.batches,
            "Batch index {batch} out of range for {} batches",
            self.batches
        );

        self.batch_strides.scaled(batch as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::batch::GlobalOrder;
    use hashbrown::HashSet;

    fn dispatcher(order: GlobalOrder) -> BatchDispatcher {
        BatchDispatcher::new(
            &MatmulProblem::new(3, 100, 64, 32),
            32,
            32,
            order,
            TensorOffsets {
                lhs: 3200,
                rhs: 2048,
                scales: vec![100, 0],
                out: 6400,
            },
            u32::MAX as u64,
        )
        .unwrap()
    }

    #[test]
    fn grid_covers_every_batch_tile_once() {
        for order in [
            GlobalOrder::RowMajor,
            GlobalOrder::ColMajor,
            GlobalOrder::SwizzleRowMajor(2),
            GlobalOrder::SwizzleColMajor(2),
        ] {
            let dispatcher = dispatcher(order);
            let count = dispatcher.cube_count();
            assert_eq!(count, CubeCount::new(24, 1, 1));

            let tiles: HashSet<CubeTile> = (0..count.num_cubes())
                .map(|absolute| dispatcher.tile_of(absolute))
                .collect();
            assert_eq!(tiles.len(), 24, "{order:?}");
            assert!(tiles.iter().all(|tile| tile.batch < 3 && tile.m < 4 && tile.n < 2));
        }
    }

    #[test]
    fn batch_offsets_follow_strides() {
        let dispatcher = dispatcher(GlobalOrder::RowMajor);

        assert_eq!(
            dispatcher.resolve(2),
            TensorOffsets {
                lhs: 6400,
                rhs: 4096,
                scales: vec![200, 0],
                out: 12800,
            }
        );
        assert_eq!(dispatcher.tile_of(9), CubeTile { batch: 1, m: 0, n: 1 });
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn batch_index_is_bound_checked() {
        dispatcher(GlobalOrder::RowMajor).resolve(3);
    }

    #[test]
    fn launch_limit_is_enforced() {
        let result = BatchDispatcher::new(
            &MatmulProblem::new(64, 256, 256, 32),
            32,
            32,
            GlobalOrder::RowMajor,
            TensorOffsets {
                lhs: 0,
                rhs: 0,
                scales: vec![],
                out: 0,
            },
            1024,
        );

        assert!(result.is_err());
    }
}
