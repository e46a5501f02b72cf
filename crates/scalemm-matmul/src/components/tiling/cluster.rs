/// Arrangement of the units of a cube over the dimensions of a tile.
///
/// `arrange_order` lists the dimensions from slowest to fastest varying unit index: consecutive
/// units move along the last dimension of the order first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadCluster<const N: usize> {
    lengths: [u32; N],
    arrange_order: [usize; N],
}

impl<const N: usize> ThreadCluster<N> {
    /// Creates a cluster, returning `None` if the order isn't a permutation of the dimensions.
    pub fn new(lengths: [u32; N], arrange_order: [usize; N]) -> Option<Self> {
        match is_permutation(&arrange_order) {
            true => Some(Self {
                lengths,
                arrange_order,
            }),
            false => None,
        }
    }

    /// A cluster where the last dimension varies fastest.
    pub fn ordered(lengths: [u32; N]) -> Self {
        Self {
            lengths,
            arrange_order: core::array::from_fn(|dim| dim),
        }
    }

    pub fn lengths(&self) -> [u32; N] {
        self.lengths
    }

    /// Number of units in the cluster.
    pub fn num_units(&self) -> u32 {
        self.lengths.iter().product()
    }

    /// Position of `unit` in the cluster.
    pub fn position(&self, unit: u32) -> [u32; N] {
        let mut remaining = unit;
        let mut position = [0; N];

        for &dim in self.arrange_order.iter().rev() {
            position[dim] = remaining % self.lengths[dim];
            remaining /= self.lengths[dim];
        }

        position
    }
}

/// Whether `order` contains every dimension exactly once.
pub fn is_permutation<const N: usize>(order: &[usize; N]) -> bool {
    let mut seen = [false; N];

    for &dim in order {
        if dim >= N || seen[dim] {
            return false;
        }
        seen[dim] = true;
    }

    true
}
