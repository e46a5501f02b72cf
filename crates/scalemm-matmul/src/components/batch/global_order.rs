/// Order in which the block tiles of one batch are handed to consecutive cubes.
///
/// The swizzled orders walk strips of `w` tiles in a zigzag so that neighbouring cubes share
/// operand rows or columns. A step of 1 is the plain order.
#[derive(Default, Copy, Clone, Debug, Hash, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalOrder {
    #[default]
    RowMajor,
    ColMajor,
    /// Horizontal strips `w` rows tall.
    SwizzleRowMajor(u32),
    /// Vertical strips `w` columns wide.
    SwizzleColMajor(u32),
}

impl GlobalOrder {
    /// Rewrites swizzles of step 1 as their plain order.
    pub fn canonicalize(self) -> Self {
        match self {
            GlobalOrder::SwizzleRowMajor(1) => GlobalOrder::RowMajor,
            GlobalOrder::SwizzleColMajor(1) => GlobalOrder::ColMajor,
            other => other,
        }
    }

    /// Checks that the strips tile the `m_cubes x n_cubes` grid exactly.
    pub fn validate(&self, m_cubes: u32, n_cubes: u32) -> Result<(), String> {
        let (width, across) = match self.canonicalize() {
            GlobalOrder::RowMajor | GlobalOrder::ColMajor => return Ok(()),
            GlobalOrder::SwizzleRowMajor(w) => (w, m_cubes),
            GlobalOrder::SwizzleColMajor(w) => (w, n_cubes),
        };

        match width {
            0 => Err("Swizzle strips can't be empty.".to_string()),
            w if !across.is_multiple_of(w) => Err(format!(
                "{self:?} needs a grid extent divisible by {w}, got {across} cubes."
            )),
            _ => Ok(()),
        }
    }

    /// Position `(m, n)` of the tile visited at `index` within a batch of `m_cubes x n_cubes`
    /// tiles.
    pub fn tile_position(&self, index: u32, m_cubes: u32, n_cubes: u32) -> (u32, u32) {
        match self.canonicalize() {
            GlobalOrder::RowMajor => (index / n_cubes, index % n_cubes),
            GlobalOrder::ColMajor => (index % m_cubes, index / m_cubes),
            GlobalOrder::SwizzleRowMajor(w) => {
                let (n, m) = zigzag(index, n_cubes, w);
                (m, n)
            }
            GlobalOrder::SwizzleColMajor(w) => zigzag(index, m_cubes, w),
        }
    }
}

/// Walks strips of `width` tiles that are `length` tiles long.
///
/// Returns the position along the strip and the absolute position across strips. Odd strips are
/// walked backwards, and every odd row of a strip runs in the opposite direction.
fn zigzag(index: u32, length: u32, width: u32) -> (u32, u32) {
    debug_assert!(width > 0);

    let strip_len = length * width;
    let strip = index / strip_len;
    let row = (index % strip_len) / width;
    let col = index % width;

    let along = match strip % 2 {
        0 => row,
        _ => length - 1 - row,
    };
    let across = match row % 2 {
        0 => col,
        _ => width - 1 - col,
    };

    (along, strip * width + across)
}
