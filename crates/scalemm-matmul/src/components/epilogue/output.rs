use scalemm_common::Element;

/// The narrowed output of one block tile, staged before it is committed to global memory.
///
/// Every element inside the problem extents must be written exactly once. Elements of a partial
/// tile outside of the extents are never written nor committed.
#[derive(Debug)]
pub struct OutputTile<E: Element> {
    row_origin: usize,
    col_origin: usize,
    rows: usize,
    cols: usize,
    extent_rows: usize,
    extent_cols: usize,
    values: Vec<E>,
    written: Vec<bool>,
}

impl<E: Element> OutputTile<E> {
    /// A `rows x cols` tile at `(row_origin, col_origin)` of an `m x n` output.
    pub fn new(
        row_origin: usize,
        col_origin: usize,
        rows: usize,
        cols: usize,
        m: usize,
        n: usize,
    ) -> Self {
        Self {
            row_origin,
            col_origin,
            rows,
            cols,
            extent_rows: m.saturating_sub(row_origin).min(rows),
            extent_cols: n.saturating_sub(col_origin).min(cols),
            values: vec![E::zero(); rows * cols],
            written: vec![false; rows * cols],
        }
    }

    /// Whether block position `(row, col)` is inside the problem.
    pub fn in_bounds(&self, row: u32, col: u32) -> bool {
        (row as usize) < self.extent_rows && (col as usize) < self.extent_cols
    }

    /// Writes the value at block position `(row, col)`.
    ///
    /// # Panics
    ///
    /// If the position is outside of the problem or was already written.
    pub fn write(&mut self, row: u32, col: u32, value: E) {
        assert!(
            self.in_bounds(row, col),
            "Output element ({row}, {col}) is outside of the problem"
        );
        let index = row as usize * self.cols + col as usize;
        assert!(
            !self.written[index],
            "Output element ({}, {}) written twice",
            self.row_origin + row as usize,
            self.col_origin + col as usize
        );

        self.written[index] = true;
        self.values[index] = value;
    }

    /// Whether every element inside the problem was written.
    pub fn is_complete(&self) -> bool {
        (0..self.extent_rows).all(|row| {
            self.written[row * self.cols..row * self.cols + self.extent_cols]
                .iter()
                .all(|written| *written)
        })
    }

    /// Value at block position `(row, col)`, if written.
    pub fn get(&self, row: u32, col: u32) -> Option<E> {
        let index = row as usize * self.cols + col as usize;
        self.written[index].then(|| self.values[index])
    }

    /// Copies the tile into the output buffer of one batch, `offset` being the batch base and
    /// `strides` the `[row, col]` strides in elements.
    pub fn commit(&self, out: &mut [E], offset: usize, strides: [usize; 2]) {
        debug_assert!(self.is_complete(), "Output tile committed before completion");

        for row in 0..self.extent_rows {
            let row_offset = offset + (self.row_origin + row) * strides[0];

            for col in 0..self.extent_cols {
                let index = row * self.cols + col;
                if self.written[index] {
                    out[row_offset + (self.col_origin + col) * strides[1]] = self.values[index];
                }
            }
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tile_commits_only_its_extent() {
        let mut tile = OutputTile::<f32>::new(2, 2, 4, 4, 5, 3);
        assert!(tile.in_bounds(2, 0));
        assert!(!tile.in_bounds(3, 0));
        assert!(!tile.in_bounds(0, 1));

        for row in 0..3 {
            tile.write(row, 0, (row + 1) as f32);
        }
        assert!(tile.is_complete());

        let mut out = vec![0.0; 15];
        tile.commit(&mut out, 0, [3, 1]);

        assert_eq!(out[2 * 3 + 2], 1.0);
        assert_eq!(out[3 * 3 + 2], 2.0);
        assert_eq!(out[4 * 3 + 2], 3.0);
        assert_eq!(out.iter().sum::<f32>(), 6.0);
    }

    #[test]
    #[should_panic(expected = "written twice")]
    fn double_write_is_a_contract_violation() {
        let mut tile = OutputTile::<f32>::new(0, 0, 2, 2, 2, 2);
        tile.write(1, 1, 1.0);
        tile.write(1, 1, 2.0);
    }
}
