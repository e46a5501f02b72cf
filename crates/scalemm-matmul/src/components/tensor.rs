use scalemm_common::ElemType;
use scalemm_runtime::storage::Handle;

/// Memory layout of a matrix, derived from its strides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixLayout {
    /// Columns are contiguous.
    RowMajor,
    /// Rows are contiguous.
    ColMajor,
    /// Neither dimension is contiguous.
    Strided,
}

/// A strided batched matrix in device memory.
///
/// Shapes and strides are `[batch, rows, cols]`, strides are in elements. A zero stride
/// broadcasts the tensor along that dimension.
#[derive(new, Clone, Debug)]
pub struct TensorArg {
    pub handle: Handle,
    pub elem: ElemType,
    pub shape: [usize; 3],
    pub strides: [usize; 3],
}

impl TensorArg {
    /// Layout tag of the matrices. A broadcast dimension counts as contiguous.
    pub fn layout(&self) -> MatrixLayout {
        match self.strides {
            [_, _, 1] => MatrixLayout::RowMajor,
            [_, 1, _] => MatrixLayout::ColMajor,
            [_, _, 0] => MatrixLayout::RowMajor,
            [_, 0, _] => MatrixLayout::ColMajor,
            _ => MatrixLayout::Strided,
        }
    }

    /// Offset in elements of `[batch, row, col]`.
    pub fn offset(&self, batch: usize, row: usize, col: usize) -> usize {
        batch * self.strides[0] + row * self.strides[1] + col * self.strides[2]
    }

    /// Number of elements the buffer must hold to cover every index of the shape.
    pub fn required_len(&self) -> usize {
        required_len(&self.shape, &self.strides)
    }
}

/// Number of elements needed to hold every index of `shape` with `strides`.
pub fn required_len(shape: &[usize; 3], strides: &[usize; 3]) -> usize {
    if shape.contains(&0) {
        return 0;
    }

    shape
        .iter()
        .zip(strides.iter())
        .map(|(dim, stride)| (dim - 1) * stride)
        .sum::<usize>()
        + 1
}

/// Packed row-major strides for `[batch, rows, cols]`.
pub fn row_major_strides(rows: usize, cols: usize) -> [usize; 3] {
    [rows * cols, cols, 1]
}

/// Packed column-major strides for `[batch, rows, cols]`.
pub fn col_major_strides(rows: usize, cols: usize) -> [usize; 3] {
    [rows * cols, 1, rows]
}

/// Strides of a scale varying only with the row, one vector of `rows` values per batch.
pub fn row_broadcast_strides(rows: usize) -> [usize; 3] {
    [rows, 1, 0]
}

/// Strides of a scale varying only with the column, one vector of `cols` values per batch.
pub fn col_broadcast_strides(cols: usize) -> [usize; 3] {
    [cols, 0, 1]
}
