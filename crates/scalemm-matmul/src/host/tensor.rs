use scalemm_common::Element;
use scalemm_common::rand::Rng;
use scalemm_runtime::ComputeClient;
use scalemm_runtime::server::ServerError;

use crate::components::{
    TensorArg, col_broadcast_strides, col_major_strides, required_len, row_broadcast_strides,
    row_major_strides,
};

/// Initialization of the values of a host tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TensorInit {
    Zero,
    /// Uniform integers, `[-5, 5]` for operands and `[0, 2]` for scales.
    Integer,
    /// Uniform decimals, `[-1, 1]` for operands and `[0, 1]` for scales.
    Decimal,
    Constant(f32),
}

/// What a tensor holds, selecting the value range of the random initializations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorRole {
    Operand,
    Scale,
}

impl TensorInit {
    /// Parses the numeric init method of the command line: 0 zero, 1 integer, 2 decimal.
    pub fn from_method(method: u8) -> Option<Self> {
        match method {
            0 => Some(TensorInit::Zero),
            1 => Some(TensorInit::Integer),
            2 => Some(TensorInit::Decimal),
            _ => None,
        }
    }

    pub fn sample<R: Rng>(&self, role: TensorRole, rng: &mut R) -> f32 {
        match (self, role) {
            (TensorInit::Zero, _) => 0.0,
            (TensorInit::Constant(value), _) => *value,
            (TensorInit::Integer, TensorRole::Operand) => rng.random_range(-5..=5) as f32,
            (TensorInit::Integer, TensorRole::Scale) => rng.random_range(0..=2) as f32,
            (TensorInit::Decimal, TensorRole::Operand) => rng.random_range(-1.0..=1.0),
            (TensorInit::Decimal, TensorRole::Scale) => rng.random_range(0.0..=1.0),
        }
    }
}

/// A strided `[batch, rows, cols]` tensor in host memory.
#[derive(Clone, Debug, PartialEq)]
pub struct HostTensor<E: Element> {
    data: Vec<E>,
    shape: [usize; 3],
    strides: [usize; 3],
}

impl<E: Element> HostTensor<E> {
    /// A zeroed tensor holding exactly the elements addressed by `strides`.
    pub fn new(shape: [usize; 3], strides: [usize; 3]) -> Self {
        Self {
            data: vec![E::zero(); required_len(&shape, &strides)],
            shape,
            strides,
        }
    }

    /// Wraps existing data.
    ///
    /// # Panics
    ///
    /// If `data` is too small for the strides.
    pub fn from_data(data: Vec<E>, shape: [usize; 3], strides: [usize; 3]) -> Self {
        let required = required_len(&shape, &strides);
        assert!(
            data.len() >= required,
            "{} elements can't hold a tensor addressing {required}",
            data.len()
        );

        Self {
            data,
            shape,
            strides,
        }
    }

    pub fn row_major(batches: usize, rows: usize, cols: usize) -> Self {
        Self::new([batches, rows, cols], row_major_strides(rows, cols))
    }

    pub fn col_major(batches: usize, rows: usize, cols: usize) -> Self {
        Self::new([batches, rows, cols], col_major_strides(rows, cols))
    }

    /// A scale holding one value per row, broadcast along the columns.
    pub fn row_broadcast(batches: usize, rows: usize, cols: usize) -> Self {
        Self::new([batches, rows, cols], row_broadcast_strides(rows))
    }

    /// A scale holding one value per column, broadcast along the rows.
    pub fn col_broadcast(batches: usize, rows: usize, cols: usize) -> Self {
        Self::new([batches, rows, cols], col_broadcast_strides(cols))
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    pub fn data(&self) -> &[E] {
        &self.data
    }

    fn index(&self, batch: usize, row: usize, col: usize) -> usize {
        debug_assert!(batch < self.shape[0] && row < self.shape[1] && col < self.shape[2]);
        batch * self.strides[0] + row * self.strides[1] + col * self.strides[2]
    }

    pub fn get(&self, batch: usize, row: usize, col: usize) -> E {
        self.data[self.index(batch, row, col)]
    }

    pub fn set(&mut self, batch: usize, row: usize, col: usize, value: E) {
        let index = self.index(batch, row, col);
        self.data[index] = value;
    }

    /// Copies one batch into a single-batch tensor with the same row and column strides.
    pub fn batch(&self, batch: usize) -> Self {
        let [_, rows, cols] = self.shape;
        let mut single = Self::new([1, rows, cols], self.strides);

        for row in 0..rows {
            for col in 0..cols {
                single.set(0, row, col, self.get(batch, row, col));
            }
        }

        single
    }

    /// Fills every stored element, padding included.
    pub fn fill<R: Rng>(&mut self, init: TensorInit, role: TensorRole, rng: &mut R) {
        for value in self.data.iter_mut() {
            *value = E::from_f32(init.sample(role, rng));
        }
    }

    pub fn with_init<R: Rng>(mut self, init: TensorInit, role: TensorRole, rng: &mut R) -> Self {
        self.fill(init, role, rng);
        self
    }

    /// Iterates `(batch, row, col)` over the logical shape in row-major order.
    pub fn indices(&self) -> impl Iterator<Item = (usize, usize, usize)> + use<E> {
        let [batches, rows, cols] = self.shape;
        (0..batches)
            .flat_map(move |batch| (0..rows).map(move |row| (batch, row)))
            .flat_map(move |(batch, row)| (0..cols).map(move |col| (batch, row, col)))
    }

    /// Uploads the tensor to the device of `client`.
    pub fn to_device(&self, client: &ComputeClient) -> TensorArg {
        TensorArg::new(
            client.create_from_slice(&self.data),
            E::ELEM,
            self.shape,
            self.strides,
        )
    }

    /// Reads a tensor back from the device, waiting for the default queue.
    pub fn from_device(client: &ComputeClient, arg: &TensorArg) -> Result<Self, ServerError> {
        let data = client.read_one_as::<E>(&arg.handle)?;
        Ok(Self::from_data(data, arg.shape, arg.strides))
    }
}
