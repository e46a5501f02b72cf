use core::fmt::Display;

/// Elementwise operation fused after the accumulation.
///
/// The operation consumes the accumulator and one value per auxiliary tensor, in order, and
/// produces one output value. Every variant evaluates left to right in the precision of the
/// caller, so the kernel (`f32`) and the reference oracle (`f64`) apply the same formula.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ElementwiseOp {
    /// `acc`
    PassThrough,
    /// `acc * alpha`
    Scale { alpha: f32 },
    /// `acc + d0`
    Add,
    /// `acc * d0`
    Multiply,
    /// `acc * d0 * d1`
    #[default]
    MultiplyMultiply,
    /// `acc * d0 + d1`
    MultiplyAdd,
}

/// Broadcast axis of an auxiliary tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuxBroadcast {
    /// One value per row: zero stride along columns.
    PerRow,
    /// One value per column: zero stride along rows.
    PerCol,
}

impl AuxBroadcast {
    /// Whether `strides` (`[batch, row, col]`) broadcast along this axis.
    pub fn matches(&self, strides: &[usize; 3]) -> bool {
        match self {
            AuxBroadcast::PerRow => strides[2] == 0,
            AuxBroadcast::PerCol => strides[1] == 0,
        }
    }
}

impl ElementwiseOp {
    /// Number of auxiliary tensors consumed by the operation.
    pub fn num_aux(&self) -> usize {
        match self {
            ElementwiseOp::PassThrough | ElementwiseOp::Scale { .. } => 0,
            ElementwiseOp::Add | ElementwiseOp::Multiply => 1,
            ElementwiseOp::MultiplyMultiply | ElementwiseOp::MultiplyAdd => 2,
        }
    }

    /// Axis along which the auxiliary tensor at `index` must be broadcast, if any.
    ///
    /// The multiply-multiply epilogue rescales rows by `d0` and columns by `d1`, so both are
    /// broadcast vectors. Other operations accept any layout.
    pub fn aux_broadcast(&self, index: usize) -> Option<AuxBroadcast> {
        match (self, index) {
            (ElementwiseOp::MultiplyMultiply, 0) => Some(AuxBroadcast::PerRow),
            (ElementwiseOp::MultiplyMultiply, 1) => Some(AuxBroadcast::PerCol),
            _ => None,
        }
    }

    /// Applies the operation in `f32`.
    pub fn apply(&self, acc: f32, aux: &[f32]) -> f32 {
        match self {
            ElementwiseOp::PassThrough => acc,
            ElementwiseOp::Scale { alpha } => acc * alpha,
            ElementwiseOp::Add => acc + aux[0],
            ElementwiseOp::Multiply => acc * aux[0],
            ElementwiseOp::MultiplyMultiply => acc * aux[0] * aux[1],
            ElementwiseOp::MultiplyAdd => acc * aux[0] + aux[1],
        }
    }

    /// Applies the operation in `f64`.
    pub fn apply_f64(&self, acc: f64, aux: &[f64]) -> f64 {
        match self {
            ElementwiseOp::PassThrough => acc,
            ElementwiseOp::Scale { alpha } => acc * *alpha as f64,
            ElementwiseOp::Add => acc + aux[0],
            ElementwiseOp::Multiply => acc * aux[0],
            ElementwiseOp::MultiplyMultiply => acc * aux[0] * aux[1],
            ElementwiseOp::MultiplyAdd => acc * aux[0] + aux[1],
        }
    }
}

impl Display for ElementwiseOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ElementwiseOp::PassThrough => f.write_str("PassThrough"),
            ElementwiseOp::Scale { alpha } => write!(f, "Scale({alpha})"),
            ElementwiseOp::Add => f.write_str("Add"),
            ElementwiseOp::Multiply => f.write_str("Multiply"),
            ElementwiseOp::MultiplyMultiply => f.write_str("MultiplyMultiply"),
            ElementwiseOp::MultiplyAdd => f.write_str("MultiplyAdd"),
        }
    }
}
