use core::fmt::Display;

use crate::components::batch::GlobalOrder;
use crate::components::epilogue::ElementwiseOp;

/// Overlap strategy between the loads of the next stage and the matrix instructions of the
/// current one. Never changes the numeric result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineScheduler {
    /// Each wave issues its share of the next loads, then all of its instructions.
    #[default]
    Interwave,
    /// Each wave interleaves chunks of its loads between its instructions.
    Intrawave,
}

/// Depth of the multi-buffered main loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVersion {
    /// Two scratch buffers, one stage loaded ahead.
    #[default]
    V1,
    /// Three scratch buffers, two stages loaded ahead.
    V2,
}

impl PipelineVersion {
    /// Number of scratch buffers per operand.
    pub fn num_stages(&self) -> u32 {
        match self {
            PipelineVersion::V1 => 2,
            PipelineVersion::V2 => 3,
        }
    }

    /// Number of stages loaded ahead of the one being computed.
    pub fn prefetch_depth(&self) -> u32 {
        self.num_stages() - 1
    }
}

/// How problem extents that aren't multiples of the block shape are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemmSpecialization {
    /// M, N and K must be multiples of the block shape.
    #[default]
    Default,
    /// Out-of-range reads are zero and out-of-range writes are skipped.
    MNKPadding,
}

/// Transfer of an operand tile from global memory to scratch memory.
///
/// Dimensions are `[K0, MN, K1]` where `K = K0 * K1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockTransfer {
    /// Units along each dimension.
    pub cluster_lengths: [u32; 3],
    /// Dimensions from slowest to fastest varying unit index.
    pub cluster_arrange_order: [usize; 3],
    /// Order in which a unit walks its slice, slowest first.
    pub src_access_order: [usize; 3],
    /// Dimension of the vectorized global reads: 1 (MN) or 2 (K1).
    pub src_vector_dim: usize,
    pub src_scalar_per_vector: u32,
    /// Width of the vectorized scratch writes along K1.
    pub dst_scalar_per_vector_k1: u32,
    /// Pads each K0 slab of the scratch tile by one MN row.
    #[serde(default)]
    pub lds_add_extra_mn: bool,
}

/// Transfer of the accumulators through scratch memory to the output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ShuffleTransfer {
    pub m_xdl_per_wave_per_shuffle: u32,
    pub n_xdl_per_wave_per_shuffle: u32,
    /// Units over `[1, M, 1, N]` of the shuffle tile.
    pub cluster_lengths: [u32; 4],
    /// Vector width along N of each auxiliary tensor, then of the output.
    pub scalar_per_vector: Vec<u32>,
}

/// Static tiling geometry of a scaled matmul instance.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TileDescriptor {
    /// Units per cube.
    pub block_size: u32,
    pub m_per_block: u32,
    pub n_per_block: u32,
    pub k_per_block: u32,
    /// K1 of the lhs scratch tile.
    pub ak1: u32,
    /// K1 of the rhs scratch tile.
    pub bk1: u32,
    /// Output tile of one matrix instruction.
    pub m_per_xdl: u32,
    pub n_per_xdl: u32,
    /// Matrix instructions per wave along each axis.
    pub m_xdl_per_wave: u32,
    pub n_xdl_per_wave: u32,
    pub a_transfer: BlockTransfer,
    pub b_transfer: BlockTransfer,
    pub c_shuffle: ShuffleTransfer,
    #[serde(default)]
    pub scheduler: PipelineScheduler,
    #[serde(default)]
    pub version: PipelineVersion,
    #[serde(default)]
    pub specialization: GemmSpecialization,
    #[serde(default)]
    pub epilogue: ElementwiseOp,
    #[serde(default)]
    pub global_order: GlobalOrder,
}

impl BlockTransfer {
    /// K-contiguous transfer arranged `[1, 0, 2]` with vectors of `vector` elements.
    pub fn k_contiguous(cluster_lengths: [u32; 3], vector: u32) -> Self {
        Self {
            cluster_lengths,
            cluster_arrange_order: [1, 0, 2],
            src_access_order: [1, 0, 2],
            src_vector_dim: 2,
            src_scalar_per_vector: vector,
            dst_scalar_per_vector_k1: vector,
            lds_add_extra_mn: true,
        }
    }
}

impl TileDescriptor {
    /// The reference instance: 256 units, 256x128x32 blocks, 32x32 instructions with 4x2 per
    /// wave, interwave scheduling on a two-stage pipeline.
    pub fn reference() -> Self {
        Self {
            block_size: 256,
            m_per_block: 256,
            n_per_block: 128,
            k_per_block: 32,
            ak1: 8,
            bk1: 8,
            m_per_xdl: 32,
            n_per_xdl: 32,
            m_xdl_per_wave: 4,
            n_xdl_per_wave: 2,
            a_transfer: BlockTransfer::k_contiguous([4, 64, 1], 8),
            b_transfer: BlockTransfer::k_contiguous([4, 64, 1], 8),
            c_shuffle: ShuffleTransfer {
                m_xdl_per_wave_per_shuffle: 1,
                n_xdl_per_wave_per_shuffle: 1,
                cluster_lengths: [1, 32, 1, 8],
                scalar_per_vector: vec![8, 8, 1],
            },
            scheduler: PipelineScheduler::Interwave,
            version: PipelineVersion::V1,
            specialization: GemmSpecialization::Default,
            epilogue: ElementwiseOp::MultiplyMultiply,
            global_order: GlobalOrder::RowMajor,
        }
    }

    /// A single wave64 cube computing 32x32x32 blocks with 16x16 instructions.
    pub fn cdna3_small() -> Self {
        Self {
            block_size: 64,
            m_per_block: 32,
            n_per_block: 32,
            k_per_block: 32,
            ak1: 8,
            bk1: 8,
            m_per_xdl: 16,
            n_per_xdl: 16,
            m_xdl_per_wave: 2,
            n_xdl_per_wave: 2,
            a_transfer: BlockTransfer::k_contiguous([4, 16, 1], 8),
            b_transfer: BlockTransfer::k_contiguous([4, 16, 1], 8),
            c_shuffle: ShuffleTransfer {
                m_xdl_per_wave_per_shuffle: 1,
                n_xdl_per_wave_per_shuffle: 1,
                cluster_lengths: [1, 16, 1, 4],
                scalar_per_vector: vec![4, 4, 4],
            },
            ..Self::reference()
        }
    }

    /// Four wave32 waves computing 64x64x32 blocks with 16x16x16 WMMA instructions.
    pub fn rdna4_wmma() -> Self {
        Self {
            block_size: 128,
            m_per_block: 64,
            n_per_block: 64,
            k_per_block: 32,
            ak1: 8,
            bk1: 8,
            m_per_xdl: 16,
            n_per_xdl: 16,
            m_xdl_per_wave: 2,
            n_xdl_per_wave: 2,
            a_transfer: BlockTransfer::k_contiguous([4, 32, 1], 8),
            b_transfer: BlockTransfer::k_contiguous([4, 32, 1], 8),
            c_shuffle: ShuffleTransfer {
                m_xdl_per_wave_per_shuffle: 1,
                n_xdl_per_wave_per_shuffle: 1,
                cluster_lengths: [1, 16, 1, 8],
                scalar_per_vector: vec![4, 4, 4],
            },
            ..Self::reference()
        }
    }

    /// Four wave32 waves computing 32x32x16 blocks with scalar multiply-adds.
    pub fn generic_fma() -> Self {
        Self {
            block_size: 128,
            m_per_block: 32,
            n_per_block: 32,
            k_per_block: 16,
            ak1: 4,
            bk1: 4,
            m_per_xdl: 16,
            n_per_xdl: 16,
            m_xdl_per_wave: 1,
            n_xdl_per_wave: 1,
            a_transfer: BlockTransfer::k_contiguous([4, 32, 1], 4),
            b_transfer: BlockTransfer::k_contiguous([4, 32, 1], 4),
            c_shuffle: ShuffleTransfer {
                m_xdl_per_wave_per_shuffle: 1,
                n_xdl_per_wave_per_shuffle: 1,
                cluster_lengths: [1, 16, 1, 8],
                scalar_per_vector: vec![4, 4, 4],
            },
            ..Self::reference()
        }
    }

    pub fn with_scheduler(mut self, scheduler: PipelineScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_version(mut self, version: PipelineVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_specialization(mut self, specialization: GemmSpecialization) -> Self {
        self.specialization = specialization;
        self
    }

    pub fn with_global_order(mut self, global_order: GlobalOrder) -> Self {
        self.global_order = global_order.canonicalize();
        self
    }

    /// Sets the output vector width.
    pub fn with_out_vector(mut self, vector: u32) -> Self {
        if let Some(last) = self.c_shuffle.scalar_per_vector.last_mut() {
            *last = vector;
        }
        self
    }

    /// Replaces the epilogue, keeping one auxiliary vector width per auxiliary tensor.
    ///
    /// New auxiliary tensors reuse the width of the first existing one, or the output width.
    pub fn with_epilogue(mut self, epilogue: ElementwiseOp) -> Self {
        let vectors = &self.c_shuffle.scalar_per_vector;
        let out_vector = vectors.last().copied().unwrap_or(1);
        let aux_vector = match vectors.len() > 1 {
            true => vectors[0],
            false => out_vector,
        };

        self.c_shuffle.scalar_per_vector = core::iter::repeat_n(aux_vector, epilogue.num_aux())
            .chain(core::iter::once(out_vector))
            .collect();
        self.epilogue = epilogue;
        self
    }
}

impl Display for TileDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}, {}x{}x{}, {}x{}, {}x{}, {}x{}, {:?}, {:?}, {:?}, {}",
            self.block_size,
            self.m_per_block,
            self.n_per_block,
            self.k_per_block,
            self.ak1,
            self.bk1,
            self.m_per_xdl,
            self.n_per_xdl,
            self.m_xdl_per_wave,
            self.n_xdl_per_wave,
            self.scheduler,
            self.version,
            self.specialization,
            self.epilogue,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_epilogue_resizes_vectors() {
        let descriptor = TileDescriptor::reference().with_epilogue(ElementwiseOp::PassThrough);
        assert_eq!(descriptor.c_shuffle.scalar_per_vector, vec![1]);

        let descriptor = TileDescriptor::reference().with_epilogue(ElementwiseOp::Add);
        assert_eq!(descriptor.c_shuffle.scalar_per_vector, vec![8, 1]);
    }

    #[test]
    fn pipeline_versions_prefetch() {
        assert_eq!(PipelineVersion::V1.prefetch_depth(), 1);
        assert_eq!(PipelineVersion::V2.num_stages(), 3);
    }

    #[test]
    fn descriptor_round_trips_through_toml() {
        let descriptor = TileDescriptor::reference()
            .with_scheduler(PipelineScheduler::Intrawave)
            .with_global_order(GlobalOrder::SwizzleRowMajor(2));

        let content = toml::to_string(&descriptor).unwrap();
        let parsed: TileDescriptor = toml::from_str(&content).unwrap();

        assert_eq!(parsed, descriptor);
    }
}
