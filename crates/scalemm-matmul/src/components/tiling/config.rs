use scalemm_common::ElemType;
use scalemm_runtime::kernel::CubeDim;
use scalemm_runtime::properties::DeviceProperties;

use crate::components::tile::{MatrixAccelerateBackend, MmaInstruction, backend_for};
use crate::components::{
    FormattedConfigError, MatmulAvailabilityError, MatmulElems, MatmulIdent, MatmulSetupError,
};

use super::{BlockTransfer, ThreadCluster, TileDescriptor, cluster::is_permutation};

/// Derived geometry of an operand transfer into scratch memory.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    pub ident: MatmulIdent,
    /// `[K0, MN, K1]` extents of the block tile.
    pub tile: [u32; 3],
    pub cluster: ThreadCluster<3>,
    /// Elements handled by one unit along each dimension.
    pub thread_slice: [u32; 3],
    pub access_order: [usize; 3],
    pub src_vector_dim: usize,
    pub src_vector: u32,
    pub dst_vector: u32,
    /// Extra MN rows at the end of each K0 slab of the scratch tile.
    pub pad_rows: u32,
    pub elem_size: usize,
}

impl TransferConfig {
    fn new(
        ident: MatmulIdent,
        transfer: &BlockTransfer,
        mn: u32,
        k_per_block: u32,
        k1: u32,
        elem: ElemType,
    ) -> Result<Self, MatmulSetupError> {
        let tile = [k_per_block / k1, mn, k1];
        let cluster = ThreadCluster::new(transfer.cluster_lengths, transfer.cluster_arrange_order)
            .ok_or_else(|| {
                let order = transfer.cluster_arrange_order;
                FormattedConfigError::new(move || {
                    format!("{ident} cluster arrange order {order:?} is not a permutation")
                })
            })?;

        if !is_permutation(&transfer.src_access_order) {
            let order = transfer.src_access_order;
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || format!("{ident} source access order {order:?} is not a permutation"),
            )));
        }

        let lengths = transfer.cluster_lengths;
        if lengths.contains(&0) || (0..3).any(|dim| !tile[dim].is_multiple_of(lengths[dim])) {
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "{ident} tile [K0, MN, K1]={tile:?} can't be split evenly over the cluster {lengths:?}"
                    )
                },
            )));
        }
        let thread_slice: [u32; 3] = core::array::from_fn(|dim| tile[dim] / lengths[dim]);

        if !matches!(transfer.src_vector_dim, 1 | 2) {
            let dim = transfer.src_vector_dim;
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || format!("{ident} source vector dim must be 1 (MN) or 2 (K1), got {dim}"),
            )));
        }

        let src_vector = transfer.src_scalar_per_vector;
        let slice_along_src = thread_slice[transfer.src_vector_dim];
        if src_vector == 0 || !slice_along_src.is_multiple_of(src_vector) {
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "{ident} source vector width {src_vector} must divide the unit slice {thread_slice:?} along its vector dim"
                    )
                },
            )));
        }

        let dst_vector = transfer.dst_scalar_per_vector_k1;
        if dst_vector == 0 || !thread_slice[2].is_multiple_of(dst_vector) {
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "{ident} destination vector width {dst_vector} must divide the unit slice {thread_slice:?} along K1"
                    )
                },
            )));
        }

        Ok(Self {
            ident,
            tile,
            cluster,
            thread_slice,
            access_order: transfer.src_access_order,
            src_vector_dim: transfer.src_vector_dim,
            src_vector,
            dst_vector,
            pad_rows: transfer.lds_add_extra_mn as u32,
            elem_size: elem.size(),
        })
    }

    /// Elements of one scratch buffer, padding included.
    pub fn stage_len(&self) -> usize {
        let [k0, mn, k1] = self.tile;
        k0 as usize * (mn + self.pad_rows) as usize * k1 as usize
    }

    /// Bytes of one scratch buffer.
    pub fn stage_bytes(&self) -> usize {
        self.stage_len() * self.elem_size
    }

    /// Elements loaded by one unit per stage.
    pub fn slice_len(&self) -> u32 {
        self.thread_slice.iter().product()
    }

    /// Index in the scratch buffer of element `(k, mn)` of the block tile.
    pub fn stage_index(&self, k: u32, mn: u32) -> usize {
        let [_, rows, k1] = self.tile;
        let (k0, k1_pos) = (k / k1, k % k1);
        ((k0 * (rows + self.pad_rows) + mn) * k1 + k1_pos) as usize
    }
}

/// Derived geometry of the shuffle of the accumulators to the output.
#[derive(Clone, Debug)]
pub struct ShuffleConfig {
    pub m_xdl_per_shuffle: u32,
    pub n_xdl_per_shuffle: u32,
    /// Rows of the block covered by one shuffle step.
    pub rows: u32,
    /// Columns of the block covered by one shuffle step.
    pub cols: u32,
    pub cluster: ThreadCluster<4>,
    pub slice_rows: u32,
    pub slice_cols: u32,
    pub aux_vectors: Vec<u32>,
    pub out_vector: u32,
}

impl ShuffleConfig {
    /// Bytes of the `f32` shuffle buffer.
    pub fn buffer_bytes(&self) -> usize {
        self.rows as usize * self.cols as usize * size_of::<f32>()
    }
}

/// A tile descriptor validated against a device and element types.
///
/// Can only be built by [`MatmulConfig::new`], so every instance satisfies the tiling, vector
/// width, scratch memory and register constraints of its device.
#[derive(Clone, Debug)]
pub struct MatmulConfig {
    descriptor: TileDescriptor,
    elems: MatmulElems,
    backend: &'static dyn MatrixAccelerateBackend,
    instruction: MmaInstruction,
    plane_size: u32,
    m_waves: u32,
    n_waves: u32,
    lhs: TransferConfig,
    rhs: TransferConfig,
    shuffle: ShuffleConfig,
}

impl MatmulConfig {
    /// Validates the descriptor for the element types on the device.
    pub fn new(
        descriptor: TileDescriptor,
        elems: MatmulElems,
        properties: &DeviceProperties,
    ) -> Result<Self, MatmulSetupError> {
        let d = &descriptor;

        if !elems.is_supported()
            || ![elems.lhs, elems.rhs, elems.scale, elems.out]
                .into_iter()
                .all(|elem| properties.type_supported(elem))
        {
            return Err(elems.unavailable().into());
        }

        if d.block_size == 0 || d.block_size > properties.hardware.max_units_per_cube {
            return Err(
                MatmulAvailabilityError::CubeDimTooBig(CubeDim::new_1d(d.block_size)).into(),
            );
        }

        let backend = backend_for(properties.generation);
        let plane_size = properties.hardware.plane_size;
        if !backend.supports_plane_size(plane_size) {
            return Err(MatmulAvailabilityError::PlaneDimUnsupported {
                plane_dim: plane_size,
                backend: backend.name(),
            }
            .into());
        }

        let instruction = backend.instruction(
            properties,
            elems.lhs,
            elems.rhs,
            d.m_per_xdl,
            d.n_per_xdl,
            d.k_per_block,
        )?;

        let wave_m = d.m_xdl_per_wave * d.m_per_xdl;
        let wave_n = d.n_xdl_per_wave * d.n_per_xdl;
        if wave_m == 0
            || wave_n == 0
            || !d.m_per_block.is_multiple_of(wave_m)
            || !d.n_per_block.is_multiple_of(wave_n)
        {
            let (m_per_block, n_per_block) = (d.m_per_block, d.n_per_block);
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "Block {m_per_block}x{n_per_block} must be a multiple of the wave tile {wave_m}x{wave_n}"
                    )
                },
            )));
        }

        let m_waves = d.m_per_block / wave_m;
        let n_waves = d.n_per_block / wave_n;
        if m_waves * n_waves * plane_size != d.block_size {
            let block_size = d.block_size;
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "Block size {block_size} must equal {m_waves}x{n_waves} waves of {plane_size} units"
                    )
                },
            )));
        }

        let k_per_block = d.k_per_block;
        let (ak1, bk1) = (d.ak1, d.bk1);
        if ak1 == 0
            || bk1 == 0
            || k_per_block == 0
            || !k_per_block.is_multiple_of(ak1)
            || !k_per_block.is_multiple_of(bk1)
            || !k_per_block.is_multiple_of(instruction.k)
        {
            let instruction_k = instruction.k;
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "K per block {k_per_block} must be a multiple of AK1={ak1}, BK1={bk1} and the instruction k={instruction_k}"
                    )
                },
            )));
        }

        let lhs = TransferConfig::new(
            MatmulIdent::Lhs,
            &d.a_transfer,
            d.m_per_block,
            k_per_block,
            ak1,
            elems.lhs,
        )?;
        let rhs = TransferConfig::new(
            MatmulIdent::Rhs,
            &d.b_transfer,
            d.n_per_block,
            k_per_block,
            bk1,
            elems.rhs,
        )?;

        for transfer in [&lhs, &rhs] {
            let units = transfer.cluster.num_units();
            if units != d.block_size {
                let (ident, block_size) = (transfer.ident, d.block_size);
                return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                    move || {
                        format!(
                            "{ident} transfer cluster has {units} units, block size is {block_size}"
                        )
                    },
                )));
            }
        }

        let shuffle = Self::shuffle_config(d, m_waves, n_waves)?;

        let num_aux = d.epilogue.num_aux();
        if shuffle.aux_vectors.len() != num_aux {
            let (epilogue, num_vectors) = (d.epilogue, shuffle.aux_vectors.len());
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "Epilogue {epilogue} reads {num_aux} auxiliary tensors, but {num_vectors} vector widths are configured"
                    )
                },
            )));
        }

        let available = properties.hardware.max_shared_memory_size;
        let stages = d.version.num_stages() as usize;
        let required = stages * (lhs.stage_bytes() + rhs.stage_bytes());
        for required in [required, shuffle.buffer_bytes()] {
            if required > available {
                return Err(MatmulAvailabilityError::SharedMemoryOvercommit {
                    required,
                    available,
                }
                .into());
            }
        }

        let config = Self {
            descriptor,
            elems,
            backend,
            instruction,
            plane_size,
            m_waves,
            n_waves,
            lhs,
            rhs,
            shuffle,
        };

        let required = config.registers_per_unit();
        let available = properties.hardware.max_registers_per_unit;
        if required > available {
            return Err(MatmulAvailabilityError::RegisterOvercommit {
                required,
                available,
            }
            .into());
        }

        log::debug!("Validated matmul config {}", config.descriptor);

        Ok(config)
    }

    fn shuffle_config(
        d: &TileDescriptor,
        m_waves: u32,
        n_waves: u32,
    ) -> Result<ShuffleConfig, MatmulSetupError> {
        let shuffle = &d.c_shuffle;
        let (m_shuffle, n_shuffle) = (
            shuffle.m_xdl_per_wave_per_shuffle,
            shuffle.n_xdl_per_wave_per_shuffle,
        );

        if m_shuffle == 0
            || n_shuffle == 0
            || !d.m_xdl_per_wave.is_multiple_of(m_shuffle)
            || !d.n_xdl_per_wave.is_multiple_of(n_shuffle)
        {
            let (m_xdl, n_xdl) = (d.m_xdl_per_wave, d.n_xdl_per_wave);
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "Instructions per wave {m_xdl}x{n_xdl} must be a multiple of the instructions per shuffle {m_shuffle}x{n_shuffle}"
                    )
                },
            )));
        }

        let lengths = shuffle.cluster_lengths;
        let cluster = ThreadCluster::ordered(lengths);
        if cluster.num_units() != d.block_size || lengths[0] != 1 || lengths[2] != 1 {
            let block_size = d.block_size;
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "Shuffle cluster {lengths:?} must have the shape [1, M, 1, N] and {block_size} units"
                    )
                },
            )));
        }

        let rows = m_shuffle * m_waves * d.m_per_xdl;
        let cols = n_shuffle * n_waves * d.n_per_xdl;
        let (cluster_m, cluster_n) = (lengths[1], lengths[3]);
        if !rows.is_multiple_of(cluster_m) || !cols.is_multiple_of(cluster_n) {
            return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                move || {
                    format!(
                        "Shuffle tile {rows}x{cols} can't be split evenly over the cluster {cluster_m}x{cluster_n}"
                    )
                },
            )));
        }
        let (slice_rows, slice_cols) = (rows / cluster_m, cols / cluster_n);

        let Some((&out_vector, aux_vectors)) = shuffle.scalar_per_vector.split_last() else {
            return Err(MatmulSetupError::InvalidConfig(Box::new(
                "Shuffle vector widths must at least contain the output width",
            )));
        };

        for &vector in shuffle.scalar_per_vector.iter() {
            if vector == 0 || !slice_cols.is_multiple_of(vector) {
                return Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
                    move || {
                        format!(
                            "Shuffle vector width {vector} must divide the unit slice of {slice_cols} columns"
                        )
                    },
                )));
            }
        }

        Ok(ShuffleConfig {
            m_xdl_per_shuffle: m_shuffle,
            n_xdl_per_shuffle: n_shuffle,
            rows,
            cols,
            cluster,
            slice_rows,
            slice_cols,
            aux_vectors: aux_vectors.to_vec(),
            out_vector,
        })
    }

    /// 32-bit registers needed by one unit: accumulators, instruction fragments and the
    /// in-flight operand slices.
    pub fn registers_per_unit(&self) -> u32 {
        let d = &self.descriptor;
        let plane = self.plane_size;
        let accumulators =
            (d.m_xdl_per_wave * d.n_xdl_per_wave * d.m_per_xdl * d.n_per_xdl).div_ceil(plane);

        let fragment_bytes = (self.instruction.m as usize * self.elems.lhs.size()
            + self.instruction.n as usize * self.elems.rhs.size())
            * self.instruction.k as usize;
        let fragments = (fragment_bytes as u32).div_ceil(plane * 4);

        let prefetch = d.version.prefetch_depth();
        let slices = [&self.lhs, &self.rhs]
            .iter()
            .map(|transfer| (transfer.slice_len() * transfer.elem_size as u32).div_ceil(4))
            .sum::<u32>()
            * prefetch;

        accumulators + fragments + slices
    }

    pub fn descriptor(&self) -> &TileDescriptor {
        &self.descriptor
    }

    pub fn elems(&self) -> MatmulElems {
        self.elems
    }

    pub fn backend(&self) -> &'static dyn MatrixAccelerateBackend {
        self.backend
    }

    pub fn instruction(&self) -> MmaInstruction {
        self.instruction
    }

    pub fn plane_size(&self) -> u32 {
        self.plane_size
    }

    pub fn num_waves(&self) -> u32 {
        self.m_waves * self.n_waves
    }

    pub fn m_waves(&self) -> u32 {
        self.m_waves
    }

    pub fn n_waves(&self) -> u32 {
        self.n_waves
    }

    pub fn transfer(&self, ident: MatmulIdent) -> &TransferConfig {
        match ident {
            MatmulIdent::Lhs => &self.lhs,
            MatmulIdent::Rhs | MatmulIdent::Out => &self.rhs,
        }
    }

    pub fn shuffle(&self) -> &ShuffleConfig {
        &self.shuffle
    }

    pub fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.descriptor.block_size)
    }

    /// Matrix instructions per K step of the block, per wave.
    pub fn instructions_per_k_step(&self) -> u32 {
        self.descriptor.m_xdl_per_wave * self.descriptor.n_xdl_per_wave
    }

    /// Instruction K steps per block stage.
    pub fn k_steps(&self) -> u32 {
        self.descriptor.k_per_block / self.instruction.k
    }

    /// Wave `(m, n)` position of `wave`.
    pub fn wave_position(&self, wave: u32) -> (u32, u32) {
        (wave / self.n_waves, wave % self.n_waves)
    }

    /// Block row of `row` inside instruction tile `mx` of wave row `wave_m`.
    pub fn block_row(&self, mx: u32, wave_m: u32, row: u32) -> u32 {
        let m_per_xdl = self.descriptor.m_per_xdl;
        mx * self.m_waves * m_per_xdl + wave_m * m_per_xdl + row
    }

    /// Block column of `col` inside instruction tile `nx` of wave column `wave_n`.
    pub fn block_col(&self, nx: u32, wave_n: u32, col: u32) -> u32 {
        let n_per_xdl = self.descriptor.n_per_xdl;
        nx * self.n_waves * n_per_xdl + wave_n * n_per_xdl + col
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::epilogue::ElementwiseOp;
    use crate::components::tiling::PipelineVersion;
    use scalemm_runtime::properties::HardwareGeneration;

    fn cdna3() -> DeviceProperties {
        DeviceProperties::new(HardwareGeneration::Cdna3)
    }

    fn invalid_message(result: Result<MatmulConfig, MatmulSetupError>) -> String {
        match result {
            Err(MatmulSetupError::InvalidConfig(err)) => err.to_string(),
            Err(other) => panic!("Expected an invalid config, got {other:?}"),
            Ok(_) => panic!("Expected an invalid config"),
        }
    }

    #[test]
    fn reference_instance_is_valid() {
        let config =
            MatmulConfig::new(TileDescriptor::reference(), MatmulElems::REFERENCE, &cdna3())
                .unwrap();

        assert_eq!(config.num_waves(), 4);
        assert_eq!((config.m_waves(), config.n_waves()), (2, 2));
        assert_eq!(config.instruction(), MmaInstruction::new(32, 32, 16));
        assert_eq!(config.transfer(MatmulIdent::Lhs).thread_slice, [1, 4, 8]);
        assert_eq!(config.transfer(MatmulIdent::Rhs).thread_slice, [1, 2, 8]);
        assert_eq!((config.shuffle().rows, config.shuffle().cols), (64, 64));
        assert_eq!(
            (config.shuffle().slice_rows, config.shuffle().slice_cols),
            (2, 8)
        );
        assert!(config.registers_per_unit() <= 512);
    }

    #[test]
    fn presets_are_valid_on_their_generation() {
        MatmulConfig::new(TileDescriptor::cdna3_small(), MatmulElems::REFERENCE, &cdna3())
            .unwrap();
        MatmulConfig::new(
            TileDescriptor::rdna4_wmma(),
            MatmulElems::REFERENCE,
            &DeviceProperties::new(HardwareGeneration::Rdna4),
        )
        .unwrap();
        MatmulConfig::new(
            TileDescriptor::generic_fma(),
            MatmulElems::REFERENCE,
            &DeviceProperties::new(HardwareGeneration::Generic),
        )
        .unwrap();
    }

    #[test]
    fn cluster_must_cover_block() {
        let mut descriptor = TileDescriptor::reference();
        descriptor.a_transfer.cluster_lengths = [4, 32, 1];

        let message = invalid_message(MatmulConfig::new(
            descriptor,
            MatmulElems::REFERENCE,
            &cdna3(),
        ));
        assert!(message.contains("128 units"), "{message}");
    }

    #[test]
    fn waves_must_tile_block() {
        let mut descriptor = TileDescriptor::reference();
        descriptor.m_xdl_per_wave = 3;

        let message = invalid_message(MatmulConfig::new(
            descriptor,
            MatmulElems::REFERENCE,
            &cdna3(),
        ));
        assert!(message.contains("wave tile"), "{message}");
    }

    #[test]
    fn vector_width_must_divide_slice() {
        let mut descriptor = TileDescriptor::reference();
        descriptor.b_transfer.src_scalar_per_vector = 16;

        let message = invalid_message(MatmulConfig::new(
            descriptor,
            MatmulElems::REFERENCE,
            &cdna3(),
        ));
        assert!(message.contains("source vector width 16"), "{message}");
    }

    #[test]
    fn shuffle_vectors_must_match_epilogue() {
        let mut descriptor = TileDescriptor::reference();
        descriptor.epilogue = ElementwiseOp::PassThrough;

        let message = invalid_message(MatmulConfig::new(
            descriptor,
            MatmulElems::REFERENCE,
            &cdna3(),
        ));
        assert!(message.contains("reads 0 auxiliary"), "{message}");
    }

    #[test]
    fn scratch_memory_overcommit_is_unavailable() {
        let elems = MatmulElems::SUPPORTED[8];
        assert_eq!(elems.lhs, ElemType::F32);

        let result = MatmulConfig::new(
            TileDescriptor::reference().with_version(PipelineVersion::V2),
            elems,
            &cdna3(),
        );

        assert!(matches!(
            result,
            Err(MatmulSetupError::Unavailable(
                MatmulAvailabilityError::SharedMemoryOvercommit { .. }
            ))
        ));
    }

    #[test]
    fn wave64_backend_rejects_wave32_device() {
        let mut properties = cdna3();
        properties.hardware.plane_size = 32;

        let result = MatmulConfig::new(
            TileDescriptor::reference(),
            MatmulElems::REFERENCE,
            &properties,
        );

        assert!(matches!(
            result,
            Err(MatmulSetupError::Unavailable(
                MatmulAvailabilityError::PlaneDimUnsupported { plane_dim: 32, .. }
            ))
        ));
    }

    #[test]
    fn scratch_index_skips_padding_row() {
        let config =
            MatmulConfig::new(TileDescriptor::reference(), MatmulElems::REFERENCE, &cdna3())
                .unwrap();
        let lhs = config.transfer(MatmulIdent::Lhs);

        assert_eq!(lhs.stage_len(), 4 * 257 * 8);
        assert_eq!(lhs.stage_index(9, 3), (257 + 3) * 8 + 1);
    }

    #[test]
    fn block_coordinates_interleave_waves() {
        let config =
            MatmulConfig::new(TileDescriptor::reference(), MatmulElems::REFERENCE, &cdna3())
                .unwrap();

        assert_eq!(config.block_row(1, 1, 5), 64 + 32 + 5);
        assert_eq!(config.block_col(1, 0, 2), 64 + 2);
        assert_eq!(config.wave_position(3), (1, 1));
    }
}
