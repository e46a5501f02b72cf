use core::fmt::Debug;

use scalemm_common::ElemType;
use scalemm_runtime::properties::{DeviceProperties, HardwareGeneration};

use crate::components::MatmulAvailabilityError;

/// Shape of one matrix-multiply-accumulate instruction.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MmaInstruction {
    pub m: u32,
    pub n: u32,
    pub k: u32,
}

/// Matrix-multiply-accumulate unit of a hardware generation.
///
/// Fragments are `f32` values converted exactly from the operand types: `lhs` is `m x k` and
/// `rhs` is `n x k`, both K-contiguous, and `acc` is `m x n` row-major.
pub trait MatrixAccelerateBackend: Debug + Send + Sync {
    /// Short name used in type strings.
    fn name(&self) -> &'static str;

    /// Whether the backend runs on waves of `plane_size` units.
    fn supports_plane_size(&self, plane_size: u32) -> bool;

    /// The instruction producing `m x n` tiles for the operand types, with the largest `k`
    /// dividing `k_per_block`.
    fn instruction(
        &self,
        properties: &DeviceProperties,
        lhs: ElemType,
        rhs: ElemType,
        m: u32,
        n: u32,
        k_per_block: u32,
    ) -> Result<MmaInstruction, MatmulAvailabilityError> {
        properties
            .mma_instructions(lhs, rhs, ElemType::F32, m, n)
            .filter(|config| k_per_block.is_multiple_of(config.k))
            .map(|config| MmaInstruction::new(config.m, config.n, config.k))
            .max_by_key(|instruction| instruction.k)
            .ok_or(MatmulAvailabilityError::MmaInstructionUnavailable { lhs, rhs, m, n })
    }

    /// `acc += lhs * rhs^T`.
    ///
    /// Each product of the instruction is reduced over `k` starting from zero, in lane order,
    /// then added to the accumulator.
    fn execute(&self, instruction: &MmaInstruction, lhs: &[f32], rhs: &[f32], acc: &mut [f32]) {
        let k = instruction.k as usize;
        let n = instruction.n as usize;

        for (row, lhs_row) in lhs.chunks_exact(k).enumerate() {
            let acc_row = &mut acc[row * n..(row + 1) * n];

            for (value, rhs_col) in acc_row.iter_mut().zip(rhs.chunks_exact(k)) {
                let mut dot = 0.0f32;
                for (a, b) in lhs_row.iter().zip(rhs_col) {
                    dot += a * b;
                }
                *value += dot;
            }
        }
    }
}

/// XDL matrix cores of wave64 devices.
#[derive(Debug)]
pub struct XdlBackend;

/// WMMA instructions of wave32 devices.
#[derive(Debug)]
pub struct WmmaBackend;

/// Scalar multiply-adds, for devices without matrix instructions.
#[derive(Debug)]
pub struct FmaBackend;

impl MatrixAccelerateBackend for XdlBackend {
    fn name(&self) -> &'static str {
        "Xdl"
    }

    fn supports_plane_size(&self, plane_size: u32) -> bool {
        plane_size == 64
    }
}

impl MatrixAccelerateBackend for WmmaBackend {
    fn name(&self) -> &'static str {
        "Wmma"
    }

    fn supports_plane_size(&self, plane_size: u32) -> bool {
        plane_size == 32
    }
}

impl MatrixAccelerateBackend for FmaBackend {
    fn name(&self) -> &'static str {
        "Fma"
    }

    fn supports_plane_size(&self, plane_size: u32) -> bool {
        plane_size > 0
    }

    fn instruction(
        &self,
        properties: &DeviceProperties,
        lhs: ElemType,
        rhs: ElemType,
        m: u32,
        n: u32,
        _k_per_block: u32,
    ) -> Result<MmaInstruction, MatmulAvailabilityError> {
        match properties.type_supported(lhs) && properties.type_supported(rhs) && m > 0 && n > 0
        {
            true => Ok(MmaInstruction::new(m, n, 1)),
            false => Err(MatmulAvailabilityError::MmaInstructionUnavailable { lhs, rhs, m, n }),
        }
    }

    fn execute(&self, instruction: &MmaInstruction, lhs: &[f32], rhs: &[f32], acc: &mut [f32]) {
        let n = instruction.n as usize;

        for (row, a) in lhs.iter().enumerate() {
            for (value, b) in acc[row * n..(row + 1) * n].iter_mut().zip(rhs) {
                *value += a * b;
            }
        }
    }
}

/// The matrix backend of a hardware generation.
pub fn backend_for(generation: HardwareGeneration) -> &'static dyn MatrixAccelerateBackend {
    match generation {
        HardwareGeneration::Cdna3 => &XdlBackend,
        HardwareGeneration::Rdna4 => &WmmaBackend,
        HardwareGeneration::Generic => &FmaBackend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdl_picks_largest_dividing_k() {
        let properties = DeviceProperties::new(HardwareGeneration::Cdna3);
        let backend = backend_for(properties.generation);

        let instruction = backend
            .instruction(&properties, ElemType::E4M3, ElemType::E4M3, 16, 16, 32)
            .unwrap();
        assert_eq!(instruction, MmaInstruction::new(16, 16, 32));

        let instruction = backend
            .instruction(&properties, ElemType::E4M3, ElemType::E4M3, 32, 32, 32)
            .unwrap();
        assert_eq!(instruction, MmaInstruction::new(32, 32, 16));
    }

    #[test]
    fn wmma_has_no_32x32_instruction() {
        let properties = DeviceProperties::new(HardwareGeneration::Rdna4);

        assert!(matches!(
            WmmaBackend.instruction(&properties, ElemType::E4M3, ElemType::E4M3, 32, 32, 32),
            Err(MatmulAvailabilityError::MmaInstructionUnavailable { .. })
        ));
    }

    #[test]
    fn dot_product_is_added_to_accumulator() {
        let instruction = MmaInstruction::new(2, 2, 3);
        // lhs rows [1, 2, 3], [4, 5, 6]; rhs cols [1, 0, 1], [0, 1, 0].
        let lhs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rhs = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let mut acc = [1.0, 1.0, 1.0, 1.0];

        XdlBackend.execute(&instruction, &lhs, &rhs, &mut acc);

        assert_eq!(acc, [5.0, 3.0, 11.0, 6.0]);
    }

    #[test]
    fn fma_accumulates_outer_products() {
        let instruction = MmaInstruction::new(2, 3, 1);
        let mut acc = [0.0; 6];

        FmaBackend.execute(&instruction, &[1.0, 2.0], &[3.0, 4.0, 5.0], &mut acc);
        FmaBackend.execute(&instruction, &[1.0, 1.0], &[1.0, 1.0, 1.0], &mut acc);

        assert_eq!(acc, [4.0, 5.0, 6.0, 7.0, 9.0, 11.0]);
    }
}
