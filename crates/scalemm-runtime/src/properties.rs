use core::fmt::Display;

use hashbrown::HashSet;
use scalemm_common::ElemType;

/// Family of matrix accelerator the emulated device behaves like.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareGeneration {
    /// Wave64 devices with XDL matrix-core instructions.
    Cdna3,
    /// Wave32 devices with WMMA instructions.
    Rdna4,
    /// Devices without matrix instructions, every product is a scalar fused multiply-add.
    Generic,
}

impl Display for HardwareGeneration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            HardwareGeneration::Cdna3 => "cdna3",
            HardwareGeneration::Rdna4 => "rdna4",
            HardwareGeneration::Generic => "generic",
        };
        f.write_str(name)
    }
}

impl core::str::FromStr for HardwareGeneration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cdna3" | "xdl" => Ok(Self::Cdna3),
            "rdna4" | "wmma" => Ok(Self::Rdna4),
            "generic" | "fma" => Ok(Self::Generic),
            other => Err(format!("Unknown hardware generation {other}")),
        }
    }
}

/// A matrix-multiply-accumulate instruction offered by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MmaConfig {
    /// Element type of the left operand.
    pub a_type: ElemType,
    /// Element type of the right operand.
    pub b_type: ElemType,
    /// Element type of the accumulator.
    pub cd_type: ElemType,
    pub m: u32,
    pub n: u32,
    pub k: u32,
}

/// Hardware limits of the device.
#[derive(Clone, Debug)]
pub struct HardwareProperties {
    /// Number of units in a wave (plane).
    pub plane_size: u32,
    /// Maximum number of units in a cube.
    pub max_units_per_cube: u32,
    /// Maximum number of cubes in a single launch.
    pub max_cube_count: u64,
    /// Scratch (shared) memory available to a cube, in bytes.
    pub max_shared_memory_size: usize,
    /// 32-bit registers available to a unit.
    pub max_registers_per_unit: u32,
    /// Number of compute units on the device.
    pub num_compute_units: u32,
}

/// Properties of the emulated device.
#[derive(Clone, Debug)]
pub struct DeviceProperties {
    pub generation: HardwareGeneration,
    pub hardware: HardwareProperties,
    mma_configs: HashSet<MmaConfig>,
    types: HashSet<ElemType>,
}

impl DeviceProperties {
    /// Creates the properties of a device of the given generation.
    pub fn new(generation: HardwareGeneration) -> Self {
        let mut props = match generation {
            HardwareGeneration::Cdna3 => Self::empty(
                generation,
                HardwareProperties {
                    plane_size: 64,
                    max_units_per_cube: 1024,
                    max_cube_count: u32::MAX as u64,
                    max_shared_memory_size: 64 * 1024,
                    max_registers_per_unit: 512,
                    num_compute_units: 304,
                },
            ),
            HardwareGeneration::Rdna4 => Self::empty(
                generation,
                HardwareProperties {
                    plane_size: 32,
                    max_units_per_cube: 1024,
                    max_cube_count: u32::MAX as u64,
                    max_shared_memory_size: 64 * 1024,
                    max_registers_per_unit: 256,
                    num_compute_units: 64,
                },
            ),
            HardwareGeneration::Generic => Self::empty(
                generation,
                HardwareProperties {
                    plane_size: 32,
                    max_units_per_cube: 1024,
                    max_cube_count: u32::MAX as u64,
                    max_shared_memory_size: 48 * 1024,
                    max_registers_per_unit: 255,
                    num_compute_units: 16,
                },
            ),
        };

        for elem in [
            ElemType::E4M3,
            ElemType::E5M2,
            ElemType::BF16,
            ElemType::F16,
            ElemType::F32,
        ] {
            props.register_type(elem);
        }

        match generation {
            HardwareGeneration::Cdna3 => {
                let fp8 = [ElemType::E4M3, ElemType::E5M2];
                for a in fp8 {
                    for b in fp8 {
                        props.register_mma(a, b, 32, 32, 16);
                        props.register_mma(a, b, 16, 16, 32);
                    }
                }
                for elem in [ElemType::BF16, ElemType::F16] {
                    props.register_mma(elem, elem, 32, 32, 8);
                    props.register_mma(elem, elem, 16, 16, 16);
                }
                props.register_mma(ElemType::F32, ElemType::F32, 32, 32, 2);
                props.register_mma(ElemType::F32, ElemType::F32, 16, 16, 4);
            }
            HardwareGeneration::Rdna4 => {
                let fp8 = [ElemType::E4M3, ElemType::E5M2];
                for a in fp8 {
                    for b in fp8 {
                        props.register_mma(a, b, 16, 16, 16);
                    }
                }
                for elem in [ElemType::BF16, ElemType::F16] {
                    props.register_mma(elem, elem, 16, 16, 16);
                }
            }
            HardwareGeneration::Generic => {}
        }

        props
    }

    fn empty(generation: HardwareGeneration, hardware: HardwareProperties) -> Self {
        Self {
            generation,
            hardware,
            mma_configs: HashSet::new(),
            types: HashSet::new(),
        }
    }

    /// Registers a matrix instruction accumulating in `f32`.
    pub fn register_mma(&mut self, a_type: ElemType, b_type: ElemType, m: u32, n: u32, k: u32) {
        self.mma_configs.insert(MmaConfig {
            a_type,
            b_type,
            cd_type: ElemType::F32,
            m,
            n,
            k,
        });
    }

    /// Registers an element type as usable in device memory.
    pub fn register_type(&mut self, elem: ElemType) {
        self.types.insert(elem);
    }

    /// Whether the element type can be stored and loaded by kernels.
    pub fn type_supported(&self, elem: ElemType) -> bool {
        self.types.contains(&elem)
    }

    /// Every matrix instruction for the given operand types and output tile, any `k`.
    pub fn mma_instructions(
        &self,
        a_type: ElemType,
        b_type: ElemType,
        cd_type: ElemType,
        m: u32,
        n: u32,
    ) -> impl Iterator<Item = &MmaConfig> {
        self.mma_configs.iter().filter(move |config| {
            config.a_type == a_type
                && config.b_type == b_type
                && config.cd_type == cd_type
                && config.m == m
                && config.n == n
        })
    }

    /// Number of matrix instructions the device offers.
    pub fn num_mma_instructions(&self) -> usize {
        self.mma_configs.len()
    }
}
