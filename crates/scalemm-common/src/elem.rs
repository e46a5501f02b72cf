use core::fmt::{Debug, Display};
use core::str::FromStr;

use bytemuck::Pod;
use half::{bf16, f16};

use crate::float::{e4m3, e5m2};

/// Element types understood by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    E4M3,
    E5M2,
    BF16,
    F16,
    F32,
}

impl ElemType {
    /// Size of one element in bytes.
    pub const fn size(&self) -> usize {
        match self {
            ElemType::E4M3 | ElemType::E5M2 => 1,
            ElemType::BF16 | ElemType::F16 => 2,
            ElemType::F32 => 4,
        }
    }

    /// Whether this is one of the 8-bit float formats.
    pub const fn is_fp8(&self) -> bool {
        matches!(self, ElemType::E4M3 | ElemType::E5M2)
    }
}

impl Display for ElemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ElemType::E4M3 => "e4m3",
            ElemType::E5M2 => "e5m2",
            ElemType::BF16 => "bf16",
            ElemType::F16 => "f16",
            ElemType::F32 => "f32",
        };
        f.write_str(name)
    }
}

impl FromStr for ElemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "e4m3" | "fp8" | "f8" => Ok(ElemType::E4M3),
            "e5m2" | "bf8" => Ok(ElemType::E5M2),
            "bf16" => Ok(ElemType::BF16),
            "f16" | "half" => Ok(ElemType::F16),
            "f32" | "float" => Ok(ElemType::F32),
            other => Err(format!("Unknown element type {other}")),
        }
    }
}

/// A scalar that can live in device memory.
///
/// Conversions to and from `f32` use the type's standard rounding rule
/// (round-to-nearest-even for every supported format).
pub trait Element: Pod + Send + Sync + Debug + Display + PartialEq + 'static {
    /// The runtime tag of this type.
    const ELEM: ElemType;

    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;

    /// Narrows a `f64` with a single rounding step.
    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }

    fn zero() -> Self {
        bytemuck::Zeroable::zeroed()
    }

    /// Reinterprets raw bytes as elements.
    fn from_bytes(bytes: &[u8]) -> &[Self] {
        bytemuck::cast_slice(bytes)
    }

    /// Reinterprets elements as raw bytes.
    fn as_bytes(elems: &[Self]) -> &[u8] {
        bytemuck::cast_slice(elems)
    }
}

impl Element for e4m3 {
    const ELEM: ElemType = ElemType::E4M3;

    fn to_f32(self) -> f32 {
        e4m3::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        e4m3::from_f32(value)
    }

    fn from_f64(value: f64) -> Self {
        e4m3::from_f64(value)
    }
}

impl Element for e5m2 {
    const ELEM: ElemType = ElemType::E5M2;

    fn to_f32(self) -> f32 {
        e5m2::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        e5m2::from_f32(value)
    }

    fn from_f64(value: f64) -> Self {
        e5m2::from_f64(value)
    }
}

impl Element for bf16 {
    const ELEM: ElemType = ElemType::BF16;

    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        bf16::from_f32(value)
    }

    fn from_f64(value: f64) -> Self {
        bf16::from_f64(value)
    }
}

impl Element for f16 {
    const ELEM: ElemType = ElemType::F16;

    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }
}

impl Element for f32 {
    const ELEM: ElemType = ElemType::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}
