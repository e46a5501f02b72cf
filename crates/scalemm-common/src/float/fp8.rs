use bytemuck::{Pod, Zeroable};
use core::fmt::{Debug, Display};

/// A 8-bit floating point type with 4 exponent bits and 3 mantissa bits.
///
/// Uses the OCP `e4m3fn` encoding: there are no infinities, the only NaN pattern is
/// `S.1111.111` and the finite range is `±448`.
///
/// [`Minifloat`]: https://en.wikipedia.org/wiki/Minifloat
#[allow(non_camel_case_types)]
#[repr(transparent)]
#[derive(
    Clone, Copy, Default, Zeroable, Pod, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct e4m3(u8);

/// A 8-bit floating point type with 5 exponent bits and 2 mantissa bits.
///
/// IEEE-like: exponent `11111` encodes infinities and NaNs.
///
/// [`Minifloat`]: https://en.wikipedia.org/wiki/Minifloat
#[allow(non_camel_case_types)]
#[repr(transparent)]
#[derive(
    Clone, Copy, Default, Zeroable, Pod, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct e5m2(u8);

impl e4m3 {
    /// Maximum representable value
    pub const MAX: f64 = 448.0;
    /// Minimum representable value
    pub const MIN: f64 = -448.0;
    /// Distance between `1.0` and the next representable value.
    pub const EPSILON: f64 = 0.125;

    /// Creates a value from its raw bit pattern.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern.
    pub const fn to_bits(self) -> u8 {
        self.0
    }

    /// Narrows a `f32` with round-to-nearest-even, saturating to [`Self::MAX`].
    pub fn from_f32(value: f32) -> Self {
        Self(E4M3_FORMAT.encode(value as f64))
    }

    /// Narrows a `f64` with a single round-to-nearest-even step, saturating to [`Self::MAX`].
    pub fn from_f64(value: f64) -> Self {
        Self(E4M3_FORMAT.encode(value))
    }

    /// Widens to `f32`. Exact.
    pub fn to_f32(self) -> f32 {
        E4M3_FORMAT.decode(self.0)
    }

    pub fn is_nan(self) -> bool {
        self.to_f32().is_nan()
    }
}

impl e5m2 {
    /// Maximum representable value
    pub const MAX: f64 = 57344.0;
    /// Minimum representable value
    pub const MIN: f64 = -57344.0;
    /// Distance between `1.0` and the next representable value.
    pub const EPSILON: f64 = 0.25;

    /// Creates a value from its raw bit pattern.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern.
    pub const fn to_bits(self) -> u8 {
        self.0
    }

    /// Narrows a `f32` with round-to-nearest-even. Finite overflow saturates to [`Self::MAX`],
    /// infinities are kept.
    pub fn from_f32(value: f32) -> Self {
        Self(E5M2_FORMAT.encode(value as f64))
    }

    /// Narrows a `f64` with a single round-to-nearest-even step.
    pub fn from_f64(value: f64) -> Self {
        Self(E5M2_FORMAT.encode(value))
    }

    /// Widens to `f32`. Exact.
    pub fn to_f32(self) -> f32 {
        E5M2_FORMAT.decode(self.0)
    }

    pub fn is_nan(self) -> bool {
        self.to_f32().is_nan()
    }
}

macro_rules! impl_fmt {
    ($ty:ty) => {
        impl Display for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                Display::fmt(&self.to_f32(), f)
            }
        }

        impl Debug for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                Debug::fmt(&self.to_f32(), f)
            }
        }

        impl From<$ty> for f32 {
            fn from(value: $ty) -> Self {
                value.to_f32()
            }
        }
    };
}

impl_fmt!(e4m3);
impl_fmt!(e5m2);

/// Bit layout of a sign + exponent + mantissa byte.
struct MinifloatFormat {
    mantissa_bits: i32,
    bias: i32,
    max: f64,
    /// Magnitude bits of the largest finite value.
    max_bits: u8,
    /// Magnitude bits of the canonical NaN.
    nan_bits: u8,
    /// Magnitude bits of infinity, when the format has one.
    infinity_bits: Option<u8>,
}

const E4M3_FORMAT: MinifloatFormat = MinifloatFormat {
    mantissa_bits: 3,
    bias: 7,
    max: e4m3::MAX,
    max_bits: 0x7E,
    nan_bits: 0x7F,
    infinity_bits: None,
};

const E5M2_FORMAT: MinifloatFormat = MinifloatFormat {
    mantissa_bits: 2,
    bias: 15,
    max: e5m2::MAX,
    max_bits: 0x7B,
    nan_bits: 0x7F,
    infinity_bits: Some(0x7C),
};

const SIGN_BIT: u8 = 0x80;

impl MinifloatFormat {
    fn encode(&self, value: f64) -> u8 {
        let sign = if value.is_sign_negative() { SIGN_BIT } else { 0 };

        if value.is_nan() {
            return sign | self.nan_bits;
        }

        let magnitude = value.abs();

        if magnitude.is_infinite() {
            return sign | self.infinity_bits.unwrap_or(self.max_bits);
        }

        let min_exponent = 1 - self.bias;
        let exponent = exponent_of(magnitude).max(min_exponent);
        let quantum = pow2(exponent - self.mantissa_bits);
        let rounded = (magnitude / quantum).round_ties_even() * quantum;

        if rounded > self.max {
            return sign | self.max_bits;
        }

        if rounded == 0.0 {
            return sign;
        }

        let exponent = exponent_of(rounded);
        let magnitude_bits = if exponent < min_exponent {
            (rounded / pow2(min_exponent - self.mantissa_bits)) as u8
        } else {
            let significand = (rounded / pow2(exponent - self.mantissa_bits)) as i32;
            let mantissa = significand - (1 << self.mantissa_bits);
            (((exponent + self.bias) << self.mantissa_bits) | mantissa) as u8
        };

        sign | magnitude_bits
    }

    fn decode(&self, bits: u8) -> f32 {
        let sign = if bits & SIGN_BIT != 0 { -1.0 } else { 1.0 };
        let magnitude = bits & !SIGN_BIT;

        match self.infinity_bits {
            Some(infinity) if magnitude == infinity => return sign * f32::INFINITY,
            Some(infinity) if magnitude > infinity => return f32::NAN,
            None if magnitude == self.nan_bits => return f32::NAN,
            _ => {}
        }

        let exponent = (magnitude >> self.mantissa_bits) as i32;
        let mantissa = (magnitude & ((1 << self.mantissa_bits) - 1)) as i32;

        let value = if exponent == 0 {
            mantissa as f64 * pow2(1 - self.bias - self.mantissa_bits)
        } else {
            ((1 << self.mantissa_bits) + mantissa) as f64
                * pow2(exponent - self.bias - self.mantissa_bits)
        };

        sign * value as f32
    }
}

/// `floor(log2(value))` for a positive finite value, read from the binary exponent.
fn exponent_of(value: f64) -> i32 {
    let biased = ((value.to_bits() >> 52) & 0x7FF) as i32;

    if biased == 0 {
        // Subnormal doubles are far below any fp8 range.
        -1023
    } else {
        biased - 1023
    }
}

fn pow2(exponent: i32) -> f64 {
    f64::from_bits(((exponent + 1023) as u64) << 52)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e4m3_encodes_reference_values() {
        assert_eq!(e4m3::from_f32(1.0).to_bits(), 0x38);
        assert_eq!(e4m3::from_f32(-2.0).to_bits(), 0xC0);
        assert_eq!(e4m3::from_f32(448.0).to_bits(), 0x7E);
        assert_eq!(e4m3::from_f32(-0.0).to_bits(), 0x80);
        assert_eq!(e4m3::from_f32(0.001953125).to_bits(), 0x01);
    }

    #[test]
    fn e4m3_rounds_ties_to_even() {
        // Halfway between 1.0 (even mantissa) and 1.125.
        assert_eq!(e4m3::from_f32(1.0625).to_f32(), 1.0);
        // Halfway between 1.125 and 1.25 (even mantissa).
        assert_eq!(e4m3::from_f32(1.1875).to_f32(), 1.25);
        // Half of the smallest subnormal rounds to zero.
        assert_eq!(e4m3::from_f32(0.0009765625).to_bits(), 0x00);
    }

    #[test]
    fn e4m3_saturates_overflow_and_infinity() {
        assert_eq!(e4m3::from_f32(500.0).to_f32(), 448.0);
        assert_eq!(e4m3::from_f32(f32::INFINITY).to_f32(), 448.0);
        assert_eq!(e4m3::from_f32(f32::NEG_INFINITY).to_f32(), -448.0);
        assert!(e4m3::from_f32(f32::NAN).is_nan());
        assert_eq!(e4m3::from_f32(f32::NAN).to_bits() & 0x7F, 0x7F);
    }

    #[test]
    fn e4m3_decode_encode_is_identity_on_every_number() {
        for bits in 0..=u8::MAX {
            let value = e4m3::from_bits(bits);
            if value.is_nan() {
                continue;
            }
            assert_eq!(e4m3::from_f32(value.to_f32()).to_bits(), bits, "bits {bits:#04x}");
        }
    }

    #[test]
    fn e5m2_keeps_infinities_and_saturates_finite_overflow() {
        assert_eq!(e5m2::from_f32(1.0).to_bits(), 0x3C);
        assert_eq!(e5m2::from_f32(57344.0).to_bits(), 0x7B);
        assert_eq!(e5m2::from_f32(60000.0).to_f32(), 57344.0);
        assert_eq!(e5m2::from_f32(f32::INFINITY).to_bits(), 0x7C);
        assert_eq!(e5m2::from_bits(0xFC).to_f32(), f32::NEG_INFINITY);
        assert!(e5m2::from_bits(0x7E).is_nan());
    }

    #[test]
    fn e5m2_decode_encode_is_identity_on_every_number() {
        for bits in 0..=u8::MAX {
            let value = e5m2::from_bits(bits);
            if value.is_nan() {
                continue;
            }
            assert_eq!(e5m2::from_f32(value.to_f32()).to_bits(), bits, "bits {bits:#04x}");
        }
    }

    #[test]
    fn f64_narrowing_rounds_once() {
        // Slightly above the tie between 1.0 and 1.125, lost if rounded through f32 first.
        let value = 1.0625 + 1e-12;
        assert_eq!(e4m3::from_f64(value).to_f32(), 1.125);
    }
}
