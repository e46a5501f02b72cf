use core::fmt::Display;

use scalemm_common::{ElemType, Element};

use super::MatmulAvailabilityError;

/// Runtime description of the element types of a scaled matmul.
///
/// Every combination accumulates in `f32` and stages the epilogue through an `f32` buffer.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MatmulElems {
    pub lhs: ElemType,
    pub rhs: ElemType,
    pub scale: ElemType,
    pub out: ElemType,
}

impl MatmulElems {
    /// Element types of the reference instance: fp8 operands, f32 scales and a bf16 output.
    pub const REFERENCE: MatmulElems = MatmulElems {
        lhs: ElemType::E4M3,
        rhs: ElemType::E4M3,
        scale: ElemType::F32,
        out: ElemType::BF16,
    };

    /// Every combination the kernel is instantiated for.
    pub const SUPPORTED: [MatmulElems; 9] = [
        Self::REFERENCE,
        Self::of(ElemType::E4M3, ElemType::E4M3, ElemType::F16),
        Self::of(ElemType::E4M3, ElemType::E4M3, ElemType::F32),
        Self::of(ElemType::E4M3, ElemType::E4M3, ElemType::E4M3),
        Self::of(ElemType::E5M2, ElemType::E5M2, ElemType::BF16),
        Self::of(ElemType::E4M3, ElemType::E5M2, ElemType::BF16),
        Self::of(ElemType::BF16, ElemType::BF16, ElemType::BF16),
        Self::of(ElemType::F16, ElemType::F16, ElemType::F16),
        Self::of(ElemType::F32, ElemType::F32, ElemType::F32),
    ];

    const fn of(lhs: ElemType, rhs: ElemType, out: ElemType) -> Self {
        Self {
            lhs,
            rhs,
            scale: ElemType::F32,
            out,
        }
    }

    /// Whether the kernel is instantiated for these types.
    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    pub(crate) fn unavailable(&self) -> MatmulAvailabilityError {
        MatmulAvailabilityError::TypesUnavailable {
            lhs: self.lhs,
            rhs: self.rhs,
            scale: self.scale,
            out: self.out,
        }
    }
}

impl Display for MatmulElems {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{},{},{},{}", self.lhs, self.rhs, self.scale, self.out)
    }
}

/// Static element types of a scaled matmul instance.
pub trait MatmulPrecision: Send + Sync + 'static {
    /// Left operand.
    type Lhs: Element;
    /// Right operand.
    type Rhs: Element;
    /// Auxiliary scale tensors.
    type Scale: Element;
    /// Output.
    type Out: Element;

    fn elems() -> MatmulElems {
        MatmulElems {
            lhs: Self::Lhs::ELEM,
            rhs: Self::Rhs::ELEM,
            scale: Self::Scale::ELEM,
            out: Self::Out::ELEM,
        }
    }
}

impl<L: Element, R: Element, S: Element, O: Element> MatmulPrecision for (L, R, S, O) {
    type Lhs = L;
    type Rhs = R;
    type Scale = S;
    type Out = O;
}

/// Runs `$body` with `$precision` bound to the static precision matching `$elems`, or evaluates
/// `$unsupported` when the combination isn't instantiated.
macro_rules! with_precision {
    ($elems:expr, $precision:ident => $body:expr, _ => $unsupported:expr) => {{
        use half::{bf16, f16};
        use scalemm_common::ElemType::*;
        use scalemm_common::float::{e4m3, e5m2};

        let elems: $crate::components::MatmulElems = $elems;
        match (elems.lhs, elems.rhs, elems.scale, elems.out) {
            (E4M3, E4M3, F32, BF16) => {
                type $precision = (e4m3, e4m3, f32, bf16);
                $body
            }
            (E4M3, E4M3, F32, F16) => {
                type $precision = (e4m3, e4m3, f32, f16);
                $body
            }
            (E4M3, E4M3, F32, F32) => {
                type $precision = (e4m3, e4m3, f32, f32);
                $body
            }
            (E4M3, E4M3, F32, E4M3) => {
                type $precision = (e4m3, e4m3, f32, e4m3);
                $body
            }
            (E5M2, E5M2, F32, BF16) => {
                type $precision = (e5m2, e5m2, f32, bf16);
                $body
            }
            (E4M3, E5M2, F32, BF16) => {
                type $precision = (e4m3, e5m2, f32, bf16);
                $body
            }
            (BF16, BF16, F32, BF16) => {
                type $precision = (bf16, bf16, f32, bf16);
                $body
            }
            (F16, F16, F32, F16) => {
                type $precision = (f16, f16, f32, f16);
                $body
            }
            (F32, F32, F32, F32) => {
                type $precision = (f32, f32, f32, f32);
                $body
            }
            _ => $unsupported,
        }
    }};
}

pub(crate) use with_precision;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_combination_dispatches() {
        for elems in MatmulElems::SUPPORTED {
            let dispatched = with_precision!(elems, P => Some(P::elems()), _ => None);
            assert_eq!(dispatched, Some(elems));
        }
    }

    #[test]
    fn unknown_combination_is_rejected() {
        let elems = MatmulElems::new(ElemType::F16, ElemType::BF16, ElemType::F32, ElemType::F32);

        assert!(!elems.is_supported());
        assert_eq!(with_precision!(elems, P => Some(P::elems()), _ => None), None);
    }
}
