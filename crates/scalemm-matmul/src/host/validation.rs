use core::fmt::Display;

use scalemm_common::{ElemType, Element};

use super::HostTensor;

/// Accepted distance between a computed value and the reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    /// `|actual - expected| <= atol + rtol * |expected|`.
    Relative { rtol: f64, atol: f64 },
    /// At most `max_ulps` representable values between the actual and expected encodings.
    RoundingDistance { max_ulps: u64 },
}

impl Tolerance {
    /// Default tolerance when producing `elem`.
    pub fn for_elem(elem: ElemType) -> Self {
        match elem {
            ElemType::F32 => Tolerance::Relative {
                rtol: 1e-5,
                atol: 1e-5,
            },
            ElemType::F16 => Tolerance::Relative {
                rtol: 1e-3,
                atol: 1e-3,
            },
            ElemType::BF16 => Tolerance::Relative {
                rtol: 1e-2,
                atol: 1e-2,
            },
            ElemType::E4M3 | ElemType::E5M2 => Tolerance::RoundingDistance { max_ulps: 1 },
        }
    }

    fn accepts<E: Element>(&self, actual: E, expected: E) -> bool {
        let (a, e) = (actual.to_f64(), expected.to_f64());
        if a.is_nan() || e.is_nan() {
            return a.is_nan() && e.is_nan();
        }

        match self {
            Tolerance::Relative { rtol, atol } => {
                a == e || (a - e).abs() <= atol + rtol * e.abs()
            }
            Tolerance::RoundingDistance { max_ulps } => {
                rounding_distance(actual, expected) <= *max_ulps
            }
        }
    }
}

impl Display for Tolerance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Tolerance::Relative { rtol, atol } => write!(f, "rtol={rtol:e} atol={atol:e}"),
            Tolerance::RoundingDistance { max_ulps } => write!(f, "max {max_ulps} ulp"),
        }
    }
}

/// Number of representable values between two encodings of the same type.
///
/// Both zeros are at distance 0 and the distance across zero counts every value in between.
pub fn rounding_distance<E: Element>(lhs: E, rhs: E) -> u64 {
    ordinal(lhs).abs_diff(ordinal(rhs))
}

// Maps a sign-magnitude encoding onto a monotonic integer.
fn ordinal<E: Element>(value: E) -> i64 {
    let bytes = bytemuck::bytes_of(&value);
    let bits = match *bytes {
        [b0] => b0 as u64,
        [b0, b1] => u16::from_ne_bytes([b0, b1]) as u64,
        [b0, b1, b2, b3] => u32::from_ne_bytes([b0, b1, b2, b3]) as u64,
        _ => unreachable!("Elements are 1, 2 or 4 bytes wide"),
    };
    let sign = 1u64 << (bytes.len() * 8 - 1);
    let magnitude = (bits & (sign - 1)) as i64;

    match bits & sign == 0 {
        true => magnitude,
        false => -magnitude,
    }
}

/// Element that exceeded the tolerance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub actual: f64,
    pub expected: f64,
}

/// Comparison of one batch slice against the reference.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationReport {
    pub batch: usize,
    pub num_elements: usize,
    pub mismatches: usize,
    pub max_abs_error: f64,
    pub first_mismatch: Option<Mismatch>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches == 0
    }

    /// Fraction of the elements of the slice exceeding the tolerance.
    pub fn mismatch_ratio(&self) -> f64 {
        match self.num_elements {
            0 => 0.0,
            count => self.mismatches as f64 / count as f64,
        }
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "batch {}: {}/{} mismatches, max abs error {:e}",
            self.batch, self.mismatches, self.num_elements, self.max_abs_error
        )?;

        if let Some(mismatch) = &self.first_mismatch {
            write!(
                f,
                ", first at ({}, {}) actual={} expected={}",
                mismatch.row, mismatch.col, mismatch.actual, mismatch.expected
            )?;
        }

        Ok(())
    }
}

/// Compares every logical element of `actual` with `expected`, one report per batch.
///
/// # Panics
///
/// If the shapes differ.
pub fn validate<E: Element>(
    actual: &HostTensor<E>,
    expected: &HostTensor<E>,
    tolerance: Tolerance,
) -> Vec<ValidationReport> {
    assert_eq!(actual.shape(), expected.shape(), "Shapes differ");
    let [batches, rows, cols] = actual.shape();

    (0..batches)
        .map(|batch| {
            let mut report = ValidationReport {
                batch,
                num_elements: rows * cols,
                mismatches: 0,
                max_abs_error: 0.0,
                first_mismatch: None,
            };

            for row in 0..rows {
                for col in 0..cols {
                    let a = actual.get(batch, row, col);
                    let e = expected.get(batch, row, col);
                    let error = (a.to_f64() - e.to_f64()).abs();

                    if !error.is_nan() {
                        report.max_abs_error = report.max_abs_error.max(error);
                    }

                    if !tolerance.accepts(a, e) {
                        report.mismatches += 1;
                        if report.first_mismatch.is_none() {
                            report.first_mismatch = Some(Mismatch {
                                row,
                                col,
                                actual: a.to_f64(),
                                expected: e.to_f64(),
                            });
                        }
                    }
                }
            }

            report
        })
        .collect()
}
