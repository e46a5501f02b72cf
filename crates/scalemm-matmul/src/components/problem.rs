use core::fmt::Display;

/// Description of a batched matmul problem to solve, regardless of actual data.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatmulProblem {
    pub batches: usize,
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl MatmulProblem {
    /// Number of multiply-add operations, counted as two flops each.
    pub fn flops(&self) -> u64 {
        2 * self.batches as u64 * self.m as u64 * self.n as u64 * self.k as u64
    }

    /// Coarse size class used to select tile configurations.
    pub fn shape_class(&self) -> ShapeClass {
        match self.m < 512 && self.n < 512 && self.k < 512 {
            true => ShapeClass::Small,
            false => ShapeClass::Large,
        }
    }

    /// Logical shape `[batch, rows, cols]` of the identified tensor.
    pub fn shape(&self, ident: MatmulIdent) -> [usize; 3] {
        match ident {
            MatmulIdent::Lhs => [self.batches, self.m, self.k],
            MatmulIdent::Rhs => [self.batches, self.k, self.n],
            MatmulIdent::Out => [self.batches, self.m, self.n],
        }
    }
}

impl Display for MatmulProblem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "batch={} m={} n={} k={}",
            self.batches, self.m, self.n, self.k
        )
    }
}

/// Size class of a problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeClass {
    /// Every dimension is smaller than 512.
    Small,
    /// At least one dimension is 512 or more.
    Large,
}

/// Identifies one of the matrices of the matmul.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatmulIdent {
    Lhs,
    Rhs,
    Out,
}

impl Display for MatmulIdent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            MatmulIdent::Lhs => "lhs",
            MatmulIdent::Rhs => "rhs",
            MatmulIdent::Out => "out",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_class_splits_at_512() {
        assert_eq!(
            MatmulProblem::new(4, 256, 128, 511).shape_class(),
            ShapeClass::Small
        );
        assert_eq!(
            MatmulProblem::new(1, 256, 128, 512).shape_class(),
            ShapeClass::Large
        );
    }

    #[test]
    fn flops_count_every_batch() {
        assert_eq!(MatmulProblem::new(2, 4, 8, 16).flops(), 2 * 2 * 4 * 8 * 16);
    }
}
