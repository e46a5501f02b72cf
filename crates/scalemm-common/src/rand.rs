pub use rand::{Rng, SeedableRng, rngs::StdRng};

use rand::distr::StandardUniform;
use rand::prelude::Distribution;

/// Seed used whenever reproducible data is requested without an explicit seed.
pub const DEFAULT_SEED: u64 = 42;

/// Returns a seeded random number generator using entropy.
#[inline(always)]
pub fn get_seeded_rng() -> StdRng {
    StdRng::from_os_rng()
}

/// Returns a random number generator seeded with `seed`, for reproducible data.
#[inline(always)]
pub fn get_rng_from_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Generates random data from a thread-local RNG.
#[inline]
pub fn gen_random<T>() -> T
where
    StandardUniform: Distribution<T>,
{
    rand::rng().random()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut lhs = get_rng_from_seed(DEFAULT_SEED);
        let mut rhs = get_rng_from_seed(DEFAULT_SEED);

        let lhs: Vec<u32> = (0..8).map(|_| lhs.random()).collect();
        let rhs: Vec<u32> = (0..8).map(|_| rhs.random()).collect();

        assert_eq!(lhs, rhs);
    }
}
