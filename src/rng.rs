//! Injectable randomness (spec §5, §9): dice rolls and event sampling must be
//! seedable so tests are deterministic. Everything downstream takes `&mut dyn Rng`
//! rather than reaching for a global generator.

use rand::rngs::SmallRng;
use rand::Rng as _;
use rand::SeedableRng;

pub trait Rng {
    /// Uniform roll of one die with `sides` faces, returns a value in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;

    /// Uniform integer in `1..=max` inclusive, used by the weighted event sampler.
    fn uniform(&mut self, max: u64) -> u64;
}

pub struct SmallRngSource(SmallRng);

impl SmallRngSource {
    pub fn seeded(seed: u64) -> Self {
        Self(SmallRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(SmallRng::from_os_rng())
    }
}

impl Rng for SmallRngSource {
    fn roll_die(&mut self, sides: u32) -> u32 {
        if sides < 1 {
            return 0;
        }
        self.0.random_range(1..=sides)
    }

    fn uniform(&mut self, max: u64) -> u64 {
        if max < 1 {
            return 0;
        }
        self.0.random_range(1..=max)
    }
}
