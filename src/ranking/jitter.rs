//! Jitter for the rank formula.
//!
//! Every score is divided by a factor drawn from `[1.0, 1.1)`, so that equally
//! weighted, equally fresh sources do not interleave in lock-step. The source of
//! that factor is injected into the selection engine, which keeps the
//! algorithm reproducible under test.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

pub trait Jitter: Send {
    /// Next multiplier. Implementations used in production stay in `[1.0, 1.1)`.
    fn next_factor(&mut self) -> f64;
}

/// Uniform jitter in `[1.0, 1.1)`.
#[derive(Debug, Clone)]
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Jitter for RandomJitter {
    fn next_factor(&mut self) -> f64 {
        self.rng.random_range(1.0..1.1)
    }
}

/// Constant factor; `FixedJitter(1.0)` disables jitter entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn next_factor(&mut self) -> f64 {
        self.0
    }
}

/// How the service obtains jitter for each request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterMode {
    /// Fresh OS-seeded generator per request.
    #[default]
    Random,
    /// Every request replays the same sequence. Reproducible ranking for debugging.
    Seeded(u64),
    /// Constant factor.
    Fixed(f64),
}

impl JitterMode {
    pub fn make(&self) -> Box<dyn Jitter> {
        match *self {
            JitterMode::Random => Box::new(RandomJitter::from_entropy()),
            JitterMode::Seeded(seed) => Box::new(RandomJitter::seeded(seed)),
            JitterMode::Fixed(f) => Box::new(FixedJitter(f)),
        }
    }
}
