//! Process-wide random seeding.
//!
//! Seeding happens exactly once, explicitly, at process entry; the generator
//! is then passed by reference to the components that need randomness.

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

/// A seeded generator plus a record of how it was seeded.
pub struct SeededRng {
    rng: StdRng,
    securely_seeded: bool,
}

impl SeededRng {
    /// Whether the generator was seeded from OS entropy rather than time.
    pub fn securely_seeded(&self) -> bool {
        self.securely_seeded
    }

    /// Borrow the generator.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Derive an independent generator, e.g. for a spawned task.
    pub fn derive(&mut self) -> StdRng {
        let mut seed = [0u8; 32];
        self.rng.fill(&mut seed);
        StdRng::from_seed(seed)
    }
}

/// Seed the process generator: OS entropy when available, the current time
/// otherwise, which is weak but guaranteed.
pub fn seed() -> SeededRng {
    match StdRng::from_rng(OsRng) {
        Ok(rng) => SeededRng {
            rng,
            securely_seeded: true,
        },
        Err(_) => {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1);
            SeededRng {
                rng: StdRng::seed_from_u64(nanos),
                securely_seeded: false,
            }
        }
    }
}
