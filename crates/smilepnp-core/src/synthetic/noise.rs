//! Seeded pixel noise.

use crate::{CorrespondenceSet, Real};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Perturb every 2D point by uniform noise in `[-amplitude, amplitude]` px.
pub fn add_pixel_noise(set: &CorrespondenceSet, amplitude: Real, seed: u64) -> CorrespondenceSet {
    if amplitude <= 0.0 {
        return set.clone();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut noisy = set.clone();
    for c in noisy.items_mut() {
        c.point2d.x += rng.random_range(-amplitude..=amplitude);
        c.point2d.y += rng.random_range(-amplitude..=amplitude);
    }
    noisy
}
