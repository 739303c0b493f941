use crate::{Real, Vec2};
use serde::{Deserialize, Serialize};

/// Radial lens distortion with three coefficients.
///
/// Tangential terms are not modeled; the OpenCV-ordered coefficient vector is
/// `[k1, k2, 0, 0, k3]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RadialDistortion {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
}

impl RadialDistortion {
    /// Fixed-point iterations used by [`RadialDistortion::undistort`].
    pub const UNDISTORT_ITERS: usize = 20;

    pub fn new(k1: Real, k2: Real, k3: Real) -> Self {
        Self { k1, k2, k3 }
    }

    pub fn zeros() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.k3 == 0.0
    }

    /// Coefficients in OpenCV order `[k1, k2, p1, p2, k3]`.
    pub fn to_vector(&self) -> [Real; 5] {
        [self.k1, self.k2, 0.0, 0.0, self.k3]
    }

    fn radial_factor(&self, x: Real, y: Real) -> Real {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6
    }

    /// Apply distortion to an undistorted normalized coordinate.
    pub fn distort(&self, n_undist: &Vec2) -> Vec2 {
        n_undist * self.radial_factor(n_undist.x, n_undist.y)
    }

    /// Invert [`RadialDistortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        if self.is_zero() {
            return *n_dist;
        }
        let mut x = n_dist.x;
        let mut y = n_dist.y;
        for _ in 0..Self::UNDISTORT_ITERS {
            let f = self.radial_factor(x, y);
            if f.abs() <= Real::EPSILON {
                break;
            }
            x = n_dist.x / f;
            y = n_dist.y / f;
        }
        Vec2::new(x, y)
    }
}
