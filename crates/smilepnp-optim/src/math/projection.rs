//! Projection helpers shared by factors, generic over `RealField` so they run
//! on dual numbers during automatic differentiation.

use nalgebra::{RealField, Vector2, Vector3};

/// Epsilon added to depth for numerical stability.
pub const PROJECTION_EPS: f64 = 1.0e-9;

/// Radial distortion `1 + k1 r² + k2 r⁴ + k3 r⁶` applied to normalized
/// coordinates.
pub fn distort_radial<T: RealField>(x: T, y: T, k1: T, k2: T, k3: T) -> (T, T) {
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();
    let scale = T::one() + k1 * r2 + k2 * r4 + k3 * r6;
    (x * scale.clone(), y * scale)
}

/// Project a camera-frame point with a shared focal length and radial
/// distortion.
pub fn project_radial<T: RealField>(
    f: T,
    cx: T,
    cy: T,
    k: [T; 3],
    pc: Vector3<T>,
) -> Vector2<T> {
    let eps: T = nalgebra::convert(PROJECTION_EPS);
    let z = pc.z.clone() + eps;
    let x = pc.x.clone() / z.clone();
    let y = pc.y.clone() / z;
    let [k1, k2, k3] = k;
    let (xd, yd) = distort_radial(x, y, k1, k2, k3);
    Vector2::new(f.clone() * xd + cx, f * yd + cy)
}
