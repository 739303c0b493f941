//! Small linear algebra helpers shared by the PnP solvers.

use nalgebra::{DMatrix, Matrix3x4};
use smilepnp_core::{Mat3, Mat4, Pt3, Real, Vec3};

/// Isotropic normalization for 3D points.
///
/// Centers the points at the origin and scales them so the mean distance to
/// the origin is `√3`. Returns `None` for an empty input or when all points
/// coincide.
pub fn normalize_points_3d(points: &[Pt3]) -> Option<(Vec<Pt3>, Mat4)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as Real;
    let centroid = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<Real>()
        / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = (3.0_f64).sqrt() / mean_dist;
    let mut t = Mat4::identity() * scale;
    t[(3, 3)] = 1.0;
    t.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-scale * centroid));

    let normalized = points
        .iter()
        .map(|p| Pt3::from((p.coords - centroid) * scale))
        .collect();
    Some((normalized, t))
}

/// Reshape a 12-element row of `v_t` into a row-major 3x4 matrix.
pub fn mat34_from_svd_row(v_t: &DMatrix<Real>, row_idx: usize) -> Matrix3x4<Real> {
    Matrix3x4::from_fn(|r, c| v_t[(row_idx, 4 * r + c)])
}

/// Closest rotation to `m` in the Frobenius sense.
///
/// Returns `None` if the SVD does not produce both singular vector sets.
pub fn nearest_rotation(m: &Mat3) -> Option<Mat3> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let d = (u * v_t).determinant().signum();
    let fix = Mat3::from_diagonal(&Vec3::new(1.0, 1.0, d));
    Some(u * fix * v_t)
}

/// Sum of squared deviations of `m`'s columns from an orthonormal frame.
pub fn orthogonality_error(m: &Mat3) -> Real {
    let a = m.column(0);
    let b = m.column(1);
    let c = m.column(2);
    let la = a.norm_squared() - 1.0;
    let lb = b.norm_squared() - 1.0;
    let lc = c.norm_squared() - 1.0;
    let ab = a.dot(&b);
    let ac = a.dot(&c);
    let bc = b.dot(&c);
    la * la + lb * lb + lc * lc + 2.0 * (ab * ab + ac * ac + bc * bc)
}
