//! EPnP (Efficient Perspective-n-Point) pose solver.
//!
//! World points are expressed as barycentric combinations of four control
//! points taken from the principal axes of the point cloud. The camera-frame
//! control points are the null vector of a `2n x 12` system; the pose then
//! follows from rigid alignment.

use super::pose_utils::pose_from_points;
use super::{check_inputs, normalized_rays, PnpError};
use nalgebra::{DMatrix, SymmetricEigen};
use smilepnp_core::{CameraModel, Iso3, Mat3, Pt2, Pt3, Real, Vec3};

pub const EPNP_MIN_POINTS: usize = 4;

/// EPnP pose estimation for 4+ points.
///
/// Returns a single pose estimate in `T_C_W` form.
pub fn epnp(world: &[Pt3], image: &[Pt2], camera: &CameraModel) -> Result<Iso3, PnpError> {
    check_inputs(world, image, EPNP_MIN_POINTS)?;
    let n = world.len();
    let rays = normalized_rays(image, camera);

    let centroid = world.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n as Real;
    let mut cov = Mat3::zeros();
    for p in world {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }
    cov /= n as Real;

    let eig = SymmetricEigen::new(cov);
    let mut control_w = [centroid; 4];
    for i in 0..3 {
        let axis = eig.eigenvectors.column(i).into_owned();
        control_w[i + 1] = centroid + axis * eig.eigenvalues[i].abs().sqrt();
    }

    let basis = Mat3::from_columns(&[
        control_w[1] - control_w[0],
        control_w[2] - control_w[0],
        control_w[3] - control_w[0],
    ]);
    if basis.determinant().abs() <= Real::EPSILON {
        return Err(PnpError::Degenerate("control points are coplanar"));
    }
    let basis_inv = basis
        .try_inverse()
        .ok_or(PnpError::Degenerate("control points are coplanar"))?;

    let alphas: Vec<[Real; 4]> = world
        .iter()
        .map(|p| {
            let c = basis_inv * (p.coords - control_w[0]);
            [1.0 - c.x - c.y - c.z, c.x, c.y, c.z]
        })
        .collect();

    let mut m = DMatrix::<Real>::zeros(2 * n, 12);
    for (i, (a, uv)) in alphas.iter().zip(&rays).enumerate() {
        let r0 = 2 * i;
        let r1 = r0 + 1;
        for (j, &alpha) in a.iter().enumerate() {
            let c = 3 * j;
            m[(r0, c)] = alpha;
            m[(r0, c + 2)] = -uv.x * alpha;
            m[(r1, c + 1)] = alpha;
            m[(r1, c + 2)] = -uv.y * alpha;
        }
    }

    // Null vector of M from the smallest eigenpair of MᵀM.
    let mtm = m.transpose() * &m;
    let eig = mtm.symmetric_eigen();
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx)
        .ok_or(PnpError::SvdFailed("EPnP system"))?;
    let sol = eig.eigenvectors.column(min_idx);

    let mut control_c = [Vec3::zeros(); 4];
    for (j, cc) in control_c.iter_mut().enumerate() {
        *cc = Vec3::new(sol[3 * j], sol[3 * j + 1], sol[3 * j + 2]);
    }

    let mut sum_w = 0.0;
    let mut sum_c = 0.0;
    for i in 0..4 {
        for j in (i + 1)..4 {
            sum_w += (control_w[i] - control_w[j]).norm_squared();
            sum_c += (control_c[i] - control_c[j]).norm_squared();
        }
    }
    if sum_c <= Real::EPSILON {
        return Err(PnpError::Degenerate("EPnP control points collapsed"));
    }

    let camera_pts = |scale: Real| -> Vec<Vec3> {
        alphas
            .iter()
            .map(|a| {
                a.iter()
                    .zip(&control_c)
                    .fold(Vec3::zeros(), |acc, (&alpha, cc)| acc + cc * alpha)
                    * scale
            })
            .collect()
    };

    let mut scale = (sum_w / sum_c).sqrt();
    let mut points_c = camera_pts(scale);
    // The null vector's sign is arbitrary; keep the points in front.
    if points_c.iter().map(|p| p.z).sum::<Real>() < 0.0 {
        scale = -scale;
        points_c = camera_pts(scale);
    }

    pose_from_points(world, &points_c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Rotation3, Translation3};
    use smilepnp_core::{rotation_angle_between, ImageSize, RadialDistortion};

    fn camera() -> CameraModel {
        CameraModel::new(
            800.0,
            Pt2::new(640.0, 360.0),
            RadialDistortion::zeros(),
            ImageSize::new(1280, 720),
        )
        .unwrap()
    }

    #[test]
    fn epnp_recovers_pose_synthetic() {
        let cam = camera();
        let rot = Rotation3::from_euler_angles(-0.1, 0.05, 0.2);
        let t = Translation3::new(0.1, -0.05, 1.2);
        let iso_gt = Isometry3::from_parts(t, rot.into());

        let mut world = Vec::new();
        let mut image = Vec::new();
        for z in 0..2 {
            for y in 0..3 {
                for x in 0..4 {
                    let pw = Pt3::new(x as Real * 0.1, y as Real * 0.1, 0.6 + z as Real * 0.1);
                    let uv = cam.project(&iso_gt.transform_point(&pw)).unwrap();
                    world.push(pw);
                    image.push(uv);
                }
            }
        }

        let est = epnp(&world, &image, &cam).unwrap();

        let dt = (est.translation.vector - iso_gt.translation.vector).norm();
        let ang = rotation_angle_between(
            est.rotation.to_rotation_matrix().matrix(),
            iso_gt.rotation.to_rotation_matrix().matrix(),
        );
        assert!(dt < 1e-3, "translation error too large: {}", dt);
        assert!(ang < 1e-3, "rotation error too large: {}", ang);
    }

    #[test]
    fn epnp_rejects_coincident_points() {
        let cam = camera();
        let world = vec![Pt3::new(0.2, 0.1, 3.0); 6];
        let image = vec![Pt2::new(700.0, 400.0); 6];
        assert!(matches!(
            epnp(&world, &image, &cam),
            Err(PnpError::Degenerate(_))
        ));
    }
}
