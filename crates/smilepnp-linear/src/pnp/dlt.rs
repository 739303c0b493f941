//! Direct Linear Transform (DLT) pose solver.
//!
//! Solves the homogeneous system for `P = [R | t]` on normalized image
//! coordinates and conditioned world points, then projects the rotation
//! block onto SO(3).

use super::{check_inputs, normalized_rays, PnpError};
use crate::math::{mat34_from_svd_row, normalize_points_3d};
use nalgebra::DMatrix;
use smilepnp_core::{iso3_from_rt, CameraModel, Iso3, Pt2, Pt3, Real};

/// Minimum number of correspondences for the linear solve.
pub const DLT_MIN_POINTS: usize = 6;

/// Direct linear PnP on all input points.
///
/// Returns `T_C_W`: the transform from world to camera coordinates.
pub fn dlt(world: &[Pt3], image: &[Pt2], camera: &CameraModel) -> Result<Iso3, PnpError> {
    check_inputs(world, image, DLT_MIN_POINTS)?;
    let n = world.len();

    let (world_norm, t_world) = normalize_points_3d(world)
        .ok_or(PnpError::Degenerate("3D points coincide"))?;
    let rays = normalized_rays(image, camera);

    let mut a = DMatrix::<Real>::zeros(2 * n, 12);
    for (i, (pw, uv)) in world_norm.iter().zip(&rays).enumerate() {
        let (x, y, z) = (pw.x, pw.y, pw.z);
        let (u, v) = (uv.x, uv.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -u * x;
        a[(r0, 9)] = -u * y;
        a[(r0, 10)] = -u * z;
        a[(r0, 11)] = -u;

        a[(r1, 4)] = x;
        a[(r1, 5)] = y;
        a[(r1, 6)] = z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -v * x;
        a[(r1, 9)] = -v * y;
        a[(r1, 10)] = -v * z;
        a[(r1, 11)] = -v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(PnpError::SvdFailed("DLT system"))?;
    if v_t.nrows() < 12 {
        return Err(PnpError::Degenerate("DLT system is underdetermined"));
    }
    // Undo the world conditioning: P = P_norm * T_world.
    let p_mtx = mat34_from_svd_row(&v_t, v_t.nrows() - 1) * t_world;

    let mut r_approx = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();
    let mut s = (r_approx.row(0).norm() + r_approx.row(1).norm() + r_approx.row(2).norm()) / 3.0;
    if r_approx.determinant() < 0.0 {
        s = -s;
    }
    if s.abs() <= Real::EPSILON {
        return Err(PnpError::Degenerate("DLT rotation block vanished"));
    }
    r_approx /= s;

    let svd = r_approx.svd(true, true);
    let u = svd.u.ok_or(PnpError::SvdFailed("DLT rotation"))?;
    let v_t = svd.v_t.ok_or(PnpError::SvdFailed("DLT rotation"))?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t = p_mtx.column(3).into_owned() / s;
    Ok(iso3_from_rt(&r_orth, &t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Rotation3, Translation3};
    use smilepnp_core::{rotation_angle_between, ImageSize, RadialDistortion};

    #[test]
    fn dlt_recovers_pose_synthetic() {
        let cam = CameraModel::new(
            800.0,
            Pt2::new(640.0, 360.0),
            RadialDistortion::zeros(),
            ImageSize::new(1280, 720),
        )
        .unwrap();

        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Translation3::new(0.1, -0.05, 1.0);
        let iso_gt = Isometry3::from_parts(t, rot.into());

        let mut world = Vec::new();
        let mut image = Vec::new();
        for z in 0..2 {
            for y in 0..3 {
                for x in 0..4 {
                    let pw = Pt3::new(x as Real * 0.1, y as Real * 0.1, 0.5 + z as Real * 0.1);
                    let uv = cam.project(&iso_gt.transform_point(&pw)).unwrap();
                    world.push(pw);
                    image.push(uv);
                }
            }
        }

        let est = dlt(&world, &image, &cam).unwrap();

        let dt = (est.translation.vector - iso_gt.translation.vector).norm();
        let ang = rotation_angle_between(
            est.rotation.to_rotation_matrix().matrix(),
            iso_gt.rotation.to_rotation_matrix().matrix(),
        );
        assert!(dt < 1e-3, "translation error too large: {}", dt);
        assert!(ang < 1e-3, "rotation error too large: {}", ang);
    }

    #[test]
    fn dlt_undistorts_before_solving() {
        let cam = CameraModel::new(
            1200.0,
            Pt2::new(960.0, 540.0),
            RadialDistortion::new(-0.08, 0.02, 0.0),
            ImageSize::new(1920, 1080),
        )
        .unwrap();
        let rot = Rotation3::from_euler_angles(-0.2, 0.3, 0.05);
        let iso_gt = Isometry3::from_parts(Translation3::new(0.2, 0.1, 6.0), rot.into());

        let world = smilepnp_core::synthetic::scattered_points();
        let image: Vec<Pt2> = world
            .iter()
            .map(|pw| cam.project(&iso_gt.transform_point(pw)).unwrap())
            .collect();

        let est = dlt(&world, &image, &cam).unwrap();
        assert!((est.translation.vector - iso_gt.translation.vector).norm() < 1e-4);
    }

    #[test]
    fn dlt_needs_six_points() {
        let cam = CameraModel::pinhole(800.0, ImageSize::new(640, 480)).unwrap();
        let world = vec![Pt3::new(0.0, 0.0, 5.0); 5];
        let image = vec![Pt2::new(320.0, 240.0); 5];
        assert_eq!(
            dlt(&world, &image, &cam),
            Err(PnpError::NotEnoughPoints { needed: 6, got: 5 })
        );
    }
}
