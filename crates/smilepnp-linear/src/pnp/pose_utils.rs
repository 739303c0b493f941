//! Pose recovery from world / camera-frame point pairs.

use super::PnpError;
use smilepnp_core::{iso3_from_rt, Iso3, Mat3, Pt3, Real, Vec3};

/// Rigid alignment of `world` onto `camera` (Kabsch).
///
/// Returns `T_C_W`: the transform from world coordinates to camera
/// coordinates.
pub(super) fn pose_from_points(world: &[Pt3], camera: &[Vec3]) -> Result<Iso3, PnpError> {
    if world.len() != camera.len() || world.len() < 3 {
        return Err(PnpError::Degenerate("too few points for rigid alignment"));
    }

    let n = world.len() as Real;
    let c_w = world.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;
    let c_c = camera.iter().fold(Vec3::zeros(), |acc, p| acc + p) / n;

    let mut h = Mat3::zeros();
    for (pw, pc) in world.iter().zip(camera) {
        h += (pc - c_c) * (pw.coords - c_w).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(PnpError::SvdFailed("rigid alignment"))?;
    let v_t = svd.v_t.ok_or(PnpError::SvdFailed("rigid alignment"))?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }

    let t = c_c - r * c_w;
    Ok(iso3_from_rt(&r, &t))
}
