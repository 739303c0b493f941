//! SE(3) parameter conversions for tiny-solver.

use anyhow::{ensure, Result};
use nalgebra::{DVector, DVectorView, Quaternion, UnitQuaternion, Vector3};
use smilepnp_core::Iso3;

pub const POSE_DIM: usize = 7;

/// `Iso3` to `[qx, qy, qz, qw, tx, ty, tz]`.
pub fn iso3_to_se3_dvec(pose: &Iso3) -> DVector<f64> {
    let q = pose.rotation.quaternion().coords;
    let t = pose.translation.vector;
    nalgebra::dvector![q[0], q[1], q[2], q[3], t.x, t.y, t.z]
}

/// `[qx, qy, qz, qw, tx, ty, tz]` to `Iso3`; the quaternion is renormalized.
pub fn se3_dvec_to_iso3(v: DVectorView<'_, f64>) -> Result<Iso3> {
    ensure!(
        v.len() == POSE_DIM,
        "expected se3 vector of length {}, got {}",
        POSE_DIM,
        v.len()
    );
    let rot = UnitQuaternion::from_quaternion(Quaternion::new(v[3], v[0], v[1], v[2]));
    Ok(Iso3::from_parts(Vector3::new(v[4], v[5], v[6]).into(), rot))
}
