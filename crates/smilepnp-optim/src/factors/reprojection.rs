//! Reprojection residual factors.

use crate::math::projection::project_radial;
use crate::params::intrinsics::CameraLayout;
use nalgebra::{DVector, RealField, Vector2, Vector3};
use smilepnp_core::{CameraModel, Pt2, Pt3};
use tiny_solver::factors::Factor;
use tiny_solver::manifold::se3::SE3;

fn world_point<T: RealField>(pw: &Pt3) -> Vector3<T> {
    Vector3::new(
        nalgebra::convert(pw.x),
        nalgebra::convert(pw.y),
        nalgebra::convert(pw.z),
    )
}

fn pixel_residual<T: RealField>(uv: &Pt2, proj: Vector2<T>) -> DVector<T> {
    let u: T = nalgebra::convert(uv.x);
    let v: T = nalgebra::convert(uv.y);
    nalgebra::dvector![u - proj.x.clone(), v - proj.y.clone()]
}

/// Pixel residual of one landmark under a fixed camera; the only parameter
/// block is the SE(3) pose.
#[derive(Debug, Clone)]
pub struct PoseReprojFactor {
    pub pw: Pt3,
    pub uv: Pt2,
    pub camera: CameraModel,
}

impl<T: RealField> Factor<T> for PoseReprojFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 1, "expected [pose] parameter block");
        let se3 = SE3::<T>::from_vec(params[0].as_view());
        let pc = se3 * world_point::<T>(&self.pw).as_view();

        let cam = &self.camera;
        let proj = project_radial(
            nalgebra::convert(cam.focal_px),
            nalgebra::convert(cam.principal.x),
            nalgebra::convert(cam.principal.y),
            [
                nalgebra::convert(cam.distortion.k1),
                nalgebra::convert(cam.distortion.k2),
                nalgebra::convert(cam.distortion.k3),
            ],
            pc,
        );
        pixel_residual(&self.uv, proj)
    }
}

/// Pixel residual of one landmark with the free camera fields and the SE(3)
/// pose as parameter blocks.
///
/// The blocks are `[camera, pose]`, or just `[pose]` when the layout frees
/// nothing.
#[derive(Debug, Clone)]
pub struct CalibReprojFactor {
    pub pw: Pt3,
    pub uv: Pt2,
    pub layout: CameraLayout,
}

impl<T: RealField> Factor<T> for CalibReprojFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert!(
            matches!(params.len(), 1 | 2),
            "expected [camera, pose] or [pose] parameter blocks"
        );
        let (camera, pose) = match params {
            [camera, pose] => (Some(camera), pose),
            _ => (None, &params[0]),
        };
        let [f, cx, cy, k1, k2, k3] = self.layout.expand(camera);

        let se3 = SE3::<T>::from_vec(pose.as_view());
        let pc = se3 * world_point::<T>(&self.pw).as_view();
        let proj = project_radial(f, cx, cy, [k1, k2, k3], pc);
        pixel_residual(&self.uv, proj)
    }
}
