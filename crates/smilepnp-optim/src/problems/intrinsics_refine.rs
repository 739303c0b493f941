//! Joint refinement of intrinsics, radial distortion and pose.
//!
//! Square pixels are enforced by a single focal parameter and tangential
//! distortion is not modeled. Only unmasked fields enter the `camera`
//! block (see [`CameraLayout`]); masked fields are constants of the
//! residual and come back bit-identical.
//!
//! When distortion is refined together with the focal length or the
//! principal point, a first pass holds the distortion so the linear
//! part of the camera settles before the radial terms move.

use crate::factors::reprojection::CalibReprojFactor;
use crate::params::intrinsics::CameraLayout;
use crate::params::pose_se3::{iso3_to_se3_dvec, se3_dvec_to_iso3};
use crate::solver::tiny::{solve, TinySolveOptions};
use anyhow::{anyhow, bail, ensure, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use smilepnp_core::{CameraModel, Iso3, Pt2, Pt3, Real};
use std::collections::HashMap;
use std::sync::Arc;
use tiny_solver::manifold::se3::SE3Manifold;
use tiny_solver::problem::Problem;

const CAMERA_KEY: &str = "camera";
const POSE_KEY: &str = "pose";

/// Which fields are held at their initial values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsMask {
    pub fix_focal: bool,
    pub fix_principal: bool,
    pub fix_k1: bool,
    pub fix_k2: bool,
    pub fix_k3: bool,
}

impl IntrinsicsMask {
    /// Hold every intrinsic field; only the pose moves.
    pub fn all_fixed() -> Self {
        Self {
            fix_focal: true,
            fix_principal: true,
            fix_k1: true,
            fix_k2: true,
            fix_k3: true,
        }
    }

    /// Free flags in [`CameraLayout`] field order.
    pub fn free_fields(&self) -> [bool; 6] {
        [
            !self.fix_focal,
            !self.fix_principal,
            !self.fix_principal,
            !self.fix_k1,
            !self.fix_k2,
            !self.fix_k3,
        ]
    }

    fn frees_distortion(&self) -> bool {
        !(self.fix_k1 && self.fix_k2 && self.fix_k3)
    }

    fn frees_projection(&self) -> bool {
        !(self.fix_focal && self.fix_principal)
    }

    fn with_distortion_held(&self) -> Self {
        Self {
            fix_k1: true,
            fix_k2: true,
            fix_k3: true,
            ..*self
        }
    }

    /// Masks solved one after the other.
    fn stages(&self) -> Vec<IntrinsicsMask> {
        if self.frees_distortion() && self.frees_projection() {
            vec![self.with_distortion_held(), *self]
        } else {
            vec![*self]
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntrinsicsRefineInit {
    pub camera: CameraModel,
    pub pose: Iso3,
}

/// Raw refined values. The focal length is not validated here.
#[derive(Debug, Clone)]
pub struct IntrinsicsRefineResult {
    /// Initial camera with the unmasked fields replaced.
    pub camera: CameraModel,
    pub pose: Iso3,
    pub initial_cost: f64,
    pub final_cost: f64,
}

impl IntrinsicsRefineResult {
    /// RMS pixel residual over `num_points` landmarks.
    pub fn rms(&self, num_points: usize) -> Real {
        if num_points == 0 {
            return 0.0;
        }
        (2.0 * self.final_cost / num_points as Real).sqrt()
    }
}

/// Build the joint problem, its initial parameter map and the camera layout.
///
/// The `camera` block is present only when at least one field is free.
pub fn build_intrinsics_problem(
    world: &[Pt3],
    image: &[Pt2],
    initial: &IntrinsicsRefineInit,
    mask: &IntrinsicsMask,
) -> Result<(Problem, HashMap<String, DVector<f64>>, CameraLayout)> {
    ensure!(
        world.len() == image.len(),
        "3D / 2D point counts must match: {} vs {}",
        world.len(),
        image.len()
    );
    ensure!(world.len() >= 6, "need at least 6 points, got {}", world.len());

    let layout = CameraLayout::new(&initial.camera, mask.free_fields());
    let keys: &[&str] = if layout.free_count() > 0 {
        &[CAMERA_KEY, POSE_KEY]
    } else {
        &[POSE_KEY]
    };

    let mut problem = Problem::new();
    problem.set_variable_manifold(POSE_KEY, Arc::new(SE3Manifold));
    for (pw, uv) in world.iter().zip(image) {
        let factor = CalibReprojFactor {
            pw: *pw,
            uv: *uv,
            layout,
        };
        problem.add_residual_block(2, keys, Box::new(factor), None);
    }

    let mut initial_map = HashMap::new();
    if layout.free_count() > 0 {
        initial_map.insert(CAMERA_KEY.to_string(), layout.pack(&initial.camera));
    }
    initial_map.insert(POSE_KEY.to_string(), iso3_to_se3_dvec(&initial.pose));
    Ok((problem, initial_map, layout))
}

/// Refine the unmasked intrinsics together with the pose.
///
/// Fails when the optimizer never managed to evaluate a step, so an
/// untouched camera is never reported as refined.
pub fn optimize_intrinsics(
    world: &[Pt3],
    image: &[Pt2],
    initial: &IntrinsicsRefineInit,
    mask: &IntrinsicsMask,
    solver: &TinySolveOptions,
) -> Result<IntrinsicsRefineResult> {
    let mut current = initial.clone();
    let mut initial_cost = None;
    let mut final_cost = 0.0;
    let mut stalled = true;

    for stage in mask.stages() {
        let (problem, initial_map, layout) =
            build_intrinsics_problem(world, image, &current, &stage)?;
        let solution = solve(&problem, initial_map, solver)?;
        let get = |key: &str| {
            solution
                .params
                .get(key)
                .ok_or_else(|| anyhow!("missing {key} in solution"))
        };
        if layout.free_count() > 0 {
            current.camera = layout.unpack(&current.camera, get(CAMERA_KEY)?.as_view())?;
        }
        current.pose = se3_dvec_to_iso3(get(POSE_KEY)?.as_view())?;

        initial_cost.get_or_insert(solution.initial_cost);
        final_cost = solution.final_cost;
        stalled &= solution.stalled();
    }
    if stalled {
        bail!("refinement made no progress");
    }
    log::debug!(
        "intrinsics refinement finished: f = {:.3}, cost {:.3e}",
        current.camera.focal_px,
        final_cost
    );

    Ok(IntrinsicsRefineResult {
        camera: current.camera,
        pose: current.pose,
        initial_cost: initial_cost.unwrap_or(final_cost),
        final_cost,
    })
}
