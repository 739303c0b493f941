//! Pose refinement with fixed intrinsics and distortion.
//!
//! Each landmark contributes one two-residual block on the single `pose`
//! parameter, which lives on the SE(3) manifold.

use crate::factors::reprojection::PoseReprojFactor;
use crate::params::pose_se3::{iso3_to_se3_dvec, se3_dvec_to_iso3};
use crate::solver::tiny::{solve, TinySolveOptions};
use anyhow::{anyhow, bail, ensure, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use smilepnp_core::{CameraModel, Iso3, Pt2, Pt3};
use std::collections::HashMap;
use std::sync::Arc;
use tiny_solver::manifold::se3::SE3Manifold;
use tiny_solver::problem::Problem;

const POSE_KEY: &str = "pose";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRefineResult {
    pub pose: Iso3,
    pub final_cost: f64,
}

/// Build the pose-only problem and its initial parameter map.
pub fn build_pose_problem(
    world: &[Pt3],
    image: &[Pt2],
    camera: &CameraModel,
    initial: &Iso3,
) -> Result<(Problem, HashMap<String, DVector<f64>>)> {
    ensure!(
        world.len() == image.len(),
        "3D / 2D point counts must match: {} vs {}",
        world.len(),
        image.len()
    );
    ensure!(world.len() >= 3, "need at least 3 points, got {}", world.len());

    let mut problem = Problem::new();
    problem.set_variable_manifold(POSE_KEY, Arc::new(SE3Manifold));
    for (pw, uv) in world.iter().zip(image) {
        let factor = PoseReprojFactor {
            pw: *pw,
            uv: *uv,
            camera: *camera,
        };
        problem.add_residual_block(2, &[POSE_KEY], Box::new(factor), None);
    }

    let mut initial_map = HashMap::new();
    initial_map.insert(POSE_KEY.to_string(), iso3_to_se3_dvec(initial));
    Ok((problem, initial_map))
}

/// Refine `initial` by Levenberg–Marquardt on pixel reprojection error.
///
/// Fails when no step could be taken within the iteration budget.
pub fn refine_pose(
    world: &[Pt3],
    image: &[Pt2],
    camera: &CameraModel,
    initial: &Iso3,
    solver: &TinySolveOptions,
) -> Result<PoseRefineResult> {
    let (problem, initial_map) = build_pose_problem(world, image, camera, initial)?;
    let solution = solve(&problem, initial_map, solver)?;
    if solution.stalled() {
        bail!("pose refinement made no progress");
    }
    let pose_vec = solution
        .params
        .get(POSE_KEY)
        .ok_or_else(|| anyhow!("missing pose in solution"))?;
    let pose = se3_dvec_to_iso3(pose_vec.as_view())?;
    let final_cost = solution.final_cost;
    log::debug!(
        "pose refinement finished after {} iterations, cost {final_cost:.3e}",
        solution.iterations
    );
    Ok(PoseRefineResult { pose, final_cost })
}
