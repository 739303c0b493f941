//! Non-linear refinement problems built on tiny-solver.
//!
//! Two problems share the same projection and parameter machinery:
//! - [`problems::pose_refine`]: SE(3) pose with fixed intrinsics and
//!   distortion (the ITERATIVE PnP stage);
//! - [`problems::intrinsics_refine`]: shared focal length, principal point,
//!   three radial terms and the pose, with per-field masking.
//!
//! Both run through [`solver::tiny::solve`], which reports a run that never
//! moved as stalled instead of converged.

pub mod factors;
pub mod math;
pub mod params;
pub mod problems;
pub mod solver;

pub use crate::problems::intrinsics_refine::{
    optimize_intrinsics, IntrinsicsMask, IntrinsicsRefineInit, IntrinsicsRefineResult,
};
pub use crate::problems::pose_refine::{refine_pose, PoseRefineResult};
pub use crate::params::intrinsics::CameraLayout;
pub use crate::solver::tiny::{StopReason, TinySolution, TinySolveOptions};
