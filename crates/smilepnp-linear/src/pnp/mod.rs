//! Perspective-n-Point (PnP) solvers for camera pose estimation.
//!
//! Includes:
//! - SQPnP: globally optimal solver over the rotation 9-vector.
//! - DLT (linear) pose estimation with normalization.
//! - EPnP (control-point formulation) for 4+ points.
//!
//! All methods estimate a pose `T_C_W`: transform from world coordinates into
//! the vision camera frame (looking along +Z, Y down).

use smilepnp_core::{CameraModel, Iso3, Pt2, Pt3, Vec2};
use thiserror::Error;

mod dlt;
mod epnp;
mod pose_utils;
mod sqpnp;

pub use dlt::dlt;
pub use epnp::epnp;
pub use sqpnp::{sqpnp, SqpnpOptions, SqpnpSolution};

/// Errors that can occur during PnP estimation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PnpError {
    /// Not enough point correspondences were provided.
    #[error("need at least {needed} point correspondences, got {got}")]
    NotEnoughPoints { needed: usize, got: usize },
    /// World and image point lists differ in length.
    #[error("3D / 2D point counts must match: {world} vs {image}")]
    MismatchedCounts { world: usize, image: usize },
    /// The point configuration does not constrain the pose.
    #[error("degenerate point configuration: {0}")]
    Degenerate(&'static str),
    /// The SQPnP cost matrix has too many null directions.
    #[error("cost matrix has {0} null directions")]
    RankDeficient(usize),
    /// A singular value decomposition did not converge.
    #[error("svd failed in {0}")]
    SvdFailed(&'static str),
    /// No candidate placed the points in front of the camera.
    #[error("no solution with points in front of the camera")]
    NoSolution,
}

/// Pose solvers over a fixed camera model.
///
/// Pixel positions are undistorted with the camera's radial model before
/// any solver runs.
#[derive(Debug, Clone, Copy)]
pub struct PnpSolver;

impl PnpSolver {
    /// SQPnP: all minimum-error candidates, sorted by algebraic error.
    pub fn sqpnp(
        world: &[Pt3],
        image: &[Pt2],
        camera: &CameraModel,
        opts: &SqpnpOptions,
    ) -> Result<Vec<SqpnpSolution>, PnpError> {
        sqpnp::sqpnp(world, image, camera, opts)
    }

    /// Normalized DLT on all points (6+).
    pub fn dlt(world: &[Pt3], image: &[Pt2], camera: &CameraModel) -> Result<Iso3, PnpError> {
        dlt::dlt(world, image, camera)
    }

    /// EPnP on all points (4+).
    pub fn epnp(world: &[Pt3], image: &[Pt2], camera: &CameraModel) -> Result<Iso3, PnpError> {
        epnp::epnp(world, image, camera)
    }
}

pub(crate) fn check_inputs(world: &[Pt3], image: &[Pt2], needed: usize) -> Result<(), PnpError> {
    if world.len() != image.len() {
        return Err(PnpError::MismatchedCounts {
            world: world.len(),
            image: image.len(),
        });
    }
    if world.len() < needed {
        return Err(PnpError::NotEnoughPoints {
            needed,
            got: world.len(),
        });
    }
    Ok(())
}

/// Undistorted normalized image coordinates (`z = 1` plane).
pub(crate) fn normalized_rays(image: &[Pt2], camera: &CameraModel) -> Vec<Vec2> {
    image.iter().map(|px| camera.pixel_to_normalized(px)).collect()
}
