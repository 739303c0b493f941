//! Selective intrinsics calibration.
//!
//! The refiner moves only the flagged fields (plus the pose) and the result
//! copies every unflagged field from the input camera unchanged. A refined
//! focal length that is not positive and finite is rejected rather than
//! reported as an error.

use crate::error::SolverError;
use crate::pose::{run_chain, select_solution, PnpBackend};
use anyhow::Result;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use smilepnp_core::{
    evaluate_set, iso3_from_rt, rt_from_iso3, CameraModel, CorrespondenceSet, ImageSize, Iso3,
    Mat3, Pt2, RadialDistortion, Real, TrackCameraParams, Vec3, Warning,
};
use smilepnp_optim::{optimize_intrinsics, IntrinsicsMask, IntrinsicsRefineInit, TinySolveOptions};

/// Fewest correspondences a calibration accepts.
pub const MIN_CALIBRATION_POINTS: usize = 6;

/// Fields the refiner may change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineFlags {
    pub focal_length: bool,
    pub principal_point: bool,
    pub k1: bool,
    pub k2: bool,
    pub k3: bool,
}

impl RefineFlags {
    pub fn focal_only() -> Self {
        Self {
            focal_length: true,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            focal_length: true,
            principal_point: true,
            k1: true,
            k2: true,
            k3: true,
        }
    }

    /// Optimizer mask: every unflagged field is fixed.
    pub fn to_mask(&self) -> IntrinsicsMask {
        IntrinsicsMask {
            fix_focal: !self.focal_length,
            fix_principal: !self.principal_point,
            fix_k1: !self.k1,
            fix_k2: !self.k2,
            fix_k3: !self.k3,
        }
    }
}

/// Raw refiner output before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedIntrinsics {
    pub focal_px: Real,
    /// Vision convention.
    pub principal: Pt2,
    pub distortion: RadialDistortion,
    pub pose: Iso3,
}

/// Joint refinement of intrinsics and pose.
pub trait IntrinsicsRefiner {
    fn refine(
        &self,
        set: &CorrespondenceSet,
        camera: &CameraModel,
        initial_pose: &Iso3,
        flags: &RefineFlags,
    ) -> Result<RefinedIntrinsics>;
}

/// Levenberg–Marquardt refinement through `smilepnp-optim`.
#[derive(Debug, Clone, Default)]
pub struct TinySolverRefiner {
    pub solver: TinySolveOptions,
}

impl TinySolverRefiner {
    pub fn new(solver: TinySolveOptions) -> Self {
        Self { solver }
    }
}

impl IntrinsicsRefiner for TinySolverRefiner {
    fn refine(
        &self,
        set: &CorrespondenceSet,
        camera: &CameraModel,
        initial_pose: &Iso3,
        flags: &RefineFlags,
    ) -> Result<RefinedIntrinsics> {
        let init = IntrinsicsRefineInit {
            camera: *camera,
            pose: *initial_pose,
        };
        let result = optimize_intrinsics(
            &set.points_3d(),
            &set.points_2d(),
            &init,
            &flags.to_mask(),
            &self.solver,
        )?;
        Ok(RefinedIntrinsics {
            focal_px: result.camera.focal_px,
            principal: result.camera.principal,
            distortion: result.camera.distortion,
            pose: result.pose,
        })
    }
}

/// An accepted calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Input camera with only the flagged fields replaced.
    pub camera: CameraModel,
    pub flags: RefineFlags,
    /// RMS pixel error of the refined camera and pose.
    pub rms: Real,
    pub rotation: Mat3,
    pub translation: Vec3,
    pub message: String,
    /// Conditions found while gathering the input, already logged.
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationOutcome {
    Applied(CalibrationResult),
    /// The refined focal length was invalid; stored values are kept.
    Rejected { focal: Real, message: String },
}

impl CalibrationOutcome {
    pub fn message(&self) -> &str {
        match self {
            CalibrationOutcome::Applied(result) => &result.message,
            CalibrationOutcome::Rejected { message, .. } => message,
        }
    }
}

/// Calibrate `camera` on `set` without touching any host state.
///
/// The initial pose comes from the PnP chain on the current camera.
pub fn calibrate(
    pnp: &dyn PnpBackend,
    refiner: &dyn IntrinsicsRefiner,
    set: &CorrespondenceSet,
    camera: &CameraModel,
    flags: &RefineFlags,
) -> Result<CalibrationOutcome, SolverError> {
    if set.len() < MIN_CALIBRATION_POINTS {
        return Err(SolverError::NotEnoughPoints {
            needed: MIN_CALIBRATION_POINTS,
            got: set.len(),
        });
    }

    let chain = run_chain(pnp, set, camera)
        .map_err(|e| SolverError::CalibrationFailed(format!("no initial pose: {e}")))?;
    let start = &chain.candidates[select_solution(&chain.candidates)];
    let initial_pose = iso3_from_rt(&start.rotation, &start.translation);
    debug!("calibration starts from the {} pose", chain.method);

    let refined = refiner
        .refine(set, camera, &initial_pose, flags)
        .map_err(|e| SolverError::CalibrationFailed(e.to_string()))?;

    if !(refined.focal_px.is_finite() && refined.focal_px > 0.0) {
        warn!(
            "calibration produced focal length {}; previous values kept",
            refined.focal_px
        );
        return Ok(CalibrationOutcome::Rejected {
            focal: refined.focal_px,
            message: "Invalid calibration - previous values retained".to_string(),
        });
    }

    let merged = merge_flagged(camera, &refined, flags);
    let (rotation, translation) = rt_from_iso3(&refined.pose);
    let rms = evaluate_set(set, &rotation, &translation, &merged).stats.rms;
    Ok(CalibrationOutcome::Applied(CalibrationResult {
        camera: merged,
        flags: *flags,
        rms,
        rotation,
        translation,
        message: format!("Reprojection error (calibration) : {rms:.3} px"),
        warnings: Vec::new(),
    }))
}

/// Copy the flagged fields of `refined` into `camera`.
pub fn merge_flagged(
    camera: &CameraModel,
    refined: &RefinedIntrinsics,
    flags: &RefineFlags,
) -> CameraModel {
    let mut out = *camera;
    if flags.focal_length {
        out.focal_px = refined.focal_px;
    }
    if flags.principal_point {
        out.principal = refined.principal;
    }
    if flags.k1 {
        out.distortion.k1 = refined.distortion.k1;
    }
    if flags.k2 {
        out.distortion.k2 = refined.distortion.k2;
    }
    if flags.k3 {
        out.distortion.k3 = refined.distortion.k3;
    }
    out
}

/// Store the flagged fields of `camera` in the provider's parameters.
///
/// The principal point is converted back to the bottom-left convention.
/// Flagged radial terms go to both the polynomial and Brown sets.
pub fn write_back(
    params: &mut TrackCameraParams,
    camera: &CameraModel,
    flags: &RefineFlags,
    image: ImageSize,
) {
    if flags.focal_length {
        params.focal_px = camera.focal_px;
    }
    if flags.principal_point {
        params.principal_px = [camera.principal.x, image.flip_y(camera.principal.y)];
    }
    let d = camera.distortion;
    for set in [&mut params.polynomial, &mut params.brown] {
        if flags.k1 {
            set.k1 = d.k1;
        }
        if flags.k2 {
            set.k2 = d.k2;
        }
        if flags.k3 {
            set.k3 = d.k3;
        }
    }
}
