//! Session-level errors.

use crate::pose::StageFailure;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a session operation. External state is never modified when
/// one of these is returned.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("No Movie clip selected.")]
    ClipMissing,
    /// Every problem found in the mapping table, in row order.
    #[error("{}", .0.join("\n"))]
    Mapping(Vec<String>),
    #[error("Track {track} undefined on frame {frame}.")]
    MarkerMissing { track: String, frame: i32 },
    #[error("2D and 3D point counts differ ({points_2d} vs {points_3d}).")]
    PointMismatch { points_2d: usize, points_3d: usize },
    #[error("At least {needed} correspondences required, got {got}.")]
    NotEnoughPoints { needed: usize, got: usize },
    #[error(
        "All PnP methods failed ({}). Check that the points are not coplanar and that the calibration is correct.",
        StageFailure::join(.0)
    )]
    PnpFailed(Vec<StageFailure>),
    #[error("Calibration failed: {0}. Check that the points are well placed and not coplanar.")]
    CalibrationFailed(String),
    #[error("No camera selected. Select a camera first.")]
    NoCameraSelected,
    #[error("No tracks found in clip.")]
    NoTracks,
    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),
    #[error("Cannot write report {}: {source}", .path.display())]
    ReportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SolverError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SolverError::ClipMissing => "clip_missing",
            SolverError::Mapping(_) => "mapping_error",
            SolverError::MarkerMissing { .. } => "marker_missing",
            SolverError::PointMismatch { .. } => "point_mismatch",
            SolverError::NotEnoughPoints { .. } => "not_enough_points",
            SolverError::PnpFailed(_) => "pnp_failed",
            SolverError::CalibrationFailed(_) => "calibration_failed",
            SolverError::NoCameraSelected => "no_camera_selected",
            SolverError::NoTracks => "no_tracks",
            SolverError::SolverUnavailable(_) => "solver_unavailable",
            SolverError::ReportIo { .. } => "report_io",
        }
    }
}
