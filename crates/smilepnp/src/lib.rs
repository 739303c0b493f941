//! High-level entry crate for SmilePnP.
//!
//! SmilePnP places a scene camera from a handful of landmarks: 2D markers
//! tracked in a photograph or video frame, each paired with a 3D reference
//! point in a scene. It can also refine the camera's focal length, principal
//! point and radial distortion from the same correspondences.
//!
//! ## Session API
//!
//! ```no_run
//! use smilepnp::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut project = InMemoryProject::from_json(&std::fs::read_to_string("project.json")?)?;
//! let mut session = Session::new(SolverConfig::default())?;
//!
//! // Pair every track with the scene entity of the same name.
//! session.sync_landmarks(&project.tracks, &project.scene, &mut project.mapping)?;
//!
//! // Refine the focal length, then place the active camera.
//! session.calibrate(
//!     &mut project.tracks,
//!     &project.scene,
//!     &project.mapping,
//!     &RefineFlags::focal_only(),
//! )?;
//! let solution = session.solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)?;
//! println!("{}", solution.message);
//! # Ok(())
//! # }
//! ```
//!
//! ## Solver API
//!
//! The closed-form solvers and refinement problems are usable on their own:
//!
//! ```no_run
//! use smilepnp::core::{CameraModel, ImageSize, Pt2, Pt3};
//! use smilepnp::linear::{PnpSolver, SqpnpOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = CameraModel::pinhole(1800.0, ImageSize::new(1920, 1080))?;
//! let world: Vec<Pt3> = /* landmark positions */
//! # vec![];
//! let image: Vec<Pt2> = /* marker pixels */
//! # vec![];
//! let solutions = PnpSolver::sqpnp(&world, &image, &camera, &SqpnpOptions::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`core`]: camera model, correspondences, reprojection, conventions
//! - [`linear`]: SQPnP, DLT and EPnP
//! - [`optim`]: tiny-solver pose and intrinsics refinement
//! - [`pipeline`]: host traits, mapping, sessions and reports

/// Core math types, camera model and reprojection evaluation.
pub mod core {
    pub use smilepnp_core::*;
}

/// Closed-form pose solvers.
pub mod linear {
    pub use smilepnp_linear::*;
}

/// Non-linear least-squares refinement.
pub mod optim {
    pub use smilepnp_optim::*;
}

/// Sessions, host interfaces and reporting.
pub mod pipeline {
    pub use smilepnp_pipeline::*;
}

/// Convenient re-exports for common use cases.
///
/// Import with `use smilepnp::prelude::*;` to get started quickly.
pub mod prelude {
    pub use crate::core::{
        CameraModel, CorrespondenceSet, ImageSize, Iso3, Mat3, Pt2, Pt3, RadialDistortion,
        SceneTransform, TrackCameraParams, Vec3, Warning,
    };

    pub use crate::pipeline::{
        CalibrationOutcome, ClipInfo, InMemoryProject, MappingRow, MappingTable, PnpMethod,
        PoseSolution, RefineFlags, SceneGraph, Session, SolverConfig, SolverError, TrackProvider,
    };
}
