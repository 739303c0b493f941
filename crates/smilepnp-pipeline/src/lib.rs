//! Pose solving, calibration and reporting sessions.
//!
//! A [`Session`] works against two host interfaces: a [`TrackProvider`]
//! holding the 2D clip, markers and stored intrinsics, and a [`SceneGraph`]
//! holding the 3D landmarks and cameras. [`InMemoryProject`] implements both
//! and serializes to JSON.
//!
//! ```no_run
//! use smilepnp_pipeline::{InMemoryProject, Session, SolverConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut project = InMemoryProject::from_json(&std::fs::read_to_string("project.json")?)?;
//! let mut session = Session::new(SolverConfig::default())?;
//! let solution = session.solve_pose(
//!     &project.tracks,
//!     &mut project.scene,
//!     &project.mapping,
//!     None,
//! )?;
//! println!("{}", solution.message);
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod config;
pub mod error;
pub mod lens;
pub mod mapping;
pub mod memory;
pub mod pose;
pub mod provider;
pub mod report;
pub mod session;

pub use calibration::{
    CalibrationOutcome, CalibrationResult, IntrinsicsRefiner, RefineFlags, RefinedIntrinsics,
    TinySolverRefiner, MIN_CALIBRATION_POINTS,
};
pub use config::{LmConfig, ReportConfig, SolverConfig};
pub use error::SolverError;
pub use lens::lens_settings;
pub use mapping::{MappingRow, MappingTable};
pub use memory::{CameraState, InMemoryProject, InMemoryScene, InMemoryTracks};
pub use pose::{
    NativePnp, PnpBackend, PnpMethod, PoseCandidate, PoseSolution, StageError, StageFailure,
    MIN_POSE_POINTS,
};
pub use provider::{
    ClipInfo, LensSettings, ObjectKind, SceneGraph, SceneObject, SensorFit, TrackProvider,
};
pub use report::{default_report_name, PointRecord};
pub use session::{Session, SessionState};
