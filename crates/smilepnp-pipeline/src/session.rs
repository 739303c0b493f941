//! Session operations over the host traits.
//!
//! Every operation validates and computes first and writes to the host
//! last. The two commit points are the camera transform and lens in
//! [`Session::solve_pose`] and the stored intrinsics in
//! [`Session::calibrate`] / [`Session::reset_calibration`]. A returned error
//! means nothing was written.

use crate::calibration::{
    self, write_back, CalibrationOutcome, IntrinsicsRefiner, RefineFlags, TinySolverRefiner,
};
use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::lens::lens_settings;
use crate::mapping::{self, MappingTable};
use crate::pose::{self, NativePnp, PnpBackend, PoseSolution};
use crate::provider::{ObjectKind, SceneGraph, TrackProvider};
use crate::report::{scale_to_mm, write_report, PointRecord, ReportContext};
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use smilepnp_core::{
    CameraModel, CorrespondenceSet, ImageSize, Real, ReprojectionReport, TrackCameraParams,
    DEFAULT_FOCAL_PX,
};
use std::fmt;
use std::path::{Path, PathBuf};

/// Results kept between operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Last user-facing solver message.
    pub message: String,
    /// Per-point results of the last successful pose solve.
    pub last_pairs: Vec<PointRecord>,
}

pub struct Session {
    config: SolverConfig,
    pnp: Box<dyn PnpBackend>,
    refiner: Box<dyn IntrinsicsRefiner>,
    state: SessionState,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session with the native PnP stages and the tiny-solver refiner.
    pub fn new(config: SolverConfig) -> Result<Self, SolverError> {
        config
            .validate()
            .map_err(|e| SolverError::SolverUnavailable(e.to_string()))?;
        let pnp = NativePnp::new(config.sqpnp, config.pose_refine_options());
        let refiner = TinySolverRefiner::new(config.calibration_options());
        Ok(Self {
            config,
            pnp: Box::new(pnp),
            refiner: Box::new(refiner),
            state: SessionState::default(),
        })
    }

    /// Session with caller-supplied backends.
    pub fn with_backends(
        config: SolverConfig,
        pnp: Box<dyn PnpBackend>,
        refiner: Box<dyn IntrinsicsRefiner>,
    ) -> Result<Self, SolverError> {
        let mut session = Self::new(config)?;
        session.pnp = pnp;
        session.refiner = refiner;
        Ok(session)
    }

    /// Resume from a stored state.
    pub fn with_state(mut self, state: SessionState) -> Self {
        self.state = state;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    pub fn message(&self) -> &str {
        &self.state.message
    }

    /// Rebuild `mapping` from the provider's tracks. Returns the row count.
    pub fn sync_landmarks(
        &mut self,
        tracks: &dyn TrackProvider,
        scene: &dyn SceneGraph,
        mapping: &mut MappingTable,
    ) -> Result<usize, SolverError> {
        let table = mapping::sync_landmarks(mapping, tracks, scene)?;
        *mapping = table;
        self.state.message = format!("{} correspondences initialized.", mapping.len());
        info!("{}", self.state.message);
        Ok(mapping.len())
    }

    pub fn remove_mapping(&mut self, mapping: &mut MappingTable, index: usize) -> bool {
        mapping.remove(index)
    }

    /// Solve the camera pose and move the target camera.
    ///
    /// The target is `camera_id` or else the scene's active camera; it must
    /// be a camera entity. On success the camera's transform and lens are
    /// set and it becomes the active camera.
    pub fn solve_pose(
        &mut self,
        tracks: &dyn TrackProvider,
        scene: &mut dyn SceneGraph,
        mapping: &MappingTable,
        camera_id: Option<&str>,
    ) -> Result<PoseSolution, SolverError> {
        let (set, mut warnings) = mapping::collect(mapping, tracks, &*scene, scene.active_frame())?;
        let (size, params) = stored_params(tracks)?;
        let (camera, camera_warnings) = CameraModel::from_track_params(&params, size);
        warnings.extend(camera_warnings);

        let mut solution = pose::solve(self.pnp.as_ref(), &set, &camera)?;
        let target = resolve_camera(&*scene, camera_id)?;
        let lens = lens_settings(&params, &camera, scene.render_aspect());
        let scale = self.scale_to_mm(&*scene);
        let records = point_records(&set, &solution.evaluation, scale);

        scene.set_camera_transform(&target, &solution.scene_transform);
        scene.set_camera_lens(&target, &lens);
        scene.set_active_camera(&target);
        info!(
            "{target} placed with {} ({} points): {}",
            solution.method,
            set.len(),
            solution.message
        );
        if solution.fallback_used {
            warn!(
                "pose solved by {} after {} failed stage(s)",
                solution.method,
                solution.failed_stages.len()
            );
        }

        warnings.append(&mut solution.warnings);
        solution.warnings = warnings;
        self.state.last_pairs = records;
        self.state.message = solution.message.clone();
        Ok(solution)
    }

    /// Refine the flagged intrinsics and store them on acceptance.
    pub fn calibrate(
        &mut self,
        tracks: &mut dyn TrackProvider,
        scene: &dyn SceneGraph,
        mapping: &MappingTable,
        flags: &RefineFlags,
    ) -> Result<CalibrationOutcome, SolverError> {
        let (set, mut warnings) = mapping::collect(mapping, &*tracks, scene, scene.active_frame())?;
        let (size, params) = stored_params(&*tracks)?;
        let (camera, camera_warnings) = CameraModel::from_track_params(&params, size);
        warnings.extend(camera_warnings);

        let mut outcome = calibration::calibrate(
            self.pnp.as_ref(),
            self.refiner.as_ref(),
            &set,
            &camera,
            flags,
        )?;
        match &mut outcome {
            CalibrationOutcome::Applied(result) => {
                result.warnings = warnings;
                let mut updated = params;
                write_back(&mut updated, &result.camera, flags, size);
                tracks.set_camera_params(updated);
                info!("{}", result.message);
            }
            CalibrationOutcome::Rejected { focal, .. } => {
                warn!("calibration rejected (focal {focal}); stored intrinsics unchanged");
            }
        }
        self.state.message = outcome.message().to_string();
        Ok(outcome)
    }

    /// Restore default intrinsics: 2000 px focal, centred principal point,
    /// no distortion.
    pub fn reset_calibration(&mut self, tracks: &mut dyn TrackProvider) -> Result<(), SolverError> {
        let (size, mut params) = stored_params(&*tracks)?;
        params.reset_calibration(size);
        tracks.set_camera_params(params);
        self.state.message = "Calibration reset".to_string();
        info!("Calibration reset successfully (focal: {DEFAULT_FOCAL_PX} px)");
        Ok(())
    }

    /// Report text dated `now`.
    pub fn render_report(
        &self,
        tracks: &dyn TrackProvider,
        scene: &dyn SceneGraph,
        mapping: &MappingTable,
        now: DateTime<Local>,
    ) -> String {
        ReportContext {
            tracks,
            scene,
            mapping,
            state: &self.state,
            scale_to_mm: self.scale_to_mm(scene),
            generated_at: now,
        }
        .render()
    }

    /// Write the report to `path`, overwriting any existing file.
    pub fn generate_report(
        &self,
        tracks: &dyn TrackProvider,
        scene: &dyn SceneGraph,
        mapping: &MappingTable,
        path: &Path,
    ) -> Result<PathBuf, SolverError> {
        let content = self.render_report(tracks, scene, mapping, Local::now());
        write_report(path, &content)
    }

    fn scale_to_mm(&self, scene: &dyn SceneGraph) -> Real {
        scale_to_mm(
            self.config
                .report
                .scale_override
                .unwrap_or_else(|| scene.scale_length()),
        )
    }
}

fn stored_params(tracks: &dyn TrackProvider) -> Result<(ImageSize, TrackCameraParams), SolverError> {
    let size = tracks.clip().ok_or(SolverError::ClipMissing)?.size();
    let params = tracks
        .camera_params()
        .unwrap_or_else(|| TrackCameraParams::defaults_for(size));
    Ok((size, params))
}

fn resolve_camera(scene: &dyn SceneGraph, camera_id: Option<&str>) -> Result<String, SolverError> {
    let id = camera_id
        .map(str::to_string)
        .or_else(|| scene.active_camera())
        .ok_or(SolverError::NoCameraSelected)?;
    match scene.object(&id) {
        Some(object) if object.kind == ObjectKind::Camera => Ok(id),
        _ => Err(SolverError::NoCameraSelected),
    }
}

fn point_records(
    set: &CorrespondenceSet,
    evaluation: &ReprojectionReport,
    scale_to_mm: Real,
) -> Vec<PointRecord> {
    set.iter()
        .zip(&evaluation.points)
        .map(|(c, e)| {
            let mm = c.point3d.coords * scale_to_mm;
            PointRecord {
                track: c.label.clone(),
                object: c.object.clone(),
                object_location_mm: [mm.x, mm.y, mm.z],
                marker_px: [c.point2d.x, c.point2d.y],
                projected_px: e.projected.map(|p| [p.x, p.y]),
                error_px: e
                    .projected
                    .and(Some(e.error))
                    .filter(|err| err.is_finite()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LmConfig;

    #[test]
    fn invalid_config_is_solver_unavailable() {
        let config = SolverConfig {
            calibration: LmConfig {
                max_iters: Some(0),
                ..LmConfig::default()
            },
            ..SolverConfig::default()
        };
        let err = Session::new(config).unwrap_err();
        assert_eq!(err.code(), "solver_unavailable");
    }

    #[test]
    fn state_roundtrips_through_builder() {
        let state = SessionState {
            message: "hello".to_string(),
            last_pairs: Vec::new(),
        };
        let session = Session::new(SolverConfig::default())
            .unwrap()
            .with_state(state.clone());
        assert_eq!(session.message(), "hello");
        assert_eq!(session.into_state(), state);
    }
}
