mod common;

use common::*;
use smilepnp_core::synthetic::{cube_corners, scattered_points};
use smilepnp_core::{evaluate_set, to_scene_transform, CameraModel, CorrespondenceSet, Pt3};
use smilepnp_linear::PnpError;
use smilepnp_pipeline::{
    MappingRow, NativePnp, PnpBackend, PnpMethod, PoseCandidate, SceneGraph, Session,
    SolverConfig, StageError, TinySolverRefiner, TrackProvider,
};
use chrono::Local;

/// Fails the listed stages and defers the rest to the native solvers.
struct Failing(Vec<PnpMethod>);

impl PnpBackend for Failing {
    fn solve(
        &self,
        method: PnpMethod,
        set: &CorrespondenceSet,
        camera: &CameraModel,
    ) -> Result<Vec<PoseCandidate>, StageError> {
        if self.0.contains(&method) {
            return Err(PnpError::Degenerate("forced").into());
        }
        NativePnp::default().solve(method, set, camera)
    }
}

fn failing_session(methods: Vec<PnpMethod>) -> Session {
    Session::with_backends(
        SolverConfig::default(),
        Box::new(Failing(methods)),
        Box::new(TinySolverRefiner::default()),
    )
    .unwrap()
}

#[test]
fn cube_corners_end_to_end() {
    let truth = pinhole(1800.0);
    let (r, t) = default_pose();
    let corners: Vec<Pt3> = cube_corners(Pt3::new(0.0, 0.0, 0.5), 1.0)
        .into_iter()
        .take(6)
        .collect();
    let (mut project, set) = project_with(&truth, &r, &t, &corners);

    let mut session = session();
    let solution = session
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap();

    assert_eq!(solution.method, PnpMethod::Sqpnp);
    assert!(!solution.fallback_used);
    assert!(solution.evaluation.stats.rms < 1e-6);
    assert_eq!(solution.evaluation.stats.count, 6);

    let expected = to_scene_transform(&r, &t);
    let placed = project.scene.camera_transform("Camera").unwrap();
    assert!((placed.location - expected.location).norm() < 1e-6);
    assert!((placed.rotation - expected.rotation).norm() < 1e-6);

    let reference = evaluate_set(&set, &r, &t, &truth);
    let records = &session.state().last_pairs;
    assert_eq!(records.len(), 6);
    for (record, point) in records.iter().zip(&reference.points) {
        let error = record.error_px.unwrap();
        assert!((error - point.error).abs() < 1e-6);
    }

    let report = session.render_report(
        &project.tracks,
        &project.scene,
        &project.mapping,
        Local::now(),
    );
    let rows: Vec<&str> = report
        .lines()
        .skip_while(|line| *line != "-".repeat(100))
        .skip(1)
        .take_while(|line| !line.is_empty())
        .collect();
    assert_eq!(rows.len(), 6);
    for (idx, row) in rows.iter().enumerate() {
        assert!(row.starts_with(&format!("{:<4} P{}", idx + 1, idx + 1)), "{row}");
        assert!(row.trim_end().ends_with("0.000"), "{row}");
    }
    assert!(report.contains("Average error: 0.000 px"));
    assert!(report.contains("Object: Camera"));
}

#[test]
fn lens_is_written_with_the_pose() {
    let truth = pinhole(1600.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());
    let mut params = stored_params(&truth);
    params.principal_px = [1000.0, 500.0];
    project.tracks.camera = Some(params);

    session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap();
    let lens = project.scene.camera_lens("Camera").unwrap();
    assert!((lens.focal_mm - 1600.0 * 36.0 / 1920.0).abs() < 1e-9);
    assert!((lens.shift_x - (960.0 - 1000.0) / 1920.0).abs() < 1e-12);
    assert!((lens.shift_y - (540.0 - 500.0) / 1920.0).abs() < 1e-12);
}

#[test]
fn sqpnp_failure_falls_back_to_iterative() {
    let truth = pinhole(1500.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());

    let mut session = failing_session(vec![PnpMethod::Sqpnp]);
    let solution = session
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap();

    assert_eq!(solution.method, PnpMethod::Iterative);
    assert!(solution.fallback_used);
    assert_eq!(solution.failed_stages.len(), 1);
    assert_eq!(solution.failed_stages[0].method, PnpMethod::Sqpnp);
    assert!(solution.warnings.iter().any(|w| w.code() == "pnp_fallback"));
    assert!(solution.evaluation.stats.rms < 1e-3);
}

#[test]
fn all_stages_failing_writes_nothing() {
    let truth = pinhole(1500.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());
    let before = project.clone();

    let mut session = failing_session(PnpMethod::CHAIN.to_vec());
    let err = session
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap_err();

    assert_eq!(err.code(), "pnp_failed");
    assert_eq!(project, before);
    assert!(session.state().last_pairs.is_empty());
}

#[test]
fn four_points_solve_three_do_not() {
    let truth = pinhole(1500.0);
    let (r, t) = default_pose();
    let points = scattered_points();

    let (mut project, _) = project_with(&truth, &r, &t, &points[..4]);
    assert!(session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .is_ok());

    let (mut project, _) = project_with(&truth, &r, &t, &points[..3]);
    let before = project.clone();
    let err = session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap_err();
    assert_eq!(err.code(), "not_enough_points");
    assert_eq!(project, before);
}

#[test]
fn non_positive_focal_is_clamped_but_not_stored() {
    let truth = pinhole(2000.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());
    let mut params = stored_params(&truth);
    params.focal_px = -5.0;
    project.tracks.camera = Some(params);

    let solution = session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap();
    assert!(solution.warnings.iter().any(|w| w.code() == "focal_clamped"));
    assert!(solution.evaluation.stats.rms < 1e-3);
    assert_eq!(project.tracks.camera_params().unwrap().focal_px, -5.0);
}

#[test]
fn target_must_be_a_camera() {
    let truth = pinhole(1500.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());

    let err = session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, Some("P1"))
        .unwrap_err();
    assert_eq!(err.code(), "no_camera_selected");

    project.scene.cameras.clear();
    project.scene.active_camera = None;
    let before = project.clone();
    let err = session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap_err();
    assert_eq!(err.code(), "no_camera_selected");
    assert_eq!(project, before);
}

#[test]
fn explicit_camera_becomes_active() {
    let truth = pinhole(1500.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());
    project.scene.add_camera("Witness");

    session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, Some("Witness"))
        .unwrap();
    assert_eq!(project.scene.active_camera().as_deref(), Some("Witness"));
    let expected = to_scene_transform(&r, &t);
    let placed = project.scene.camera_transform("Witness").unwrap();
    assert!((placed.location - expected.location).norm() < 1e-6);
}

#[test]
fn missing_marker_stops_the_solve() {
    let truth = pinhole(1500.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());
    project.scene.frame = 2;

    let err = session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap_err();
    assert_eq!(err.code(), "marker_missing");
}

#[test]
fn incomplete_mapping_is_reported() {
    let truth = pinhole(1500.0);
    let (r, t) = default_pose();
    let (mut project, _) = project_with(&truth, &r, &t, &scattered_points());
    project.mapping.push(MappingRow::new("Ghost", None));

    let err = session()
        .solve_pose(&project.tracks, &mut project.scene, &project.mapping, None)
        .unwrap_err();
    assert_eq!(err.code(), "mapping_error");
    assert!(err.to_string().contains("2D track not found : Ghost"));
}
