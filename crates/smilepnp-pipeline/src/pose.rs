//! The PnP fallback chain and solution selection.
//!
//! Stages run in the fixed order SQPnP, ITERATIVE, EPnP. A stage that
//! returns candidates ends the chain; only a failure advances it. Every
//! candidate carries the RMS reprojection error the stage measured over all
//! correspondences, and [`select_solution`] picks the lowest.

use crate::error::SolverError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use smilepnp_core::{
    evaluate_set, rt_from_iso3, to_scene_transform, CameraModel, CorrespondenceSet, Iso3, Mat3,
    Real, ReprojectionReport, SceneTransform, Vec3, Warning,
};
use smilepnp_linear::{PnpError, PnpSolver, SqpnpOptions};
use smilepnp_optim::{refine_pose, TinySolveOptions};
use std::fmt;
use thiserror::Error;

/// Fewest correspondences a pose solve accepts.
pub const MIN_POSE_POINTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PnpMethod {
    Sqpnp,
    Iterative,
    Epnp,
}

impl PnpMethod {
    /// Stages in the order they are tried.
    pub const CHAIN: [PnpMethod; 3] = [PnpMethod::Sqpnp, PnpMethod::Iterative, PnpMethod::Epnp];

    pub fn name(&self) -> &'static str {
        match self {
            PnpMethod::Sqpnp => "SQPNP",
            PnpMethod::Iterative => "ITERATIVE",
            PnpMethod::Epnp => "EPNP",
        }
    }
}

impl fmt::Display for PnpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a single stage failed.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Pnp(#[from] PnpError),
    #[error("refinement failed: {0}")]
    Refinement(String),
    #[error("no candidate returned")]
    Empty,
}

/// A failed stage, kept in the result and in `pnp_failed` errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub method: PnpMethod,
    pub reason: String,
}

impl StageFailure {
    pub fn new(method: PnpMethod, reason: impl Into<String>) -> Self {
        Self {
            method,
            reason: reason.into(),
        }
    }

    /// `"SQPNP: reason; EPNP: reason"`.
    pub fn join(failures: &[StageFailure]) -> String {
        failures
            .iter()
            .map(|f| format!("{}: {}", f.method, f.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One pose hypothesis produced by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseCandidate {
    /// World-to-camera rotation, vision convention.
    pub rotation: Mat3,
    pub translation: Vec3,
    /// RMS pixel error as reported by the stage.
    pub reprojection_error: Option<Real>,
    /// Position within the stage output.
    pub solution_index: usize,
}

/// Produces pose candidates for one stage of the chain.
pub trait PnpBackend {
    fn solve(
        &self,
        method: PnpMethod,
        set: &CorrespondenceSet,
        camera: &CameraModel,
    ) -> Result<Vec<PoseCandidate>, StageError>;
}

/// Stages implemented by `smilepnp-linear` and `smilepnp-optim`.
#[derive(Debug, Clone, Default)]
pub struct NativePnp {
    pub sqpnp: SqpnpOptions,
    /// Levenberg–Marquardt settings of the ITERATIVE stage.
    pub refine: TinySolveOptions,
}

impl NativePnp {
    pub fn new(sqpnp: SqpnpOptions, refine: TinySolveOptions) -> Self {
        Self { sqpnp, refine }
    }

    fn candidate(
        set: &CorrespondenceSet,
        camera: &CameraModel,
        rotation: Mat3,
        translation: Vec3,
        solution_index: usize,
    ) -> PoseCandidate {
        let rms = evaluate_set(set, &rotation, &translation, camera).stats.rms;
        PoseCandidate {
            rotation,
            translation,
            reprojection_error: Some(rms),
            solution_index,
        }
    }

    fn iterative(
        &self,
        set: &CorrespondenceSet,
        camera: &CameraModel,
    ) -> Result<Iso3, StageError> {
        let world = set.points_3d();
        let image = set.points_2d();
        let initial = if set.len() >= 6 {
            PnpSolver::dlt(&world, &image, camera)
                .or_else(|_| PnpSolver::epnp(&world, &image, camera))?
        } else {
            PnpSolver::epnp(&world, &image, camera)?
        };
        let refined = refine_pose(&world, &image, camera, &initial, &self.refine)
            .map_err(|e| StageError::Refinement(e.to_string()))?;
        Ok(refined.pose)
    }
}

impl PnpBackend for NativePnp {
    fn solve(
        &self,
        method: PnpMethod,
        set: &CorrespondenceSet,
        camera: &CameraModel,
    ) -> Result<Vec<PoseCandidate>, StageError> {
        let world = set.points_3d();
        let image = set.points_2d();
        let candidates = match method {
            PnpMethod::Sqpnp => PnpSolver::sqpnp(&world, &image, camera, &self.sqpnp)?
                .into_iter()
                .enumerate()
                .map(|(idx, s)| Self::candidate(set, camera, s.rotation, s.translation, idx))
                .collect(),
            PnpMethod::Iterative => {
                let (r, t) = rt_from_iso3(&self.iterative(set, camera)?);
                vec![Self::candidate(set, camera, r, t, 0)]
            }
            PnpMethod::Epnp => {
                let (r, t) = rt_from_iso3(&PnpSolver::epnp(&world, &image, camera)?);
                vec![Self::candidate(set, camera, r, t, 0)]
            }
        };
        Ok(candidates)
    }
}

/// Index of the best candidate.
///
/// A single candidate is taken as is. Otherwise the lowest error wins (first
/// on ties) when every candidate has one; if any error is missing the first
/// candidate is used.
pub fn select_solution(candidates: &[PoseCandidate]) -> usize {
    if candidates.len() <= 1 {
        return 0;
    }
    let errors: Option<Vec<Real>> = candidates.iter().map(|c| c.reprojection_error).collect();
    let Some(errors) = errors else {
        return 0;
    };
    let mut best = 0;
    for (idx, err) in errors.iter().enumerate().skip(1) {
        if *err < errors[best] {
            best = idx;
        }
    }
    best
}

/// Candidates of the first stage that succeeded.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub method: PnpMethod,
    pub candidates: Vec<PoseCandidate>,
    pub failures: Vec<StageFailure>,
}

/// Run the stages in order until one yields candidates.
pub fn run_chain(
    backend: &dyn PnpBackend,
    set: &CorrespondenceSet,
    camera: &CameraModel,
) -> Result<ChainOutcome, SolverError> {
    let mut failures = Vec::new();
    for method in PnpMethod::CHAIN {
        debug!("trying {method} on {} correspondences", set.len());
        let result = backend
            .solve(method, set, camera)
            .and_then(|c| if c.is_empty() { Err(StageError::Empty) } else { Ok(c) });
        match result {
            Ok(candidates) => {
                return Ok(ChainOutcome {
                    method,
                    candidates,
                    failures,
                })
            }
            Err(err) => {
                warn!("{method} failed: {err}");
                failures.push(StageFailure::new(method, err.to_string()));
            }
        }
    }
    Err(SolverError::PnpFailed(failures))
}

/// The selected pose and everything derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseSolution {
    pub candidate: PoseCandidate,
    pub method: PnpMethod,
    pub fallback_used: bool,
    pub failed_stages: Vec<StageFailure>,
    /// Per-point errors of the selected pose.
    pub evaluation: ReprojectionReport,
    /// Camera world transform in scene axes.
    pub scene_transform: SceneTransform,
    pub message: String,
    pub warnings: Vec<Warning>,
}

/// Solve the pose of `camera` from `set` without touching any host state.
pub fn solve(
    backend: &dyn PnpBackend,
    set: &CorrespondenceSet,
    camera: &CameraModel,
) -> Result<PoseSolution, SolverError> {
    if set.len() < MIN_POSE_POINTS {
        return Err(SolverError::NotEnoughPoints {
            needed: MIN_POSE_POINTS,
            got: set.len(),
        });
    }

    let ChainOutcome {
        method,
        mut candidates,
        failures,
    } = run_chain(backend, set, camera)?;
    let index = select_solution(&candidates);
    let total = candidates.len();
    let candidate = candidates.swap_remove(index);

    let warnings: Vec<Warning> = failures
        .iter()
        .map(|f| Warning::PnpFallback {
            stage: f.method.name().to_string(),
            reason: f.reason.clone(),
        })
        .collect();
    let evaluation = evaluate_set(set, &candidate.rotation, &candidate.translation, camera);
    let scene_transform = to_scene_transform(&candidate.rotation, &candidate.translation);
    let message = format!(
        "Reprojection error : {:.3} px (solution #{})",
        candidate.reprojection_error.unwrap_or(0.0),
        index + 1
    );
    debug!("{method} selected solution #{} of {total}", index + 1);

    Ok(PoseSolution {
        candidate,
        method,
        fallback_used: !failures.is_empty(),
        failed_stages: failures,
        evaluation,
        scene_transform,
        message,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use smilepnp_core::synthetic::{cube_corners, look_at, project_all, scattered_points};
    use smilepnp_core::{ImageSize, Pt3};
    use std::cell::RefCell;

    fn candidate(err: Option<Real>, idx: usize) -> PoseCandidate {
        PoseCandidate {
            rotation: Mat3::identity(),
            translation: Vec3::new(0.0, 0.0, idx as Real + 1.0),
            reprojection_error: err,
            solution_index: idx,
        }
    }

    fn cube_scene() -> (CorrespondenceSet, CameraModel, Mat3, Vec3) {
        let camera = CameraModel::pinhole(1800.0, ImageSize::new(1920, 1080)).unwrap();
        let (r, t) = look_at(&Pt3::new(4.0, -6.0, 3.0), &Pt3::origin(), &Vec3::z());
        let set = project_all(&camera, &r, &t, &cube_corners(Pt3::origin(), 1.0)).unwrap();
        (set, camera, r, t)
    }

    /// Fails the listed stages and records every call.
    struct Scripted {
        fail: Vec<PnpMethod>,
        calls: RefCell<Vec<PnpMethod>>,
    }

    impl PnpBackend for Scripted {
        fn solve(
            &self,
            method: PnpMethod,
            _set: &CorrespondenceSet,
            _camera: &CameraModel,
        ) -> Result<Vec<PoseCandidate>, StageError> {
            self.calls.borrow_mut().push(method);
            if self.fail.contains(&method) {
                Err(PnpError::Degenerate("scripted").into())
            } else {
                Ok(vec![candidate(Some(0.5), 0)])
            }
        }
    }

    #[test]
    fn single_candidate_is_selected() {
        assert_eq!(select_solution(&[candidate(None, 0)]), 0);
    }

    #[test]
    fn lowest_error_wins_first_on_ties() {
        let c = [
            candidate(Some(2.0), 0),
            candidate(Some(0.5), 1),
            candidate(Some(0.5), 2),
        ];
        assert_eq!(select_solution(&c), 1);
    }

    #[test]
    fn missing_error_selects_first() {
        let c = [candidate(Some(2.0), 0), candidate(None, 1), candidate(Some(0.1), 2)];
        assert_eq!(select_solution(&c), 0);
    }

    #[test]
    fn chain_stops_at_first_success() {
        let (set, camera, _, _) = cube_scene();
        let backend = Scripted {
            fail: vec![PnpMethod::Sqpnp],
            calls: RefCell::new(Vec::new()),
        };
        let outcome = run_chain(&backend, &set, &camera).unwrap();
        assert_eq!(outcome.method, PnpMethod::Iterative);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            *backend.calls.borrow(),
            vec![PnpMethod::Sqpnp, PnpMethod::Iterative]
        );
    }

    #[test]
    fn chain_reports_every_failed_stage() {
        let (set, camera, _, _) = cube_scene();
        let backend = Scripted {
            fail: PnpMethod::CHAIN.to_vec(),
            calls: RefCell::new(Vec::new()),
        };
        match run_chain(&backend, &set, &camera).unwrap_err() {
            SolverError::PnpFailed(failures) => {
                let methods: Vec<_> = failures.iter().map(|f| f.method).collect();
                assert_eq!(methods, PnpMethod::CHAIN.to_vec());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn native_stages_recover_cube_pose() {
        let (set, camera, r, t) = cube_scene();
        let backend = NativePnp::default();
        for method in PnpMethod::CHAIN {
            let candidates = backend.solve(method, &set, &camera).unwrap();
            let best = &candidates[select_solution(&candidates)];
            assert!(best.reprojection_error.unwrap() < 1e-3, "{method}");
            assert!((best.rotation - r).norm() < 1e-5, "{method}");
            assert!((best.translation - t).norm() < 1e-5, "{method}");
        }
    }

    #[test]
    fn solve_formats_message_and_transform() {
        let (set, camera, r, t) = cube_scene();
        let solution = solve(&NativePnp::default(), &set, &camera).unwrap();
        assert_eq!(solution.method, PnpMethod::Sqpnp);
        assert!(!solution.fallback_used);
        assert!(solution.message.starts_with("Reprojection error : 0.000 px (solution #"));
        assert!(solution.evaluation.stats.rms < 1e-6);
        let expected = to_scene_transform(&r, &t);
        assert!((solution.scene_transform.location - expected.location).norm() < 1e-6);
    }

    #[test]
    fn solve_needs_four_points() {
        let camera = CameraModel::pinhole(1500.0, ImageSize::new(1920, 1080)).unwrap();
        let (r, t) = look_at(&Pt3::new(3.0, -5.0, 4.0), &Pt3::origin(), &Vec3::z());
        let set = project_all(&camera, &r, &t, &scattered_points()).unwrap();
        let err = solve(&NativePnp::default(), &set.truncated(3), &camera).unwrap_err();
        assert_eq!(err.code(), "not_enough_points");
        assert!(solve(&NativePnp::default(), &set.truncated(4), &camera).is_ok());
    }

    #[test]
    fn fallback_is_signalled() {
        let (set, camera, _, _) = cube_scene();
        let backend = Scripted {
            fail: vec![PnpMethod::Sqpnp],
            calls: RefCell::new(Vec::new()),
        };
        let solution = solve(&backend, &set, &camera).unwrap();
        assert!(solution.fallback_used);
        assert_eq!(solution.method, PnpMethod::Iterative);
        assert_eq!(solution.warnings.len(), 1);
        assert_eq!(solution.warnings[0].code(), "pnp_fallback");
    }
}
