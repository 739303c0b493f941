//! Reprojection error evaluation.
//!
//! [`evaluate`] projects 3D points through a pose and a [`CameraModel`] and
//! measures the Euclidean pixel distance to the observed markers. It is a
//! pure function: identical inputs always give identical errors.

use crate::{CameraModel, CorrespondenceSet, Mat3, Pt2, Pt3, Real, Vec3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Error for a single correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointError {
    /// Projected pixel position, `None` when the point is behind the camera.
    pub projected: Option<Pt2>,
    /// Observed pixel position.
    pub observed: Pt2,
    /// Pixel distance; infinite when the point cannot be projected.
    pub error: Real,
}

/// Summary statistics for reprojection errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// Mean reprojection error in pixels.
    pub mean: Real,
    /// Root mean square error in pixels.
    pub rms: Real,
    /// Maximum reprojection error in pixels.
    pub max: Real,
    /// Number of points evaluated.
    pub count: usize,
}

impl ReprojectionStats {
    /// Compute statistics from a collection of errors.
    pub fn from_errors(errors: &[Real]) -> Self {
        if errors.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                max: 0.0,
                count: 0,
            };
        }

        let sum: Real = errors.iter().sum();
        let sum_sq: Real = errors.iter().map(|e| e * e).sum();
        let max = errors.iter().cloned().fold(0.0, Real::max);
        let n = errors.len() as Real;

        Self {
            mean: sum / n,
            rms: (sum_sq / n).sqrt(),
            max,
            count: errors.len(),
        }
    }
}

/// Per-point errors plus aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionReport {
    pub points: Vec<PointError>,
    pub stats: ReprojectionStats,
}

impl ReprojectionReport {
    pub fn errors(&self) -> Vec<Real> {
        self.points.iter().map(|p| p.error).collect()
    }
}

/// Evaluate reprojection errors of `points3d` against `points2d`.
///
/// `rotation` and `translation` map world points into the vision camera frame.
///
/// # Errors
///
/// Returns an error if the point lists have different lengths.
pub fn evaluate(
    points3d: &[Pt3],
    points2d: &[Pt2],
    rotation: &Mat3,
    translation: &Vec3,
    camera: &CameraModel,
) -> Result<ReprojectionReport> {
    ensure!(
        points3d.len() == points2d.len(),
        "3D / 2D point counts must match: {} vs {}",
        points3d.len(),
        points2d.len()
    );

    let points = points3d
        .iter()
        .zip(points2d)
        .map(|(pw, observed)| point_error(camera, rotation, translation, pw, observed))
        .collect();
    Ok(report_from_points(points))
}

/// Evaluate a whole correspondence set.
pub fn evaluate_set(
    set: &CorrespondenceSet,
    rotation: &Mat3,
    translation: &Vec3,
    camera: &CameraModel,
) -> ReprojectionReport {
    let points = set
        .iter()
        .map(|c| point_error(camera, rotation, translation, &c.point3d, &c.point2d))
        .collect();
    report_from_points(points)
}

fn point_error(
    camera: &CameraModel,
    rotation: &Mat3,
    translation: &Vec3,
    pw: &Pt3,
    observed: &Pt2,
) -> PointError {
    let projected = camera.project_world(rotation, translation, pw);
    let error = projected.map_or(Real::INFINITY, |p| (p - observed).norm());
    PointError {
        projected,
        observed: *observed,
        error,
    }
}

fn report_from_points(points: Vec<PointError>) -> ReprojectionReport {
    let errors: Vec<Real> = points.iter().map(|p| p.error).collect();
    let stats = ReprojectionStats::from_errors(&errors);
    ReprojectionReport { points, stats }
}

/// RMS reprojection error over all points.
pub fn rms_error(
    points3d: &[Pt3],
    points2d: &[Pt2],
    rotation: &Mat3,
    translation: &Vec3,
    camera: &CameraModel,
) -> Result<Real> {
    Ok(evaluate(points3d, points2d, rotation, translation, camera)?
        .stats
        .rms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageSize, RadialDistortion};
    use nalgebra::Rotation3;

    fn scene() -> (Vec<Pt3>, Mat3, Vec3, CameraModel) {
        let camera = CameraModel::new(
            1500.0,
            Pt2::new(960.0, 540.0),
            RadialDistortion::new(-0.05, 0.01, 0.0),
            ImageSize::new(1920, 1080),
        )
        .unwrap();
        let rotation = Rotation3::from_euler_angles(0.1, -0.2, 0.05).into_inner();
        let translation = Vec3::new(0.1, -0.2, 5.0);
        let points = vec![
            Pt3::new(0.0, 0.0, 0.0),
            Pt3::new(1.0, 0.0, 0.0),
            Pt3::new(0.0, 1.0, 0.5),
            Pt3::new(-1.0, 0.5, 1.0),
        ];
        (points, rotation, translation, camera)
    }

    #[test]
    fn reprojection_stats_empty() {
        let stats = ReprojectionStats::from_errors(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn reprojection_stats_computation() {
        let stats = ReprojectionStats::from_errors(&[1.0, 2.0, 3.0]);

        assert_eq!(stats.count, 3);
        assert!((stats.mean - 2.0).abs() < 1e-10);
        assert!((stats.rms - (14.0_f64 / 3.0).sqrt()).abs() < 1e-10);
        assert!((stats.max - 3.0).abs() < 1e-10);
    }

    #[test]
    fn exact_projections_have_zero_error() {
        let (points, r, t, cam) = scene();
        let observed: Vec<Pt2> = points
            .iter()
            .map(|p| cam.project_world(&r, &t, p).unwrap())
            .collect();
        let report = evaluate(&points, &observed, &r, &t, &cam).unwrap();
        assert_eq!(report.stats.count, 4);
        assert!(report.stats.rms < 1e-12);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let (points, r, t, cam) = scene();
        let observed: Vec<Pt2> = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let px = cam.project_world(&r, &t, p).unwrap();
                Pt2::new(px.x + i as Real * 0.7, px.y - 0.3)
            })
            .collect();
        let first = evaluate(&points, &observed, &r, &t, &cam).unwrap();
        let second = evaluate(&points, &observed, &r, &t, &cam).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.errors(), second.errors());
    }

    #[test]
    fn offset_measurement_gives_offset_error() {
        let (points, r, t, cam) = scene();
        let mut observed: Vec<Pt2> = points
            .iter()
            .map(|p| cam.project_world(&r, &t, p).unwrap())
            .collect();
        observed[2].x += 3.0;
        observed[2].y += 4.0;
        let report = evaluate(&points, &observed, &r, &t, &cam).unwrap();
        assert!((report.points[2].error - 5.0).abs() < 1e-9);
        assert!((report.stats.mean - 1.25).abs() < 1e-9);
    }

    #[test]
    fn points_behind_camera_have_infinite_error() {
        let (_, r, _, cam) = scene();
        let t = Vec3::new(0.0, 0.0, -10.0);
        let report = evaluate(&[Pt3::origin()], &[Pt2::new(0.0, 0.0)], &r, &t, &cam).unwrap();
        assert!(report.points[0].projected.is_none());
        assert!(report.stats.rms.is_infinite());
    }

    #[test]
    fn evaluate_rejects_mismatched_lengths() {
        let (points, r, t, cam) = scene();
        assert!(evaluate(&points, &[Pt2::origin()], &r, &t, &cam).is_err());
    }
}
