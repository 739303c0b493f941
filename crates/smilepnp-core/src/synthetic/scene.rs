//! Synthetic landmark layouts and projection.

use crate::{CameraModel, Correspondence, CorrespondenceSet, Mat3, Pt3, Real, Vec3};
use anyhow::{bail, Result};

/// The eight corners of an axis-aligned cube centred at `center`.
///
/// Order: `z` major, then `y`, then `x` (`-` before `+`).
pub fn cube_corners(center: Pt3, size: Real) -> Vec<Pt3> {
    let h = size * 0.5;
    let mut points = Vec::with_capacity(8);
    for sz in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            for sx in [-1.0, 1.0] {
                points.push(center + Vec3::new(sx * h, sy * h, sz * h));
            }
        }
    }
    points
}

/// A fixed set of twelve non-coplanar points spread over a 2 x 2 x 1 volume.
pub fn scattered_points() -> Vec<Pt3> {
    vec![
        Pt3::new(-1.0, -1.0, 0.0),
        Pt3::new(1.0, -1.0, 0.1),
        Pt3::new(1.0, 1.0, 0.0),
        Pt3::new(-1.0, 1.0, 0.3),
        Pt3::new(0.0, 0.0, 1.0),
        Pt3::new(0.5, -0.4, 0.6),
        Pt3::new(-0.6, 0.3, 0.8),
        Pt3::new(0.2, 0.9, 0.4),
        Pt3::new(-0.8, -0.2, 0.5),
        Pt3::new(0.7, 0.6, 0.9),
        Pt3::new(-0.3, -0.8, 0.2),
        Pt3::new(0.9, -0.1, 0.7),
    ]
}

/// World-to-camera pose (vision convention) for a camera at `eye` looking at
/// `target`, with `up` mapped to the image's upward direction.
pub fn look_at(eye: &Pt3, target: &Pt3, up: &Vec3) -> (Mat3, Vec3) {
    let z = (target - eye).normalize();
    let x = z.cross(up).normalize();
    let y = z.cross(&x);
    let rotation = Mat3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]);
    let translation = -(rotation * eye.coords);
    (rotation, translation)
}

/// Project world points, requiring every point to be in front of the camera.
pub fn project_all(
    camera: &CameraModel,
    rotation: &Mat3,
    translation: &Vec3,
    points: &[Pt3],
) -> Result<CorrespondenceSet> {
    let mut items = Vec::with_capacity(points.len());
    for (idx, pw) in points.iter().enumerate() {
        let Some(uv) = camera.project_world(rotation, translation, pw) else {
            bail!("point {idx} not projectable");
        };
        let label = format!("P{}", idx + 1);
        items.push(Correspondence::new(label.clone(), label, uv, *pw));
    }
    CorrespondenceSet::new(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageSize;

    #[test]
    fn look_at_centres_target() {
        let camera = CameraModel::pinhole(1000.0, ImageSize::new(800, 600)).unwrap();
        let (r, t) = look_at(&Pt3::new(3.0, -5.0, 2.0), &Pt3::new(0.0, 0.0, 0.5), &Vec3::z());
        assert!((r.determinant() - 1.0).abs() < 1e-12);
        let uv = camera
            .project_world(&r, &t, &Pt3::new(0.0, 0.0, 0.5))
            .unwrap();
        assert!((uv - camera.principal).norm() < 1e-9);
    }

    #[test]
    fn up_direction_points_up_in_image() {
        let camera = CameraModel::pinhole(1000.0, ImageSize::new(800, 600)).unwrap();
        let (r, t) = look_at(&Pt3::new(0.0, -5.0, 0.0), &Pt3::origin(), &Vec3::z());
        let above = camera.project_world(&r, &t, &Pt3::new(0.0, 0.0, 1.0)).unwrap();
        assert!(above.y < camera.principal.y);
    }

    #[test]
    fn cube_has_unit_edges() {
        let corners = cube_corners(Pt3::new(1.0, 2.0, 3.0), 2.0);
        assert_eq!(corners.len(), 8);
        assert!(((corners[1] - corners[0]).norm() - 2.0).abs() < 1e-12);
    }
}
