//! Conversion between the computer-vision camera convention and the scene's.
//!
//! Vision: `R_cv`, `t_cv` map world points into a camera frame looking along
//! +Z with Y pointing down the image.
//!
//! Scene: the camera object's local axes look along −Z with Y up. Its world
//! transform is `Translation(location) · rotation`.
//!
//! The two camera-local frames differ by the fixed flip `diag(1, -1, -1)`:
//!
//! ```text
//! rotation = R_cvᵀ · diag(1, -1, -1)
//! location = -R_cvᵀ · t_cv
//! ```

use crate::{Mat3, Mat4, Real, Vec3};
use nalgebra::Rotation3;
use serde::{Deserialize, Serialize};

/// Basis change from scene camera-local axes to vision camera axes.
pub fn scene_camera_to_cv() -> Mat3 {
    Mat3::from_diagonal(&Vec3::new(1.0, -1.0, -1.0))
}

/// World transform of a scene camera object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneTransform {
    /// Camera-to-world rotation in scene camera-local axes.
    pub rotation: Mat3,
    /// Camera position in world coordinates.
    pub location: Vec3,
}

impl SceneTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Mat3::identity(),
            location: Vec3::zeros(),
        }
    }

    /// Homogeneous world matrix `Translation(location) · rotation`.
    pub fn to_matrix4(&self) -> Mat4 {
        let mut m = self.rotation.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.location);
        m
    }

    /// XYZ Euler angles in degrees (`R = Rz · Ry · Rx`).
    pub fn euler_xyz_degrees(&self) -> Vec3 {
        let (rx, ry, rz) = Rotation3::from_matrix_unchecked(self.rotation).euler_angles();
        Vec3::new(rx.to_degrees(), ry.to_degrees(), rz.to_degrees())
    }

    pub fn distance_to_origin(&self) -> Real {
        self.location.norm()
    }
}

/// Convert a vision world-to-camera pose into the scene camera transform.
pub fn to_scene_transform(rotation_cv: &Mat3, translation_cv: &Vec3) -> SceneTransform {
    let cv_to_world = rotation_cv.transpose();
    SceneTransform {
        rotation: cv_to_world * scene_camera_to_cv(),
        location: -(cv_to_world * translation_cv),
    }
}

/// Inverse of [`to_scene_transform`].
pub fn from_scene_transform(transform: &SceneTransform) -> (Mat3, Vec3) {
    let rotation_cv = (transform.rotation * scene_camera_to_cv()).transpose();
    let translation_cv = -(rotation_cv * transform.location);
    (rotation_cv, translation_cv)
}
