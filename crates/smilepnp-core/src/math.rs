//! Mathematical type definitions and small pose helpers.

use nalgebra::{Isometry3, Matrix3, Matrix4, Point2, Point3, Rotation3, UnitQuaternion, Vector2, Vector3};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Build an isometry from a rotation matrix and translation.
///
/// The rotation is assumed orthonormal; it is not re-projected onto SO(3).
pub fn iso3_from_rt(rotation: &Mat3, translation: &Vec3) -> Iso3 {
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation));
    Iso3::from_parts((*translation).into(), rot)
}

/// Split an isometry into a rotation matrix and translation vector.
pub fn rt_from_iso3(pose: &Iso3) -> (Mat3, Vec3) {
    (
        pose.rotation.to_rotation_matrix().into_inner(),
        pose.translation.vector,
    )
}

/// Angle in radians between two rotation matrices.
pub fn rotation_angle_between(a: &Mat3, b: &Mat3) -> Real {
    let diff = a.transpose() * b;
    let cos_theta = ((diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    cos_theta.acos()
}
