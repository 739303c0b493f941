//! Deterministic synthetic data generation helpers.
//!
//! Small building blocks for constructing synthetic PnP and calibration
//! problems used in tests across the workspace:
//! - landmark layouts (cube corners, scattered non-coplanar points),
//! - look-at poses in the vision convention,
//! - projection into [`crate::CorrespondenceSet`],
//! - seeded pixel noise.
//!
//! # Example
//!
//! ```
//! use smilepnp_core::{synthetic::scene, CameraModel, ImageSize, Pt3, Vec3};
//!
//! let camera = CameraModel::pinhole(1800.0, ImageSize::new(1920, 1080)).unwrap();
//! let points = scene::cube_corners(Pt3::origin(), 1.0);
//! let (r, t) = scene::look_at(&Pt3::new(4.0, -6.0, 3.0), &Pt3::origin(), &Vec3::z());
//! let set = scene::project_all(&camera, &r, &t, &points).unwrap();
//! assert_eq!(set.len(), 8);
//! ```

pub mod noise;
pub mod scene;

pub use noise::add_pixel_noise;
pub use scene::{cube_corners, look_at, project_all, scattered_points};
