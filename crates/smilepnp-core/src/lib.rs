//! Core math and geometry primitives for SmilePnP.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the pinhole [`CameraModel`] with radial distortion and its construction
//!   from a track provider's stored parameters,
//! - 2D/3D [`Correspondence`] sets,
//! - the reprojection evaluator ([`evaluate`]),
//! - the vision-to-scene camera convention converter ([`to_scene_transform`]),
//! - deterministic synthetic scenes for tests ([`synthetic`]).
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ projection(R * X + t)`

/// Vision-to-scene camera transform conversion.
pub mod convention;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera model and distortion.
pub mod models;
/// Reprojection error evaluation.
pub mod reprojection;
/// Deterministic synthetic data for tests and examples.
pub mod synthetic;
/// Correspondence containers.
pub mod types;
/// Recoverable warnings raised while building inputs or solving.
pub mod warning;

pub use convention::*;
pub use math::*;
pub use models::*;
pub use reprojection::*;
pub use types::*;
pub use warning::Warning;
