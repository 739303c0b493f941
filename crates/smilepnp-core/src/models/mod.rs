//! Camera model types.
//!
//! [`CameraModel`] is the single camera description consumed by every solver:
//! a shared focal length in pixels, a principal point in the vision (top-left,
//! y-down) convention and a radial-only [`RadialDistortion`].
//!
//! [`TrackCameraParams`] is the track provider's stored description of the
//! same camera (bottom-left principal point, tagged distortion sets) and
//! [`CameraModel::from_track_params`] converts between the two.

mod camera;
mod distortion;

pub use camera::*;
pub use distortion::*;
