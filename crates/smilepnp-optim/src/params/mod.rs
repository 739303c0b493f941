//! Parameter blocks and their conversions to tiny-solver vectors.
//!
//! - [`intrinsics::CameraLayout`]: free subset of `[f, cx, cy, k1, k2, k3]`
//! - [`pose_se3`]: SE(3) pose `[qx, qy, qz, qw, tx, ty, tz]`

pub mod intrinsics;
pub mod pose_se3;
