//! Closed-form camera pose solvers.
//!
//! Every solver estimates a world-to-camera pose (`R`, `t`, vision
//! convention) from 3D points and their pixel positions under a known
//! [`CameraModel`](smilepnp_core::CameraModel). Pixels are undistorted
//! before solving.
//!
//! - [`sqpnp`](pnp::sqpnp): globally optimal SQPnP, 3+ points, one or more
//!   candidate solutions ranked by algebraic error.
//! - [`dlt`](pnp::dlt): normalized direct linear transform, 6+ points.
//! - [`epnp`](pnp::epnp): control-point formulation, 4+ points.

pub mod math;
pub mod pnp;

pub use pnp::*;
