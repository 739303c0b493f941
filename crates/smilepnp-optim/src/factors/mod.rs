//! Residual factors for tiny-solver.
//!
//! Factors are generic over [`nalgebra::RealField`] so tiny-solver can
//! evaluate them on dual numbers. Constants are lifted with
//! [`nalgebra::convert`].

pub mod reprojection;
