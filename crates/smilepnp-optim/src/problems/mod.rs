//! Problem builders and optimizers.

pub mod intrinsics_refine;
pub mod pose_refine;
