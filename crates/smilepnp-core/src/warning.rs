use crate::Real;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recoverable condition reported alongside a successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    /// The stored focal length was not positive and was replaced.
    FocalClamped { source: Real, replacement: Real },
    /// The distortion model tag is not supported; distortion is disabled.
    UnsupportedDistortionModel { tag: String },
    /// A landmark object is not point-like; its origin is used.
    NonPointLandmark { track: String, object: String },
    /// A PnP stage failed and the next stage was tried.
    PnpFallback { stage: String, reason: String },
}

impl Warning {
    /// Stable tag for the warning kind.
    pub fn code(&self) -> &'static str {
        match self {
            Warning::FocalClamped { .. } => "focal_clamped",
            Warning::UnsupportedDistortionModel { .. } => "unsupported_distortion_model",
            Warning::NonPointLandmark { .. } => "non_point_landmark",
            Warning::PnpFallback { .. } => "pnp_fallback",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::FocalClamped {
                source,
                replacement,
            } => write!(
                f,
                "invalid focal length ({source}); using default value ({replacement} px)"
            ),
            Warning::UnsupportedDistortionModel { tag } => write!(
                f,
                "unsupported distortion model '{tag}'; using zero coefficients"
            ),
            Warning::NonPointLandmark { track, object } => write!(
                f,
                "{object} (track {track}) is not an empty; using its origin"
            ),
            Warning::PnpFallback { stage, reason } => {
                write!(f, "{stage} failed ({reason}); trying the next PnP method")
            }
        }
    }
}
