//! Host interfaces: the 2D track provider and the 3D scene graph.
//!
//! A session reads correspondences and stored intrinsics through these
//! traits and writes back only at its commit points.

use serde::{Deserialize, Serialize};
use smilepnp_core::{ImageSize, Pt2, Pt3, Real, SceneTransform, TrackCameraParams};
use std::fmt;

/// The active 2D clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl ClipInfo {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }
}

/// Kind of a scene entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Empty,
    Mesh,
    Camera,
    Other(String),
}

impl ObjectKind {
    /// Upper-case type label used in reports.
    pub fn label(&self) -> &str {
        match self {
            ObjectKind::Empty => "EMPTY",
            ObjectKind::Mesh => "MESH",
            ObjectKind::Camera => "CAMERA",
            ObjectKind::Other(name) => name,
        }
    }

    /// Whether the entity's origin is an exact landmark position.
    pub fn is_point(&self) -> bool {
        matches!(self, ObjectKind::Empty)
    }
}

/// A named scene entity and its world-space origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    pub world_position: Pt3,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind, world_position: Pt3) -> Self {
        Self {
            name: name.into(),
            kind,
            world_position,
        }
    }
}

/// Which sensor dimension the lens fits to the render frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorFit {
    Horizontal,
    Vertical,
}

impl fmt::Display for SensorFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFit::Horizontal => f.write_str("HORIZONTAL"),
            SensorFit::Vertical => f.write_str("VERTICAL"),
        }
    }
}

/// Lens settings of a scene camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LensSettings {
    pub focal_mm: Real,
    pub sensor_width_mm: Real,
    pub sensor_height_mm: Real,
    pub sensor_fit: SensorFit,
    /// Horizontal shift as a fraction of the fitted sensor dimension.
    pub shift_x: Real,
    /// Vertical shift as a fraction of the fitted sensor dimension.
    pub shift_y: Real,
}

impl Default for LensSettings {
    fn default() -> Self {
        Self {
            focal_mm: 50.0,
            sensor_width_mm: 36.0,
            sensor_height_mm: 24.0,
            sensor_fit: SensorFit::Horizontal,
            shift_x: 0.0,
            shift_y: 0.0,
        }
    }
}

/// Source of 2D tracks and stored camera intrinsics.
pub trait TrackProvider {
    /// The active clip, if any.
    fn clip(&self) -> Option<ClipInfo>;

    /// Names of every track in the active clip.
    fn track_names(&self) -> Vec<String>;

    /// Marker position of `track` at `frame`, normalized with a bottom-left
    /// origin.
    fn marker(&self, track: &str, frame: i32) -> Option<Pt2>;

    /// Stored intrinsics of the active clip.
    fn camera_params(&self) -> Option<TrackCameraParams>;

    /// Replace the stored intrinsics of the active clip.
    fn set_camera_params(&mut self, params: TrackCameraParams);

    fn has_track(&self, track: &str) -> bool {
        self.track_names().iter().any(|name| name == track)
    }
}

/// The 3D scene holding landmark entities and cameras.
pub trait SceneGraph {
    fn active_frame(&self) -> i32;

    fn object(&self, name: &str) -> Option<SceneObject>;

    fn object_names(&self) -> Vec<String>;

    fn active_camera(&self) -> Option<String>;

    fn set_active_camera(&mut self, id: &str);

    fn camera_transform(&self, id: &str) -> Option<SceneTransform>;

    fn set_camera_transform(&mut self, id: &str, transform: &SceneTransform);

    fn camera_lens(&self, id: &str) -> Option<LensSettings>;

    fn set_camera_lens(&mut self, id: &str, lens: &LensSettings);

    /// Render width over height, including pixel aspect.
    fn render_aspect(&self) -> Real;

    /// Scene units in metres.
    fn scale_length(&self) -> Real;
}
