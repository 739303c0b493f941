//! In-memory host used by the CLI and the tests.
//!
//! The project is split into a track half and a scene half so a session can
//! borrow both mutably at once; the project itself also implements both
//! traits for read-only callers.

use crate::mapping::MappingTable;
use crate::provider::{
    ClipInfo, LensSettings, ObjectKind, SceneGraph, SceneObject, TrackProvider,
};
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use smilepnp_core::{Pt2, Pt3, Real, SceneTransform, TrackCameraParams};
use std::collections::BTreeMap;

/// Clip, markers and stored intrinsics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryTracks {
    pub clip: Option<ClipInfo>,
    /// Normalized bottom-left markers per track and frame.
    pub tracks: BTreeMap<String, BTreeMap<i32, Pt2>>,
    /// Stored intrinsics; clip defaults when unset.
    pub camera: Option<TrackCameraParams>,
}

impl InMemoryTracks {
    pub fn new(clip: ClipInfo) -> Self {
        Self {
            clip: Some(clip),
            ..Self::default()
        }
    }

    /// Insert or move a marker, creating the track on first use.
    pub fn set_marker(&mut self, track: impl Into<String>, frame: i32, marker: Pt2) {
        self.tracks
            .entry(track.into())
            .or_default()
            .insert(frame, marker);
    }

    /// Insert a marker given in top-left pixels.
    pub fn set_marker_px(&mut self, track: impl Into<String>, frame: i32, pixel: Pt2) {
        let Some(clip) = &self.clip else {
            return;
        };
        let size = clip.size();
        let marker = Pt2::new(
            pixel.x / size.width_f(),
            size.flip_y(pixel.y) / size.height_f(),
        );
        self.set_marker(track, frame, marker);
    }
}

impl TrackProvider for InMemoryTracks {
    fn clip(&self) -> Option<ClipInfo> {
        self.clip.clone()
    }

    fn track_names(&self) -> Vec<String> {
        if self.clip.is_none() {
            return Vec::new();
        }
        self.tracks.keys().cloned().collect()
    }

    fn marker(&self, track: &str, frame: i32) -> Option<Pt2> {
        self.tracks.get(track)?.get(&frame).copied()
    }

    fn camera_params(&self) -> Option<TrackCameraParams> {
        let clip = self.clip.as_ref()?;
        Some(
            self.camera
                .clone()
                .unwrap_or_else(|| TrackCameraParams::defaults_for(clip.size())),
        )
    }

    fn set_camera_params(&mut self, params: TrackCameraParams) {
        self.camera = Some(params);
    }

    fn has_track(&self, track: &str) -> bool {
        self.clip.is_some() && self.tracks.contains_key(track)
    }
}

/// Transform and lens of a scene camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub transform: SceneTransform,
    #[serde(default)]
    pub lens: LensSettings,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            transform: SceneTransform::identity(),
            lens: LensSettings::default(),
        }
    }
}

/// Scene entities, cameras and render settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryScene {
    pub frame: i32,
    /// Non-camera entities keyed by name.
    pub objects: BTreeMap<String, SceneObject>,
    pub cameras: BTreeMap<String, CameraState>,
    pub active_camera: Option<String>,
    pub render_aspect: Real,
    pub scale_length: Real,
}

impl Default for InMemoryScene {
    fn default() -> Self {
        Self {
            frame: 1,
            objects: BTreeMap::new(),
            cameras: BTreeMap::new(),
            active_camera: None,
            render_aspect: 16.0 / 9.0,
            scale_length: 1.0,
        }
    }
}

impl InMemoryScene {
    pub fn add_object(&mut self, name: impl Into<String>, kind: ObjectKind, position: Pt3) {
        let name = name.into();
        self.objects
            .insert(name.clone(), SceneObject::new(name, kind, position));
    }

    pub fn add_empty(&mut self, name: impl Into<String>, position: Pt3) {
        self.add_object(name, ObjectKind::Empty, position);
    }

    /// Add a camera at the identity transform. The first camera becomes active.
    pub fn add_camera(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.active_camera.is_none() {
            self.active_camera = Some(name.clone());
        }
        self.cameras.insert(name, CameraState::default());
    }
}

impl SceneGraph for InMemoryScene {
    fn active_frame(&self) -> i32 {
        self.frame
    }

    fn object(&self, name: &str) -> Option<SceneObject> {
        if let Some(object) = self.objects.get(name) {
            return Some(object.clone());
        }
        self.cameras.get(name).map(|cam| {
            SceneObject::new(
                name,
                ObjectKind::Camera,
                Pt3::from(cam.transform.location),
            )
        })
    }

    fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .keys()
            .chain(self.cameras.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn active_camera(&self) -> Option<String> {
        self.active_camera.clone()
    }

    fn set_active_camera(&mut self, id: &str) {
        self.active_camera = Some(id.to_string());
    }

    fn camera_transform(&self, id: &str) -> Option<SceneTransform> {
        self.cameras.get(id).map(|cam| cam.transform)
    }

    fn set_camera_transform(&mut self, id: &str, transform: &SceneTransform) {
        self.cameras.entry(id.to_string()).or_default().transform = *transform;
    }

    fn camera_lens(&self, id: &str) -> Option<LensSettings> {
        self.cameras.get(id).map(|cam| cam.lens)
    }

    fn set_camera_lens(&mut self, id: &str, lens: &LensSettings) {
        self.cameras.entry(id.to_string()).or_default().lens = *lens;
    }

    fn render_aspect(&self) -> Real {
        self.render_aspect
    }

    fn scale_length(&self) -> Real {
        self.scale_length
    }
}

/// A complete project: tracks, scene, mapping table and session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryProject {
    pub tracks: InMemoryTracks,
    pub scene: InMemoryScene,
    pub mapping: MappingTable,
    pub state: SessionState,
}

impl InMemoryProject {
    pub fn new(clip: ClipInfo) -> Self {
        Self {
            tracks: InMemoryTracks::new(clip),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl TrackProvider for InMemoryProject {
    fn clip(&self) -> Option<ClipInfo> {
        self.tracks.clip()
    }

    fn track_names(&self) -> Vec<String> {
        self.tracks.track_names()
    }

    fn marker(&self, track: &str, frame: i32) -> Option<Pt2> {
        self.tracks.marker(track, frame)
    }

    fn camera_params(&self) -> Option<TrackCameraParams> {
        self.tracks.camera_params()
    }

    fn set_camera_params(&mut self, params: TrackCameraParams) {
        self.tracks.set_camera_params(params);
    }

    fn has_track(&self, track: &str) -> bool {
        self.tracks.has_track(track)
    }
}

impl SceneGraph for InMemoryProject {
    fn active_frame(&self) -> i32 {
        self.scene.active_frame()
    }

    fn object(&self, name: &str) -> Option<SceneObject> {
        self.scene.object(name)
    }

    fn object_names(&self) -> Vec<String> {
        self.scene.object_names()
    }

    fn active_camera(&self) -> Option<String> {
        self.scene.active_camera()
    }

    fn set_active_camera(&mut self, id: &str) {
        self.scene.set_active_camera(id);
    }

    fn camera_transform(&self, id: &str) -> Option<SceneTransform> {
        self.scene.camera_transform(id)
    }

    fn set_camera_transform(&mut self, id: &str, transform: &SceneTransform) {
        self.scene.set_camera_transform(id, transform);
    }

    fn camera_lens(&self, id: &str) -> Option<LensSettings> {
        self.scene.camera_lens(id)
    }

    fn set_camera_lens(&mut self, id: &str, lens: &LensSettings) {
        self.scene.set_camera_lens(id, lens);
    }

    fn render_aspect(&self) -> Real {
        self.scene.render_aspect()
    }

    fn scale_length(&self) -> Real {
        self.scene.scale_length()
    }
}
