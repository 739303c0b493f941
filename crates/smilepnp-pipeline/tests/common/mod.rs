#![allow(dead_code)]

use smilepnp_core::synthetic::{look_at, project_all};
use smilepnp_core::{
    CameraModel, CorrespondenceSet, ImageSize, Mat3, Pt2, Pt3, RadialDistortion, TrackCameraParams,
    Vec3,
};
use smilepnp_pipeline::{ClipInfo, InMemoryProject, Session, SolverConfig};

pub const WIDTH: u32 = 1920;
pub const HEIGHT: u32 = 1080;

pub fn size() -> ImageSize {
    ImageSize::new(WIDTH, HEIGHT)
}

pub fn camera(focal: f64, principal: Pt2, distortion: RadialDistortion) -> CameraModel {
    CameraModel::new(focal, principal, distortion, size()).unwrap()
}

pub fn pinhole(focal: f64) -> CameraModel {
    CameraModel::pinhole(focal, size()).unwrap()
}

/// Stored parameters that rebuild `camera` exactly.
pub fn stored_params(camera: &CameraModel) -> TrackCameraParams {
    let mut params = TrackCameraParams::defaults_for(size());
    params.focal_px = camera.focal_px;
    let p = camera.principal_provider();
    params.principal_px = [p.x, p.y];
    params.polynomial = camera.distortion;
    params
}

pub fn default_pose() -> (Mat3, Vec3) {
    look_at(&Pt3::new(3.0, -6.0, 3.5), &Pt3::new(0.0, 0.0, 0.3), &Vec3::z())
}

/// Project `points` through `truth` and store them as tracks and empties
/// named `P1..Pn`, with a mapping synced from the scene. The stored
/// intrinsics match `truth`.
pub fn project_with(
    truth: &CameraModel,
    rotation: &Mat3,
    translation: &Vec3,
    points: &[Pt3],
) -> (InMemoryProject, CorrespondenceSet) {
    let set = project_all(truth, rotation, translation, points).unwrap();
    let mut project = InMemoryProject::new(ClipInfo::new("shot.mp4", WIDTH, HEIGHT));
    for c in set.iter() {
        project.tracks.set_marker_px(c.label.clone(), 1, c.point2d);
        project.scene.add_empty(c.label.clone(), c.point3d);
    }
    project.scene.add_camera("Camera");
    project.tracks.camera = Some(stored_params(truth));
    let mut session = session();
    session
        .sync_landmarks(&project.tracks, &project.scene, &mut project.mapping)
        .unwrap();
    (project, set)
}

pub fn session() -> Session {
    Session::new(SolverConfig::default()).unwrap()
}
