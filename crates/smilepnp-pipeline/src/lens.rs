//! Scene camera lens settings derived from the solved intrinsics.

use crate::provider::{LensSettings, SensorFit};
use smilepnp_core::{CameraModel, Real, TrackCameraParams};

/// Lens matching `camera` on a sensor of the stored width.
///
/// The sensor fits horizontally when the render frame is no wider than the
/// clip. Shifts are measured from the provider-convention principal point
/// and expressed in units of the fitted image dimension.
pub fn lens_settings(
    params: &TrackCameraParams,
    camera: &CameraModel,
    render_aspect: Real,
) -> LensSettings {
    let size = camera.image_size;
    let (w, h) = (size.width_f(), size.height_f());
    let sensor_width_mm = params.sensor_width_mm;

    let (sensor_fit, reference) = if render_aspect <= size.aspect() {
        (SensorFit::Horizontal, w)
    } else {
        (SensorFit::Vertical, h)
    };
    let [px, py] = params.principal_px;

    LensSettings {
        focal_mm: camera.focal_px * sensor_width_mm / w,
        sensor_width_mm,
        sensor_height_mm: sensor_width_mm * h / w,
        sensor_fit,
        shift_x: (w * 0.5 - px) / reference,
        shift_y: (h * 0.5 - py) / reference,
    }
}
