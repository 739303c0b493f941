use crate::{Mat3, Pt2, Pt3, RadialDistortion, Real, Vec2, Vec3, Warning};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Focal length substituted when the stored focal length is not positive.
pub const DEFAULT_FOCAL_PX: Real = 2000.0;

/// Sensor width assumed when the provider does not store one.
pub const DEFAULT_SENSOR_WIDTH_MM: Real = 36.0;

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width_f(&self) -> Real {
        self.width as Real
    }

    #[inline]
    pub fn height_f(&self) -> Real {
        self.height as Real
    }

    /// Image centre in pixels.
    pub fn center(&self) -> Pt2 {
        Pt2::new(self.width_f() * 0.5, self.height_f() * 0.5)
    }

    /// Width over height.
    pub fn aspect(&self) -> Real {
        self.width_f() / self.height_f()
    }

    /// Convert a normalized bottom-left marker position into top-left pixels.
    pub fn marker_to_pixel(&self, marker: &Pt2) -> Pt2 {
        Pt2::new(
            marker.x * self.width_f(),
            self.height_f() - marker.y * self.height_f(),
        )
    }

    /// Flip a y coordinate between the bottom-left and top-left conventions.
    #[inline]
    pub fn flip_y(&self, y: Real) -> Real {
        self.height_f() - y
    }
}

/// Distortion model declared by the track provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistortionModelTag {
    Polynomial,
    Brown,
    Other(String),
}

impl DistortionModelTag {
    /// Parse a provider tag such as `"POLYNOMIAL"` or `"BROWN"` (case-insensitive).
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "polynomial" => Self::Polynomial,
            "brown" => Self::Brown,
            _ => Self::Other(tag.to_string()),
        }
    }
}

/// Camera parameters as stored by the track provider.
///
/// The principal point uses the provider's bottom-left pixel convention.
/// Both distortion sets are stored; `distortion_model` selects the active one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackCameraParams {
    pub focal_px: Real,
    pub principal_px: [Real; 2],
    #[serde(default = "default_sensor_width")]
    pub sensor_width_mm: Real,
    pub distortion_model: String,
    #[serde(default)]
    pub polynomial: RadialDistortion,
    #[serde(default)]
    pub brown: RadialDistortion,
}

fn default_sensor_width() -> Real {
    DEFAULT_SENSOR_WIDTH_MM
}

impl TrackCameraParams {
    /// Default parameters for an image: 2000 px focal, centred principal
    /// point, no distortion.
    pub fn defaults_for(image: ImageSize) -> Self {
        let c = image.center();
        Self {
            focal_px: DEFAULT_FOCAL_PX,
            principal_px: [c.x, c.y],
            sensor_width_mm: DEFAULT_SENSOR_WIDTH_MM,
            distortion_model: "POLYNOMIAL".to_string(),
            polynomial: RadialDistortion::zeros(),
            brown: RadialDistortion::zeros(),
        }
    }

    pub fn distortion_tag(&self) -> DistortionModelTag {
        DistortionModelTag::parse(&self.distortion_model)
    }

    /// Focal length in millimetres for the stored sensor width.
    pub fn focal_mm(&self, image: ImageSize) -> Real {
        self.focal_px * self.sensor_width_mm / image.width_f()
    }

    /// Restore the default calibration while keeping the sensor and model tag.
    pub fn reset_calibration(&mut self, image: ImageSize) {
        let c = image.center();
        self.focal_px = DEFAULT_FOCAL_PX;
        self.principal_px = [c.x, c.y];
        self.polynomial = RadialDistortion::zeros();
        self.brown = RadialDistortion::zeros();
    }
}

/// Pinhole camera with square pixels and radial distortion.
///
/// The principal point is stored in the vision convention (origin top-left,
/// y down), matching the pixel coordinates of correspondences.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub focal_px: Real,
    pub principal: Pt2,
    pub distortion: RadialDistortion,
    pub image_size: ImageSize,
}

impl CameraModel {
    /// Construct a camera model, rejecting non-positive focal lengths.
    pub fn new(
        focal_px: Real,
        principal: Pt2,
        distortion: RadialDistortion,
        image_size: ImageSize,
    ) -> Result<Self> {
        ensure!(
            focal_px.is_finite() && focal_px > 0.0,
            "focal length must be positive, got {}",
            focal_px
        );
        ensure!(
            image_size.width > 0 && image_size.height > 0,
            "image size must be non-zero, got {}x{}",
            image_size.width,
            image_size.height
        );
        Ok(Self {
            focal_px,
            principal,
            distortion,
            image_size,
        })
    }

    /// Distortion-free camera with the principal point at the image centre.
    pub fn pinhole(focal_px: Real, image_size: ImageSize) -> Result<Self> {
        Self::new(
            focal_px,
            image_size.center(),
            RadialDistortion::zeros(),
            image_size,
        )
    }

    /// Build the solver camera from the provider's stored parameters.
    ///
    /// Never fails: a non-positive focal length is replaced by
    /// [`DEFAULT_FOCAL_PX`] and an unknown distortion model disables
    /// distortion. Both cases are reported as warnings.
    pub fn from_track_params(params: &TrackCameraParams, image_size: ImageSize) -> (Self, Vec<Warning>) {
        let mut warnings = Vec::new();

        let mut focal_px = params.focal_px;
        if !(focal_px.is_finite() && focal_px > 0.0) {
            let warning = Warning::FocalClamped {
                source: focal_px,
                replacement: DEFAULT_FOCAL_PX,
            };
            log::warn!("{warning}");
            warnings.push(warning);
            focal_px = DEFAULT_FOCAL_PX;
        }

        let distortion = match params.distortion_tag() {
            DistortionModelTag::Polynomial => params.polynomial,
            DistortionModelTag::Brown => params.brown,
            DistortionModelTag::Other(tag) => {
                let warning = Warning::UnsupportedDistortionModel { tag };
                log::warn!("{warning}");
                warnings.push(warning);
                RadialDistortion::zeros()
            }
        };

        let principal = Pt2::new(
            params.principal_px[0],
            image_size.flip_y(params.principal_px[1]),
        );

        let camera = Self {
            focal_px,
            principal,
            distortion,
            image_size,
        };
        (camera, warnings)
    }

    /// Principal point in the provider's bottom-left convention.
    pub fn principal_provider(&self) -> Pt2 {
        Pt2::new(self.principal.x, self.image_size.flip_y(self.principal.y))
    }

    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.focal_px,
            0.0,
            self.principal.x,
            0.0,
            self.focal_px,
            self.principal.y,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Distortion coefficients in OpenCV order `[k1, k2, p1, p2, k3]`.
    pub fn distortion_vector(&self) -> [Real; 5] {
        self.distortion.to_vector()
    }

    /// Map an undistorted normalized coordinate to pixels.
    pub fn normalized_to_pixel(&self, n: &Vec2) -> Pt2 {
        let d = self.distortion.distort(n);
        Pt2::new(
            self.focal_px * d.x + self.principal.x,
            self.focal_px * d.y + self.principal.y,
        )
    }

    /// Map a pixel to an undistorted normalized coordinate on the `z = 1` plane.
    pub fn pixel_to_normalized(&self, px: &Pt2) -> Vec2 {
        let d = Vec2::new(
            (px.x - self.principal.x) / self.focal_px,
            (px.y - self.principal.y) / self.focal_px,
        );
        self.distortion.undistort(&d)
    }

    /// Project a camera-frame point. Returns `None` at or behind the camera plane.
    pub fn project(&self, pc: &Pt3) -> Option<Pt2> {
        if pc.z <= Real::EPSILON {
            return None;
        }
        Some(self.normalized_to_pixel(&Vec2::new(pc.x / pc.z, pc.y / pc.z)))
    }

    /// Project a world point through a world-to-camera pose.
    pub fn project_world(&self, rotation: &Mat3, translation: &Vec3, pw: &Pt3) -> Option<Pt2> {
        let pc = rotation * pw.coords + translation;
        self.project(&Pt3::from(pc))
    }
}
