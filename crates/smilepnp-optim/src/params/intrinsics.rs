//! Camera parameter block: the free subset of `[f, cx, cy, k1, k2, k3]`.
//!
//! Focal length and principal point are stored divided by a reference focal
//! length, so every entry of the block is of order one. Held fields never
//! enter the block; the residual reads them as constants.

use anyhow::{ensure, Result};
use nalgebra::{DVector, DVectorView, RealField};
use smilepnp_core::{CameraModel, Pt2, RadialDistortion, Real};

/// Number of camera fields: `f, cx, cy, k1, k2, k3`.
pub const CAMERA_FIELDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Free(usize),
    Held(Real),
}

/// Mapping between a [`CameraModel`] and its free-parameter block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraLayout {
    slots: [Slot; CAMERA_FIELDS],
    scale: Real,
    free: usize,
}

fn fields(camera: &CameraModel) -> [Real; CAMERA_FIELDS] {
    let d = camera.distortion;
    [
        camera.focal_px,
        camera.principal.x,
        camera.principal.y,
        d.k1,
        d.k2,
        d.k3,
    ]
}

/// Only the pixel-valued fields are scaled.
fn is_scaled(field: usize) -> bool {
    field < 3
}

impl CameraLayout {
    /// Layout over `camera` with `free[i]` selecting the moving fields.
    ///
    /// The reference scale is the camera's focal length, or 1 when that is
    /// not a usable positive value.
    pub fn new(camera: &CameraModel, free: [bool; CAMERA_FIELDS]) -> Self {
        let values = fields(camera);
        let scale = if camera.focal_px.is_finite() && camera.focal_px > 0.0 {
            camera.focal_px
        } else {
            1.0
        };
        let mut slots = [Slot::Held(0.0); CAMERA_FIELDS];
        let mut next = 0;
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = if free[i] {
                next += 1;
                Slot::Free(next - 1)
            } else {
                Slot::Held(values[i])
            };
        }
        Self {
            slots,
            scale,
            free: next,
        }
    }

    pub fn free_count(&self) -> usize {
        self.free
    }

    pub fn scale(&self) -> Real {
        self.scale
    }

    /// Free values of `camera`, scaled.
    pub fn pack(&self, camera: &CameraModel) -> DVector<f64> {
        let values = fields(camera);
        let mut block = DVector::zeros(self.free);
        for (i, slot) in self.slots.iter().enumerate() {
            if let Slot::Free(j) = *slot {
                block[j] = if is_scaled(i) {
                    values[i] / self.scale
                } else {
                    values[i]
                };
            }
        }
        block
    }

    /// All six fields in pixel units, generic for automatic differentiation.
    ///
    /// `block` may be `None` only when nothing is free.
    pub fn expand<T: RealField>(&self, block: Option<&DVector<T>>) -> [T; CAMERA_FIELDS] {
        let scale: T = nalgebra::convert(self.scale);
        std::array::from_fn(|i| match (self.slots[i], block) {
            (Slot::Free(j), Some(block)) if is_scaled(i) => block[j].clone() * scale.clone(),
            (Slot::Free(j), Some(block)) => block[j].clone(),
            (Slot::Held(v), _) => nalgebra::convert(v),
            (Slot::Free(_), None) => T::zero(),
        })
    }

    /// `base` with its free fields replaced from `block`.
    ///
    /// Held fields are copied from `base` unchanged.
    pub fn unpack(&self, base: &CameraModel, block: DVectorView<'_, f64>) -> Result<CameraModel> {
        ensure!(
            block.len() == self.free,
            "expected camera block of length {}, got {}",
            self.free,
            block.len()
        );
        let mut values = fields(base);
        for (i, slot) in self.slots.iter().enumerate() {
            if let Slot::Free(j) = *slot {
                values[i] = if is_scaled(i) {
                    block[j] * self.scale
                } else {
                    block[j]
                };
            }
        }
        let mut out = *base;
        out.focal_px = values[0];
        out.principal = Pt2::new(values[1], values[2]);
        out.distortion = RadialDistortion::new(values[3], values[4], values[5]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smilepnp_core::ImageSize;

    fn camera() -> CameraModel {
        CameraModel::new(
            1600.0,
            Pt2::new(950.0, 530.0),
            RadialDistortion::new(-0.05, 0.02, 0.001),
            ImageSize::new(1920, 1080),
        )
        .unwrap()
    }

    #[test]
    fn block_holds_only_free_fields_scaled() {
        let cam = camera();
        let layout = CameraLayout::new(&cam, [true, false, false, true, false, false]);
        assert_eq!(layout.free_count(), 2);
        let block = layout.pack(&cam);
        assert_eq!(block.len(), 2);
        assert!((block[0] - 1.0).abs() < 1e-15);
        assert_eq!(block[1], -0.05);
    }

    #[test]
    fn expand_restores_pixel_units() {
        let cam = camera();
        let layout = CameraLayout::new(&cam, [true, true, true, true, true, true]);
        let block = layout.pack(&cam);
        let values = layout.expand(Some(&block));
        let expected = [1600.0, 950.0, 530.0, -0.05, 0.02, 0.001];
        for (got, want) in values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn unpack_keeps_held_fields_bit_identical() {
        let cam = camera();
        let layout = CameraLayout::new(&cam, [true, false, false, false, false, false]);
        let out = layout
            .unpack(&cam, nalgebra::dvector![1.1].as_view())
            .unwrap();
        assert!((out.focal_px - 1760.0).abs() < 1e-9);
        assert_eq!(out.principal, cam.principal);
        assert_eq!(out.distortion, cam.distortion);
    }

    #[test]
    fn nothing_free_expands_held_values() {
        let cam = camera();
        let layout = CameraLayout::new(&cam, [false; CAMERA_FIELDS]);
        assert_eq!(layout.free_count(), 0);
        let values = layout.expand::<f64>(None);
        assert_eq!(values[0], 1600.0);
        assert_eq!(values[5], 0.001);
    }

    #[test]
    fn unpack_rejects_wrong_length() {
        let cam = camera();
        let layout = CameraLayout::new(&cam, [true, false, false, false, false, false]);
        assert!(layout.unpack(&cam, nalgebra::dvector![1.0, 2.0].as_view()).is_err());
    }
}
