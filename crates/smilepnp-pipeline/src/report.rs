//! Plain-text quality report.
//!
//! The report lists the last solve's per-point errors (or the bare mapping
//! when no solve has run), the landmark positions in millimetres, the active
//! scene camera and the clip's optical parameters.

use crate::error::SolverError;
use crate::mapping::MappingTable;
use crate::provider::{SceneGraph, TrackProvider};
use crate::session::SessionState;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use smilepnp_core::Real;
use std::fs;
use std::path::{Path, PathBuf};

/// One solved correspondence as shown in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub track: String,
    pub object: String,
    pub object_location_mm: [Real; 3],
    /// Measured marker, top-left pixels.
    pub marker_px: [Real; 2],
    /// `None` when the point was behind the camera.
    pub projected_px: Option<[Real; 2]>,
    /// `None` when the point could not be projected.
    pub error_px: Option<Real>,
}

/// Millimetres per scene unit. Non-positive scales count as metres.
pub fn scale_to_mm(scale_length: Real) -> Real {
    if scale_length.is_finite() && scale_length > 0.0 {
        scale_length * 1000.0
    } else {
        1000.0
    }
}

/// `Quality_Report_YYYYmmdd_HHMM.txt` in local time.
pub fn default_report_name(now: &DateTime<Local>) -> String {
    format!("Quality_Report_{}.txt", now.format("%Y%m%d_%H%M"))
}

fn coords(values: &[Real]) -> String {
    if values.is_empty() {
        return "-".to_string();
    }
    values
        .iter()
        .map(|v| format!("{v:.1}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything the report reads.
pub struct ReportContext<'a> {
    pub tracks: &'a dyn TrackProvider,
    pub scene: &'a dyn SceneGraph,
    pub mapping: &'a MappingTable,
    pub state: &'a SessionState,
    pub scale_to_mm: Real,
    pub generated_at: DateTime<Local>,
}

impl ReportContext<'_> {
    pub fn render(&self) -> String {
        let eq = "=".repeat(80);
        let dash = "-".repeat(80);
        let mut lines: Vec<String> = vec![
            eq.clone(),
            "SmilePnP Quality Report".to_string(),
            eq.clone(),
            String::new(),
            format!("Date: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S")),
        ];
        let clip = self.tracks.clip();
        if let Some(clip) = &clip {
            lines.push(format!(
                "Active clip: {} ({}x{} px)",
                clip.name, clip.width, clip.height
            ));
        }
        lines.push(format!("Solver message: {}", self.state.message));
        lines.push(String::new());

        lines.extend([dash.clone(), "2D/3D Correspondences".to_string(), dash.clone()]);
        if self.state.last_pairs.is_empty() {
            self.mapping_table(&mut lines);
        } else {
            self.error_table(&mut lines);
        }
        lines.push(String::new());

        self.landmarks(&mut lines, &dash);
        self.active_camera(&mut lines, &dash);
        if clip.is_some() {
            self.clip_parameters(&mut lines, &dash);
        }

        lines.extend([
            dash,
            "NOTE: 3D coordinates are expressed in millimeters. Check units if reimporting the scene."
                .to_string(),
            eq,
        ]);
        lines.join("\n")
    }

    fn error_table(&self, lines: &mut Vec<String>) {
        lines.push(format!(
            "{:<4} {:<15} {:<15} {:<20} {:<15} {:<15} {:<10}",
            "#", "Track", "3D Object", "3D Pos (mm)", "2D Meas (px)", "2D Proj (px)", "Error (px)"
        ));
        lines.push("-".repeat(100));
        for (idx, record) in self.state.last_pairs.iter().enumerate() {
            let object = if record.object.is_empty() {
                "(undefined)"
            } else {
                record.object.as_str()
            };
            let projected = record
                .projected_px
                .map_or_else(|| "-".to_string(), |p| coords(&p));
            let error = record
                .error_px
                .map_or_else(|| "n/a".to_string(), |e| format!("{e:.3}"));
            lines.push(format!(
                "{:<4} {:<15} {:<15} {:<20} {:<15} {:<15} {:<10}",
                idx + 1,
                record.track,
                object,
                coords(&record.object_location_mm),
                coords(&record.marker_px),
                projected,
                error
            ));
        }
        let errors: Vec<Real> = self
            .state
            .last_pairs
            .iter()
            .filter_map(|r| r.error_px)
            .collect();
        lines.push(String::new());
        lines.push(
            "NOTE: Reprojection error - the lower the value, the better the alignment."
                .to_string(),
        );
        if errors.is_empty() {
            lines.push("Average error: n/a".to_string());
        } else {
            let mean = errors.iter().sum::<Real>() / errors.len() as Real;
            lines.push(format!("Average error: {mean:.3} px"));
        }
    }

    fn mapping_table(&self, lines: &mut Vec<String>) {
        lines.push(format!("{:<30} {:<30}", "2D Track", "3D Object"));
        lines.push("-".repeat(60));
        for row in self.mapping.rows() {
            let object = row.object.as_deref().unwrap_or("(undefined)");
            lines.push(format!("{:<30} {:<30}", row.track_name, object));
        }
        lines.push(String::new());
        lines.push(
            "No error measurements available. Run a solver before generating the report."
                .to_string(),
        );
    }

    fn landmarks(&self, lines: &mut Vec<String>, dash: &str) {
        lines.extend([dash.to_string(), "3D Landmarks Summary".to_string(), dash.to_string()]);
        lines.push(format!(
            "{:<20} {:<20} {:<10} {:<30}",
            "Track", "Object", "Type", "3D Position (mm)"
        ));
        lines.push(dash.to_string());
        for row in self.mapping.rows() {
            let name = row.object.as_deref().unwrap_or("(undefined)");
            let object = row.object.as_deref().and_then(|o| self.scene.object(o));
            let (kind, location) = match &object {
                Some(obj) => {
                    let p = obj.world_position.coords * self.scale_to_mm;
                    (obj.kind.label().to_string(), coords(p.as_slice()))
                }
                None => ("-".to_string(), "-".to_string()),
            };
            lines.push(format!(
                "{:<20} {:<20} {:<10} {:<30}",
                row.track_name, name, kind, location
            ));
        }
        lines.push(String::new());
    }

    fn active_camera(&self, lines: &mut Vec<String>, dash: &str) {
        let Some(id) = self.scene.active_camera() else {
            return;
        };
        let Some(transform) = self.scene.camera_transform(&id) else {
            return;
        };
        lines.extend([dash.to_string(), "Active Camera".to_string(), dash.to_string()]);
        let loc = transform.location;
        let euler = transform.euler_xyz_degrees();
        lines.push(format!("Object: {id}"));
        lines.push(format!(
            "Position (m): ({:.4}, {:.4}, {:.4})",
            loc.x, loc.y, loc.z
        ));
        lines.push(format!(
            "Rotation (°): ({:.2}, {:.2}, {:.2})",
            euler.x, euler.y, euler.z
        ));
        lines.push(format!(
            "Distance to origin: {:.4} m",
            transform.distance_to_origin()
        ));
        if let Some(lens) = self.scene.camera_lens(&id) {
            lines.push(format!("Focal length: {:.3} mm", lens.focal_mm));
            lines.push(format!(
                "Sensor: {:.2} x {:.2} mm",
                lens.sensor_width_mm, lens.sensor_height_mm
            ));
            lines.push(format!("Shift: X {:.4}, Y {:.4}", lens.shift_x, lens.shift_y));
        }
        lines.push(String::new());
    }

    fn clip_parameters(&self, lines: &mut Vec<String>, dash: &str) {
        let (Some(clip), Some(params)) = (self.tracks.clip(), self.tracks.camera_params()) else {
            return;
        };
        let size = clip.size();
        lines.extend([
            dash.to_string(),
            "2D Clip and Optical Parameters".to_string(),
            dash.to_string(),
        ]);
        lines.push(format!("Clip resolution: {} x {} px", clip.width, clip.height));
        lines.push(format!("Clip focal length: {:.3} mm", params.focal_mm(size)));
        lines.push(format!("Clip sensor: {:.2} mm", params.sensor_width_mm));
        lines.push(format!(
            "Optical center: {:.3}, {:.3} px",
            params.principal_px[0], params.principal_px[1]
        ));
        let k = params.polynomial;
        lines.push(format!(
            "Distortion (k1/k2/k3): {:.6}, {:.6}, {:.6}",
            k.k1, k.k2, k.k3
        ));
        lines.push(String::new());
    }
}

/// Write `content` as UTF-8, creating parent directories.
pub fn write_report(path: &Path, content: &str) -> Result<PathBuf, SolverError> {
    let io_err = |source| SolverError::ReportIo {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)?;
    log::info!("report written to {}", path.display());
    Ok(path.to_path_buf())
}
