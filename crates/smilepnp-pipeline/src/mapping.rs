//! Track-to-landmark mapping table and correspondence collection.

use crate::error::SolverError;
use crate::provider::{SceneGraph, TrackProvider};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use smilepnp_core::{Correspondence, CorrespondenceSet, Warning};
use std::collections::HashMap;

/// One row: a 2D track name and the 3D entity assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRow {
    pub track_name: String,
    #[serde(default)]
    pub object: Option<String>,
}

impl MappingRow {
    pub fn new(track_name: impl Into<String>, object: Option<String>) -> Self {
        Self {
            track_name: track_name.into(),
            object,
        }
    }

    /// Whether the row names both a track and an entity.
    pub fn is_complete(&self) -> bool {
        !self.track_name.is_empty() && self.object.as_deref().is_some_and(|o| !o.is_empty())
    }
}

/// Ordered mapping rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable {
    rows: Vec<MappingRow>,
}

impl MappingTable {
    pub fn new(rows: Vec<MappingRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[MappingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: MappingRow) {
        self.rows.push(row);
    }

    /// Assign `object` to every row of `track`. Returns whether a row matched.
    pub fn assign(&mut self, track: &str, object: Option<String>) -> bool {
        let mut found = false;
        for row in self.rows.iter_mut().filter(|r| r.track_name == track) {
            row.object = object.clone();
            found = true;
        }
        found
    }

    /// Remove the row at `index`; out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> bool {
        if index < self.rows.len() {
            self.rows.remove(index);
            true
        } else {
            false
        }
    }

    /// `(track, object)` pairs of every complete row.
    pub fn complete_rows(&self) -> Vec<(&str, &str)> {
        self.rows
            .iter()
            .filter(|r| r.is_complete())
            .filter_map(|r| r.object.as_deref().map(|o| (r.track_name.as_str(), o)))
            .collect()
    }
}

/// Rebuild the table from the provider's tracks.
///
/// One row per track, sorted by name. Assignments from `existing` are kept;
/// otherwise a scene entity with the track's name is assigned.
pub fn sync_landmarks(
    existing: &MappingTable,
    tracks: &dyn TrackProvider,
    scene: &dyn SceneGraph,
) -> Result<MappingTable, SolverError> {
    if tracks.clip().is_none() {
        return Err(SolverError::ClipMissing);
    }
    let mut names = tracks.track_names();
    if names.is_empty() {
        return Err(SolverError::NoTracks);
    }
    names.sort();

    let previous: HashMap<&str, &str> = existing
        .rows
        .iter()
        .filter_map(|r| r.object.as_deref().map(|o| (r.track_name.as_str(), o)))
        .collect();

    let rows = names
        .into_iter()
        .map(|name| {
            let object = previous
                .get(name.as_str())
                .map(|o| o.to_string())
                .or_else(|| scene.object(&name).map(|o| o.name));
            MappingRow::new(name, object)
        })
        .collect();
    Ok(MappingTable::new(rows))
}

/// Build the correspondence set for `frame`.
///
/// Markers are converted to top-left pixels; entities contribute their
/// world-space origin.
pub fn collect(
    mapping: &MappingTable,
    tracks: &dyn TrackProvider,
    scene: &dyn SceneGraph,
    frame: i32,
) -> Result<(CorrespondenceSet, Vec<Warning>), SolverError> {
    let clip = tracks.clip().ok_or(SolverError::ClipMissing)?;
    let size = clip.size();

    let mut errors = Vec::new();
    let mut entries = Vec::new();
    if mapping.is_empty() {
        errors.push("No 2D/3D correspondences. Run landmark synchronization.".to_string());
    }
    for row in mapping.rows.iter().filter(|r| !r.track_name.is_empty()) {
        let name = &row.track_name;
        if !tracks.has_track(name) {
            errors.push(format!("2D track not found : {name}"));
            continue;
        }
        let Some(object_name) = row.object.as_deref().filter(|o| !o.is_empty()) else {
            errors.push(format!("No object assigned for {name}"));
            continue;
        };
        match scene.object(object_name) {
            Some(object) => entries.push((name, object)),
            None => errors.push(format!("3D object not found : {object_name}")),
        }
    }
    if entries.is_empty() && !mapping.is_empty() {
        errors.push("All correspondences are incomplete.".to_string());
    }
    if !errors.is_empty() {
        return Err(SolverError::Mapping(errors));
    }

    let mut warnings = Vec::new();
    let mut points_2d = Vec::with_capacity(entries.len());
    let mut points_3d = Vec::with_capacity(entries.len());
    for (name, object) in &entries {
        let marker = tracks
            .marker(name, frame)
            .ok_or_else(|| SolverError::MarkerMissing {
                track: name.to_string(),
                frame,
            })?;
        points_2d.push(size.marker_to_pixel(&marker));

        if !object.kind.is_point() {
            let warning = Warning::NonPointLandmark {
                track: name.to_string(),
                object: object.name.clone(),
            };
            warn!("{warning}");
            warnings.push(warning);
        }
        points_3d.push(object.world_position);
    }
    if points_2d.len() != points_3d.len() {
        return Err(SolverError::PointMismatch {
            points_2d: points_2d.len(),
            points_3d: points_3d.len(),
        });
    }

    let items = entries
        .iter()
        .zip(points_2d.into_iter().zip(points_3d))
        .map(|((name, object), (p2, p3))| {
            Correspondence::new(name.as_str(), object.name.as_str(), p2, p3)
        })
        .collect();
    let set = CorrespondenceSet::new(items)
        .map_err(|e| SolverError::Mapping(vec![e.to_string()]))?;
    debug!("collected {} correspondences on frame {frame}", set.len());
    Ok((set, warnings))
}
