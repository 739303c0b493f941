//! 2D/3D landmark correspondences.
//!
//! A [`CorrespondenceSet`] is built fresh for every solve or calibration from
//! the mapping table and the current frame's markers. It is never persisted.

use crate::{Pt2, Pt3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One landmark: a tracked 2D marker paired with a 3D reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Track name; unique within a set.
    pub label: String,
    /// Name of the 3D entity the track is mapped to.
    pub object: String,
    /// Marker position in pixels (origin top-left, y down).
    pub point2d: Pt2,
    /// World-space position of the 3D entity.
    pub point3d: Pt3,
}

impl Correspondence {
    pub fn new(label: impl Into<String>, object: impl Into<String>, point2d: Pt2, point3d: Pt3) -> Self {
        Self {
            label: label.into(),
            object: object.into(),
            point2d,
            point3d,
        }
    }
}

/// Ordered set of correspondences with unique labels.
///
/// # Example
///
/// ```
/// use smilepnp_core::{CorrespondenceSet, Pt2, Pt3};
///
/// let points_3d = vec![Pt3::new(0.0, 0.0, 0.0), Pt3::new(0.1, 0.0, 0.0)];
/// let points_2d = vec![Pt2::new(320.0, 240.0), Pt2::new(400.0, 240.0)];
/// let set = CorrespondenceSet::from_points(points_3d, points_2d).unwrap();
///
/// assert_eq!(set.len(), 2);
/// assert_eq!(set.labels(), vec!["P1", "P2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    items: Vec<Correspondence>,
}

impl CorrespondenceSet {
    /// Build a set, rejecting duplicate labels.
    pub fn new(items: Vec<Correspondence>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            ensure!(
                seen.insert(item.label.as_str()),
                "duplicate correspondence label: {}",
                item.label
            );
        }
        Ok(Self { items })
    }

    /// Build a set from parallel point lists, labelling points `P1..Pn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the 3D and 2D point counts don't match.
    pub fn from_points(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match: {} vs {}",
            points_3d.len(),
            points_2d.len()
        );
        let items = points_3d
            .into_iter()
            .zip(points_2d)
            .enumerate()
            .map(|(i, (p3, p2))| {
                let label = format!("P{}", i + 1);
                Correspondence::new(label.clone(), label, p2, p3)
            })
            .collect();
        Ok(Self { items })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Correspondence] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut [Correspondence] {
        &mut self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Correspondence> {
        self.items.iter()
    }

    pub fn points_3d(&self) -> Vec<Pt3> {
        self.items.iter().map(|c| c.point3d).collect()
    }

    pub fn points_2d(&self) -> Vec<Pt2> {
        self.items.iter().map(|c| c.point2d).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.items.iter().map(|c| c.label.as_str()).collect()
    }

    /// Keep only the first `n` correspondences.
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            items: self.items.iter().take(n).cloned().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CorrespondenceSet {
    type Item = &'a Correspondence;
    type IntoIter = std::slice::Iter<'a, Correspondence>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
