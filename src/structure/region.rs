use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use super::slice::PolygonSlice;
use crate::geometry::ContourPlane;
use crate::math::{Point3, Vector3};
use crate::operations::query::PlaneGeometry;

/// Default display color when a region carries none (red).
pub const DEFAULT_COLOR: [f64; 3] = [1.0, 0.0, 0.0];

/// Whether a structure is made of contour loops or is a single marker point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StructureKind {
    /// One or more closed contour loops.
    Polygonal,
    /// A single point (for example a reference marker).
    Point(Point3),
}

/// Descriptive metadata copied from the region record.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureMetadata {
    /// Region number, unique within a frame of reference.
    pub number: i32,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Display color, RGB components in `[0, 1]`.
    pub color: [f64; 3],
    /// Frame-of-reference UID the coordinates are expressed in.
    pub frame_of_reference_uid: String,
    /// Series UID of the anatomical images the contours were drawn on.
    pub referenced_series_uid: Option<String>,
    /// Source image per slice index. Negative keys hold frame-level
    /// references not tied to a particular contour.
    pub slice_instance_uids: BTreeMap<i32, String>,
}

impl Default for StructureMetadata {
    fn default() -> Self {
        Self {
            number: 0,
            name: String::new(),
            description: String::new(),
            color: DEFAULT_COLOR,
            frame_of_reference_uid: String::new(),
            referenced_series_uid: None,
            slice_instance_uids: BTreeMap::new(),
        }
    }
}

/// One clinically meaningful region reconstructed from contour slices.
///
/// Geometric metadata is computed once at import; a structure is never
/// modified afterwards; re-importing replaces it.
#[derive(Debug, Clone)]
pub struct Structure {
    metadata: StructureMetadata,
    slices: Vec<PolygonSlice>,
    kind: StructureKind,
    geometry: PlaneGeometry,
}

impl Structure {
    /// Creates a structure from its metadata, slices and plane geometry.
    #[must_use]
    pub fn new(
        metadata: StructureMetadata,
        slices: Vec<PolygonSlice>,
        kind: StructureKind,
        geometry: PlaneGeometry,
    ) -> Self {
        Self {
            metadata,
            slices,
            kind,
            geometry,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &StructureMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn number(&self) -> i32 {
        self.metadata.number
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    #[must_use]
    pub fn color(&self) -> [f64; 3] {
        self.metadata.color
    }

    #[must_use]
    pub fn frame_of_reference_uid(&self) -> &str {
        &self.metadata.frame_of_reference_uid
    }

    #[must_use]
    pub fn referenced_series_uid(&self) -> Option<&str> {
        self.metadata.referenced_series_uid.as_deref()
    }

    #[must_use]
    pub fn slice_instance_uids(&self) -> &BTreeMap<i32, String> {
        &self.metadata.slice_instance_uids
    }

    /// The contour loops, in import order.
    #[must_use]
    pub fn slices(&self) -> &[PolygonSlice] {
        &self.slices
    }

    #[must_use]
    pub fn kind(&self) -> StructureKind {
        self.kind
    }

    /// Returns `true` for a single-point structure.
    #[must_use]
    pub fn is_point(&self) -> bool {
        matches!(self.kind, StructureKind::Point(_))
    }

    /// Full plane geometry, including the warnings raised while estimating it.
    #[must_use]
    pub fn plane_geometry(&self) -> &PlaneGeometry {
        &self.geometry
    }

    /// Representative distance between contour planes (mm).
    #[must_use]
    pub fn slice_thickness(&self) -> f64 {
        self.geometry.spacing
    }

    /// Unit normal of the reference contour plane.
    #[must_use]
    pub fn plane_normal(&self) -> &Vector3 {
        &self.geometry.normal
    }

    /// Contour planes keyed by signed distance from the first plane.
    #[must_use]
    pub fn ordered_planes(&self) -> &BTreeMap<OrderedFloat<f64>, ContourPlane> {
        &self.geometry.planes
    }

    /// Value painted into label volumes for this structure: the region
    /// number when it fits a non-zero `u16`, else 1.
    #[must_use]
    pub fn label_value(&self) -> u16 {
        u16::try_from(self.metadata.number)
            .ok()
            .filter(|&v| v > 0)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(number: i32) -> Structure {
        Structure::new(
            StructureMetadata {
                number,
                ..StructureMetadata::default()
            },
            Vec::new(),
            StructureKind::Polygonal,
            PlaneGeometry::fallback(),
        )
    }

    #[test]
    fn label_value_follows_number() {
        assert_eq!(structure(12).label_value(), 12);
        assert_eq!(structure(0).label_value(), 1);
        assert_eq!(structure(-3).label_value(), 1);
        assert_eq!(structure(70_000).label_value(), 1);
    }

    #[test]
    fn default_metadata_is_red() {
        let s = structure(1);
        assert_eq!(s.color(), DEFAULT_COLOR);
        assert!(!s.is_point());
        assert!(s.referenced_series_uid().is_none());
    }
}
