use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, info_span, warn};

use crate::error::{GeometryError, Result};
use crate::math::Point3;
use crate::operations::query::{majority_spacing, EstimatePlaneGeometry, EstimationParams, PlaneGeometry};
use crate::structure::{
    PolygonSlice, Structure, StructureId, StructureKind, StructureMetadata, StructureStore,
    DEFAULT_COLOR,
};

/// One contour as delivered by the structure-set reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContourRecord {
    /// Flat `x, y, z` coordinates of one closed loop, in patient (LPS)
    /// coordinates.
    pub points: Vec<f64>,
    /// Images this contour was drawn on. Only the first is used.
    pub referenced_instance_uids: Vec<String>,
}

/// One region of interest with its contours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionRecord {
    pub number: i32,
    pub name: String,
    pub description: String,
    pub frame_of_reference_uid: String,
    /// Display color as 8-bit RGB; red when absent.
    pub display_color: Option<[u8; 3]>,
    pub contours: Vec<ContourRecord>,
}

/// A whole structure set: regions plus set-level references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureSetRecord {
    pub regions: Vec<RegionRecord>,
    /// Series the structure set was drawn on.
    pub referenced_series_uid: Option<String>,
    /// Images listed at frame-of-reference level, used when no contour
    /// carries its own image reference.
    pub frame_contour_image_uids: Vec<String>,
}

/// Import settings.
#[derive(Debug, Clone, Copy)]
pub struct ImportParams {
    /// Convert patient LPS coordinates to RAS by negating x and y.
    pub flip_lps_to_ras: bool,
    /// Tolerances for plane geometry estimation.
    pub estimation: EstimationParams,
}

impl Default for ImportParams {
    fn default() -> Self {
        Self {
            flip_lps_to_ras: true,
            estimation: EstimationParams::default(),
        }
    }
}

/// A region that produced no structure.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRegion {
    pub number: i32,
    pub name: String,
    pub reason: String,
}

/// Result of importing a structure set.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedStructureSet {
    /// New structures, in region order.
    pub structures: Vec<StructureId>,
    /// Structures removed from the store because a region replaced them.
    pub replaced: Vec<StructureId>,
    /// Regions that were malformed or empty.
    pub skipped: Vec<SkippedRegion>,
    /// Every distinct image referenced by the imported structures.
    pub referenced_instance_uids: BTreeSet<String>,
    /// Series the set was drawn on.
    pub referenced_series_uid: Option<String>,
    /// Majority plane spacing over all imported structures.
    pub set_spacing: f64,
}

/// Builds one [`Structure`] per region of a structure-set record and adds it
/// to the store.
///
/// A malformed region is skipped with a warning; the rest of the batch is
/// still imported. A region whose number and frame of reference match an
/// existing structure replaces it.
pub struct ImportStructureSet<'a> {
    record: &'a StructureSetRecord,
    params: ImportParams,
}

impl<'a> ImportStructureSet<'a> {
    /// Creates a new import operation with default parameters.
    #[must_use]
    pub fn new(record: &'a StructureSetRecord) -> Self {
        Self {
            record,
            params: ImportParams::default(),
        }
    }

    /// Sets custom import parameters.
    #[must_use]
    pub fn with_params(mut self, params: ImportParams) -> Self {
        self.params = params;
        self
    }

    /// Executes the import.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store is inconsistent; region problems
    /// are reported through [`ImportedStructureSet::skipped`].
    pub fn execute(&self, store: &mut StructureStore) -> Result<ImportedStructureSet> {
        let mut structures = Vec::new();
        let mut replaced = Vec::new();
        let mut skipped = Vec::new();
        let mut referenced_instance_uids = BTreeSet::new();
        let mut all_deltas = Vec::new();

        for region in &self.record.regions {
            let _span = info_span!("region", number = region.number, name = %region.name).entered();

            let structure = match self.build_structure(region) {
                Ok(structure) => structure,
                Err(err) => {
                    warn!(error = %err, "skipping region");
                    skipped.push(SkippedRegion {
                        number: region.number,
                        name: region.name.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            if let Some(existing) = store.find_by_number(region.number, &region.frame_of_reference_uid) {
                store.remove(existing)?;
                if let Some(pos) = structures.iter().position(|&id| id == existing) {
                    warn!("region number repeated within the batch; keeping the later region");
                    structures.remove(pos);
                } else {
                    info!("replacing previously imported structure");
                    replaced.push(existing);
                }
            }
            structures.push(store.add(structure));
        }

        for &id in &structures {
            let structure = store.structure(id)?;
            referenced_instance_uids.extend(structure.slice_instance_uids().values().cloned());
            all_deltas.extend_from_slice(&structure.plane_geometry().deltas);
        }

        let set_spacing = majority_spacing(&all_deltas, self.params.estimation.spacing_tolerance)
            .unwrap_or(self.params.estimation.fallback_spacing);

        info!(
            imported = structures.len(),
            skipped = skipped.len(),
            replaced = replaced.len(),
            set_spacing,
            "structure set imported"
        );

        Ok(ImportedStructureSet {
            structures,
            replaced,
            skipped,
            referenced_instance_uids,
            referenced_series_uid: self.record.referenced_series_uid.clone(),
            set_spacing,
        })
    }

    fn build_structure(&self, region: &RegionRecord) -> Result<Structure> {
        let mut slices = Vec::with_capacity(region.contours.len());
        let mut slice_instance_uids = BTreeMap::new();

        for (index, contour) in region.contours.iter().enumerate() {
            if contour.points.is_empty() || contour.points.len() % 3 != 0 {
                warn!(
                    contour = index,
                    coordinates = contour.points.len(),
                    "dropping contour with malformed coordinate list"
                );
                continue;
            }
            let points: Vec<Point3> = contour
                .points
                .chunks_exact(3)
                .map(|c| self.to_patient_point(c[0], c[1], c[2]))
                .collect();

            let slice_index = i32::try_from(slices.len()).unwrap_or(i32::MAX);
            if let Some(uid) = contour.referenced_instance_uids.first() {
                if contour.referenced_instance_uids.len() > 1 {
                    warn!(contour = index, "contour references multiple images; using the first");
                }
                slice_instance_uids.insert(slice_index, uid.clone());
            }
            slices.push(PolygonSlice::new(points));
        }

        if slices.is_empty() {
            return Err(GeometryError::MalformedRegion(format!(
                "region {} has no valid contours",
                region.number
            ))
            .into());
        }

        if slice_instance_uids.is_empty() {
            // Negative keys: these images cannot be tied to individual contours.
            for (uid, key) in self.record.frame_contour_image_uids.iter().zip((1..).map(|i: i32| -i)) {
                slice_instance_uids.insert(key, uid.clone());
            }
        }

        let (kind, geometry) = match slices.as_slice() {
            [only] if only.is_point() => {
                debug!("point structure");
                (StructureKind::Point(only.points()[0]), PlaneGeometry::fallback())
            }
            _ => {
                let geometry = EstimatePlaneGeometry::new(&slices)
                    .with_params(self.params.estimation)
                    .execute();
                (StructureKind::Polygonal, geometry)
            }
        };

        let color = region
            .display_color
            .map_or(DEFAULT_COLOR, |rgb| rgb.map(|c| f64::from(c) / 255.0));

        let metadata = StructureMetadata {
            number: region.number,
            name: region.name.clone(),
            description: region.description.clone(),
            color,
            frame_of_reference_uid: region.frame_of_reference_uid.clone(),
            referenced_series_uid: self.record.referenced_series_uid.clone(),
            slice_instance_uids,
        };
        Ok(Structure::new(metadata, slices, kind, geometry))
    }

    fn to_patient_point(&self, x: f64, y: f64, z: f64) -> Point3 {
        if self.params.flip_lps_to_ras {
            Point3::new(-x, -y, z)
        } else {
            Point3::new(x, y, z)
        }
    }
}
