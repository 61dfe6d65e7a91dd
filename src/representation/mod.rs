//! Derived representations of a structure and the state machine that
//! converts between them.

mod converter;

pub use converter::{ConversionCounters, RepresentationConverter, StructureRepresentations};

use tracing::debug;

use crate::error::{ConversionError, ParameterError, Result};
use crate::geometry::grid::validate_oversampling_factor;
use crate::geometry::{LabelVolume, ReferenceGrid, ReferenceGridId, TriangleMesh};
use crate::math::{Point3, TOLERANCE};
use crate::operations::conversion::{ExtractSurface, Rasterize};

/// The kinds of representation a structure can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RepresentationKind {
    None,
    RibbonSurface,
    IndexedLabelVolume,
    ClosedSurface,
    /// Independent cache slot; never converted to or from.
    BitfieldLabelVolume,
}

/// Contents of the ribbon slot: a swept mesh, or the marker of a point
/// structure.
#[derive(Debug, Clone, PartialEq)]
pub enum RibbonGeometry {
    Mesh(TriangleMesh),
    Marker(Point3),
}

/// Geometry owned by a representation.
#[derive(Debug, Clone, PartialEq)]
pub enum RepresentationData {
    Ribbon(RibbonGeometry),
    IndexedLabelVolume(LabelVolume),
    ClosedSurface(TriangleMesh),
    BitfieldLabelVolume(LabelVolume),
}

/// Parameters a representation was produced with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    pub reference_grid: Option<ReferenceGridId>,
    pub oversampling_factor: Option<f64>,
    pub decimation_factor: Option<f64>,
}

/// A derived representation together with the parameters that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    data: RepresentationData,
    provenance: Provenance,
}

impl Representation {
    #[must_use]
    pub fn new(data: RepresentationData, provenance: Provenance) -> Self {
        Self { data, provenance }
    }

    /// A ribbon; ribbons depend on no conversion parameter.
    #[must_use]
    pub fn ribbon(geometry: RibbonGeometry) -> Self {
        Self::new(RepresentationData::Ribbon(geometry), Provenance::default())
    }

    #[must_use]
    pub fn data(&self) -> &RepresentationData {
        &self.data
    }

    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// The surface mesh, for ribbon meshes and closed surfaces.
    #[must_use]
    pub fn mesh(&self) -> Option<&TriangleMesh> {
        match &self.data {
            RepresentationData::Ribbon(RibbonGeometry::Mesh(mesh))
            | RepresentationData::ClosedSurface(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// The voxel data, for either label volume slot.
    #[must_use]
    pub fn label_volume(&self) -> Option<&LabelVolume> {
        match &self.data {
            RepresentationData::IndexedLabelVolume(volume)
            | RepresentationData::BitfieldLabelVolume(volume) => Some(volume),
            _ => None,
        }
    }
}

/// Per-structure conversion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionParameters {
    /// Grid to rasterize onto; `None` until chosen.
    pub reference_grid: Option<ReferenceGridId>,
    /// Resolution multiplier applied to the reference grid, in `(0.01, 100]`.
    pub oversampling_factor: f64,
    /// Fraction of triangles removed from extracted surfaces, in `[0, 1]`.
    pub decimation_target_reduction: f64,
}

impl Default for ConversionParameters {
    fn default() -> Self {
        Self {
            reference_grid: None,
            oversampling_factor: 1.0,
            decimation_target_reduction: 0.0,
        }
    }
}

/// A single conversion parameter change.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionParameter {
    ReferenceGrid(Option<ReferenceGridId>),
    OversamplingFactor(f64),
    DecimationFactor(f64),
}

impl ConversionParameters {
    /// Applies one parameter change after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::ParameterOutOfRange`] for an oversampling
    /// factor outside `(0.01, 100]` or a decimation factor outside `[0, 1]`.
    pub fn set(&mut self, parameter: ConversionParameter) -> Result<()> {
        match parameter {
            ConversionParameter::ReferenceGrid(id) => self.reference_grid = id,
            ConversionParameter::OversamplingFactor(factor) => {
                validate_oversampling_factor(factor)?;
                self.oversampling_factor = factor;
            }
            ConversionParameter::DecimationFactor(reduction) => {
                if !(0.0..=1.0).contains(&reduction) {
                    return Err(ParameterError::ParameterOutOfRange {
                        parameter: "decimation_factor",
                        value: reduction,
                        min: 0.0,
                        max: 1.0,
                    }
                    .into());
                }
                self.decimation_target_reduction = reduction;
            }
        }
        Ok(())
    }

    fn rasterization_matches(&self, provenance: &Provenance) -> bool {
        provenance.reference_grid == self.reference_grid
            && provenance
                .oversampling_factor
                .is_some_and(|f| (f - self.oversampling_factor).abs() <= TOLERANCE)
    }
}

/// Inputs a conversion may need besides its source.
#[derive(Debug, Clone, Copy)]
pub struct ConversionContext<'a> {
    /// Structure name, for error messages.
    pub structure: &'a str,
    /// Resolved reference grid, when one is selected.
    pub grid: Option<&'a ReferenceGrid>,
    pub params: &'a ConversionParameters,
    /// Value painted into label volumes.
    pub label: u16,
}

/// Capabilities shared by every representation variant.
pub trait RepresentationOps {
    /// Which variant this is.
    fn kind(&self) -> RepresentationKind;

    /// Produces the `target` representation directly from this one.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::NotImplemented`] for conversions without a
    /// direct path, and parameter errors when a required grid is missing.
    fn convert_to(
        &self,
        target: RepresentationKind,
        ctx: &ConversionContext<'_>,
    ) -> Result<Representation>;

    /// Returns `true` if `params` differ from the ones this was produced with.
    fn is_stale(&self, params: &ConversionParameters) -> bool;

    /// Drops the geometry buffers.
    fn release(self)
    where
        Self: Sized;
}

impl RepresentationOps for Representation {
    fn kind(&self) -> RepresentationKind {
        match self.data {
            RepresentationData::Ribbon(_) => RepresentationKind::RibbonSurface,
            RepresentationData::IndexedLabelVolume(_) => RepresentationKind::IndexedLabelVolume,
            RepresentationData::ClosedSurface(_) => RepresentationKind::ClosedSurface,
            RepresentationData::BitfieldLabelVolume(_) => RepresentationKind::BitfieldLabelVolume,
        }
    }

    fn convert_to(
        &self,
        target: RepresentationKind,
        ctx: &ConversionContext<'_>,
    ) -> Result<Representation> {
        let from = self.kind();
        if from == target {
            return Ok(self.clone());
        }
        match (&self.data, target) {
            (
                RepresentationData::Ribbon(RibbonGeometry::Mesh(mesh))
                | RepresentationData::ClosedSurface(mesh),
                RepresentationKind::IndexedLabelVolume,
            ) => {
                let grid = ctx
                    .grid
                    .ok_or_else(|| ParameterError::MissingReferenceGrid(ctx.structure.to_string()))?;
                let volume = Rasterize::new(mesh, grid)
                    .with_oversampling(ctx.params.oversampling_factor)
                    .with_label(ctx.label)
                    .execute()?;
                Ok(Representation::new(
                    RepresentationData::IndexedLabelVolume(volume),
                    Provenance {
                        reference_grid: ctx.params.reference_grid.clone(),
                        oversampling_factor: Some(ctx.params.oversampling_factor),
                        decimation_factor: None,
                    },
                ))
            }
            (RepresentationData::IndexedLabelVolume(volume), RepresentationKind::ClosedSurface) => {
                let mesh = ExtractSurface::new(volume)
                    .with_label(ctx.label)
                    .with_decimation(ctx.params.decimation_target_reduction)
                    .execute()?;
                Ok(Representation::new(
                    RepresentationData::ClosedSurface(mesh),
                    Provenance {
                        decimation_factor: Some(ctx.params.decimation_target_reduction),
                        ..self.provenance.clone()
                    },
                ))
            }
            _ => Err(ConversionError::NotImplemented { from, to: target }.into()),
        }
    }

    /// Label volumes go stale when the grid or oversampling changes; closed
    /// surfaces when the decimation changes or the label volume they were
    /// extracted from would now be rasterized differently.
    fn is_stale(&self, params: &ConversionParameters) -> bool {
        match self.data {
            RepresentationData::IndexedLabelVolume(_) => !params.rasterization_matches(&self.provenance),
            RepresentationData::ClosedSurface(_) => {
                let decimation_changed = match self.provenance.decimation_factor {
                    Some(d) => (d - params.decimation_target_reduction).abs() > TOLERANCE,
                    None => true,
                };
                decimation_changed
                    || (self.provenance.oversampling_factor.is_some()
                        && !params.rasterization_matches(&self.provenance))
            }
            RepresentationData::Ribbon(_) | RepresentationData::BitfieldLabelVolume(_) => false,
        }
    }

    /// Consumes the representation; its buffers are freed when `self` drops.
    fn release(self) {
        debug!(kind = ?self.kind(), "representation released");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use crate::operations::shaping::BuildRibbon;
    use crate::structure::PolygonSlice;

    fn grid() -> ReferenceGrid {
        ReferenceGrid::new(Point3::origin(), Vector3::new(1.0, 1.0, 1.0), [10, 10, 10]).unwrap()
    }

    fn ribbon() -> Representation {
        let slices: Vec<PolygonSlice> = (3..6)
            .map(|z| {
                let z = f64::from(z);
                PolygonSlice::new(vec![
                    Point3::new(2.5, 2.5, z),
                    Point3::new(6.5, 2.5, z),
                    Point3::new(6.5, 6.5, z),
                    Point3::new(2.5, 6.5, z),
                ])
            })
            .collect();
        Representation::ribbon(RibbonGeometry::Mesh(BuildRibbon::new(&slices, 1.0).execute().unwrap()))
    }

    fn params(grid: &str) -> ConversionParameters {
        ConversionParameters {
            reference_grid: Some(ReferenceGridId::new(grid)),
            ..ConversionParameters::default()
        }
    }

    // ── parameters ──

    #[test]
    fn parameter_ranges_are_enforced() {
        let mut p = ConversionParameters::default();
        assert!(p.set(ConversionParameter::OversamplingFactor(0.01)).is_err());
        assert!(p.set(ConversionParameter::OversamplingFactor(100.0)).is_ok());
        assert!(p.set(ConversionParameter::DecimationFactor(1.2)).is_err());
        assert!(p.set(ConversionParameter::DecimationFactor(0.3)).is_ok());
        assert_eq!(p.oversampling_factor, 100.0);
        assert_eq!(p.decimation_target_reduction, 0.3);
    }

    // ── conversion and staleness ──

    #[test]
    fn label_volume_tracks_its_parameters() {
        let g = grid();
        let p = params("ct");
        let ctx = ConversionContext {
            structure: "Box",
            grid: Some(&g),
            params: &p,
            label: 2,
        };
        let label = ribbon()
            .convert_to(RepresentationKind::IndexedLabelVolume, &ctx)
            .unwrap();
        assert_eq!(label.kind(), RepresentationKind::IndexedLabelVolume);
        assert_eq!(label.label_volume().unwrap().count(2), 48);
        assert!(!label.is_stale(&p));

        let mut finer = p.clone();
        finer.set(ConversionParameter::OversamplingFactor(2.0)).unwrap();
        assert!(label.is_stale(&finer));
        assert!(label.is_stale(&params("mr")));

        let mut decimated = p.clone();
        decimated.set(ConversionParameter::DecimationFactor(0.5)).unwrap();
        assert!(!label.is_stale(&decimated));

        let closed = label
            .convert_to(RepresentationKind::ClosedSurface, &ctx)
            .unwrap();
        assert!(!closed.is_stale(&p));
        assert!(closed.is_stale(&decimated));
        assert!(closed.is_stale(&finer));
        assert!(closed.mesh().unwrap().is_closed());
    }

    #[test]
    fn missing_grid_is_reported() {
        let p = ConversionParameters::default();
        let ctx = ConversionContext {
            structure: "Box",
            grid: None,
            params: &p,
            label: 1,
        };
        let err = ribbon()
            .convert_to(RepresentationKind::IndexedLabelVolume, &ctx)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ContourError::Parameter(ParameterError::MissingReferenceGrid(_))
        ));
    }

    #[test]
    fn direct_ribbon_to_closed_is_not_implemented() {
        let g = grid();
        let p = params("ct");
        let ctx = ConversionContext {
            structure: "Box",
            grid: Some(&g),
            params: &p,
            label: 1,
        };
        let err = ribbon()
            .convert_to(RepresentationKind::ClosedSurface, &ctx)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ContourError::Conversion(ConversionError::NotImplemented {
                from: RepresentationKind::RibbonSurface,
                to: RepresentationKind::ClosedSurface,
            })
        ));
        let marker = Representation::ribbon(RibbonGeometry::Marker(Point3::origin()));
        assert!(marker
            .convert_to(RepresentationKind::IndexedLabelVolume, &ctx)
            .is_err());
        assert!(!marker.is_stale(&p));
    }
}
