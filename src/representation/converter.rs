use std::collections::BTreeMap;

use slotmap::SecondaryMap;
use tracing::{debug, info, info_span, warn};

use super::{
    ConversionContext, ConversionParameter, ConversionParameters, Representation,
    RepresentationData, RepresentationKind, RepresentationOps, RibbonGeometry,
};
use crate::error::{ConversionError, GeometryError, ParameterError, Result, StoreError};
use crate::geometry::{LabelVolume, ReferenceGrid, ReferenceGridId, ReferenceGridRegistry};
use crate::operations::conversion::{CalculateOversamplingFactor, OversamplingSource};
use crate::operations::import::{ImportParams, ImportStructureSet, ImportedStructureSet, StructureSetRecord};
use crate::operations::shaping::BuildRibbon;
use crate::structure::{Structure, StructureId, StructureKind, StructureStore};

/// How many times each expensive conversion ran for one structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionCounters {
    pub ribbon_builds: usize,
    pub rasterizations: usize,
    pub surface_extractions: usize,
}

/// Cached representations, parameters and active kind of one structure.
#[derive(Debug, Clone, Default)]
pub struct StructureRepresentations {
    cache: BTreeMap<RepresentationKind, Representation>,
    params: ConversionParameters,
    active: Option<RepresentationKind>,
    counters: ConversionCounters,
}

impl StructureRepresentations {
    /// The active kind; [`RepresentationKind::None`] before anything exists.
    #[must_use]
    pub fn active_kind(&self) -> RepresentationKind {
        self.active.unwrap_or(RepresentationKind::None)
    }

    #[must_use]
    pub fn active(&self) -> Option<&Representation> {
        self.active.and_then(|kind| self.cache.get(&kind))
    }

    #[must_use]
    pub fn cached(&self, kind: RepresentationKind) -> Option<&Representation> {
        self.cache.get(&kind)
    }

    #[must_use]
    pub fn params(&self) -> &ConversionParameters {
        &self.params
    }

    #[must_use]
    pub fn counters(&self) -> ConversionCounters {
        self.counters
    }

    fn fresh(&self, kind: RepresentationKind) -> Option<&Representation> {
        self.cache.get(&kind).filter(|rep| !rep.is_stale(&self.params))
    }

    fn store(&mut self, representation: Representation) {
        if let Some(old) = self.cache.insert(representation.kind(), representation) {
            old.release();
        }
    }

    /// Picks the surface to rasterize from: the active surface, then a cached
    /// ribbon, then a cached closed surface.
    fn rasterization_source(&self) -> Option<&Representation> {
        match self.active {
            Some(RepresentationKind::RibbonSurface | RepresentationKind::ClosedSurface) => {
                self.active()
            }
            _ => self
                .cache
                .get(&RepresentationKind::RibbonSurface)
                .or_else(|| self.cache.get(&RepresentationKind::ClosedSurface)),
        }
    }
}

/// Owns every structure's representations and drives conversions between
/// them.
///
/// Conversions are pull-based: parameter changes only mark cached results
/// stale, and the work happens on the next request that needs them.
#[derive(Debug, Default)]
pub struct RepresentationConverter {
    entries: SecondaryMap<StructureId, StructureRepresentations>,
}

impl RepresentationConverter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports a structure set into `store` and gives each new structure its
    /// initial ribbon representation.
    ///
    /// A structure whose referenced series names a grid in `registry` gets
    /// that grid as its default reference grid.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ImportStructureSet::execute`].
    pub fn import_structure_set<R>(
        &mut self,
        store: &mut StructureStore,
        record: &StructureSetRecord,
        params: ImportParams,
        registry: &R,
    ) -> Result<ImportedStructureSet>
    where
        R: ReferenceGridRegistry + ?Sized,
    {
        let imported = ImportStructureSet::new(record).with_params(params).execute(store)?;
        for &id in &imported.replaced {
            self.entries.remove(id);
        }
        for &id in &imported.structures {
            let Ok(structure) = store.structure(id) else {
                warn!("imported structure missing from store; no representations created");
                continue;
            };
            let _span = info_span!("initial_ribbon", structure = structure.name()).entered();
            let mut entry = StructureRepresentations::default();
            if let Some(uid) = structure.referenced_series_uid() {
                let grid_id = ReferenceGridId::new(uid);
                if registry.contains(&grid_id) {
                    entry.params.reference_grid = Some(grid_id);
                } else {
                    debug!(series = uid, "referenced series has no registered grid");
                }
            }
            match build_ribbon(structure) {
                Ok(ribbon) => {
                    if matches!(ribbon.data(), RepresentationData::Ribbon(RibbonGeometry::Mesh(_))) {
                        entry.counters.ribbon_builds += 1;
                    }
                    entry.store(ribbon);
                    entry.active = Some(RepresentationKind::RibbonSurface);
                }
                Err(e) => warn!(error = %e, "no initial ribbon"),
            }
            self.entries.insert(id, entry);
        }
        Ok(imported)
    }

    /// Drops all representations of a structure.
    pub fn forget(&mut self, id: StructureId) -> Option<StructureRepresentations> {
        self.entries.remove(id)
    }

    /// Representation state of one structure.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] for an unknown structure.
    pub fn representations(&self, id: StructureId) -> Result<&StructureRepresentations> {
        Ok(self
            .entries
            .get(id)
            .ok_or_else(|| StoreError::EntityNotFound("representations".into()))?)
    }

    fn entry_mut(&mut self, id: StructureId) -> Result<&mut StructureRepresentations> {
        Ok(self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::EntityNotFound("representations".into()))?)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] for an unknown structure.
    pub fn active_kind(&self, id: StructureId) -> Result<RepresentationKind> {
        Ok(self.representations(id)?.active_kind())
    }

    /// The active representation, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] for an unknown structure.
    pub fn active_representation(&self, id: StructureId) -> Result<Option<&Representation>> {
        Ok(self.representations(id)?.active())
    }

    /// Returns `true` if `kind` is cached for the structure, stale or not.
    #[must_use]
    pub fn representation_exists(&self, id: StructureId, kind: RepresentationKind) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.cache.contains_key(&kind))
    }

    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] for an unknown structure.
    pub fn conversion_parameters(&self, id: StructureId) -> Result<&ConversionParameters> {
        Ok(self.representations(id)?.params())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] for an unknown structure.
    pub fn conversion_counts(&self, id: StructureId) -> Result<ConversionCounters> {
        Ok(self.representations(id)?.counters())
    }

    /// Changes one conversion parameter. Cached results that depended on it
    /// become stale; nothing is recomputed until requested.
    ///
    /// # Errors
    ///
    /// Returns a parameter error for an out-of-range value, or
    /// [`StoreError::EntityNotFound`] for an unknown structure.
    pub fn set_conversion_parameter(
        &mut self,
        id: StructureId,
        parameter: ConversionParameter,
    ) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.params.set(parameter)
    }

    /// Makes `target` the active representation, converting if needed.
    ///
    /// A cached, non-stale target is switched to without any work. On error
    /// the active representation is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::NotImplemented`] for conversions without a
    /// path (ribbon straight to closed surface, anything from a point
    /// marker), [`ConversionError::MissingSource`] when nothing to convert
    /// from is cached, or parameter errors when no usable reference grid is
    /// set.
    pub fn request_representation<R>(
        &mut self,
        id: StructureId,
        target: RepresentationKind,
        store: &StructureStore,
        registry: &R,
    ) -> Result<()>
    where
        R: ReferenceGridRegistry + ?Sized,
    {
        let structure = store.structure(id)?;
        let entry = self.entry_mut(id)?;
        let from = entry.active_kind();
        if from == target {
            return Ok(());
        }
        let _span = info_span!("request", structure = structure.name(), ?from, to = ?target).entered();
        if entry.fresh(target).is_some() {
            debug!("cached representation activated");
            entry.active = Some(target);
            return Ok(());
        }

        match target {
            RepresentationKind::None => {
                return Err(ConversionError::NotImplemented { from, to: target }.into());
            }
            RepresentationKind::RibbonSurface => {
                let ribbon = build_ribbon(structure)?;
                entry.counters.ribbon_builds += 1;
                entry.store(ribbon);
            }
            RepresentationKind::IndexedLabelVolume => {
                rasterize(entry, structure, registry)?;
            }
            RepresentationKind::ClosedSurface => {
                if from != RepresentationKind::IndexedLabelVolume {
                    return Err(if entry.cache.contains_key(&RepresentationKind::IndexedLabelVolume)
                        || from != RepresentationKind::None
                    {
                        ConversionError::NotImplemented { from, to: target }
                    } else {
                        ConversionError::MissingSource(target)
                    }
                    .into());
                }
                extract(entry, structure, registry)?;
            }
            RepresentationKind::BitfieldLabelVolume => {
                return Err(ConversionError::MissingSource(target).into());
            }
        }
        entry.active = Some(target);
        info!("representation activated");
        Ok(())
    }

    /// Recomputes `kind` from the best available source, replacing the
    /// cached copy. The active kind does not change.
    ///
    /// Ribbons are rebuilt from contours; label volumes prefer the ribbon;
    /// closed surfaces prefer the label volume, rasterizing one first if
    /// only a surface is cached.
    ///
    /// # Errors
    ///
    /// Same as [`request_representation`](Self::request_representation);
    /// bitfield label volumes cannot be recomputed.
    pub fn reconvert_representation<R>(
        &mut self,
        id: StructureId,
        kind: RepresentationKind,
        store: &StructureStore,
        registry: &R,
    ) -> Result<()>
    where
        R: ReferenceGridRegistry + ?Sized,
    {
        let structure = store.structure(id)?;
        let entry = self.entry_mut(id)?;
        let _span = info_span!("reconvert", structure = structure.name(), ?kind).entered();
        match kind {
            RepresentationKind::RibbonSurface => {
                let ribbon = build_ribbon(structure)?;
                entry.counters.ribbon_builds += 1;
                entry.store(ribbon);
            }
            RepresentationKind::IndexedLabelVolume => {
                let source = entry
                    .cache
                    .get(&RepresentationKind::RibbonSurface)
                    .or_else(|| entry.cache.get(&RepresentationKind::ClosedSurface))
                    .ok_or(ConversionError::MissingSource(kind))?;
                let label = rasterize_from(source, &entry.params, structure, registry)?;
                entry.counters.rasterizations += 1;
                entry.store(label);
            }
            RepresentationKind::ClosedSurface => {
                if !entry.cache.contains_key(&RepresentationKind::IndexedLabelVolume)
                    && entry.rasterization_source().is_none()
                {
                    return Err(ConversionError::MissingSource(kind).into());
                }
                extract(entry, structure, registry)?;
            }
            RepresentationKind::None | RepresentationKind::BitfieldLabelVolume => {
                return Err(ConversionError::MissingSource(kind).into());
            }
        }
        Ok(())
    }

    /// Frees a cached, non-active representation. Returns `false` if nothing
    /// of that kind was cached.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::ReleaseActive`] when `kind` is active.
    pub fn release_representation(&mut self, id: StructureId, kind: RepresentationKind) -> Result<bool> {
        let entry = self.entry_mut(id)?;
        if entry.active == Some(kind) {
            return Err(ConversionError::ReleaseActive(kind).into());
        }
        Ok(entry.cache.remove(&kind).map(RepresentationOps::release).is_some())
    }

    /// Stores an externally produced bitfield label volume. It is cached
    /// alongside the other kinds and never converted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntityNotFound`] for an unknown structure.
    pub fn store_bitfield_label_volume(&mut self, id: StructureId, volume: LabelVolume) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.store(Representation::new(
            RepresentationData::BitfieldLabelVolume(volume),
            super::Provenance::default(),
        ));
        Ok(())
    }

    /// Estimates an oversampling factor from the structure's closed surface,
    /// or its ribbon if no closed surface is cached, and stores it as the
    /// structure's oversampling parameter.
    ///
    /// # Errors
    ///
    /// Returns parameter errors when no usable reference grid is set,
    /// [`ConversionError::MissingSource`] when no surface is cached, or a
    /// geometry error for a point marker or a flat surface.
    pub fn calculate_oversampling_factor<R>(
        &mut self,
        id: StructureId,
        store: &StructureStore,
        registry: &R,
    ) -> Result<f64>
    where
        R: ReferenceGridRegistry + ?Sized,
    {
        let structure = store.structure(id)?;
        let entry = self.entry_mut(id)?;
        let grid = resolve_grid(&entry.params, structure, registry)?;
        let source = match (
            entry.cache.get(&RepresentationKind::ClosedSurface).and_then(Representation::mesh),
            entry.cache.get(&RepresentationKind::RibbonSurface),
        ) {
            (Some(closed), _) => OversamplingSource::ClosedSurface(closed),
            (None, Some(ribbon)) => match ribbon.data() {
                RepresentationData::Ribbon(RibbonGeometry::Mesh(mesh)) => OversamplingSource::Ribbon(mesh),
                _ => {
                    return Err(GeometryError::Degenerate(format!(
                        "point structure {} has no surface",
                        structure.name()
                    ))
                    .into())
                }
            },
            (None, None) => {
                return Err(ConversionError::MissingSource(RepresentationKind::RibbonSurface).into())
            }
        };
        let factor = CalculateOversamplingFactor::new(source, grid).execute()?;
        entry.params.set(ConversionParameter::OversamplingFactor(factor))?;
        info!(structure = structure.name(), factor, "oversampling factor calculated");
        Ok(factor)
    }
}

fn build_ribbon(structure: &Structure) -> Result<Representation> {
    if let StructureKind::Point(point) = structure.kind() {
        return Ok(Representation::ribbon(RibbonGeometry::Marker(point)));
    }
    let mesh = BuildRibbon::new(structure.slices(), structure.slice_thickness())
        .with_normal_hint(*structure.plane_normal())
        .execute()?;
    Ok(Representation::ribbon(RibbonGeometry::Mesh(mesh)))
}

fn resolve_grid<'r, R>(
    params: &ConversionParameters,
    structure: &Structure,
    registry: &'r R,
) -> Result<&'r ReferenceGrid>
where
    R: ReferenceGridRegistry + ?Sized,
{
    let id = params
        .reference_grid
        .as_ref()
        .ok_or_else(|| ParameterError::MissingReferenceGrid(structure.name().to_string()))?;
    Ok(registry
        .grid(id)
        .ok_or_else(|| ParameterError::UnknownReferenceGrid(id.to_string()))?)
}

fn rasterize_from<R>(
    source: &Representation,
    params: &ConversionParameters,
    structure: &Structure,
    registry: &R,
) -> Result<Representation>
where
    R: ReferenceGridRegistry + ?Sized,
{
    if let RepresentationData::Ribbon(RibbonGeometry::Marker(_)) = source.data() {
        return Err(ConversionError::NotImplemented {
            from: RepresentationKind::RibbonSurface,
            to: RepresentationKind::IndexedLabelVolume,
        }
        .into());
    }
    let grid = resolve_grid(params, structure, registry)?;
    let ctx = ConversionContext {
        structure: structure.name(),
        grid: Some(grid),
        params,
        label: structure.label_value(),
    };
    source.convert_to(RepresentationKind::IndexedLabelVolume, &ctx)
}

fn rasterize<R>(
    entry: &mut StructureRepresentations,
    structure: &Structure,
    registry: &R,
) -> Result<()>
where
    R: ReferenceGridRegistry + ?Sized,
{
    let source = entry
        .rasterization_source()
        .ok_or(ConversionError::MissingSource(RepresentationKind::IndexedLabelVolume))?;
    debug!(source = ?source.kind(), "rasterizing");
    let label = rasterize_from(source, &entry.params, structure, registry)?;
    entry.counters.rasterizations += 1;
    entry.store(label);
    Ok(())
}

/// Extracts a closed surface from the label volume, rasterizing a fresh one
/// first if the cached volume is stale or missing.
fn extract<R>(
    entry: &mut StructureRepresentations,
    structure: &Structure,
    registry: &R,
) -> Result<()>
where
    R: ReferenceGridRegistry + ?Sized,
{
    if entry.fresh(RepresentationKind::IndexedLabelVolume).is_none() {
        debug!("label volume stale or missing, rasterizing first");
        rasterize(entry, structure, registry)?;
    }
    let label = entry
        .cache
        .get(&RepresentationKind::IndexedLabelVolume)
        .ok_or(ConversionError::MissingSource(RepresentationKind::ClosedSurface))?;
    let ctx = ConversionContext {
        structure: structure.name(),
        grid: None,
        params: &entry.params,
        label: structure.label_value(),
    };
    let closed = label.convert_to(RepresentationKind::ClosedSurface, &ctx)?;
    entry.counters.surface_extractions += 1;
    entry.store(closed);
    Ok(())
}
