use tracing::{debug, warn};

use crate::error::{GeometryError, Result};
use crate::geometry::{ReferenceGrid, TriangleMesh};
use crate::math::fuzzy::{centroid_of, MembershipFunction};
use crate::operations::query::{ComputeMassProperties, MassProperties, SPHERE_SHAPE_FACTOR};

/// Shape index scaling applied when only a ribbon is available; ribbons lack
/// caps and read as less complex than the closed surface.
const RIBBON_COMPLEXITY_SCALE: f64 = 1.0 / 0.85;

/// Surface used to measure a structure.
#[derive(Debug, Clone, Copy)]
pub enum OversamplingSource<'a> {
    /// A closed surface (preferred).
    ClosedSurface(&'a TriangleMesh),
    /// An open ribbon; measurements are approximate.
    Ribbon(&'a TriangleMesh),
}

/// Chooses an oversampling factor `2^n` for rasterizing a structure onto a
/// reference grid.
///
/// Small structures relative to the grid and complex shapes get finer
/// sampling. The relative size `-log10(V_structure / V_grid)` and the
/// complexity `max(shape_index - 1, 0)` are combined with six fuzzy rules
/// (min t-norm, centroid defuzzification):
///
/// 1. very small size → high oversampling
/// 2. small size and high complexity → high
/// 3. small size and low complexity → medium
/// 4. medium size and high complexity → medium
/// 5. medium size and low complexity → low
/// 6. large size → low
pub struct CalculateOversamplingFactor<'a> {
    source: OversamplingSource<'a>,
    grid: &'a ReferenceGrid,
}

impl<'a> CalculateOversamplingFactor<'a> {
    #[must_use]
    pub fn new(source: OversamplingSource<'a>, grid: &'a ReferenceGrid) -> Self {
        Self { source, grid }
    }

    /// Executes the calculation.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if the surface encloses no
    /// volume.
    pub fn execute(&self) -> Result<f64> {
        let (props, scale) = match self.source {
            OversamplingSource::ClosedSurface(mesh) => {
                (ComputeMassProperties::new(mesh).execute()?, 1.0)
            }
            OversamplingSource::Ribbon(mesh) => {
                warn!("measuring ribbon surface for oversampling; shape estimate may be inaccurate");
                (ribbon_mass_properties(mesh)?, RIBBON_COMPLEXITY_SCALE)
            }
        };

        let relative_size = props.volume / self.grid.physical_volume();
        let size_measure = -relative_size.log10();
        let complexity = (props.normalized_shape_index * scale - 1.0).max(0.0);
        let factor = determine_oversampling_factor(size_measure, complexity);
        debug!(
            relative_size,
            size_measure,
            shape_index = props.normalized_shape_index,
            complexity,
            factor,
            "oversampling factor calculated"
        );
        Ok(factor)
    }
}

/// Mass properties of a ribbon stack.
///
/// The side walls of a prism carry two thirds of the flux the divergence
/// theorem sums for its volume; the missing caps carry the rest.
fn ribbon_mass_properties(mesh: &TriangleMesh) -> Result<MassProperties> {
    let volume = 1.5 * mesh.signed_volume().abs();
    if volume <= 0.0 {
        return Err(GeometryError::Degenerate("ribbon encloses no volume".into()).into());
    }
    let surface_area = mesh.area();
    Ok(MassProperties {
        volume,
        surface_area,
        normalized_shape_index: surface_area.sqrt() / volume.cbrt() / SPHERE_SHAPE_FACTOR,
    })
}

/// Crisp oversampling factor for a size measure and complexity measure.
///
/// Returns `2^round(c)` where `c` is the centroid of the clipped output
/// memberships, or 1 when no rule fires.
#[must_use]
pub fn determine_oversampling_factor(size_measure: f64, complexity: f64) -> f64 {
    let size_large = MembershipFunction::new(&[(0.5, 1.0), (2.0, 0.0)]);
    let size_medium = MembershipFunction::new(&[(0.5, 0.0), (2.0, 1.0), (2.5, 1.0), (3.0, 0.0)]);
    let size_small = MembershipFunction::new(&[(2.5, 0.0), (3.0, 1.0), (3.25, 1.0), (3.75, 0.0)]);
    let size_very_small = MembershipFunction::new(&[(3.25, 0.0), (3.75, 1.0)]);
    let complexity_low = MembershipFunction::new(&[(0.2, 1.0), (0.6, 0.0)]);
    let complexity_high = MembershipFunction::new(&[(0.2, 0.0), (0.6, 1.0)]);

    // Output universe is the base-2 exponent of the factor.
    let low = MembershipFunction::new(&[(-1.0, 1.0), (0.5, 0.0)]);
    let medium = MembershipFunction::new(&[(-1.0, 0.0), (0.5, 1.0), (2.0, 0.0)]);
    let high = MembershipFunction::new(&[(0.5, 0.0), (2.0, 1.0)]);

    let large = size_large.value(size_measure);
    let mid = size_medium.value(size_measure);
    let small = size_small.value(size_measure);
    let very_small = size_very_small.value(size_measure);
    let simple = complexity_low.value(complexity);
    let complex = complexity_high.value(complexity);

    let consequents = [
        high.clipped(very_small),
        high.clipped(small.min(complex)),
        medium.clipped(small.min(simple)),
        medium.clipped(mid.min(complex)),
        low.clipped(mid.min(simple)),
        low.clipped(large),
    ];

    match centroid_of(&consequents) {
        Some(centroid) => (centroid + 0.5).floor().exp2(),
        None => {
            warn!(size_measure, complexity, "no oversampling rule fired; using factor 1");
            1.0
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::LabelVolume;
    use crate::math::{Point3, Vector3};
    use crate::operations::conversion::ExtractSurface;
    use crate::operations::shaping::BuildRibbon;
    use crate::structure::PolygonSlice;
    use approx::assert_relative_eq;

    // ── fuzzy rules ──

    #[test]
    fn large_structures_keep_grid_resolution() {
        assert_relative_eq!(determine_oversampling_factor(0.0, 0.0), 1.0);
    }

    #[test]
    fn very_small_structures_get_high_oversampling() {
        assert_relative_eq!(determine_oversampling_factor(5.0, 0.0), 4.0);
    }

    #[test]
    fn medium_structures_follow_complexity() {
        // Medium size and low complexity fire rule 5 only.
        assert_relative_eq!(determine_oversampling_factor(2.25, 0.0), 1.0);
        // Medium size and high complexity fire rule 4 only.
        assert_relative_eq!(determine_oversampling_factor(2.25, 1.0), 2.0);
    }

    #[test]
    fn small_complex_structures_get_more_than_small_simple() {
        let simple = determine_oversampling_factor(3.1, 0.0);
        let complex = determine_oversampling_factor(3.1, 1.0);
        assert!(complex > simple);
    }

    // ── measurement ──

    fn grid() -> ReferenceGrid {
        ReferenceGrid::new(Point3::origin(), Vector3::new(1.0, 1.0, 1.0), [40, 40, 40]).unwrap()
    }

    #[test]
    fn small_block_in_large_grid_is_oversampled() {
        let mut vol = LabelVolume::empty(grid());
        for k in 10..12 {
            for j in 10..12 {
                for i in 10..12 {
                    vol.voxels_mut()[[k, j, i]] = 1;
                }
            }
        }
        let mesh = ExtractSurface::new(&vol).execute().unwrap();
        let factor = CalculateOversamplingFactor::new(OversamplingSource::ClosedSurface(&mesh), &grid())
            .execute()
            .unwrap();
        assert!(factor >= 2.0, "factor {factor}");
    }

    #[test]
    fn ribbon_volume_accounts_for_missing_caps() {
        let slices: Vec<PolygonSlice> = (0..3)
            .map(|z| {
                let z = f64::from(z);
                PolygonSlice::new(vec![
                    Point3::new(0.0, 0.0, z),
                    Point3::new(4.0, 0.0, z),
                    Point3::new(4.0, 4.0, z),
                    Point3::new(0.0, 4.0, z),
                ])
            })
            .collect();
        let ribbon = BuildRibbon::new(&slices, 1.0).execute().unwrap();
        let props = ribbon_mass_properties(&ribbon).unwrap();
        assert_relative_eq!(props.volume, 48.0, epsilon = 1e-9);
        assert_relative_eq!(props.surface_area, 48.0, epsilon = 1e-9);

        let factor = CalculateOversamplingFactor::new(OversamplingSource::Ribbon(&ribbon), &grid())
            .execute()
            .unwrap();
        assert!(factor >= 1.0);
    }

    #[test]
    fn flat_surface_cannot_be_measured() {
        let mesh = TriangleMesh::from_parts(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        );
        let grid = grid();
        let calc = CalculateOversamplingFactor::new(OversamplingSource::ClosedSurface(&mesh), &grid);
        assert!(calc.execute().is_err());
    }
}
