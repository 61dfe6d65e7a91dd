use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::geometry::ContourPlane;
use crate::math::polygon_3d::first_triple_normal;
use crate::math::{default_normal, Vector3, DEFAULT_SLICE_SPACING, SPACING_TOLERANCE};
use crate::structure::PolygonSlice;

/// Tolerances and fallbacks used when estimating plane geometry.
#[derive(Debug, Clone, Copy)]
pub struct EstimationParams {
    /// Two spacings closer than this are equal; smaller deltas are ignored.
    pub spacing_tolerance: f64,
    /// Allowed deviation of `|n1 · n2|` from 1 for parallel planes.
    pub parallel_tolerance: f64,
    /// Spacing reported when fewer than two distinct planes exist.
    pub fallback_spacing: f64,
}

impl Default for EstimationParams {
    fn default() -> Self {
        Self {
            spacing_tolerance: SPACING_TOLERANCE,
            parallel_tolerance: SPACING_TOLERANCE,
            fallback_spacing: DEFAULT_SLICE_SPACING,
        }
    }
}

/// A recoverable problem found in the contour geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryWarning {
    /// The slice has fewer than three points and cannot define a plane.
    InsufficientPoints { slice: usize, points: usize },
    /// Every point triple of the slice is collinear.
    CollinearSlice { slice: usize },
    /// The slice plane is not parallel to the reference plane.
    NonParallel { slice: usize, dot: f64 },
    /// Plane deltas differ; the majority spacing was used.
    InconsistentSpacing { first: f64, observed: f64 },
    /// Fewer than two distinct planes; the fallback spacing was used.
    TooFewPlanes { planes: usize },
    /// No plane is parallel to the reference; the default normal was used.
    NoParallelPlanes,
}

/// Plane geometry of one structure.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneGeometry {
    /// Representative distance between adjacent planes.
    pub spacing: f64,
    /// Unit normal of the reference plane.
    pub normal: Vector3,
    /// Planes keyed by signed distance from the reference plane.
    pub planes: BTreeMap<OrderedFloat<f64>, ContourPlane>,
    /// Non-zero distances between adjacent planes, in plane order.
    pub deltas: Vec<f64>,
    /// Problems found while estimating.
    pub warnings: Vec<GeometryWarning>,
}

impl PlaneGeometry {
    /// Geometry with no planes, the fallback spacing and the default normal.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            spacing: DEFAULT_SLICE_SPACING,
            normal: default_normal(),
            planes: BTreeMap::new(),
            deltas: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Estimates contour planes, their normal and the slice spacing of a
/// structure.
///
/// A plane is fitted to every slice with at least three non-collinear points.
/// The first fitted plane is the reference at distance 0; the others are
/// keyed by their signed distance along the reference normal. Distances
/// between adjacent planes below the spacing tolerance (contours sharing a
/// plane) are ignored. When the remaining deltas disagree, the most frequent
/// delta wins.
pub struct EstimatePlaneGeometry<'a> {
    slices: &'a [PolygonSlice],
    params: EstimationParams,
}

impl<'a> EstimatePlaneGeometry<'a> {
    /// Creates a new estimator over the given slices.
    #[must_use]
    pub fn new(slices: &'a [PolygonSlice]) -> Self {
        Self {
            slices,
            params: EstimationParams::default(),
        }
    }

    /// Sets custom tolerances.
    #[must_use]
    pub fn with_params(mut self, params: EstimationParams) -> Self {
        self.params = params;
        self
    }

    /// Executes the estimation. Never fails: problems are reported as
    /// [`GeometryWarning`]s and answered with documented fallbacks.
    #[must_use]
    pub fn execute(&self) -> PlaneGeometry {
        let mut warnings = Vec::new();
        let mut planes: BTreeMap<OrderedFloat<f64>, ContourPlane> = BTreeMap::new();
        let mut reference: Option<ContourPlane> = None;
        let mut fitted = 0usize;
        let mut parallel = 0usize;

        for (index, slice) in self.slices.iter().enumerate() {
            if !slice.is_planar_candidate() {
                warn!(slice = index, points = slice.len(), "slice has too few points to fit a plane");
                warnings.push(GeometryWarning::InsufficientPoints {
                    slice: index,
                    points: slice.len(),
                });
                continue;
            }
            let Some((origin, normal)) = first_triple_normal(slice.points()) else {
                warn!(slice = index, "all points of slice are collinear");
                warnings.push(GeometryWarning::CollinearSlice { slice: index });
                continue;
            };
            let Ok(plane) = ContourPlane::from_normal(origin, normal) else {
                continue;
            };
            fitted += 1;

            match &reference {
                None => {
                    planes.insert(OrderedFloat(0.0), plane.clone());
                    reference = Some(plane);
                }
                Some(first) => {
                    if first.is_parallel_to(&plane, self.params.parallel_tolerance) {
                        parallel += 1;
                    } else {
                        let dot = first.normal().dot(plane.normal());
                        warn!(slice = index, dot, "contour plane is not parallel to the reference plane");
                        warnings.push(GeometryWarning::NonParallel { slice: index, dot });
                    }
                    let distance = first.signed_distance(plane.origin());
                    planes.entry(OrderedFloat(distance)).or_insert(plane);
                }
            }
        }

        let normal = match &reference {
            Some(_) if fitted >= 2 && parallel == 0 => {
                warn!("no contour plane is parallel to the reference; using default normal");
                warnings.push(GeometryWarning::NoParallelPlanes);
                default_normal()
            }
            Some(r) => *r.normal(),
            None => default_normal(),
        };

        let deltas: Vec<f64> = planes
            .keys()
            .zip(planes.keys().skip(1))
            .map(|(a, b)| (b.0 - a.0).abs())
            .filter(|d| *d >= self.params.spacing_tolerance)
            .collect();

        let spacing = match deltas.first() {
            None => {
                warn!(
                    planes = planes.len(),
                    fallback = self.params.fallback_spacing,
                    "too few distinct contour planes; using fallback spacing"
                );
                warnings.push(GeometryWarning::TooFewPlanes {
                    planes: planes.len(),
                });
                self.params.fallback_spacing
            }
            Some(&first) => {
                let tol = self.params.spacing_tolerance;
                match deltas.iter().find(|&&d| (d - first).abs() >= tol) {
                    Some(&observed) => {
                        let majority = majority_spacing(&deltas, tol).unwrap_or(first);
                        warn!(first, observed, majority, "inconsistent plane spacing; using majority spacing");
                        warnings.push(GeometryWarning::InconsistentSpacing { first, observed });
                        majority
                    }
                    None => first,
                }
            }
        };

        debug!(spacing, planes = planes.len(), "estimated plane geometry");
        PlaneGeometry {
            spacing,
            normal,
            planes,
            deltas,
            warnings,
        }
    }
}

/// Most frequent value after rounding every value to a multiple of
/// `tolerance`. Ties resolve to the smallest value. Returns `None` for an
/// empty input.
#[must_use]
pub fn majority_spacing(values: &[f64], tolerance: f64) -> Option<f64> {
    let mut counts: BTreeMap<OrderedFloat<f64>, usize> = BTreeMap::new();
    for v in values {
        *counts
            .entry(OrderedFloat((v / tolerance).round() * tolerance))
            .or_insert(0) += 1;
    }
    let mut best: Option<(f64, usize)> = None;
    for (value, count) in counts {
        match best {
            Some((_, c)) if count <= c => {}
            _ => best = Some((value.0, count)),
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point3;
    use approx::assert_relative_eq;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    /// Counter-clockwise square of side 10 at height `z`.
    fn square_at(z: f64) -> PolygonSlice {
        PolygonSlice::new(vec![
            p(0.0, 0.0, z),
            p(10.0, 0.0, z),
            p(10.0, 10.0, z),
            p(0.0, 10.0, z),
        ])
    }

    fn squares(heights: &[f64]) -> Vec<PolygonSlice> {
        heights.iter().map(|&z| square_at(z)).collect()
    }

    // ── spacing ──

    #[test]
    fn even_spacing_is_recovered() {
        for spacing in [0.5, 1.25, 3.0] {
            let heights: Vec<f64> = (0..6).map(|i| f64::from(i) * spacing).collect();
            let slices = squares(&heights);
            let geom = EstimatePlaneGeometry::new(&slices).execute();
            assert_relative_eq!(geom.spacing, spacing, epsilon = 1e-9);
            assert!(geom.warnings.is_empty());
            assert_eq!(geom.planes.len(), 6);
        }
    }

    #[test]
    fn unordered_slices_are_sorted_by_distance() {
        let slices = squares(&[4.0, 0.0, 2.0, 6.0]);
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        let keys: Vec<f64> = geom.planes.keys().map(|k| k.0).collect();
        assert_eq!(keys, vec![-4.0, -2.0, 0.0, 2.0]);
        assert_relative_eq!(geom.spacing, 2.0);
    }

    #[test]
    fn outlier_spacing_loses_to_majority() {
        let slices = squares(&[0.0, 2.0, 4.0, 6.0, 9.0, 11.0]);
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert_relative_eq!(geom.spacing, 2.0, epsilon = 1e-9);
        assert!(matches!(
            geom.warnings.as_slice(),
            [GeometryWarning::InconsistentSpacing { .. }]
        ));
    }

    #[test]
    fn duplicate_plane_is_excluded_and_noise_outvoted() {
        // Four planes 2.5 apart, one 2.6 further, and a second contour at 0.
        let slices = squares(&[0.0, 2.5, 5.0, 7.5, 10.1, 0.0]);
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert_eq!(geom.planes.len(), 5);
        assert_eq!(geom.deltas.len(), 4);
        assert_relative_eq!(geom.spacing, 2.5, epsilon = 1e-9);
        assert!(geom
            .warnings
            .iter()
            .any(|w| matches!(w, GeometryWarning::InconsistentSpacing { .. })));
    }

    #[test]
    fn near_duplicate_planes_do_not_count() {
        let slices = squares(&[0.0, 0.000_01, 3.0, 6.0]);
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert_relative_eq!(geom.spacing, 3.0, epsilon = 1e-4);
        assert!(geom.warnings.is_empty());
    }

    #[test]
    fn single_plane_uses_fallback() {
        let slices = squares(&[5.0]);
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert_relative_eq!(geom.spacing, DEFAULT_SLICE_SPACING);
        assert_eq!(
            geom.warnings,
            vec![GeometryWarning::TooFewPlanes { planes: 1 }]
        );
        assert_relative_eq!(geom.normal, Vector3::new(0.0, 0.0, 1.0));
    }

    // ── degenerate slices ──

    #[test]
    fn collinear_and_short_slices_are_skipped() {
        let mut slices = squares(&[0.0, 1.0]);
        slices.push(PolygonSlice::new(vec![p(0.0, 0.0, 9.0), p(1.0, 0.0, 9.0)]));
        slices.push(PolygonSlice::new(vec![
            p(0.0, 0.0, 7.0),
            p(1.0, 1.0, 7.0),
            p(2.0, 2.0, 7.0),
        ]));
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert_eq!(geom.planes.len(), 2);
        assert_relative_eq!(geom.spacing, 1.0);
        assert!(geom
            .warnings
            .contains(&GeometryWarning::InsufficientPoints { slice: 2, points: 2 }));
        assert!(geom
            .warnings
            .contains(&GeometryWarning::CollinearSlice { slice: 3 }));
    }

    #[test]
    fn no_usable_plane_defaults_everything() {
        let slices = vec![PolygonSlice::new(vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(2.0, 0.0, 0.0),
        ])];
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert!(geom.planes.is_empty());
        assert_relative_eq!(geom.normal, default_normal());
        assert_relative_eq!(geom.spacing, DEFAULT_SLICE_SPACING);
    }

    // ── orientation ──

    #[test]
    fn anti_parallel_winding_is_accepted() {
        let mut slices = squares(&[0.0, 2.0, 4.0]);
        let reversed: Vec<Point3> = slices[1].points().iter().rev().copied().collect();
        slices[1] = PolygonSlice::new(reversed);
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert!(geom.warnings.is_empty());
        assert_relative_eq!(geom.spacing, 2.0);
    }

    #[test]
    fn tilted_slices_fall_back_to_default_normal() {
        let slices = vec![
            PolygonSlice::new(vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0)]),
            PolygonSlice::new(vec![p(0.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(0.0, 0.0, 1.0)]),
        ];
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert!(geom
            .warnings
            .iter()
            .any(|w| matches!(w, GeometryWarning::NonParallel { slice: 1, .. })));
        assert!(geom.warnings.contains(&GeometryWarning::NoParallelPlanes));
        assert_relative_eq!(geom.normal, default_normal());
    }

    #[test]
    fn oblique_planes_use_their_own_normal() {
        let n = Vector3::new(0.0, 1.0, 1.0).normalize();
        let u = Vector3::new(1.0, 0.0, 0.0);
        let w = n.cross(&u);
        let slices: Vec<PolygonSlice> = (0..4)
            .map(|i| {
                let o = Point3::origin() + n * (1.5 * f64::from(i));
                PolygonSlice::new(vec![o, o + u * 5.0, o + u * 5.0 + w * 5.0, o + w * 5.0])
            })
            .collect();
        let geom = EstimatePlaneGeometry::new(&slices).execute();
        assert_relative_eq!(geom.spacing, 1.5, epsilon = 1e-9);
        assert_relative_eq!(geom.normal.dot(&n).abs(), 1.0, epsilon = 1e-9);
    }

    // ── majority_spacing ──

    #[test]
    fn majority_ties_pick_smallest() {
        assert_relative_eq!(
            majority_spacing(&[3.0, 2.0, 3.0, 2.0], 1e-4).unwrap(),
            2.0,
            epsilon = 1e-9
        );
        assert!(majority_spacing(&[], 1e-4).is_none());
    }

    #[test]
    fn majority_rounds_to_tolerance() {
        let values = [2.500_01, 2.499_99, 2.6];
        assert_relative_eq!(majority_spacing(&values, 1e-4).unwrap(), 2.5, epsilon = 1e-9);
    }
}
