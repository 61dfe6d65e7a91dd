use tracing::{debug, warn};

use crate::error::{ConversionError, GeometryError, Result};
use crate::geometry::TriangleMesh;
use crate::math::polygon_3d::{newell_normal, remove_coincident_points};
use crate::math::{default_normal, Point3, Vector3, COINCIDENT_POINT_TOLERANCE, TOLERANCE};
use crate::structure::PolygonSlice;

/// Extrudes every contour loop into a thin open shell (a "ribbon").
///
/// Each loop is swept along its own Newell normal by half the slice
/// thickness to either side, so the ribbon of one slice covers exactly its
/// slab. Slices that are not coplanar with a global axis therefore still get
/// a ribbon perpendicular to their own plane. Outer loops are wound so their
/// normal agrees with the normal hint; loops nested inside another loop of
/// the same slice (holes) are wound the other way, so every wall faces away
/// from the material.
pub struct BuildRibbon<'a> {
    slices: &'a [PolygonSlice],
    thickness: f64,
    normal_hint: Option<Vector3>,
}

impl<'a> BuildRibbon<'a> {
    /// Creates a new `BuildRibbon` operation.
    #[must_use]
    pub fn new(slices: &'a [PolygonSlice], thickness: f64) -> Self {
        Self {
            slices,
            thickness,
            normal_hint: None,
        }
    }

    /// Sets the structure normal used to orient loops and as the sweep
    /// direction of degenerate loops.
    #[must_use]
    pub fn with_normal_hint(mut self, normal: Vector3) -> Self {
        self.normal_hint = Some(normal);
        self
    }

    /// Executes the operation, returning the merged ribbon mesh.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if the thickness is not positive
    /// and [`ConversionError::EmptyResult`] if no loop produced a ribbon.
    pub fn execute(&self) -> Result<TriangleMesh> {
        if self.thickness.is_nan() || self.thickness <= TOLERANCE {
            return Err(GeometryError::Degenerate(format!(
                "ribbon thickness must be positive, got {}",
                self.thickness
            ))
            .into());
        }
        let hint = self
            .normal_hint
            .and_then(|n| n.try_normalize(TOLERANCE))
            .unwrap_or_else(default_normal);
        let half_width = self.thickness / 2.0;

        let mut loops = Vec::with_capacity(self.slices.len());
        for (index, slice) in self.slices.iter().enumerate() {
            let points = remove_coincident_points(slice.points(), COINCIDENT_POINT_TOLERANCE);
            if points.len() < 3 {
                warn!(slice = index, points = points.len(), "too few distinct points for a ribbon");
                continue;
            }
            loops.push(orient_loop(points, &hint));
        }

        let mut mesh = TriangleMesh::default();
        for (i, (points, normal)) in loops.iter().enumerate() {
            let depth = loops
                .iter()
                .enumerate()
                .filter(|&(j, (other, other_normal))| {
                    j != i
                        && (points[0] - other[0]).dot(other_normal).abs() < half_width
                        && loop_contains(other, other_normal, &points[0])
                })
                .count();
            if depth % 2 == 1 {
                let reversed: Vec<Point3> = points.iter().rev().copied().collect();
                mesh.merge(&sweep_loop(&reversed, normal, half_width));
            } else {
                mesh.merge(&sweep_loop(points, normal, half_width));
            }
        }

        if mesh.is_empty() {
            return Err(ConversionError::EmptyResult("no contour produced a ribbon".into()).into());
        }
        mesh.compute_normals();
        debug!(triangles = mesh.triangle_count(), "ribbon built");
        Ok(mesh)
    }
}

/// Returns the loop wound counter-clockwise around its normal, with that
/// normal pointing to the same side as `hint`.
fn orient_loop(points: Vec<Point3>, hint: &Vector3) -> (Vec<Point3>, Vector3) {
    match newell_normal(&points) {
        Some(normal) if normal.dot(hint) < 0.0 => (points.into_iter().rev().collect(), -normal),
        Some(normal) => (points, normal),
        None => (points, *hint),
    }
}

/// Even-odd test of `point` against `polygon`, both projected onto the
/// coordinate plane that drops the dominant axis of `normal`.
fn loop_contains(polygon: &[Point3], normal: &Vector3, point: &Point3) -> bool {
    let (u, v) = match normal.iamax() {
        0 => (1, 2),
        1 => (2, 0),
        _ => (0, 1),
    };
    let (px, py) = (point[u], point[v]);
    let n = polygon.len();
    let mut inside = false;
    for i in 0..n {
        let (a, b) = (&polygon[i], &polygon[(i + 1) % n]);
        if (a[v] > py) != (b[v] > py) && px < a[u] + (py - a[v]) * (b[u] - a[u]) / (b[v] - a[v]) {
            inside = !inside;
        }
    }
    inside
}

/// Side walls of one loop: `bottom[i], bottom[j], top[j]` and
/// `bottom[i], top[j], top[i]` for every edge `i -> j`.
#[allow(clippy::cast_possible_truncation)]
fn sweep_loop(points: &[Point3], normal: &Vector3, half_width: f64) -> TriangleMesh {
    let n = points.len();
    let offset = normal * half_width;
    let mut vertices = Vec::with_capacity(2 * n);
    vertices.extend(points.iter().map(|p| p - offset));
    vertices.extend(points.iter().map(|p| p + offset));

    let mut indices = Vec::with_capacity(2 * n);
    for i in 0..n {
        let j = (i + 1) % n;
        let (bi, bj, ti, tj) = (i as u32, j as u32, (n + i) as u32, (n + j) as u32);
        indices.push([bi, bj, tj]);
        indices.push([bi, tj, ti]);
    }
    TriangleMesh::from_parts(vertices, indices)
}
